// ==========================================
// 仓库循环盘点系统 - 盘点计划引擎
// ==========================================
// 职责: 计划生命周期 Draft → Active → Closed
// 说明: 全部盘点单调账完成 或 盘点窗口过期 时自动关闭
// ==========================================

use crate::domain::plan::{CountPlan, ScopeSelector};
use crate::domain::types::PlanStatus;
use crate::engine::error::{CountError, CountResult};
use crate::engine::events::{CountEvent, CountEventType, OptionalEventPublisher};
use crate::repository::error::RepositoryError;
use crate::repository::journal_repo::JournalRepository;
use crate::repository::plan_repo::CountPlanRepository;
use chrono::NaiveDateTime;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// CountPlanManager - 盘点计划引擎
// ==========================================
pub struct CountPlanManager {
    plan_repo: Arc<CountPlanRepository>,
    journal_repo: Arc<JournalRepository>,
    events: OptionalEventPublisher,
}

impl CountPlanManager {
    /// 构造函数
    pub fn new(
        plan_repo: Arc<CountPlanRepository>,
        journal_repo: Arc<JournalRepository>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            plan_repo,
            journal_repo,
            events,
        }
    }

    /// 创建盘点计划 (草稿)
    pub fn create_plan(
        &self,
        plan_name: &str,
        scope: Vec<ScopeSelector>,
        cadence_days: i32,
        due_start: NaiveDateTime,
        due_end: NaiveDateTime,
        created_by: &str,
    ) -> CountResult<CountPlan> {
        if scope.is_empty() {
            return Err(CountError::Repository(RepositoryError::ValidationError(
                "盘点范围不可为空".to_string(),
            )));
        }
        if cadence_days <= 0 {
            return Err(CountError::Repository(RepositoryError::ValidationError(
                format!("盘点节奏必须为正数天: {}", cadence_days),
            )));
        }
        if due_start >= due_end {
            return Err(CountError::Repository(RepositoryError::ValidationError(
                "盘点窗口起必须早于窗口止".to_string(),
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        let plan = CountPlan {
            plan_id: Uuid::new_v4().to_string(),
            plan_name: plan_name.to_string(),
            scope,
            cadence_days,
            due_start,
            due_end,
            status: PlanStatus::Draft,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.plan_repo.create(&plan)?;
        tracing::info!("盘点计划创建: plan_id={}, name={}", plan.plan_id, plan_name);

        Ok(plan)
    }

    /// 激活计划: Draft → Active, 激活后范围/节奏/窗口冻结
    pub fn activate(&self, plan_id: &str) -> CountResult<CountPlan> {
        let now = chrono::Utc::now().naive_utc();

        if !self
            .plan_repo
            .transition_status(plan_id, PlanStatus::Draft, PlanStatus::Active, now)?
        {
            let current = self.get(plan_id)?;
            return Err(CountError::InvalidTransition {
                from: current.status.to_string(),
                to: PlanStatus::Active.to_string(),
            });
        }

        tracing::info!("盘点计划激活: plan_id={}", plan_id);
        Ok(self.get(plan_id)?)
    }

    /// 关闭计划: Active → Closed
    pub fn close(&self, plan_id: &str, reason: &str) -> CountResult<CountPlan> {
        let now = chrono::Utc::now().naive_utc();

        if !self
            .plan_repo
            .transition_status(plan_id, PlanStatus::Active, PlanStatus::Closed, now)?
        {
            let current = self.get(plan_id)?;
            return Err(CountError::InvalidTransition {
                from: current.status.to_string(),
                to: PlanStatus::Closed.to_string(),
            });
        }

        tracing::info!("盘点计划关闭: plan_id={}, reason={}", plan_id, reason);
        self.events.publish_or_log(
            CountEvent::journal(plan_id, CountEventType::PlanClosed, None).with_detail(reason),
        );

        Ok(self.get(plan_id)?)
    }

    /// 自动关闭判定 (幂等): 全部盘点单调账完成 或 窗口过期 时关闭
    ///
    /// # 返回
    /// - Ok(true): 本次调用完成了关闭
    /// - Ok(false): 不满足关闭条件或已关闭
    pub fn try_auto_close(&self, plan_id: &str) -> CountResult<bool> {
        let now = chrono::Utc::now().naive_utc();
        let plan = self.get(plan_id)?;

        if !plan.is_active() {
            return Ok(false);
        }

        let open_journals = self.journal_repo.count_open_by_plan(plan_id)?;
        let reason = if open_journals == 0 {
            "全部盘点单已调账完成"
        } else if plan.due_window_lapsed(now) {
            "盘点窗口已过期"
        } else {
            return Ok(false);
        };

        // CAS 关闭, 并发调用只有一个生效
        let closed =
            self.plan_repo
                .transition_status(plan_id, PlanStatus::Active, PlanStatus::Closed, now)?;
        if closed {
            tracing::info!("盘点计划自动关闭: plan_id={}, reason={}", plan_id, reason);
            self.events.publish_or_log(
                CountEvent::journal(plan_id, CountEventType::PlanClosed, None).with_detail(reason),
            );
        }

        Ok(closed)
    }

    /// 按 plan_id 读取计划
    pub fn get(&self, plan_id: &str) -> CountResult<CountPlan> {
        Ok(self
            .plan_repo
            .find_by_id(plan_id)?
            .ok_or(RepositoryError::NotFound {
                entity: "CountPlan".to_string(),
                id: plan_id.to_string(),
            })?)
    }
}
