// ==========================================
// 仓库循环盘点系统 - 审批流引擎
// ==========================================
// 职责: Submitted → UnderReview → {Approved, Rejected, InProgress(复盘)}
// 红线: 决策日志只追加; 整单流转走 CAS, 两个审批人不可能
//       各自判定通过并双触发调账; 权限检查统一走 Role::meets
// ==========================================

use crate::config::ConfigManager;
use crate::domain::approval::ApprovalDecision;
use crate::domain::journal::Journal;
use crate::domain::types::{ApprovalAction, ApprovalTier, JournalStatus, Role};
use crate::domain::variance::VarianceRecord;
use crate::engine::error::{CountError, CountResult};
use crate::engine::events::{CountEvent, CountEventType, OptionalEventPublisher};
use crate::repository::decision_repo::ApprovalDecisionRepository;
use crate::repository::error::RepositoryError;
use crate::repository::journal_repo::JournalRepository;
use crate::repository::variance_repo::VarianceRecordRepository;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

// ==========================================
// ApprovalWorkflow - 审批流引擎
// ==========================================
pub struct ApprovalWorkflow {
    journal_repo: Arc<JournalRepository>,
    variance_repo: Arc<VarianceRecordRepository>,
    decision_repo: Arc<ApprovalDecisionRepository>,
    config: Arc<ConfigManager>,
    events: OptionalEventPublisher,
}

impl ApprovalWorkflow {
    /// 构造函数
    pub fn new(
        journal_repo: Arc<JournalRepository>,
        variance_repo: Arc<VarianceRecordRepository>,
        decision_repo: Arc<ApprovalDecisionRepository>,
        config: Arc<ConfigManager>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            journal_repo,
            variance_repo,
            decision_repo,
            config,
            events,
        }
    }

    /// 进入审批: Submitted → UnderReview
    ///
    /// # 错误
    /// - `InsufficientAuthority`: 调用方无审批权限 (盘点员)
    /// - `AlreadyReconciled`: 盘点单已调账
    /// - `InvalidTransition`: 状态不是 Submitted
    pub fn begin_review(&self, journal_id: &str, actor: &str, role: Role) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();

        if role.authority().is_none() {
            return Err(CountError::InsufficientAuthority {
                required: ApprovalTier::Lead,
                actual: role,
            });
        }

        if !self
            .journal_repo
            .try_transition(journal_id, &[JournalStatus::Submitted], JournalStatus::UnderReview, now)?
        {
            return Err(self.transition_failure(journal_id, JournalStatus::UnderReview)?);
        }

        tracing::info!("盘点单进入审批: journal_id={}, reviewer={}", journal_id, actor);
        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 整单通过: UnderReview → Approved
    ///
    /// 有效要求层级 = 各明细要求层级的最大值, 其中已被足够权限
    /// 逐条通过的明细按组长层级折算, 明细级决策共同参与整单闸门。
    ///
    /// # 错误
    /// - `InsufficientAuthority`: 角色低于有效要求层级
    /// - `AlreadyReconciled` / `InvalidTransition`: 状态不匹配
    pub fn approve(
        &self,
        journal_id: &str,
        actor: &str,
        role: Role,
        comment: Option<&str>,
    ) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();
        let journal = self.journal_repo.get_by_id(journal_id)?;

        if journal.status != JournalStatus::UnderReview {
            return Err(self.transition_failure(journal_id, JournalStatus::Approved)?);
        }

        let effective = self.effective_required_tier(journal_id)?;
        if !role.meets(effective) {
            return Err(CountError::InsufficientAuthority {
                required: effective,
                actual: role,
            });
        }

        // CAS 流转: 并发审批人中只有一个赢家, 输家回读报 InvalidTransition
        if !self
            .journal_repo
            .try_transition(journal_id, &[JournalStatus::UnderReview], JournalStatus::Approved, now)?
        {
            return Err(self.transition_failure(journal_id, JournalStatus::Approved)?);
        }

        let mut decision =
            ApprovalDecision::journal_level(journal_id, actor, role, ApprovalAction::Approve);
        if let Some(comment) = comment {
            decision = decision.with_comment(comment);
        }
        self.decision_repo.append(&decision)?;

        tracing::info!(
            "盘点单审批通过: journal_id={}, actor={}, role={}, effective_tier={}",
            journal_id,
            actor,
            role,
            effective
        );
        self.events.publish_or_log(CountEvent::journal(
            journal_id,
            CountEventType::JournalApproved,
            Some(actor),
        ));

        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 明细级通过: 低层级审批人在权限内清分明细, 把更高严重度
    /// 的明细留给上级, 不改变盘点单状态
    pub fn approve_lines(
        &self,
        journal_id: &str,
        line_ids: &[String],
        actor: &str,
        role: Role,
        comment: Option<&str>,
    ) -> CountResult<()> {
        let journal = self.journal_repo.get_by_id(journal_id)?;
        if journal.status != JournalStatus::UnderReview {
            return Err(CountError::InvalidTransition {
                from: journal.status.to_string(),
                to: JournalStatus::UnderReview.to_string(),
            });
        }

        let tier_by_line = self.current_tier_by_line(journal_id)?;

        // 先整体校验权限, 避免部分写入
        for line_id in line_ids {
            let required = self.line_tier(&tier_by_line, line_id)?;
            if !role.meets(required) {
                return Err(CountError::InsufficientAuthority {
                    required,
                    actual: role,
                });
            }
        }

        for line_id in line_ids {
            let mut decision = ApprovalDecision::line_level(
                journal_id,
                line_id,
                actor,
                role,
                ApprovalAction::Approve,
            );
            if let Some(comment) = comment {
                decision = decision.with_comment(comment);
            }
            self.decision_repo.append(&decision)?;
        }

        tracing::info!(
            "明细级通过: journal_id={}, actor={}, lines={}",
            journal_id,
            actor,
            line_ids.len()
        );
        Ok(())
    }

    /// 驳回
    ///
    /// - 指定明细: 选中明细进入复盘新轮次, 盘点单回到盘点中,
    ///   未选中明细保持既有状态不动
    /// - 不指定明细 (整单驳回): UnderReview → Rejected (终态)
    pub fn reject(
        &self,
        journal_id: &str,
        line_ids: &[String],
        actor: &str,
        role: Role,
        comment: Option<&str>,
    ) -> CountResult<Journal> {
        if line_ids.is_empty() {
            self.reject_journal(journal_id, actor, role, comment)
        } else {
            self.reject_lines_for_recount(journal_id, line_ids, actor, role, comment)
        }
    }

    /// 上报: 仅路由事件与决策留痕, 不改变盘点单状态
    pub fn escalate(
        &self,
        journal_id: &str,
        actor: &str,
        role: Role,
        comment: Option<&str>,
    ) -> CountResult<()> {
        let journal = self.journal_repo.get_by_id(journal_id)?;

        if role.authority().is_none() {
            return Err(CountError::InsufficientAuthority {
                required: ApprovalTier::Lead,
                actual: role,
            });
        }

        if !matches!(
            journal.status,
            JournalStatus::Submitted | JournalStatus::UnderReview
        ) {
            return Err(CountError::InvalidTransition {
                from: journal.status.to_string(),
                to: JournalStatus::UnderReview.to_string(),
            });
        }

        let mut decision =
            ApprovalDecision::journal_level(journal_id, actor, role, ApprovalAction::Escalate);
        if let Some(comment) = comment {
            decision = decision.with_comment(comment);
        }
        self.decision_repo.append(&decision)?;

        self.events.publish_or_log(
            CountEvent::journal(journal_id, CountEventType::JournalEscalated, Some(actor))
                .with_detail(format!("上报人角色: {}", role)),
        );

        Ok(())
    }

    /// 盘点单的有效要求审批层级
    ///
    /// 折叠规则: 明细当前轮次的要求层级, 若已有足够权限的明细级
    /// Approve 决策 (晚于该轮差异计算时刻), 折算为组长层级。
    pub fn effective_required_tier(&self, journal_id: &str) -> CountResult<ApprovalTier> {
        let variances = self.variance_repo.list_current_by_journal(journal_id)?;
        let decisions = self.decision_repo.list_by_journal(journal_id)?;

        let mut effective = ApprovalTier::Lead;
        for record in &variances {
            let cleared = decisions.iter().any(|d| {
                d.line_id.as_deref() == Some(record.line_id.as_str())
                    && d.action == ApprovalAction::Approve
                    && d.actor_role.meets(record.required_tier)
                    && d.decided_at >= record.computed_at
            });

            let line_tier = if cleared {
                ApprovalTier::Lead
            } else {
                record.required_tier
            };
            effective = effective.max(line_tier);
        }

        Ok(effective)
    }

    /// 盘点单的决策日志 (审计追加序)
    pub fn decision_log(&self, journal_id: &str) -> CountResult<Vec<ApprovalDecision>> {
        Ok(self.decision_repo.list_by_journal(journal_id)?)
    }

    // ==========================================
    // 内部实现
    // ==========================================

    /// 整单驳回: UnderReview → Rejected
    fn reject_journal(
        &self,
        journal_id: &str,
        actor: &str,
        role: Role,
        comment: Option<&str>,
    ) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();
        let journal = self.journal_repo.get_by_id(journal_id)?;

        if journal.status != JournalStatus::UnderReview {
            return Err(self.transition_failure(journal_id, JournalStatus::Rejected)?);
        }

        let effective = self.effective_required_tier(journal_id)?;
        if !role.meets(effective) {
            return Err(CountError::InsufficientAuthority {
                required: effective,
                actual: role,
            });
        }

        if !self
            .journal_repo
            .try_transition(journal_id, &[JournalStatus::UnderReview], JournalStatus::Rejected, now)?
        {
            return Err(self.transition_failure(journal_id, JournalStatus::Rejected)?);
        }

        let mut decision =
            ApprovalDecision::journal_level(journal_id, actor, role, ApprovalAction::Reject);
        if let Some(comment) = comment {
            decision = decision.with_comment(comment);
        }
        self.decision_repo.append(&decision)?;

        tracing::info!("盘点单整单驳回: journal_id={}, actor={}", journal_id, actor);
        self.events.publish_or_log(CountEvent::journal(
            journal_id,
            CountEventType::JournalRejected,
            Some(actor),
        ));

        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 按明细驳回复盘: 选中明细进入新轮次, 盘点单回到盘点中
    fn reject_lines_for_recount(
        &self,
        journal_id: &str,
        line_ids: &[String],
        actor: &str,
        role: Role,
        comment: Option<&str>,
    ) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();
        let journal = self.journal_repo.get_by_id(journal_id)?;

        if journal.status != JournalStatus::UnderReview {
            return Err(self.transition_failure(journal_id, JournalStatus::InProgress)?);
        }

        let tier_by_line = self.current_tier_by_line(journal_id)?;
        for line_id in line_ids {
            let required = self.line_tier(&tier_by_line, line_id)?;
            if !role.meets(required) {
                return Err(CountError::InsufficientAuthority {
                    required,
                    actual: role,
                });
            }
        }

        // 原持有人保留并获得新租约, 便于原盘点人直接复盘
        let lease_expires_at = now + Duration::seconds(self.config.get_claim_lease_seconds());

        if !self.journal_repo.try_reject_lines_for_recount(
            journal_id,
            line_ids,
            journal.revision,
            lease_expires_at,
            now,
        )? {
            let current = self.journal_repo.get_by_id(journal_id)?;
            if current.status != JournalStatus::UnderReview {
                return Err(self.transition_failure(journal_id, JournalStatus::InProgress)?);
            }
            return Err(CountError::Repository(
                RepositoryError::OptimisticLockFailure {
                    journal_id: journal_id.to_string(),
                    expected: journal.revision,
                    actual: current.revision,
                },
            ));
        }

        for line_id in line_ids {
            let mut decision = ApprovalDecision::line_level(
                journal_id,
                line_id,
                actor,
                role,
                ApprovalAction::Reject,
            );
            if let Some(comment) = comment {
                decision = decision.with_comment(comment);
            }
            self.decision_repo.append(&decision)?;
        }

        tracing::info!(
            "明细驳回复盘: journal_id={}, actor={}, lines={:?}",
            journal_id,
            actor,
            line_ids
        );
        self.events.publish_or_log(CountEvent::lines(
            journal_id,
            CountEventType::RecountRequested,
            Some(actor),
            line_ids.to_vec(),
        ));

        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 明细当前轮次的要求层级映射
    fn current_tier_by_line(
        &self,
        journal_id: &str,
    ) -> CountResult<HashMap<String, ApprovalTier>> {
        let variances = self.variance_repo.list_current_by_journal(journal_id)?;
        Ok(variances
            .into_iter()
            .map(|r: VarianceRecord| (r.line_id, r.required_tier))
            .collect())
    }

    /// 取出明细要求层级, 缺失差异记录视为数据异常
    fn line_tier(
        &self,
        tier_by_line: &HashMap<String, ApprovalTier>,
        line_id: &str,
    ) -> CountResult<ApprovalTier> {
        tier_by_line.get(line_id).copied().ok_or_else(|| {
            CountError::Repository(RepositoryError::NotFound {
                entity: "VarianceRecord".to_string(),
                id: line_id.to_string(),
            })
        })
    }

    /// 流转失败时的统一错误判定 (回读当前状态)
    fn transition_failure(
        &self,
        journal_id: &str,
        intended: JournalStatus,
    ) -> CountResult<CountError> {
        let current = self.journal_repo.get_by_id(journal_id)?;
        if current.status == JournalStatus::Reconciled {
            return Ok(CountError::AlreadyReconciled {
                journal_id: journal_id.to_string(),
            });
        }
        Ok(CountError::InvalidTransition {
            from: current.status.to_string(),
            to: intended.to_string(),
        })
    }
}
