// ==========================================
// 仓库循环盘点系统 - 盘点单生成引擎
// ==========================================
// 职责: 按计划范围把时点库存快照展开为盘点单与有序明细
// 红线: 期望数量取快照时点值并就此冻结, 引擎不回查库存;
//       生成的盘点单进入派工池 (Pending)
// ==========================================

use crate::domain::journal::{Journal, JournalLine, SnapshotEntry};
use crate::domain::plan::CountPlan;
use crate::domain::types::{JournalStatus, LineStatus, PlanStatus};
use crate::engine::error::{CountError, CountResult};
use crate::repository::journal_repo::JournalRepository;
use crate::repository::plan_repo::CountPlanRepository;
use crate::repository::error::RepositoryError;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// JournalFactory - 盘点单生成引擎
// ==========================================
pub struct JournalFactory {
    plan_repo: Arc<CountPlanRepository>,
    journal_repo: Arc<JournalRepository>,
}

impl JournalFactory {
    /// 构造函数
    pub fn new(plan_repo: Arc<CountPlanRepository>, journal_repo: Arc<JournalRepository>) -> Self {
        Self {
            plan_repo,
            journal_repo,
        }
    }

    /// 展开计划: 快照行按计划范围过滤, 按库位聚合为盘点单
    ///
    /// 说明:
    /// - 每库位一张盘点单, 明细按物料编码排序赋序号
    /// - 命中的范围选择器把库区/技能要求标注到盘点单
    /// - 重复的 (库位, 物料) 快照行保留首行并告警
    ///
    /// # 错误
    /// - `InvalidTransition`: 计划不是 Active
    pub fn expand(&self, plan_id: &str, snapshot: &[SnapshotEntry]) -> CountResult<Vec<Journal>> {
        let plan = self
            .plan_repo
            .find_by_id(plan_id)?
            .ok_or(RepositoryError::NotFound {
                entity: "CountPlan".to_string(),
                id: plan_id.to_string(),
            })?;

        if !plan.is_active() {
            return Err(CountError::InvalidTransition {
                from: plan.status.to_string(),
                to: PlanStatus::Active.to_string(),
            });
        }

        let grouped = self.group_in_scope(&plan, snapshot);
        let now = chrono::Utc::now().naive_utc();
        let mut journals = Vec::with_capacity(grouped.len());

        for (location_code, entries) in grouped {
            // 首个命中选择器决定盘点单的库区/技能标注
            let selector = entries
                .first()
                .and_then(|e| plan.scope_match(&e.location_code, &e.item_code));

            let journal = Journal {
                journal_id: Uuid::new_v4().to_string(),
                plan_id: plan.plan_id.clone(),
                location_code: location_code.clone(),
                zone: selector.and_then(|s| s.zone.clone()),
                required_skill: selector.and_then(|s| s.required_skill.clone()),
                status: JournalStatus::Pending,
                assigned_operator: None,
                claimed_at: None,
                lease_expires_at: None,
                required_tier: None,
                revision: 0,
                created_at: now,
                updated_at: now,
            };

            let lines: Vec<JournalLine> = entries
                .iter()
                .enumerate()
                .map(|(idx, entry)| JournalLine {
                    line_id: Uuid::new_v4().to_string(),
                    journal_id: journal.journal_id.clone(),
                    seq_no: (idx + 1) as i32,
                    location_code: entry.location_code.clone(),
                    item_code: entry.item_code.clone(),
                    expected_qty: entry.on_hand_qty,
                    counted_qty: None,
                    count_pass: 1,
                    status: LineStatus::Uncounted,
                    skip_reason: None,
                    serial_refs: vec![],
                    photo_refs: vec![],
                    counted_by: None,
                    counted_at: None,
                })
                .collect();

            self.journal_repo.create_with_lines(&journal, &lines)?;
            tracing::info!(
                "盘点单生成: journal_id={}, location={}, lines={}",
                journal.journal_id,
                location_code,
                lines.len()
            );
            journals.push(journal);
        }

        tracing::info!(
            "计划展开完成: plan_id={}, journals={}, snapshot_rows={}",
            plan_id,
            journals.len(),
            snapshot.len()
        );
        Ok(journals)
    }

    /// 范围过滤 + 按库位聚合 (BTreeMap 保证库位序稳定)
    fn group_in_scope<'a>(
        &self,
        plan: &CountPlan,
        snapshot: &'a [SnapshotEntry],
    ) -> BTreeMap<String, Vec<&'a SnapshotEntry>> {
        let mut grouped: BTreeMap<String, Vec<&SnapshotEntry>> = BTreeMap::new();

        for entry in snapshot {
            if plan.scope_match(&entry.location_code, &entry.item_code).is_none() {
                continue;
            }

            let bucket = grouped.entry(entry.location_code.clone()).or_default();
            if bucket
                .iter()
                .any(|existing| existing.item_code == entry.item_code)
            {
                tracing::warn!(
                    "快照行重复, 保留首行: location={}, item={}",
                    entry.location_code,
                    entry.item_code
                );
                continue;
            }
            bucket.push(entry);
        }

        // 明细按物料编码排序
        for bucket in grouped.values_mut() {
            bucket.sort_by(|a, b| a.item_code.cmp(&b.item_code));
        }

        grouped
    }
}
