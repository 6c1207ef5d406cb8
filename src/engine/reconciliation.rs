// ==========================================
// 仓库循环盘点系统 - 调账引擎
// ==========================================
// 职责: 终审通过后生成库存调账事务批次并关闭盘点单
// 红线: 批次按盘点单ID幂等 (非按调用); 批次写入与状态翻转
//       全有或全无; "批次与状态不一致" 是完整性故障, 硬告警
//       上浮, 绝不静默自愈
// ==========================================

use crate::domain::reconciliation::{ReconciliationBatch, ReconciliationTransaction};
use crate::domain::types::JournalStatus;
use crate::engine::error::{CountError, CountResult};
use crate::engine::events::{CountEvent, CountEventType, OptionalEventPublisher};
use crate::engine::plan_manager::CountPlanManager;
use crate::repository::journal_repo::JournalRepository;
use crate::repository::reconciliation_repo::ReconciliationRepository;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// ReconciliationEngine - 调账引擎
// ==========================================
pub struct ReconciliationEngine {
    journal_repo: Arc<JournalRepository>,
    recon_repo: Arc<ReconciliationRepository>,
    plan_manager: Arc<CountPlanManager>,
    events: OptionalEventPublisher,
}

impl ReconciliationEngine {
    /// 构造函数
    pub fn new(
        journal_repo: Arc<JournalRepository>,
        recon_repo: Arc<ReconciliationRepository>,
        plan_manager: Arc<CountPlanManager>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            journal_repo,
            recon_repo,
            plan_manager,
            events,
        }
    }

    /// 调账: 为已批准盘点单写入调账事务批次并翻转为 Reconciled
    ///
    /// 幂等语义: 已调账的盘点单返回既有批次 (newly_applied=false),
    /// 不会二次套用任何数量差; 超时重试是预期路径而非异常。
    ///
    /// # 错误
    /// - `NotApproved`: 盘点单不在 Approved 状态
    /// - `IntegrityFault`: 批次与状态不一致 (部分写入), 需人工介入
    pub fn reconcile(&self, journal_id: &str, actor: &str) -> CountResult<ReconciliationBatch> {
        let now = chrono::Utc::now().naive_utc();
        let journal = self.journal_repo.get_by_id(journal_id)?;
        let existing = self.recon_repo.count_by_journal(journal_id)?;

        match (journal.status, existing) {
            // 重试路径: 返回既有批次, 不二次调账
            (JournalStatus::Reconciled, n) if n > 0 => {
                tracing::info!(
                    "盘点单已调账, 返回既有批次: journal_id={}, txns={}",
                    journal_id,
                    n
                );
                return Ok(ReconciliationBatch {
                    journal_id: journal_id.to_string(),
                    transactions: self.recon_repo.list_by_journal(journal_id)?,
                    newly_applied: false,
                });
            }
            // 状态已翻转但批次缺失: 完整性故障
            (JournalStatus::Reconciled, _) => {
                return Err(self.integrity_fault(journal_id, "状态为 RECONCILED 但调账批次缺失"));
            }
            // 批次存在但状态未翻转: 前序非原子写入的痕迹, 完整性故障
            (status, n) if n > 0 => {
                return Err(self.integrity_fault(
                    journal_id,
                    &format!("状态为 {} 但已存在 {} 条调账事务", status, n),
                ));
            }
            (JournalStatus::Approved, _) => {}
            (status, _) => {
                return Err(CountError::NotApproved {
                    journal_id: journal_id.to_string(),
                    status,
                });
            }
        }

        // 每条已盘点明细一笔带符号数量差; 跳过明细不产生调账
        let lines = self.journal_repo.find_lines(journal_id)?;
        let transactions: Vec<ReconciliationTransaction> = lines
            .iter()
            .filter_map(|line| {
                line.adjustment_delta().map(|delta| ReconciliationTransaction {
                    txn_id: Uuid::new_v4().to_string(),
                    journal_id: journal_id.to_string(),
                    line_id: line.line_id.clone(),
                    location_code: line.location_code.clone(),
                    item_code: line.item_code.clone(),
                    delta_qty: delta,
                    applied_at: now,
                })
            })
            .collect();

        // 批次写入与状态翻转单事务完成
        let written =
            self.recon_repo
                .try_write_batch(journal_id, journal.revision, &transactions, now)?;

        if !written {
            // CAS 失败: 并发调账已完成则返回既有批次, 维持幂等
            let current = self.journal_repo.get_by_id(journal_id)?;
            if current.status == JournalStatus::Reconciled {
                let txns = self.recon_repo.list_by_journal(journal_id)?;
                if txns.is_empty() {
                    return Err(
                        self.integrity_fault(journal_id, "状态为 RECONCILED 但调账批次缺失")
                    );
                }
                return Ok(ReconciliationBatch {
                    journal_id: journal_id.to_string(),
                    transactions: txns,
                    newly_applied: false,
                });
            }
            return Err(CountError::NotApproved {
                journal_id: journal_id.to_string(),
                status: current.status,
            });
        }

        tracing::info!(
            "盘点单调账完成: journal_id={}, actor={}, txns={}",
            journal_id,
            actor,
            transactions.len()
        );
        self.events.publish_or_log(CountEvent::journal(
            journal_id,
            CountEventType::JournalReconciled,
            Some(actor),
        ));

        // 计划自动关闭判定 (幂等, 失败不影响调账结果)
        if let Err(e) = self.plan_manager.try_auto_close(&journal.plan_id) {
            tracing::warn!(
                "计划自动关闭判定失败: plan_id={}, err={}",
                journal.plan_id,
                e
            );
        }

        Ok(ReconciliationBatch {
            journal_id: journal_id.to_string(),
            transactions,
            newly_applied: true,
        })
    }

    /// 完整性探针: 校验批次与状态的一致性 (巡检用, 只读)
    ///
    /// # 返回
    /// - Ok(()): 一致
    /// - Err(IntegrityFault): 不一致, 需人工介入
    pub fn verify_integrity(&self, journal_id: &str) -> CountResult<()> {
        let journal = self.journal_repo.get_by_id(journal_id)?;
        let count = self.recon_repo.count_by_journal(journal_id)?;

        match (journal.status, count) {
            (JournalStatus::Reconciled, 0) => {
                Err(self.integrity_fault(journal_id, "状态为 RECONCILED 但调账批次缺失"))
            }
            (status, n) if status != JournalStatus::Reconciled && n > 0 => Err(self
                .integrity_fault(
                    journal_id,
                    &format!("状态为 {} 但已存在 {} 条调账事务", status, n),
                )),
            _ => Ok(()),
        }
    }

    /// 构造完整性故障并记录硬告警
    fn integrity_fault(&self, journal_id: &str, detail: &str) -> CountError {
        tracing::error!(
            "调账完整性故障 (需人工介入): journal_id={}, {}",
            journal_id,
            detail
        );
        CountError::IntegrityFault {
            journal_id: journal_id.to_string(),
            detail: detail.to_string(),
        }
    }
}
