// ==========================================
// 仓库循环盘点系统 - 盘点会话引擎
// ==========================================
// 职责: 驱动持有人对一张盘点单逐条明细的盘点协议
// 红线: 同轮次内录入可覆盖 (幂等), 提交后轮次冻结;
//       提交与差异计算同事务, 外部观察不到未计算差异的已提交单
// ==========================================

use crate::domain::journal::{CountEvidence, Journal, JournalLine};
use crate::domain::types::JournalStatus;
use crate::engine::error::{CountError, CountResult};
use crate::engine::events::{CountEvent, CountEventType, OptionalEventPublisher};
use crate::engine::variance::VarianceEngine;
use crate::repository::error::RepositoryError;
use crate::repository::journal_repo::JournalRepository;
use std::sync::Arc;

// ==========================================
// CountSession - 盘点会话引擎
// ==========================================
pub struct CountSession {
    journal_repo: Arc<JournalRepository>,
    variance_engine: Arc<VarianceEngine>,
    events: OptionalEventPublisher,
}

impl CountSession {
    /// 构造函数
    pub fn new(
        journal_repo: Arc<JournalRepository>,
        variance_engine: Arc<VarianceEngine>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            journal_repo,
            variance_engine,
            events,
        }
    }

    /// 录入盘点数量
    ///
    /// 同轮次幂等: 提交前重复录入覆盖待定值, 不产生历史;
    /// 历史由差异记录按轮次保留, 提交后改数必须走复盘新轮次。
    ///
    /// # 错误
    /// - `LineNotOwnedByClaimant`: 调用方不是持有人 / 明细不属于该盘点单
    /// - `InvalidQuantity`: 数量为负或非有限值
    pub fn record_count(
        &self,
        journal_id: &str,
        operator_id: &str,
        line_id: &str,
        quantity: f64,
        evidence: CountEvidence,
    ) -> CountResult<JournalLine> {
        let now = chrono::Utc::now().naive_utc();

        if !quantity.is_finite() || quantity < 0.0 {
            return Err(CountError::InvalidQuantity {
                message: format!("盘点数量必须为非负有限值, 实际: {}", quantity),
            });
        }

        let line = self.owned_line(journal_id, operator_id, line_id, now)?;

        self.journal_repo.update_line_count(
            &line.line_id,
            quantity,
            &evidence.serial_refs,
            &evidence.photo_refs,
            operator_id,
            now,
        )?;

        tracing::debug!(
            "盘点录入: journal_id={}, line_id={}, qty={}, pass={}",
            journal_id,
            line_id,
            quantity,
            line.count_pass
        );

        Ok(self
            .journal_repo
            .find_line(line_id)?
            .ok_or(RepositoryError::NotFound {
                entity: "JournalLine".to_string(),
                id: line_id.to_string(),
            })?)
    }

    /// 带原因跳过明细
    ///
    /// # 错误
    /// - `SkipReasonRequired`: 原因为空白
    /// - `LineNotOwnedByClaimant`: 调用方不是持有人 / 明细不属于该盘点单
    pub fn skip_line(
        &self,
        journal_id: &str,
        operator_id: &str,
        line_id: &str,
        reason: &str,
    ) -> CountResult<JournalLine> {
        let now = chrono::Utc::now().naive_utc();

        if reason.trim().is_empty() {
            return Err(CountError::SkipReasonRequired {
                line_id: line_id.to_string(),
            });
        }

        let line = self.owned_line(journal_id, operator_id, line_id, now)?;

        self.journal_repo
            .update_line_skip(&line.line_id, reason.trim(), operator_id, now)?;

        Ok(self
            .journal_repo
            .find_line(line_id)?
            .ok_or(RepositoryError::NotFound {
                entity: "JournalLine".to_string(),
                id: line_id.to_string(),
            })?)
    }

    /// 提交盘点单
    ///
    /// 提交前同步计算全部明细的差异记录, 与 SUBMITTED 状态翻转
    /// 同事务落库, 不存在 "已提交但差异未计算" 的可见窗口。
    ///
    /// # 错误
    /// - `InvalidTransition`: 状态不在 已领取/盘点中
    /// - `NotOwner`: 调用方不是当前有效持有人 (含租约过期被动出局)
    /// - `IncompleteLines`: 存在未盘点且未带原因跳过的明细
    pub fn submit(&self, journal_id: &str, operator_id: &str) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();
        let journal = self.journal_repo.get_by_id(journal_id)?;

        if !matches!(
            journal.status,
            JournalStatus::Assigned | JournalStatus::InProgress
        ) {
            return Err(CountError::InvalidTransition {
                from: journal.status.to_string(),
                to: JournalStatus::Submitted.to_string(),
            });
        }

        if !journal.held_by(operator_id, now) {
            return Err(CountError::NotOwner {
                journal_id: journal_id.to_string(),
                operator: operator_id.to_string(),
            });
        }

        let lines = self.journal_repo.find_lines(journal_id)?;
        let open_lines = lines
            .iter()
            .filter(|line| !line.is_complete_for_submit())
            .count();
        if open_lines > 0 {
            return Err(CountError::IncompleteLines {
                journal_id: journal_id.to_string(),
                open_lines,
            });
        }

        // 差异计算在引擎内完成, 写入与状态翻转在仓储单事务内完成
        let variances = self.variance_engine.evaluate_journal(&lines, now);
        let required_tier = VarianceEngine::journal_required_tier(&variances);

        let submitted = self.journal_repo.try_submit_with_variances(
            journal_id,
            operator_id,
            journal.revision,
            required_tier,
            &variances,
            now,
        )?;

        if !submitted {
            // 读取与提交之间发生过释放/抢占/改派
            let current = self.journal_repo.get_by_id(journal_id)?;
            if !current.held_by(operator_id, now) {
                return Err(CountError::NotOwner {
                    journal_id: journal_id.to_string(),
                    operator: operator_id.to_string(),
                });
            }
            return Err(CountError::Repository(
                RepositoryError::OptimisticLockFailure {
                    journal_id: journal_id.to_string(),
                    expected: journal.revision,
                    actual: current.revision,
                },
            ));
        }

        tracing::info!(
            "盘点单提交: journal_id={}, operator={}, required_tier={}, lines={}",
            journal_id,
            operator_id,
            required_tier,
            lines.len()
        );
        self.events.publish_or_log(CountEvent::journal(
            journal_id,
            CountEventType::JournalSubmitted,
            Some(operator_id),
        ));

        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 校验并取出持有人名下的明细
    ///
    /// 首次录入时顺带完成 已领取 → 盘点中 的开盘流转
    fn owned_line(
        &self,
        journal_id: &str,
        operator_id: &str,
        line_id: &str,
        now: chrono::NaiveDateTime,
    ) -> CountResult<JournalLine> {
        let journal = self.journal_repo.get_by_id(journal_id)?;

        if !journal.held_by(operator_id, now) {
            return Err(CountError::LineNotOwnedByClaimant {
                line_id: line_id.to_string(),
                operator: operator_id.to_string(),
            });
        }

        if journal.status == JournalStatus::Assigned {
            // 开盘流转失败说明并发态变化, 由后续写入的校验兜底
            let _ = self
                .journal_repo
                .try_mark_in_progress(journal_id, operator_id, now)?;
        }

        let line = self
            .journal_repo
            .find_line(line_id)?
            .ok_or(RepositoryError::NotFound {
                entity: "JournalLine".to_string(),
                id: line_id.to_string(),
            })?;

        if line.journal_id != journal_id {
            return Err(CountError::LineNotOwnedByClaimant {
                line_id: line_id.to_string(),
                operator: operator_id.to_string(),
            });
        }

        Ok(line)
    }
}
