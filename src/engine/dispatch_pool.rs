// ==========================================
// 仓库循环盘点系统 - 派工池引擎
// ==========================================
// 职责: 盘点单的领取/释放/改派/续租与资格列表
// 红线: 并发领取同一张盘点单时恰有一个赢家, 输家得到
//       AlreadyClaimed 而非半途状态; 租约过期惰性判定
// ==========================================

use crate::config::ConfigManager;
use crate::domain::journal::Journal;
use crate::domain::types::JournalStatus;
use crate::engine::eligibility::{DispatchFilters, EligibilityEngine, OperatorProfile};
use crate::engine::error::{CountError, CountResult};
use crate::engine::events::{CountEvent, CountEventType, OptionalEventPublisher};
use crate::repository::journal_repo::{ClaimCasResult, JournalRepository};
use chrono::Duration;
use std::sync::Arc;

// ==========================================
// DispatchPool - 派工池引擎
// ==========================================
pub struct DispatchPool {
    journal_repo: Arc<JournalRepository>,
    eligibility: Arc<EligibilityEngine>,
    config: Arc<ConfigManager>,
    events: OptionalEventPublisher,
}

impl DispatchPool {
    /// 构造函数
    pub fn new(
        journal_repo: Arc<JournalRepository>,
        eligibility: Arc<EligibilityEngine>,
        config: Arc<ConfigManager>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            journal_repo,
            eligibility,
            config,
            events,
        }
    }

    /// 领取盘点单
    ///
    /// # 并发控制
    /// 单条 CAS UPDATE 保证两个并发领取者恰有一个成功;
    /// 租约过期的已领取单可被抢占 (原持有人被动出局)。
    ///
    /// # 错误
    /// - `AlreadyClaimed`: 已被他人持有且租约有效
    /// - `NotEligible`: 状态不可领取 (已提交/审批中/终态)
    pub fn claim(&self, journal_id: &str, operator_id: &str) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();
        let lease_expires_at = now + Duration::seconds(self.config.get_claim_lease_seconds());

        match self
            .journal_repo
            .try_claim(journal_id, operator_id, now, lease_expires_at)?
        {
            ClaimCasResult::Won => {
                tracing::info!(
                    "盘点单领取成功: journal_id={}, operator={}",
                    journal_id,
                    operator_id
                );
                self.events.publish_or_log(CountEvent::journal(
                    journal_id,
                    CountEventType::JournalClaimed,
                    Some(operator_id),
                ));
                Ok(self.journal_repo.get_by_id(journal_id)?)
            }
            ClaimCasResult::HeldByOther { operator } => Err(CountError::AlreadyClaimed {
                journal_id: journal_id.to_string(),
                holder: operator,
            }),
            ClaimCasResult::IneligibleStatus { status } => Err(CountError::NotEligible {
                journal_id: journal_id.to_string(),
                status,
            }),
        }
    }

    /// 释放盘点单, 回到待领取
    ///
    /// # 错误
    /// - `NotOwner`: 调用方不是当前持有人
    pub fn release(&self, journal_id: &str, operator_id: &str) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();

        if !self.journal_repo.try_release(journal_id, operator_id, now)? {
            // 区分记录不存在与非持有人
            let _ = self.journal_repo.get_by_id(journal_id)?;
            return Err(CountError::NotOwner {
                journal_id: journal_id.to_string(),
                operator: operator_id.to_string(),
            });
        }

        tracing::info!(
            "盘点单释放: journal_id={}, operator={}",
            journal_id,
            operator_id
        );
        self.events.publish_or_log(CountEvent::journal(
            journal_id,
            CountEventType::JournalReleased,
            Some(operator_id),
        ));

        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 续租: 持有人延长租约
    ///
    /// # 错误
    /// - `NotOwner`: 调用方不是当前有效持有人 (含租约已过期)
    pub fn renew_lease(&self, journal_id: &str, operator_id: &str) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();
        let lease_expires_at = now + Duration::seconds(self.config.get_claim_lease_seconds());

        if !self
            .journal_repo
            .try_renew_lease(journal_id, operator_id, now, lease_expires_at)?
        {
            let _ = self.journal_repo.get_by_id(journal_id)?;
            return Err(CountError::NotOwner {
                journal_id: journal_id.to_string(),
                operator: operator_id.to_string(),
            });
        }

        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 改派: 当前持有人 → 新持有人 (单次 CAS 原子完成)
    ///
    /// # 错误
    /// - `NotOwner`: from 不是当前持有人
    pub fn reassign(
        &self,
        journal_id: &str,
        from_operator: &str,
        to_operator: &str,
    ) -> CountResult<Journal> {
        let now = chrono::Utc::now().naive_utc();
        let lease_expires_at = now + Duration::seconds(self.config.get_claim_lease_seconds());

        if !self.journal_repo.try_reassign(
            journal_id,
            from_operator,
            to_operator,
            now,
            lease_expires_at,
        )? {
            let _ = self.journal_repo.get_by_id(journal_id)?;
            return Err(CountError::NotOwner {
                journal_id: journal_id.to_string(),
                operator: from_operator.to_string(),
            });
        }

        tracing::info!(
            "盘点单改派: journal_id={}, from={}, to={}",
            journal_id,
            from_operator,
            to_operator
        );
        self.events.publish_or_log(
            CountEvent::journal(journal_id, CountEventType::JournalClaimed, Some(to_operator))
                .with_detail(format!("改派自 {}", from_operator)),
        );

        Ok(self.journal_repo.get_by_id(journal_id)?)
    }

    /// 查询盘点员可领取的盘点单列表
    ///
    /// 说明: 过滤条件与资格判定都是纯谓词, 本方法无副作用;
    /// 列表包含租约已过期的已领取单 (对外视同待领取)。
    pub fn list_eligible(
        &self,
        profile: &OperatorProfile,
        filters: &DispatchFilters,
    ) -> CountResult<Vec<Journal>> {
        let now = chrono::Utc::now().naive_utc();
        let claimable = self.journal_repo.list_claimable(now)?;

        Ok(claimable
            .into_iter()
            .filter(|journal| filters.accepts(journal))
            .filter(|journal| {
                let verdict = self.eligibility.check(profile, journal);
                if !verdict.eligible {
                    tracing::debug!(
                        "盘点单过滤: journal_id={}, operator={}, reason={}",
                        journal.journal_id,
                        profile.operator_id,
                        verdict.reason
                    );
                }
                verdict.eligible
            })
            .collect())
    }

    /// 读取盘点单的当前有效状态 (租约过期惰性判定)
    pub fn effective_status(&self, journal_id: &str) -> CountResult<JournalStatus> {
        let now = chrono::Utc::now().naive_utc();
        let journal = self.journal_repo.get_by_id(journal_id)?;
        Ok(journal.effective_status(now))
    }
}
