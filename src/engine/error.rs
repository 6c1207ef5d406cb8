// ==========================================
// 仓库循环盘点系统 - 引擎层错误类型
// ==========================================
// 说明: 除 IntegrityFault 外全部为调用方可恢复错误,
//       各自对应明确的重试或用户侧动作
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::{ApprovalTier, JournalStatus, Role};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum CountError {
    // ===== 派工池 =====
    #[error("盘点单已被领取: journal_id={journal_id}, holder={holder}")]
    AlreadyClaimed { journal_id: String, holder: String },

    #[error("盘点单不可领取: journal_id={journal_id}, status={status}")]
    NotEligible {
        journal_id: String,
        status: JournalStatus,
    },

    #[error("非盘点单持有人: journal_id={journal_id}, operator={operator}")]
    NotOwner {
        journal_id: String,
        operator: String,
    },

    // ===== 盘点会话 =====
    #[error("明细不属于当前持有人: line_id={line_id}, operator={operator}")]
    LineNotOwnedByClaimant { line_id: String, operator: String },

    #[error("盘点数量非法: {message}")]
    InvalidQuantity { message: String },

    #[error("跳过明细必须填写原因: line_id={line_id}")]
    SkipReasonRequired { line_id: String },

    #[error("存在未完成明细, 不可提交: journal_id={journal_id}, open_lines={open_lines}")]
    IncompleteLines {
        journal_id: String,
        open_lines: usize,
    },

    // ===== 审批流 =====
    #[error("状态流转非法: from={from} to={to}")]
    InvalidTransition { from: String, to: String },

    #[error("审批权限不足: required={required}, actor_role={actual}")]
    InsufficientAuthority {
        required: ApprovalTier,
        actual: Role,
    },

    // ===== 调账 =====
    #[error("盘点单未批准, 不可调账: journal_id={journal_id}, status={status}")]
    NotApproved {
        journal_id: String,
        status: JournalStatus,
    },

    #[error("盘点单已调账: journal_id={journal_id}")]
    AlreadyReconciled { journal_id: String },

    // ===== 完整性故障 (需人工介入, 不自动修复) =====
    #[error("调账完整性故障: journal_id={journal_id}, {detail}")]
    IntegrityFault { journal_id: String, detail: String },

    // ===== 仓储透传 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result 类型别名
pub type CountResult<T> = Result<T, CountError>;

impl CountError {
    /// 判断是否为调用方可恢复错误
    ///
    /// 说明: 完整性故障必须以硬告警上浮, 不允许静默重试
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CountError::IntegrityFault { .. })
    }
}
