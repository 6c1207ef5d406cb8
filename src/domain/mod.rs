// ==========================================
// 仓库循环盘点系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod approval;
pub mod journal;
pub mod plan;
pub mod reconciliation;
pub mod types;
pub mod variance;

// 重导出核心类型
pub use approval::ApprovalDecision;
pub use journal::{CountEvidence, Journal, JournalLine, SnapshotEntry};
pub use plan::{CountPlan, ScopeSelector};
pub use reconciliation::{ReconciliationBatch, ReconciliationTransaction};
pub use types::{
    ApprovalAction, ApprovalTier, JournalStatus, LineStatus, PlanStatus, Role, Severity,
};
pub use variance::VarianceRecord;
