// ==========================================
// 仓库循环盘点系统 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎, 不拼 SQL
// 红线: Engine 不拼 SQL, 所有规则必须输出 reason
// ==========================================

pub mod approval;
pub mod count_session;
pub mod dispatch_pool;
pub mod eligibility;
pub mod error;
pub mod events;
pub mod journal_factory;
pub mod plan_manager;
pub mod reconciliation;
pub mod variance;

// 重导出核心引擎
pub use approval::ApprovalWorkflow;
pub use count_session::CountSession;
pub use dispatch_pool::DispatchPool;
pub use eligibility::{DispatchFilters, EligibilityEngine, EligibilityVerdict, OperatorProfile};
pub use error::{CountError, CountResult};
pub use events::{
    CountEvent, CountEventPublisher, CountEventType, NoOpEventPublisher, OptionalEventPublisher,
};
pub use journal_factory::JournalFactory;
pub use plan_manager::CountPlanManager;
pub use reconciliation::ReconciliationEngine;
pub use variance::{classify, Classification, VarianceEngine};
