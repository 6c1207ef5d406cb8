// ==========================================
// 仓库循环盘点系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口, 屏蔽数据库细节
// 约束: 所有查询使用参数化, 防止 SQL 注入
// ==========================================

pub mod decision_repo;
pub mod error;
pub mod journal_repo;
pub mod plan_repo;
pub mod reconciliation_repo;
pub mod variance_repo;

// 重导出核心仓储
pub use decision_repo::ApprovalDecisionRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use journal_repo::{ClaimCasResult, JournalRepository};
pub use plan_repo::CountPlanRepository;
pub use reconciliation_repo::ReconciliationRepository;
pub use variance_repo::VarianceRecordRepository;
