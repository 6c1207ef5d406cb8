// ==========================================
// 仓库循环盘点系统 - 核心库
// ==========================================
// 系统定位: 盘点单生命周期与审批升级引擎
// 边界: 页面渲染/身份认证/报表导入导出/看板均为外部协作方,
//       通过领域事件与结构化输入对接
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施 (连接初始化/PRAGMA 统一/schema)
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ApprovalAction, ApprovalTier, JournalStatus, LineStatus, PlanStatus, Role, Severity,
};

// 领域实体
pub use domain::{
    ApprovalDecision, CountEvidence, CountPlan, Journal, JournalLine, ReconciliationBatch,
    ReconciliationTransaction, ScopeSelector, SnapshotEntry, VarianceRecord,
};

// 引擎
pub use engine::{
    ApprovalWorkflow, CountError, CountPlanManager, CountResult, CountSession, DispatchFilters,
    DispatchPool, EligibilityEngine, JournalFactory, OperatorProfile, ReconciliationEngine,
    VarianceEngine,
};

// 事件
pub use engine::{CountEvent, CountEventPublisher, CountEventType, NoOpEventPublisher};

// 配置
pub use config::ConfigManager;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "仓库循环盘点系统";

// ==========================================
// 预编译检查
// ==========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
