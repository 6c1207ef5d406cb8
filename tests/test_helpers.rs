// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、引擎装配、种子数据
// ==========================================

use cycle_count_engine::config::ConfigManager;
use cycle_count_engine::db;
use cycle_count_engine::domain::journal::SnapshotEntry;
use cycle_count_engine::domain::plan::{CountPlan, ScopeSelector};
use cycle_count_engine::domain::journal::Journal;
use cycle_count_engine::engine::{
    ApprovalWorkflow, CountPlanManager, CountSession, DispatchPool, EligibilityEngine,
    JournalFactory, OptionalEventPublisher, ReconciliationEngine, VarianceEngine,
};
use cycle_count_engine::repository::{
    ApprovalDecisionRepository, CountPlanRepository, JournalRepository, ReconciliationRepository,
    VarianceRecordRepository,
};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件 (需要保持存活)
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = Connection::open(&db_path)?;
    db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 测试环境: 共享连接上装配的全套仓储与引擎
pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub config: Arc<ConfigManager>,
    pub plan_repo: Arc<CountPlanRepository>,
    pub journal_repo: Arc<JournalRepository>,
    pub variance_repo: Arc<VarianceRecordRepository>,
    pub decision_repo: Arc<ApprovalDecisionRepository>,
    pub recon_repo: Arc<ReconciliationRepository>,
    pub plan_manager: Arc<CountPlanManager>,
    pub factory: Arc<JournalFactory>,
    pub dispatch: Arc<DispatchPool>,
    pub session: Arc<CountSession>,
    pub approval: Arc<ApprovalWorkflow>,
    pub reconciliation: Arc<ReconciliationEngine>,
}

/// 创建测试环境
pub fn setup_test_env() -> TestEnv {
    let (temp_file, db_path) = create_test_db().unwrap();

    let conn = Arc::new(Mutex::new(db::open_sqlite_connection(&db_path).unwrap()));
    let config = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());

    let plan_repo = Arc::new(CountPlanRepository::new(conn.clone()));
    let journal_repo = Arc::new(JournalRepository::new(conn.clone()));
    let variance_repo = Arc::new(VarianceRecordRepository::new(conn.clone()));
    let decision_repo = Arc::new(ApprovalDecisionRepository::new(conn.clone()));
    let recon_repo = Arc::new(ReconciliationRepository::new(conn.clone()));

    let eligibility = Arc::new(EligibilityEngine::new());
    let variance_engine = Arc::new(VarianceEngine::new(config.clone()));

    let plan_manager = Arc::new(CountPlanManager::new(
        plan_repo.clone(),
        journal_repo.clone(),
        OptionalEventPublisher::none(),
    ));
    let factory = Arc::new(JournalFactory::new(plan_repo.clone(), journal_repo.clone()));
    let dispatch = Arc::new(DispatchPool::new(
        journal_repo.clone(),
        eligibility,
        config.clone(),
        OptionalEventPublisher::none(),
    ));
    let session = Arc::new(CountSession::new(
        journal_repo.clone(),
        variance_engine,
        OptionalEventPublisher::none(),
    ));
    let approval = Arc::new(ApprovalWorkflow::new(
        journal_repo.clone(),
        variance_repo.clone(),
        decision_repo.clone(),
        config.clone(),
        OptionalEventPublisher::none(),
    ));
    let reconciliation = Arc::new(ReconciliationEngine::new(
        journal_repo.clone(),
        recon_repo.clone(),
        plan_manager.clone(),
        OptionalEventPublisher::none(),
    ));

    TestEnv {
        _temp_file: temp_file,
        db_path,
        config,
        plan_repo,
        journal_repo,
        variance_repo,
        decision_repo,
        recon_repo,
        plan_manager,
        factory,
        dispatch,
        session,
        approval,
        reconciliation,
    }
}

/// 未来的盘点窗口 (起止)
pub fn future_window() -> (chrono::NaiveDateTime, chrono::NaiveDateTime) {
    let now = chrono::Utc::now().naive_utc();
    (now, now + chrono::Duration::days(7))
}

/// 创建并激活一个覆盖全库的计划
pub fn seed_active_plan(env: &TestEnv) -> CountPlan {
    let (due_start, due_end) = future_window();
    let plan = env
        .plan_manager
        .create_plan(
            "测试盘点计划",
            vec![ScopeSelector::all()],
            30,
            due_start,
            due_end,
            "mgr01",
        )
        .unwrap();
    env.plan_manager.activate(&plan.plan_id).unwrap()
}

/// 标准测试快照: 两个库位各两条物料
pub fn sample_snapshot() -> Vec<SnapshotEntry> {
    vec![
        SnapshotEntry {
            location_code: "A-01".to_string(),
            item_code: "SKU-100".to_string(),
            on_hand_qty: 100.0,
        },
        SnapshotEntry {
            location_code: "A-01".to_string(),
            item_code: "SKU-200".to_string(),
            on_hand_qty: 50.0,
        },
        SnapshotEntry {
            location_code: "B-02".to_string(),
            item_code: "SKU-300".to_string(),
            on_hand_qty: 80.0,
        },
        SnapshotEntry {
            location_code: "B-02".to_string(),
            item_code: "SKU-400".to_string(),
            on_hand_qty: 40.0,
        },
    ]
}

/// 创建计划并展开为盘点单
pub fn seed_plan_with_journals(env: &TestEnv) -> (CountPlan, Vec<Journal>) {
    let plan = seed_active_plan(env);
    let journals = env.factory.expand(&plan.plan_id, &sample_snapshot()).unwrap();
    (plan, journals)
}
