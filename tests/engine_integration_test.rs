// ==========================================
// 全链路集成测试
// ==========================================
// 职责: 计划 → 展开 → 派工 → 盘点 → 审批 → 复盘 → 调账 → 关闭
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod engine_integration_test {
    use crate::test_helpers::{future_window, sample_snapshot, setup_test_env};
    use cycle_count_engine::domain::journal::CountEvidence;
    use cycle_count_engine::domain::types::{
        ApprovalTier, JournalStatus, LineStatus, PlanStatus, Role, Severity,
    };
    use cycle_count_engine::engine::{DispatchFilters, OperatorProfile};
    use cycle_count_engine::ScopeSelector;

    // ==========================================
    // 测试1: 完整业务闭环
    // ==========================================

    #[test]
    fn test_full_cycle_count_flow() {
        let env = setup_test_env();

        // 1. 建计划并激活
        let (due_start, due_end) = future_window();
        let plan = env
            .plan_manager
            .create_plan(
                "月度循环盘点",
                vec![ScopeSelector::all()],
                30,
                due_start,
                due_end,
                "mgr01",
            )
            .unwrap();
        assert_eq!(plan.status, PlanStatus::Draft);
        let plan = env.plan_manager.activate(&plan.plan_id).unwrap();
        assert_eq!(plan.status, PlanStatus::Active);

        // 2. 快照展开: 两个库位 → 两张盘点单, 明细带冻结期望数量
        let journals = env.factory.expand(&plan.plan_id, &sample_snapshot()).unwrap();
        assert_eq!(journals.len(), 2);
        for journal in &journals {
            assert_eq!(journal.status, JournalStatus::Pending);
            let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();
            assert_eq!(lines.len(), 2);
            assert!(lines.iter().all(|l| l.status == LineStatus::Uncounted));
        }

        // 3. 派工: 盘点员从资格列表领取
        let profile = OperatorProfile {
            operator_id: "op01".to_string(),
            zones: vec![],
            skills: vec![],
            shift: None,
        };
        let eligible = env
            .dispatch
            .list_eligible(&profile, &DispatchFilters::default())
            .unwrap();
        assert_eq!(eligible.len(), 2);

        let journal_id = eligible[0].journal_id.clone();
        let claimed = env.dispatch.claim(&journal_id, "op01").unwrap();
        assert_eq!(claimed.status, JournalStatus::Assigned);

        // 4. 盘点: 一条 30% 短缺 (Major), 一条账实一致
        let lines = env.journal_repo.find_lines(&journal_id).unwrap();
        let short_line = lines[0].line_id.clone();
        let clean_line = lines[1].line_id.clone();

        env.session
            .record_count(
                &journal_id,
                "op01",
                &short_line,
                lines[0].expected_qty * 0.7,
                CountEvidence {
                    serial_refs: vec![],
                    photo_refs: vec!["photo://shelf/a01".to_string()],
                },
            )
            .unwrap();
        env.session
            .record_count(
                &journal_id,
                "op01",
                &clean_line,
                lines[1].expected_qty,
                Default::default(),
            )
            .unwrap();

        let submitted = env.session.submit(&journal_id, "op01").unwrap();
        assert_eq!(submitted.status, JournalStatus::Submitted);
        assert_eq!(submitted.required_tier, Some(ApprovalTier::Supervisor));

        // 5. 审批: 组长发现越级, 上报后主管驳回短缺明细复盘
        env.approval
            .begin_review(&journal_id, "lead01", Role::Lead)
            .unwrap();
        env.approval
            .escalate(&journal_id, "lead01", Role::Lead, Some("Major 差异, 请主管处理"))
            .unwrap();
        env.approval
            .reject(
                &journal_id,
                &[short_line.clone()],
                "sup01",
                Role::Supervisor,
                Some("短缺过大, 复盘确认"),
            )
            .unwrap();

        // 6. 复盘: 原持有人重盘短缺明细, 第二轮账实一致
        let journal = env.journal_repo.get_by_id(&journal_id).unwrap();
        assert_eq!(journal.status, JournalStatus::InProgress);
        assert_eq!(journal.assigned_operator.as_deref(), Some("op01"));

        env.session
            .record_count(
                &journal_id,
                "op01",
                &short_line,
                lines[0].expected_qty,
                Default::default(),
            )
            .unwrap();
        env.session.submit(&journal_id, "op01").unwrap();

        // 第二轮分级: 全部 None, 组长即可收尾
        let records = env.variance_repo.list_current_by_journal(&journal_id).unwrap();
        assert!(records.iter().all(|r| r.severity == Severity::None));

        env.approval
            .begin_review(&journal_id, "lead01", Role::Lead)
            .unwrap();
        env.approval
            .approve(&journal_id, "lead01", Role::Lead, None)
            .unwrap();

        // 7. 调账: 复盘后零差异 → 批次中每笔 delta 为 0
        let batch = env.reconciliation.reconcile(&journal_id, "lead01").unwrap();
        assert!(batch.newly_applied);
        assert_eq!(batch.transactions.len(), 2);
        assert_eq!(batch.total_delta(), 0.0);

        let journal = env.journal_repo.get_by_id(&journal_id).unwrap();
        assert_eq!(journal.status, JournalStatus::Reconciled);

        // 8. 审计链: 差异历史两轮俱在, 决策日志完整
        let history = env.variance_repo.list_history_by_line(&short_line).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].severity, Severity::Major);
        assert_eq!(history[1].severity, Severity::None);

        let log = env.approval.decision_log(&journal_id).unwrap();
        assert!(log.len() >= 3); // 上报 + 明细驳回 + 整单通过

        // 9. 第二张盘点单走通后计划自动关闭
        let other_id = journals
            .iter()
            .map(|j| j.journal_id.clone())
            .find(|id| id != &journal_id)
            .unwrap();
        env.dispatch.claim(&other_id, "op02").unwrap();
        for line in env.journal_repo.find_lines(&other_id).unwrap() {
            env.session
                .record_count(&other_id, "op02", &line.line_id, line.expected_qty, Default::default())
                .unwrap();
        }
        env.session.submit(&other_id, "op02").unwrap();
        env.approval
            .begin_review(&other_id, "lead01", Role::Lead)
            .unwrap();
        env.approval
            .approve(&other_id, "lead01", Role::Lead, None)
            .unwrap();
        env.reconciliation.reconcile(&other_id, "lead01").unwrap();

        let plan = env.plan_manager.get(&plan.plan_id).unwrap();
        assert_eq!(plan.status, PlanStatus::Closed);

        println!("✅ 全链路集成测试通过");
    }

    // ==========================================
    // 测试2: 窗口过期自动关闭
    // ==========================================

    #[test]
    fn test_plan_auto_closes_on_lapsed_window() {
        let env = setup_test_env();

        // 已过期的盘点窗口
        let now = chrono::Utc::now().naive_utc();
        let plan = env
            .plan_manager
            .create_plan(
                "过期窗口计划",
                vec![ScopeSelector::all()],
                7,
                now - chrono::Duration::days(10),
                now - chrono::Duration::days(3),
                "mgr01",
            )
            .unwrap();
        env.plan_manager.activate(&plan.plan_id).unwrap();
        env.factory.expand(&plan.plan_id, &sample_snapshot()).unwrap();

        // 仍有未完成盘点单, 但窗口已过 → 自动关闭
        let closed = env.plan_manager.try_auto_close(&plan.plan_id).unwrap();
        assert!(closed);

        let plan = env.plan_manager.get(&plan.plan_id).unwrap();
        assert_eq!(plan.status, PlanStatus::Closed);

        // 状态列表同步可见
        let closed_plans = env.plan_repo.list_by_status(PlanStatus::Closed).unwrap();
        assert!(closed_plans.iter().any(|p| p.plan_id == plan.plan_id));

        // 幂等: 再次判定不重复关闭
        assert!(!env.plan_manager.try_auto_close(&plan.plan_id).unwrap());

        println!("✅ 窗口过期自动关闭测试通过");
    }

    // ==========================================
    // 测试3: 范围选择器决定展开与标注
    // ==========================================

    #[test]
    fn test_expand_respects_scope_and_annotates_zone() {
        let env = setup_test_env();

        let (due_start, due_end) = future_window();
        let plan = env
            .plan_manager
            .create_plan(
                "A区专项盘点",
                vec![ScopeSelector {
                    location_prefix: Some("A-".to_string()),
                    item_prefix: None,
                    zone: Some("A区".to_string()),
                    required_skill: Some("SERIAL_COUNT".to_string()),
                }],
                14,
                due_start,
                due_end,
                "mgr01",
            )
            .unwrap();
        env.plan_manager.activate(&plan.plan_id).unwrap();

        let journals = env.factory.expand(&plan.plan_id, &sample_snapshot()).unwrap();

        // 仅 A-01 在范围内, B-02 被滤除
        assert_eq!(journals.len(), 1);
        assert_eq!(journals[0].location_code, "A-01");
        assert_eq!(journals[0].zone.as_deref(), Some("A区"));
        assert_eq!(journals[0].required_skill.as_deref(), Some("SERIAL_COUNT"));

        // 技能不满足的盘点员领取列表为空
        let unskilled = OperatorProfile {
            operator_id: "op01".to_string(),
            zones: vec!["A区".to_string()],
            skills: vec![],
            shift: None,
        };
        let eligible = env
            .dispatch
            .list_eligible(&unskilled, &DispatchFilters::default())
            .unwrap();
        assert!(eligible.is_empty());

        println!("✅ 范围展开与标注测试通过");
    }

    // ==========================================
    // 测试4: 草稿计划不可展开
    // ==========================================

    #[test]
    fn test_expand_draft_plan_fails() {
        let env = setup_test_env();

        let (due_start, due_end) = future_window();
        let plan = env
            .plan_manager
            .create_plan("草稿计划", vec![ScopeSelector::all()], 30, due_start, due_end, "mgr01")
            .unwrap();

        assert!(matches!(
            env.factory.expand(&plan.plan_id, &sample_snapshot()),
            Err(cycle_count_engine::CountError::InvalidTransition { .. })
        ));

        println!("✅ 草稿计划不可展开测试通过");
    }
}
