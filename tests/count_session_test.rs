// ==========================================
// 盘点会话测试
// ==========================================
// 职责: 验证录入幂等、跳过、提交完整性与提交后冻结
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod count_session_test {
    use crate::test_helpers::{seed_plan_with_journals, setup_test_env, TestEnv};
    use cycle_count_engine::domain::journal::CountEvidence;
    use cycle_count_engine::domain::types::{JournalStatus, LineStatus};
    use cycle_count_engine::engine::CountError;
    use cycle_count_engine::Journal;

    /// 领取第一张盘点单并返回
    fn claim_first(env: &TestEnv, operator: &str) -> Journal {
        let (_plan, journals) = seed_plan_with_journals(env);
        env.dispatch.claim(&journals[0].journal_id, operator).unwrap()
    }

    // ==========================================
    // 测试1: 录入与同轮次幂等覆盖
    // ==========================================

    #[test]
    fn test_record_count_marks_line_counted() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        let evidence = CountEvidence {
            serial_refs: vec!["SN-001".to_string()],
            photo_refs: vec!["photo://evidence/1".to_string()],
        };
        let counted = env
            .session
            .record_count(&journal.journal_id, "op01", &lines[0].line_id, 98.0, evidence)
            .unwrap();

        assert_eq!(counted.status, LineStatus::Counted);
        assert_eq!(counted.counted_qty, Some(98.0));
        assert_eq!(counted.counted_by.as_deref(), Some("op01"));
        assert_eq!(counted.serial_refs, vec!["SN-001".to_string()]);

        // 首次录入后盘点单进入盘点中
        let journal = env.journal_repo.get_by_id(&journal.journal_id).unwrap();
        assert_eq!(journal.status, JournalStatus::InProgress);

        println!("✅ 录入测试通过");
    }

    #[test]
    fn test_rerecord_overwrites_pending_value() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();
        let line_id = lines[0].line_id.clone();

        env.session
            .record_count(&journal.journal_id, "op01", &line_id, 98.0, Default::default())
            .unwrap();
        let again = env
            .session
            .record_count(&journal.journal_id, "op01", &line_id, 101.0, Default::default())
            .unwrap();

        // 提交前重复录入覆盖待定值, 不产生历史
        assert_eq!(again.counted_qty, Some(101.0));
        assert_eq!(again.count_pass, 1);

        println!("✅ 同轮次幂等覆盖测试通过");
    }

    // ==========================================
    // 测试2: 非法数量与非持有人
    // ==========================================

    #[test]
    fn test_invalid_quantity_rejected() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                env.session.record_count(
                    &journal.journal_id,
                    "op01",
                    &lines[0].line_id,
                    bad,
                    Default::default()
                ),
                Err(CountError::InvalidQuantity { .. })
            ));
        }

        println!("✅ 非法数量测试通过");
    }

    #[test]
    fn test_record_by_non_claimant_fails() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        assert!(matches!(
            env.session.record_count(
                &journal.journal_id,
                "op02",
                &lines[0].line_id,
                98.0,
                Default::default()
            ),
            Err(CountError::LineNotOwnedByClaimant { .. })
        ));

        println!("✅ 非持有人录入失败测试通过");
    }

    #[test]
    fn test_record_line_of_other_journal_fails() {
        let env = setup_test_env();
        let (_plan, journals) = seed_plan_with_journals(&env);
        env.dispatch.claim(&journals[0].journal_id, "op01").unwrap();

        // 明细属于另一张盘点单
        let other_lines = env.journal_repo.find_lines(&journals[1].journal_id).unwrap();

        assert!(matches!(
            env.session.record_count(
                &journals[0].journal_id,
                "op01",
                &other_lines[0].line_id,
                10.0,
                Default::default()
            ),
            Err(CountError::LineNotOwnedByClaimant { .. })
        ));

        println!("✅ 跨单明细录入失败测试通过");
    }

    // ==========================================
    // 测试3: 跳过明细
    // ==========================================

    #[test]
    fn test_skip_line_requires_reason() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        assert!(matches!(
            env.session
                .skip_line(&journal.journal_id, "op01", &lines[0].line_id, "   "),
            Err(CountError::SkipReasonRequired { .. })
        ));

        let skipped = env
            .session
            .skip_line(&journal.journal_id, "op01", &lines[0].line_id, "库位封存待查")
            .unwrap();
        assert_eq!(skipped.status, LineStatus::Skipped);
        assert_eq!(skipped.skip_reason.as_deref(), Some("库位封存待查"));

        println!("✅ 跳过明细测试通过");
    }

    // ==========================================
    // 测试4: 提交完整性
    // ==========================================

    #[test]
    fn test_submit_rejected_while_lines_uncounted() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        // 只盘一条, 另一条未盘
        env.session
            .record_count(&journal.journal_id, "op01", &lines[0].line_id, 98.0, Default::default())
            .unwrap();

        match env.session.submit(&journal.journal_id, "op01") {
            Err(CountError::IncompleteLines { open_lines, .. }) => {
                assert_eq!(open_lines, 1);
            }
            other => panic!("预期 IncompleteLines, 实际: {:?}", other.map(|j| j.status)),
        }

        println!("✅ 未完成明细阻止提交测试通过");
    }

    #[test]
    fn test_submit_accepts_skipped_lines() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        env.session
            .record_count(&journal.journal_id, "op01", &lines[0].line_id, 98.0, Default::default())
            .unwrap();
        env.session
            .skip_line(&journal.journal_id, "op01", &lines[1].line_id, "物料停用")
            .unwrap();

        let submitted = env.session.submit(&journal.journal_id, "op01").unwrap();
        assert_eq!(submitted.status, JournalStatus::Submitted);

        println!("✅ 带原因跳过可提交测试通过");
    }

    #[test]
    fn test_submit_computes_variance_for_every_line() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        env.session
            .record_count(&journal.journal_id, "op01", &lines[0].line_id, 70.0, Default::default())
            .unwrap();
        env.session
            .skip_line(&journal.journal_id, "op01", &lines[1].line_id, "物料停用")
            .unwrap();
        env.session.submit(&journal.journal_id, "op01").unwrap();

        // 提交被观察到时, 每条明细 (含跳过) 都已有差异记录
        let records = env
            .variance_repo
            .list_current_by_journal(&journal.journal_id)
            .unwrap();
        assert_eq!(records.len(), lines.len());

        println!("✅ 提交同步计算差异测试通过");
    }

    #[test]
    fn test_pass_frozen_after_submit() {
        let env = setup_test_env();
        let journal = claim_first(&env, "op01");
        let lines = env.journal_repo.find_lines(&journal.journal_id).unwrap();

        for line in &lines {
            env.session
                .record_count(
                    &journal.journal_id,
                    "op01",
                    &line.line_id,
                    line.expected_qty,
                    Default::default(),
                )
                .unwrap();
        }
        env.session.submit(&journal.journal_id, "op01").unwrap();

        // 提交后轮次冻结, 任何改数必须走复盘
        assert!(matches!(
            env.session.record_count(
                &journal.journal_id,
                "op01",
                &lines[0].line_id,
                99.0,
                Default::default()
            ),
            Err(CountError::LineNotOwnedByClaimant { .. })
        ));

        // 重复提交同样拒绝
        assert!(matches!(
            env.session.submit(&journal.journal_id, "op01"),
            Err(CountError::InvalidTransition { .. })
        ));

        println!("✅ 提交后冻结测试通过");
    }

    #[test]
    fn test_submit_by_evicted_holder_fails() {
        let env = setup_test_env();
        let (_plan, journals) = seed_plan_with_journals(&env);
        let journal_id = journals[0].journal_id.clone();

        // 零秒租约领取并盘完
        env.config.set_claim_lease_seconds(0).unwrap();
        env.dispatch.claim(&journal_id, "op01").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        // 租约过期的持有人提交被拒 (被动出局)
        assert!(matches!(
            env.session.submit(&journal_id, "op01"),
            Err(CountError::NotOwner { .. })
        ));

        println!("✅ 过期持有人提交失败测试通过");
    }
}
