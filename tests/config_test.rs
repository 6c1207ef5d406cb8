// ==========================================
// 配置管理器测试
// ==========================================
// 职责: 验证配置默认值、覆写、回退与快照恢复
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod config_test {
    use crate::test_helpers::setup_test_env;
    use cycle_count_engine::config::config_manager::{
        DEFAULT_CLAIM_LEASE_SECONDS, KEY_SEVERITY_TIER_MAP,
    };
    use cycle_count_engine::config::VarianceRule;
    use cycle_count_engine::domain::types::{ApprovalTier, Severity};

    #[test]
    fn test_defaults_without_any_config() {
        let env = setup_test_env();

        assert_eq!(env.config.get_claim_lease_seconds(), DEFAULT_CLAIM_LEASE_SECONDS);

        let rules = env.config.get_variance_rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].severity, Severity::Critical);

        let tier_map = env.config.get_severity_tier_map();
        assert_eq!(tier_map.tier_for(Severity::Minor), ApprovalTier::Lead);
        assert_eq!(tier_map.tier_for(Severity::Major), ApprovalTier::Supervisor);

        println!("✅ 出厂默认配置测试通过");
    }

    #[test]
    fn test_override_lease_seconds() {
        let env = setup_test_env();

        env.config.set_claim_lease_seconds(600).unwrap();
        assert_eq!(env.config.get_claim_lease_seconds(), 600);

        println!("✅ 租约时长覆写测试通过");
    }

    #[test]
    fn test_variance_rules_roundtrip_and_normalization() {
        let env = setup_test_env();

        // 乱序写入, 读取时按严重度从高到低规整
        env.config
            .set_variance_rules(&[
                VarianceRule {
                    severity: Severity::Minor,
                    min_pct: Some(0.0),
                    min_abs: None,
                },
                VarianceRule {
                    severity: Severity::Critical,
                    min_pct: Some(0.4),
                    min_abs: None,
                },
            ])
            .unwrap();

        let rules = env.config.get_variance_rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].severity, Severity::Critical);
        assert_eq!(rules[1].severity, Severity::Minor);

        println!("✅ 分级规则覆写测试通过");
    }

    #[test]
    fn test_non_monotonic_tier_map_falls_back() {
        let env = setup_test_env();

        // Minor 层级高于 Major: 非单调, 拒收并回退默认
        env.config
            .set_config_value(
                KEY_SEVERITY_TIER_MAP,
                r#"{"NONE":"LEAD","MINOR":"MANAGER","MAJOR":"LEAD","CRITICAL":"MANAGER"}"#,
            )
            .unwrap();

        let tier_map = env.config.get_severity_tier_map();
        assert_eq!(tier_map.tier_for(Severity::Major), ApprovalTier::Supervisor);

        println!("✅ 非单调映射回退测试通过");
    }

    #[test]
    fn test_valid_tier_map_override() {
        let env = setup_test_env();

        // 整体收严一档 (保持单调)
        env.config
            .set_config_value(
                KEY_SEVERITY_TIER_MAP,
                r#"{"NONE":"LEAD","MINOR":"SUPERVISOR","MAJOR":"MANAGER","CRITICAL":"MANAGER"}"#,
            )
            .unwrap();

        let tier_map = env.config.get_severity_tier_map();
        assert_eq!(tier_map.tier_for(Severity::Minor), ApprovalTier::Supervisor);
        assert_eq!(tier_map.tier_for(Severity::Major), ApprovalTier::Manager);

        println!("✅ 映射覆写测试通过");
    }

    #[test]
    fn test_config_snapshot_restore() {
        let env = setup_test_env();

        env.config.set_claim_lease_seconds(900).unwrap();
        let snapshot = env.config.get_config_snapshot().unwrap();

        // 改动后从快照恢复
        env.config.set_claim_lease_seconds(60).unwrap();
        assert_eq!(env.config.get_claim_lease_seconds(), 60);

        let restored = env.config.restore_config_from_snapshot(&snapshot).unwrap();
        assert!(restored >= 1);
        assert_eq!(env.config.get_claim_lease_seconds(), 900);

        println!("✅ 配置快照恢复测试通过");
    }
}
