// ==========================================
// 仓库循环盘点系统 - 差异分级规则配置
// ==========================================
// 说明: 严重度阈值与层级映射是配置而非硬编码,
//       此处提供结构定义与出厂默认值
// ==========================================

use crate::domain::types::{ApprovalTier, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// VarianceRule - 单条分级规则
// ==========================================
// 语义: 百分比阈值与绝对阈值为"或"关系, 任一满足即命中;
//       规则列表按严重度从高到低求值, 首个命中者生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceRule {
    pub severity: Severity,       // 命中后的严重度
    pub min_pct: Option<f64>,     // 百分比阈值 (|delta| / max(期望,1) >= 此值)
    pub min_abs: Option<f64>,     // 绝对阈值 (|delta| >= 此值)
}

impl VarianceRule {
    /// 纯谓词: 判断 (绝对差, 百分比差) 是否命中本规则
    pub fn matches(&self, abs_delta: f64, pct_delta: f64) -> bool {
        let pct_hit = self.min_pct.map(|t| pct_delta >= t).unwrap_or(false);
        let abs_hit = self.min_abs.map(|t| abs_delta >= t).unwrap_or(false);
        pct_hit || abs_hit
    }
}

/// 出厂默认分级规则 (按严重度从高到低)
///
/// 待产品确认前的可配置默认值:
/// - Critical: 差异 >= 50% 或绝对差 >= 100
/// - Major:    差异 >= 20%
/// - Minor:    任何非零差异
pub fn default_rules() -> Vec<VarianceRule> {
    vec![
        VarianceRule {
            severity: Severity::Critical,
            min_pct: Some(0.5),
            min_abs: Some(100.0),
        },
        VarianceRule {
            severity: Severity::Major,
            min_pct: Some(0.2),
            min_abs: None,
        },
        VarianceRule {
            severity: Severity::Minor,
            min_pct: Some(0.0),
            min_abs: None,
        },
    ]
}

/// 规则列表规整: 按严重度从高到低稳定排序
pub fn normalize_rules(mut rules: Vec<VarianceRule>) -> Vec<VarianceRule> {
    rules.sort_by(|a, b| b.severity.cmp(&a.severity));
    rules
}

// ==========================================
// SeverityTierMap - 严重度 → 审批层级映射
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityTierMap {
    map: BTreeMap<Severity, ApprovalTier>,
}

impl SeverityTierMap {
    /// 出厂默认映射: None/Minor → 组长, Major → 主管, Critical → 经理
    pub fn default_map() -> Self {
        let mut map = BTreeMap::new();
        map.insert(Severity::None, ApprovalTier::Lead);
        map.insert(Severity::Minor, ApprovalTier::Lead);
        map.insert(Severity::Major, ApprovalTier::Supervisor);
        map.insert(Severity::Critical, ApprovalTier::Manager);
        Self { map }
    }

    /// 从完整映射构造, 校验单调性
    ///
    /// 红线: 严重度升高时要求层级不得降低; 不完整或非单调的映射拒收
    pub fn try_new(map: BTreeMap<Severity, ApprovalTier>) -> Option<Self> {
        let all = [
            Severity::None,
            Severity::Minor,
            Severity::Major,
            Severity::Critical,
        ];
        if !all.iter().all(|s| map.contains_key(s)) {
            return None;
        }

        let mut prev = ApprovalTier::Lead;
        for severity in all {
            let tier = map[&severity];
            if tier < prev {
                return None;
            }
            prev = tier;
        }

        Some(Self { map })
    }

    /// 查询严重度对应的要求审批层级
    pub fn tier_for(&self, severity: Severity) -> ApprovalTier {
        self.map[&severity]
    }
}

impl Default for SeverityTierMap {
    fn default() -> Self {
        Self::default_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_matches_pct_or_abs() {
        let rule = VarianceRule {
            severity: Severity::Critical,
            min_pct: Some(0.5),
            min_abs: Some(100.0),
        };

        assert!(rule.matches(10.0, 0.6)); // 百分比命中
        assert!(rule.matches(150.0, 0.1)); // 绝对值命中
        assert!(!rule.matches(10.0, 0.1)); // 均未命中
    }

    #[test]
    fn test_normalize_orders_by_severity_desc() {
        let rules = normalize_rules(vec![
            VarianceRule {
                severity: Severity::Minor,
                min_pct: Some(0.0),
                min_abs: None,
            },
            VarianceRule {
                severity: Severity::Critical,
                min_pct: Some(0.5),
                min_abs: None,
            },
        ]);

        assert_eq!(rules[0].severity, Severity::Critical);
        assert_eq!(rules[1].severity, Severity::Minor);
    }

    #[test]
    fn test_tier_map_rejects_non_monotonic() {
        let mut map = BTreeMap::new();
        map.insert(Severity::None, ApprovalTier::Lead);
        map.insert(Severity::Minor, ApprovalTier::Supervisor);
        map.insert(Severity::Major, ApprovalTier::Lead); // 倒挂
        map.insert(Severity::Critical, ApprovalTier::Manager);

        assert!(SeverityTierMap::try_new(map).is_none());
    }

    #[test]
    fn test_default_map_scenario() {
        let map = SeverityTierMap::default_map();
        assert_eq!(map.tier_for(Severity::None), ApprovalTier::Lead);
        assert_eq!(map.tier_for(Severity::Major), ApprovalTier::Supervisor);
        assert_eq!(map.tier_for(Severity::Critical), ApprovalTier::Manager);
    }
}
