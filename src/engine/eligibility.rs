// ==========================================
// 仓库循环盘点系统 - 派工资格引擎
// ==========================================
// 职责: 判定盘点员对盘点单的领取资格
// 红线: 纯谓词, 无副作用; 所有规则必须输出 reason
// ==========================================

use crate::domain::journal::Journal;
use serde::{Deserialize, Serialize};

// ==========================================
// OperatorProfile - 盘点员画像
// ==========================================
// 说明: 由外部身份系统提供, 引擎不拥有会话状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub operator_id: String,     // 盘点员ID
    pub zones: Vec<String>,      // 可作业库区
    pub skills: Vec<String>,     // 持有技能
    pub shift: Option<String>,   // 当前班次
}

// ==========================================
// DispatchFilters - 派工列表过滤条件
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchFilters {
    pub plan_id: Option<String>,         // 限定计划
    pub zone: Option<String>,            // 限定库区
    pub location_prefix: Option<String>, // 限定库位前缀
}

impl DispatchFilters {
    /// 纯谓词: 盘点单是否通过过滤条件
    pub fn accepts(&self, journal: &Journal) -> bool {
        if let Some(plan_id) = &self.plan_id {
            if &journal.plan_id != plan_id {
                return false;
            }
        }
        if let Some(zone) = &self.zone {
            if journal.zone.as_deref() != Some(zone.as_str()) {
                return false;
            }
        }
        if let Some(prefix) = &self.location_prefix {
            if !journal.location_code.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

// ==========================================
// EligibilityVerdict - 资格判定结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool, // 是否有资格
    pub reason: String, // 判定原因 (可解释)
}

impl EligibilityVerdict {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            eligible: true,
            reason: reason.into(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: reason.into(),
        }
    }
}

// ==========================================
// EligibilityEngine - 派工资格引擎
// ==========================================
pub struct EligibilityEngine {
    // 无状态引擎, 规则全部来自入参
}

impl EligibilityEngine {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    /// 判定盘点员对盘点单的领取资格
    ///
    /// 规则 (可解释):
    /// - 盘点单标注库区时, 盘点员可作业库区必须覆盖
    /// - 盘点单标注技能要求时, 盘点员必须持有该技能
    /// - 未标注的维度不设限
    pub fn check(&self, profile: &OperatorProfile, journal: &Journal) -> EligibilityVerdict {
        if let Some(zone) = &journal.zone {
            if !profile.zones.iter().any(|z| z == zone) {
                return EligibilityVerdict::fail(format!(
                    "库区不匹配: 盘点单库区={}, 盘点员可作业库区={:?}",
                    zone, profile.zones
                ));
            }
        }

        if let Some(skill) = &journal.required_skill {
            if !profile.skills.iter().any(|s| s == skill) {
                return EligibilityVerdict::fail(format!(
                    "技能不满足: 要求={}, 持有={:?}",
                    skill, profile.skills
                ));
            }
        }

        EligibilityVerdict::pass("库区与技能约束均满足")
    }
}

impl Default for EligibilityEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::JournalStatus;

    fn sample_journal(zone: Option<&str>, skill: Option<&str>) -> Journal {
        let now = chrono::Utc::now().naive_utc();
        Journal {
            journal_id: "J1".to_string(),
            plan_id: "P1".to_string(),
            location_code: "A-01".to_string(),
            zone: zone.map(|s| s.to_string()),
            required_skill: skill.map(|s| s.to_string()),
            status: JournalStatus::Pending,
            assigned_operator: None,
            claimed_at: None,
            lease_expires_at: None,
            required_tier: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_profile() -> OperatorProfile {
        OperatorProfile {
            operator_id: "op01".to_string(),
            zones: vec!["A区".to_string(), "B区".to_string()],
            skills: vec!["SERIAL_COUNT".to_string()],
            shift: Some("DAY".to_string()),
        }
    }

    #[test]
    fn test_unconstrained_journal_always_eligible() {
        let engine = EligibilityEngine::new();
        let verdict = engine.check(&sample_profile(), &sample_journal(None, None));
        assert!(verdict.eligible);
    }

    #[test]
    fn test_zone_mismatch() {
        let engine = EligibilityEngine::new();
        let verdict = engine.check(&sample_profile(), &sample_journal(Some("C区"), None));
        assert!(!verdict.eligible);
        assert!(verdict.reason.contains("库区不匹配"));
    }

    #[test]
    fn test_skill_mismatch() {
        let engine = EligibilityEngine::new();
        let verdict = engine.check(
            &sample_profile(),
            &sample_journal(Some("A区"), Some("COLD_CHAIN")),
        );
        assert!(!verdict.eligible);
        assert!(verdict.reason.contains("技能不满足"));
    }

    #[test]
    fn test_filters_accept() {
        let journal = sample_journal(Some("A区"), None);

        let mut filters = DispatchFilters::default();
        assert!(filters.accepts(&journal));

        filters.zone = Some("A区".to_string());
        assert!(filters.accepts(&journal));

        filters.location_prefix = Some("B-".to_string());
        assert!(!filters.accepts(&journal));
    }
}
