// ==========================================
// 仓库循环盘点系统 - 差异分级引擎
// ==========================================
// 职责: 对 (期望数量, 盘点数量) 做确定性的差异分级
// 红线: 纯函数, 相同输入与阈值配置必得相同结果;
//       盘点数量变化时整体重算替换, 不与旧记录合并
// ==========================================

use crate::config::variance_rules::{SeverityTierMap, VarianceRule};
use crate::config::ConfigManager;
use crate::domain::journal::JournalLine;
use crate::domain::types::{ApprovalTier, LineStatus, Severity};
use crate::domain::variance::VarianceRecord;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// Classification - 纯分级结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub delta_qty: f64,              // 绝对差 (盘点 - 期望)
    pub delta_pct: f64,              // 百分比差
    pub severity: Severity,          // 严重度
    pub required_tier: ApprovalTier, // 要求审批层级
    pub reason: String,              // 分级原因 (命中规则说明)
}

/// 纯分级函数: delta = counted - expected, pct = |delta| / max(expected, 1)
///
/// 规则按严重度从高到低求值, 首个命中者生效; 无命中 → None。
/// 零差异短路为 None, 不进入规则求值。
pub fn classify(
    expected: f64,
    counted: f64,
    rules: &[VarianceRule],
    tier_map: &SeverityTierMap,
) -> Classification {
    let delta_qty = counted - expected;
    let abs_delta = delta_qty.abs();
    let delta_pct = abs_delta / expected.max(1.0);

    if delta_qty == 0.0 {
        return Classification {
            delta_qty,
            delta_pct,
            severity: Severity::None,
            required_tier: tier_map.tier_for(Severity::None),
            reason: json!({
                "severity": "NONE",
                "reason": "盘点与账面一致"
            })
            .to_string(),
        };
    }

    for rule in rules {
        if rule.matches(abs_delta, delta_pct) {
            return Classification {
                delta_qty,
                delta_pct,
                severity: rule.severity,
                required_tier: tier_map.tier_for(rule.severity),
                reason: json!({
                    "severity": rule.severity.to_db_str(),
                    "rule_min_pct": rule.min_pct,
                    "rule_min_abs": rule.min_abs,
                    "delta_qty": delta_qty,
                    "delta_pct": delta_pct
                })
                .to_string(),
            };
        }
    }

    Classification {
        delta_qty,
        delta_pct,
        severity: Severity::None,
        required_tier: tier_map.tier_for(Severity::None),
        reason: json!({
            "severity": "NONE",
            "reason": "无规则命中",
            "delta_qty": delta_qty,
            "delta_pct": delta_pct
        })
        .to_string(),
    }
}

// ==========================================
// VarianceEngine - 差异分级引擎
// ==========================================
pub struct VarianceEngine {
    config: Arc<ConfigManager>,
}

impl VarianceEngine {
    /// 构造函数
    pub fn new(config: Arc<ConfigManager>) -> Self {
        Self { config }
    }

    /// 为一条明细生成差异记录 (当前轮次)
    ///
    /// 说明:
    /// - 已盘点明细: 按 (期望, 盘点) 分级
    /// - 跳过明细: 记零差异/严重度 None, 留痕但不产生调账
    pub fn evaluate_line(&self, line: &JournalLine, now: chrono::NaiveDateTime) -> VarianceRecord {
        let rules = self.config.get_variance_rules();
        let tier_map = self.config.get_severity_tier_map();
        self.evaluate_line_with(line, &rules, &tier_map, now)
    }

    /// 为整张盘点单的明细批量生成差异记录
    ///
    /// 说明: 规则与映射在批内只读取一次, 保证同一次提交内配置一致
    pub fn evaluate_journal(
        &self,
        lines: &[JournalLine],
        now: chrono::NaiveDateTime,
    ) -> Vec<VarianceRecord> {
        let rules = self.config.get_variance_rules();
        let tier_map = self.config.get_severity_tier_map();

        lines
            .iter()
            .map(|line| self.evaluate_line_with(line, &rules, &tier_map, now))
            .collect()
    }

    /// 整单要求审批层级 = 各明细要求层级的最大值
    pub fn journal_required_tier(records: &[VarianceRecord]) -> ApprovalTier {
        records
            .iter()
            .map(|r| r.required_tier)
            .max()
            .unwrap_or(ApprovalTier::Lead)
    }

    fn evaluate_line_with(
        &self,
        line: &JournalLine,
        rules: &[VarianceRule],
        tier_map: &SeverityTierMap,
        now: chrono::NaiveDateTime,
    ) -> VarianceRecord {
        match (line.status, line.counted_qty) {
            (LineStatus::Counted, Some(counted)) => {
                let c = classify(line.expected_qty, counted, rules, tier_map);
                VarianceRecord {
                    variance_id: Uuid::new_v4().to_string(),
                    journal_id: line.journal_id.clone(),
                    line_id: line.line_id.clone(),
                    count_pass: line.count_pass,
                    expected_qty: line.expected_qty,
                    counted_qty: Some(counted),
                    delta_qty: c.delta_qty,
                    delta_pct: c.delta_pct,
                    severity: c.severity,
                    required_tier: c.required_tier,
                    reason: c.reason,
                    computed_at: now,
                }
            }
            _ => VarianceRecord {
                // 跳过明细: 无盘点证据, 记零差异留痕
                variance_id: Uuid::new_v4().to_string(),
                journal_id: line.journal_id.clone(),
                line_id: line.line_id.clone(),
                count_pass: line.count_pass,
                expected_qty: line.expected_qty,
                counted_qty: None,
                delta_qty: 0.0,
                delta_pct: 0.0,
                severity: Severity::None,
                required_tier: tier_map.tier_for(Severity::None),
                reason: json!({
                    "severity": "NONE",
                    "reason": "明细带原因跳过, 不参与分级",
                    "skip_reason": line.skip_reason
                })
                .to_string(),
                computed_at: now,
            },
        }
    }
}
