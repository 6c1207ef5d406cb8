// ==========================================
// 仓库循环盘点系统 - 差异记录领域模型
// ==========================================
// 红线: 差异记录是派生数据, 盘点数量变化时必须整体重算替换;
//       以 (明细, 轮次) 为键, 历史轮次记录保留不改写
// ==========================================

use crate::domain::types::{ApprovalTier, Severity};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// VarianceRecord - 差异记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceRecord {
    pub variance_id: String,         // 记录ID
    pub journal_id: String,          // 关联盘点单
    pub line_id: String,             // 关联明细
    pub count_pass: i32,             // 盘点轮次
    pub expected_qty: f64,           // 期望数量
    pub counted_qty: Option<f64>,    // 盘点数量 (跳过明细为空)
    pub delta_qty: f64,              // 绝对差 (盘点 - 期望)
    pub delta_pct: f64,              // 百分比差 |delta| / max(期望, 1)
    pub severity: Severity,          // 严重度
    pub required_tier: ApprovalTier, // 要求审批层级
    pub reason: String,              // 分级原因 (命中规则说明)
    pub computed_at: NaiveDateTime,  // 计算时间
}

impl VarianceRecord {
    /// 判断是否存在实际差异
    pub fn has_variance(&self) -> bool {
        self.severity > Severity::None
    }
}
