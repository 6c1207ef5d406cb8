// ==========================================
// 仓库循环盘点系统 - 调账事务领域模型
// ==========================================
// 红线: 调账事务一经写入不可变更; 每张已批准盘点单有且仅有一个事务批次
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ReconciliationTransaction - 库存调账事务
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationTransaction {
    pub txn_id: String,            // 事务ID
    pub journal_id: String,        // 关联盘点单
    pub line_id: String,           // 关联明细
    pub location_code: String,     // 库位
    pub item_code: String,         // 物料
    pub delta_qty: f64,            // 带符号调账数量 (盘点 - 期望)
    pub applied_at: NaiveDateTime, // 写入时间
}

// ==========================================
// ReconciliationBatch - 调账批次结果
// ==========================================
// 说明: newly_applied=false 表示命中已存在批次 (按盘点单ID幂等重试)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationBatch {
    pub journal_id: String,                          // 盘点单ID
    pub transactions: Vec<ReconciliationTransaction>, // 事务明细
    pub newly_applied: bool,                         // 本次调用是否实际写入
}

impl ReconciliationBatch {
    /// 批次调账总量 (带符号)
    pub fn total_delta(&self) -> f64 {
        self.transactions.iter().map(|t| t.delta_qty).sum()
    }
}
