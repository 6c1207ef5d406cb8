// ==========================================
// 仓库循环盘点系统 - 盘点单领域模型
// ==========================================
// 红线: 盘点单同一时刻最多一个持有人; 期望数量在生成时冻结
// ==========================================

use crate::domain::types::{ApprovalTier, JournalStatus, LineStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// SnapshotEntry - 库存快照行
// ==========================================
// 说明: 由外部库存快照源提供, 引擎在盘点单生成后不再回查
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub location_code: String, // 库位
    pub item_code: String,     // 物料
    pub on_hand_qty: f64,      // 账面在库数量
}

// ==========================================
// Journal - 盘点单
// ==========================================
// 归属规则: 领取前归派工池, 领取后归持有人, 提交后归审批流
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub journal_id: String,                    // 盘点单ID
    pub plan_id: String,                       // 关联计划
    pub location_code: String,                 // 目标库位/库位组
    pub zone: Option<String>,                  // 库区标注 (来自范围选择器)
    pub required_skill: Option<String>,        // 盘点技能要求
    pub status: JournalStatus,                 // 状态
    pub assigned_operator: Option<String>,     // 持有人 (领取后)
    pub claimed_at: Option<NaiveDateTime>,     // 领取时间
    pub lease_expires_at: Option<NaiveDateTime>, // 租约到期时间
    pub required_tier: Option<ApprovalTier>,   // 整单要求审批层级 (提交时计算)
    pub revision: i32,                         // 乐观锁修订号
    pub created_at: NaiveDateTime,             // 创建时间
    pub updated_at: NaiveDateTime,             // 更新时间
}

impl Journal {
    /// 判断租约是否已过期 (惰性判定, 访问时调用)
    pub fn lease_expired(&self, now: NaiveDateTime) -> bool {
        match self.lease_expires_at {
            Some(expires) => expires < now,
            None => false,
        }
    }

    /// 当前有效状态: 已领取但租约过期的盘点单, 对外视同待领取
    ///
    /// 说明: 过期持有人被动出局, 不做同步通知
    pub fn effective_status(&self, now: NaiveDateTime) -> JournalStatus {
        match self.status {
            JournalStatus::Assigned | JournalStatus::InProgress if self.lease_expired(now) => {
                JournalStatus::Pending
            }
            status => status,
        }
    }

    /// 判断 operator 是否为当前有效持有人 (租约未过期)
    pub fn held_by(&self, operator_id: &str, now: NaiveDateTime) -> bool {
        matches!(
            self.status,
            JournalStatus::Assigned | JournalStatus::InProgress
        ) && self.assigned_operator.as_deref() == Some(operator_id)
            && !self.lease_expired(now)
    }
}

// ==========================================
// JournalLine - 盘点明细
// ==========================================
// 红线: 同一轮次内盘点数量最多落定一次 (提交前可覆盖, 提交后冻结);
//       复盘产生新轮次, 历史轮次不可改写
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub line_id: String,                  // 明细ID
    pub journal_id: String,               // 关联盘点单
    pub seq_no: i32,                      // 序号
    pub location_code: String,            // 库位
    pub item_code: String,                // 物料
    pub expected_qty: f64,                // 期望数量 (快照冻结)
    pub counted_qty: Option<f64>,         // 盘点数量 (未盘为空)
    pub count_pass: i32,                  // 盘点轮次 (从1起)
    pub status: LineStatus,               // 状态
    pub skip_reason: Option<String>,      // 跳过原因 (Skipped 必填)
    pub serial_refs: Vec<String>,         // 序列号引用 (仅存引用)
    pub photo_refs: Vec<String>,          // 照片引用 (仅存引用)
    pub counted_by: Option<String>,       // 盘点人
    pub counted_at: Option<NaiveDateTime>, // 盘点时间
}

impl JournalLine {
    /// 判断提交时是否已完成 (已盘点或已带原因跳过)
    pub fn is_complete_for_submit(&self) -> bool {
        self.status.is_complete_for_submit()
    }

    /// 调账的带符号数量差 (盘点 - 期望); 跳过的明细不产生调账
    pub fn adjustment_delta(&self) -> Option<f64> {
        match (self.status, self.counted_qty) {
            (LineStatus::Counted, Some(counted)) => Some(counted - self.expected_qty),
            _ => None,
        }
    }
}

// ==========================================
// CountEvidence - 盘点证据引用
// ==========================================
// 红线: 只存外部证据库的引用 (id/URL), 永不落二进制
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountEvidence {
    pub serial_refs: Vec<String>, // 序列号引用
    pub photo_refs: Vec<String>,  // 照片引用
}

impl CountEvidence {
    /// 空证据
    pub fn none() -> Self {
        Self::default()
    }
}
