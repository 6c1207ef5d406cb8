// ==========================================
// 仓库循环盘点系统 - 盘点计划领域模型
// ==========================================
// 红线: 计划一旦 Active, 范围/节奏/窗口全部冻结, 只允许状态流转
// ==========================================

use crate::domain::types::PlanStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ScopeSelector - 盘点范围选择器
// ==========================================
// 说明: 计划范围 = 选择器集合的并集; 选择器内各条件为与关系
// 命中的选择器会把 zone / required_skill 标注到生成的盘点单上
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSelector {
    pub location_prefix: Option<String>, // 库位前缀 (None 表示不限)
    pub item_prefix: Option<String>,     // 物料前缀 (None 表示不限)
    pub zone: Option<String>,            // 库区标注
    pub required_skill: Option<String>,  // 盘点技能要求 (如序列号盘点)
}

impl ScopeSelector {
    /// 匹配全部库位/物料的选择器
    pub fn all() -> Self {
        Self {
            location_prefix: None,
            item_prefix: None,
            zone: None,
            required_skill: None,
        }
    }

    /// 纯谓词: 判断 (库位, 物料) 是否落入本选择器
    pub fn matches(&self, location_code: &str, item_code: &str) -> bool {
        if let Some(prefix) = &self.location_prefix {
            if !location_code.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(prefix) = &self.item_prefix {
            if !item_code.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

// ==========================================
// CountPlan - 盘点计划
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountPlan {
    pub plan_id: String,             // 计划ID
    pub plan_name: String,           // 计划名称
    pub scope: Vec<ScopeSelector>,   // 盘点范围 (选择器集合)
    pub cadence_days: i32,           // 盘点节奏 (天)
    pub due_start: NaiveDateTime,    // 盘点窗口起
    pub due_end: NaiveDateTime,      // 盘点窗口止
    pub status: PlanStatus,          // 状态
    pub created_by: String,          // 创建人
    pub created_at: NaiveDateTime,   // 创建时间
    pub updated_at: NaiveDateTime,   // 更新时间
}

impl CountPlan {
    /// 判断是否为草稿状态
    pub fn is_draft(&self) -> bool {
        self.status == PlanStatus::Draft
    }

    /// 判断是否为进行中状态
    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    /// 判断是否已关闭
    pub fn is_closed(&self) -> bool {
        self.status == PlanStatus::Closed
    }

    /// 判断盘点窗口是否已过期
    pub fn due_window_lapsed(&self, now: NaiveDateTime) -> bool {
        now > self.due_end
    }

    /// 纯谓词: (库位, 物料) 是否在计划范围内, 返回首个命中的选择器
    pub fn scope_match(&self, location_code: &str, item_code: &str) -> Option<&ScopeSelector> {
        self.scope
            .iter()
            .find(|selector| selector.matches(location_code, item_code))
    }
}
