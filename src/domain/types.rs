// ==========================================
// 仓库循环盘点系统 - 领域类型定义
// ==========================================
// 职责: 定义盘点单生命周期、差异分级、审批层级的核心枚举
// 红线: 状态集固定于盘点领域, 不做通用工作流扩展
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 盘点计划状态 (Count Plan Status)
// ==========================================
// 红线: Active 之后除状态流转外不可变更
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Draft,  // 草稿
    Active, // 进行中
    Closed, // 已关闭
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PlanStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ACTIVE" => PlanStatus::Active,
            "CLOSED" => PlanStatus::Closed,
            _ => PlanStatus::Draft, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "DRAFT",
            PlanStatus::Active => "ACTIVE",
            PlanStatus::Closed => "CLOSED",
        }
    }
}

// ==========================================
// 盘点单状态 (Journal Status)
// ==========================================
// 状态机: Pending → Assigned → InProgress → Submitted → UnderReview
//         → {Approved → Reconciled, Rejected, InProgress(复盘)}
// 红线: 任何状态流转必须是比较交换 (CAS), 不允许半途状态对外可见
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    Pending,     // 待领取 (派工池中)
    Assigned,    // 已领取
    InProgress,  // 盘点中
    Submitted,   // 已提交
    UnderReview, // 审批中
    Approved,    // 审批通过
    Rejected,    // 整单驳回
    Reconciled,  // 已调账
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl JournalStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(JournalStatus::Pending),
            "ASSIGNED" => Some(JournalStatus::Assigned),
            "IN_PROGRESS" => Some(JournalStatus::InProgress),
            "SUBMITTED" => Some(JournalStatus::Submitted),
            "UNDER_REVIEW" => Some(JournalStatus::UnderReview),
            "APPROVED" => Some(JournalStatus::Approved),
            "REJECTED" => Some(JournalStatus::Rejected),
            "RECONCILED" => Some(JournalStatus::Reconciled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            JournalStatus::Pending => "PENDING",
            JournalStatus::Assigned => "ASSIGNED",
            JournalStatus::InProgress => "IN_PROGRESS",
            JournalStatus::Submitted => "SUBMITTED",
            JournalStatus::UnderReview => "UNDER_REVIEW",
            JournalStatus::Approved => "APPROVED",
            JournalStatus::Rejected => "REJECTED",
            JournalStatus::Reconciled => "RECONCILED",
        }
    }

    /// 判断是否为终态 (不再参与派工/审批)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JournalStatus::Rejected | JournalStatus::Reconciled)
    }
}

// ==========================================
// 盘点明细状态 (Journal Line Status)
// ==========================================
// 说明: Skipped 必须附带跳过原因; RecountRequested 开启新盘点轮次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Uncounted,        // 未盘点
    Counted,          // 已盘点
    Skipped,          // 跳过 (附原因)
    RecountRequested, // 待复盘
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl LineStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UNCOUNTED" => Some(LineStatus::Uncounted),
            "COUNTED" => Some(LineStatus::Counted),
            "SKIPPED" => Some(LineStatus::Skipped),
            "RECOUNT_REQUESTED" => Some(LineStatus::RecountRequested),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LineStatus::Uncounted => "UNCOUNTED",
            LineStatus::Counted => "COUNTED",
            LineStatus::Skipped => "SKIPPED",
            LineStatus::RecountRequested => "RECOUNT_REQUESTED",
        }
    }

    /// 判断提交时是否视为已完成
    pub fn is_complete_for_submit(&self) -> bool {
        matches!(self, LineStatus::Counted | LineStatus::Skipped)
    }
}

// ==========================================
// 差异严重度 (Variance Severity)
// ==========================================
// 顺序: None < Minor < Major < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    None,     // 无差异
    Minor,    // 轻微
    Major,    // 显著
    Critical, // 严重
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl Severity {
    /// 从字符串解析严重度
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NONE" => Some(Severity::None),
            "MINOR" => Some(Severity::Minor),
            "MAJOR" => Some(Severity::Major),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
        }
    }
}

// ==========================================
// 审批层级 (Approval Tier)
// ==========================================
// 顺序: Lead < Supervisor < Manager
// 红线: 严重度 → 层级 的映射必须单调不减
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalTier {
    Lead,       // 盘点组长
    Supervisor, // 主管
    Manager,    // 经理
}

impl fmt::Display for ApprovalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ApprovalTier {
    /// 从字符串解析层级
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LEAD" => Some(ApprovalTier::Lead),
            "SUPERVISOR" => Some(ApprovalTier::Supervisor),
            "MANAGER" => Some(ApprovalTier::Manager),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ApprovalTier::Lead => "LEAD",
            ApprovalTier::Supervisor => "SUPERVISOR",
            ApprovalTier::Manager => "MANAGER",
        }
    }
}

// ==========================================
// 角色 (Actor Role)
// ==========================================
// 说明: 角色由外部身份系统提供, 引擎只做不透明的权限比较
// 顺序: Operator < Lead < Supervisor < Manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Operator,   // 盘点员
    Lead,       // 盘点组长
    Supervisor, // 主管
    Manager,    // 经理
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl Role {
    /// 从字符串解析角色
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPERATOR" => Some(Role::Operator),
            "LEAD" => Some(Role::Lead),
            "SUPERVISOR" => Some(Role::Supervisor),
            "MANAGER" => Some(Role::Manager),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Role::Operator => "OPERATOR",
            Role::Lead => "LEAD",
            Role::Supervisor => "SUPERVISOR",
            Role::Manager => "MANAGER",
        }
    }

    /// 角色对应的审批权限层级 (盘点员无审批权限)
    pub fn authority(&self) -> Option<ApprovalTier> {
        match self {
            Role::Operator => None,
            Role::Lead => Some(ApprovalTier::Lead),
            Role::Supervisor => Some(ApprovalTier::Supervisor),
            Role::Manager => Some(ApprovalTier::Manager),
        }
    }

    /// 统一权限比较: 角色权限是否达到要求层级
    ///
    /// 红线: 所有审批权限检查必须经过此函数, 不允许各处各写一套
    pub fn meets(&self, required: ApprovalTier) -> bool {
        match self.authority() {
            Some(tier) => tier >= required,
            None => false,
        }
    }
}

// ==========================================
// 审批动作 (Approval Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Approve,  // 通过
    Reject,   // 驳回 (整单或按明细复盘)
    Escalate, // 上报 (仅路由, 不改变状态)
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ApprovalAction {
    /// 从字符串解析动作
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "APPROVE" => Some(ApprovalAction::Approve),
            "REJECT" => Some(ApprovalAction::Reject),
            "ESCALATE" => Some(ApprovalAction::Escalate),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "APPROVE",
            ApprovalAction::Reject => "REJECT",
            ApprovalAction::Escalate => "ESCALATE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::None < Severity::Minor);
        assert!(Severity::Minor < Severity::Major);
        assert!(Severity::Major < Severity::Critical);
    }

    #[test]
    fn test_role_meets_tier() {
        assert!(!Role::Operator.meets(ApprovalTier::Lead));
        assert!(Role::Lead.meets(ApprovalTier::Lead));
        assert!(!Role::Lead.meets(ApprovalTier::Supervisor));
        assert!(Role::Supervisor.meets(ApprovalTier::Supervisor));
        assert!(!Role::Supervisor.meets(ApprovalTier::Manager));
        assert!(Role::Manager.meets(ApprovalTier::Lead));
    }

    #[test]
    fn test_journal_status_roundtrip() {
        for status in [
            JournalStatus::Pending,
            JournalStatus::Assigned,
            JournalStatus::InProgress,
            JournalStatus::Submitted,
            JournalStatus::UnderReview,
            JournalStatus::Approved,
            JournalStatus::Rejected,
            JournalStatus::Reconciled,
        ] {
            assert_eq!(JournalStatus::from_str(status.to_db_str()), Some(status));
        }
    }

    #[test]
    fn test_line_status_complete_for_submit() {
        assert!(!LineStatus::Uncounted.is_complete_for_submit());
        assert!(LineStatus::Counted.is_complete_for_submit());
        assert!(LineStatus::Skipped.is_complete_for_submit());
        assert!(!LineStatus::RecountRequested.is_complete_for_submit());
    }
}
