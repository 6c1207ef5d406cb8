// ==========================================
// 仓库循环盘点系统 - 审批决策领域模型
// ==========================================
// 红线: 决策日志只追加, 永不改写; 盘点单的审批态是决策日志的折叠
// ==========================================

use crate::domain::types::{ApprovalAction, Role};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ApprovalDecision - 审批决策
// ==========================================
// 说明: line_id 为空表示整单决策, 否则为单条明细决策
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub decision_id: String,         // 决策ID
    pub journal_id: String,          // 关联盘点单
    pub line_id: Option<String>,     // 关联明细 (整单决策为空)
    pub actor: String,               // 决策人
    pub actor_role: Role,            // 决策人角色 (外部身份系统提供)
    pub action: ApprovalAction,      // 动作
    pub comment: Option<String>,     // 备注
    pub decided_at: NaiveDateTime,   // 决策时间
}

impl ApprovalDecision {
    /// 创建整单决策
    pub fn journal_level(
        journal_id: &str,
        actor: &str,
        actor_role: Role,
        action: ApprovalAction,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4().to_string(),
            journal_id: journal_id.to_string(),
            line_id: None,
            actor: actor.to_string(),
            actor_role,
            action,
            comment: None,
            decided_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// 创建单条明细决策
    pub fn line_level(
        journal_id: &str,
        line_id: &str,
        actor: &str,
        actor_role: Role,
        action: ApprovalAction,
    ) -> Self {
        Self {
            line_id: Some(line_id.to_string()),
            ..Self::journal_level(journal_id, actor, actor_role, action)
        }
    }

    /// 设置备注
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// 判断是否为整单决策
    pub fn is_journal_level(&self) -> bool {
        self.line_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_level_decision() {
        let decision = ApprovalDecision::line_level(
            "J1",
            "L1",
            "lead01",
            Role::Lead,
            ApprovalAction::Approve,
        )
        .with_comment("轻微差异, 直接通过");

        assert!(!decision.is_journal_level());
        assert_eq!(decision.line_id.as_deref(), Some("L1"));
        assert_eq!(decision.actor_role, Role::Lead);
        assert!(decision.comment.is_some());
    }
}
