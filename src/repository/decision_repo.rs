// ==========================================
// 仓库循环盘点系统 - 审批决策仓储
// ==========================================
// 红线: 决策日志只追加; 本仓储不提供 UPDATE/DELETE
// ==========================================

use crate::db::fmt_ts;
use crate::domain::approval::ApprovalDecision;
use crate::domain::types::{ApprovalAction, Role};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::plan_repo::parse_row_ts;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// ApprovalDecisionRepository - 审批决策仓储
// ==========================================
pub struct ApprovalDecisionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ApprovalDecisionRepository {
    /// 创建新的 ApprovalDecisionRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加决策
    pub fn append(&self, decision: &ApprovalDecision) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO approval_decision (
                decision_id, journal_id, line_id, actor, actor_role,
                action, comment, decided_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &decision.decision_id,
                &decision.journal_id,
                &decision.line_id,
                &decision.actor,
                decision.actor_role.to_db_str(),
                decision.action.to_db_str(),
                &decision.comment,
                fmt_ts(decision.decided_at),
            ],
        )?;

        Ok(decision.decision_id.clone())
    }

    /// 查询盘点单的决策日志 (按时间追加序)
    pub fn list_by_journal(&self, journal_id: &str) -> RepositoryResult<Vec<ApprovalDecision>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT decision_id, journal_id, line_id, actor, actor_role,
                      action, comment, decided_at
               FROM approval_decision
               WHERE journal_id = ?
               ORDER BY decided_at, decision_id"#,
        )?;

        let decisions = stmt
            .query_map(params![journal_id], Self::map_row)?
            .collect::<Result<Vec<ApprovalDecision>, _>>()?;

        Ok(decisions)
    }

    /// 映射数据库行到 ApprovalDecision 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ApprovalDecision> {
        let role_str: String = row.get(4)?;
        let action_str: String = row.get(5)?;

        Ok(ApprovalDecision {
            decision_id: row.get(0)?,
            journal_id: row.get(1)?,
            line_id: row.get(2)?,
            actor: row.get(3)?,
            actor_role: Role::from_str(&role_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    format!("未知角色: {}", role_str).into(),
                )
            })?,
            action: ApprovalAction::from_str(&action_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    format!("未知动作: {}", action_str).into(),
                )
            })?,
            comment: row.get(6)?,
            decided_at: parse_row_ts(row, 7)?,
        })
    }
}
