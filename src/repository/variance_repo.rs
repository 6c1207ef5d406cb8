// ==========================================
// 仓库循环盘点系统 - 差异记录仓储
// ==========================================
// 说明: 差异记录的写入在提交事务内完成 (见盘点单聚合仓储),
//       本仓储提供按当前轮次/历史轮次的读取
// ==========================================

use crate::domain::types::{ApprovalTier, Severity};
use crate::domain::variance::VarianceRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::plan_repo::parse_row_ts;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// VarianceRecordRepository - 差异记录仓储
// ==========================================
pub struct VarianceRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl VarianceRecordRepository {
    /// 创建新的 VarianceRecordRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询盘点单各明细的当前轮次差异记录
    ///
    /// 说明: 当前轮次 = 该明细的最大 count_pass
    pub fn list_current_by_journal(
        &self,
        journal_id: &str,
    ) -> RepositoryResult<Vec<VarianceRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"{} WHERE journal_id = ?
                 AND count_pass = (
                     SELECT MAX(v2.count_pass) FROM variance_record v2
                     WHERE v2.line_id = variance_record.line_id
                 )
               ORDER BY line_id"#,
            VARIANCE_SELECT
        ))?;

        let records = stmt
            .query_map(params![journal_id], Self::map_row)?
            .collect::<Result<Vec<VarianceRecord>, _>>()?;

        Ok(records)
    }

    /// 查询明细的全部轮次差异记录 (审计用, 按轮次排列)
    pub fn list_history_by_line(&self, line_id: &str) -> RepositoryResult<Vec<VarianceRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE line_id = ? ORDER BY count_pass",
            VARIANCE_SELECT
        ))?;

        let records = stmt
            .query_map(params![line_id], Self::map_row)?
            .collect::<Result<Vec<VarianceRecord>, _>>()?;

        Ok(records)
    }

    /// 查询明细在指定轮次的差异记录
    pub fn find_by_line_pass(
        &self,
        line_id: &str,
        count_pass: i32,
    ) -> RepositoryResult<Option<VarianceRecord>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE line_id = ? AND count_pass = ?", VARIANCE_SELECT),
            params![line_id, count_pass],
            Self::map_row,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 映射数据库行到 VarianceRecord 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<VarianceRecord> {
        let severity_str: String = row.get(8)?;
        let tier_str: String = row.get(9)?;

        Ok(VarianceRecord {
            variance_id: row.get(0)?,
            journal_id: row.get(1)?,
            line_id: row.get(2)?,
            count_pass: row.get(3)?,
            expected_qty: row.get(4)?,
            counted_qty: row.get(5)?,
            delta_qty: row.get(6)?,
            delta_pct: row.get(7)?,
            severity: Severity::from_str(&severity_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    8,
                    rusqlite::types::Type::Text,
                    format!("未知严重度: {}", severity_str).into(),
                )
            })?,
            required_tier: ApprovalTier::from_str(&tier_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    9,
                    rusqlite::types::Type::Text,
                    format!("未知审批层级: {}", tier_str).into(),
                )
            })?,
            reason: row.get(10)?,
            computed_at: parse_row_ts(row, 11)?,
        })
    }
}

/// 差异记录查询列集
const VARIANCE_SELECT: &str = r#"SELECT variance_id, journal_id, line_id, count_pass,
       expected_qty, counted_qty, delta_qty, delta_pct,
       severity, required_tier, reason, computed_at
FROM variance_record"#;
