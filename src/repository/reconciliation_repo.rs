// ==========================================
// 仓库循环盘点系统 - 调账事务仓储
// ==========================================
// 红线: 事务批次与盘点单状态翻转必须在同一事务内落库;
//       批次一经写入不可变更
// ==========================================

use crate::db::fmt_ts;
use crate::domain::reconciliation::ReconciliationTransaction;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::plan_repo::parse_row_ts;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// ReconciliationRepository - 调账事务仓储
// ==========================================
pub struct ReconciliationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReconciliationRepository {
    /// 创建新的 ReconciliationRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入调账批次并翻转盘点单状态 (单事务, 全有或全无)
    ///
    /// # 并发控制
    /// 状态翻转 CAS (APPROVED + revision); CAS 失败整个事务放弃,
    /// 返回 Ok(false) 由引擎回读判定 (通常是并发调账已完成)。
    pub fn try_write_batch(
        &self,
        journal_id: &str,
        expected_revision: i32,
        transactions: &[ReconciliationTransaction],
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            r#"UPDATE journal
               SET status = 'RECONCILED', revision = revision + 1, updated_at = ?1
               WHERE journal_id = ?2 AND status = 'APPROVED' AND revision = ?3"#,
            params![fmt_ts(now), journal_id, expected_revision],
        )?;

        if rows_affected == 0 {
            return Ok(false);
        }

        for txn in transactions {
            tx.execute(
                r#"INSERT INTO recon_txn (
                    txn_id, journal_id, line_id, location_code, item_code,
                    delta_qty, applied_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    &txn.txn_id,
                    &txn.journal_id,
                    &txn.line_id,
                    &txn.location_code,
                    &txn.item_code,
                    &txn.delta_qty,
                    fmt_ts(txn.applied_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    /// 查询盘点单的调账批次
    pub fn list_by_journal(
        &self,
        journal_id: &str,
    ) -> RepositoryResult<Vec<ReconciliationTransaction>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT txn_id, journal_id, line_id, location_code, item_code,
                      delta_qty, applied_at
               FROM recon_txn
               WHERE journal_id = ?
               ORDER BY line_id"#,
        )?;

        let transactions = stmt
            .query_map(params![journal_id], Self::map_row)?
            .collect::<Result<Vec<ReconciliationTransaction>, _>>()?;

        Ok(transactions)
    }

    /// 统计盘点单的调账事务数量 (完整性探针)
    pub fn count_by_journal(&self, journal_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM recon_txn WHERE journal_id = ?",
            params![journal_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// 映射数据库行到 ReconciliationTransaction 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ReconciliationTransaction> {
        Ok(ReconciliationTransaction {
            txn_id: row.get(0)?,
            journal_id: row.get(1)?,
            line_id: row.get(2)?,
            location_code: row.get(3)?,
            item_code: row.get(4)?,
            delta_qty: row.get(5)?,
            applied_at: parse_row_ts(row, 6)?,
        })
    }
}
