// ==========================================
// 仓库循环盘点系统 - 盘点单聚合仓储
// ==========================================
// 职责: 盘点单 + 盘点明细的聚合数据访问
// 红线: Repository 不含业务逻辑; 领取/提交/审批流转全部走
//       单条 CAS UPDATE 或单事务, 不允许半途状态对外可见
// ==========================================

use crate::db::fmt_ts;
use crate::domain::journal::{Journal, JournalLine};
use crate::domain::types::{ApprovalTier, JournalStatus, LineStatus};
use crate::domain::variance::VarianceRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::plan_repo::{parse_row_ts, parse_row_ts_opt};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// ClaimCasResult - 领取 CAS 结果
// ==========================================
// 说明: 仓储只报告比较交换的事实结果, 错误语义由引擎层赋予
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimCasResult {
    /// 本调用方赢得领取
    Won,
    /// 已被他人持有且租约有效
    HeldByOther { operator: String },
    /// 状态不可领取 (已提交/审批中/终态)
    IneligibleStatus { status: JournalStatus },
}

// ==========================================
// JournalRepository - 盘点单聚合仓储
// ==========================================
pub struct JournalRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JournalRepository {
    /// 创建新的 JournalRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 创建
    // ==========================================

    /// 创建盘点单及其全部明细 (单事务)
    pub fn create_with_lines(
        &self,
        journal: &Journal,
        lines: &[JournalLine],
    ) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO journal (
                journal_id, plan_id, location_code, zone, required_skill,
                status, assigned_operator, claimed_at, lease_expires_at,
                required_tier, revision, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &journal.journal_id,
                &journal.plan_id,
                &journal.location_code,
                &journal.zone,
                &journal.required_skill,
                journal.status.to_db_str(),
                &journal.assigned_operator,
                journal.claimed_at.map(fmt_ts),
                journal.lease_expires_at.map(fmt_ts),
                journal.required_tier.map(|t| t.to_db_str()),
                &journal.revision,
                fmt_ts(journal.created_at),
                fmt_ts(journal.updated_at),
            ],
        )?;

        for line in lines {
            let serial_json = serde_json::to_string(&line.serial_refs)
                .map_err(|e| RepositoryError::ValidationError(format!("序列号序列化失败: {}", e)))?;
            let photo_json = serde_json::to_string(&line.photo_refs)
                .map_err(|e| RepositoryError::ValidationError(format!("照片引用序列化失败: {}", e)))?;

            tx.execute(
                r#"INSERT INTO journal_line (
                    line_id, journal_id, seq_no, location_code, item_code,
                    expected_qty, counted_qty, count_pass, status, skip_reason,
                    serial_json, photo_json, counted_by, counted_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    &line.line_id,
                    &line.journal_id,
                    &line.seq_no,
                    &line.location_code,
                    &line.item_code,
                    &line.expected_qty,
                    &line.counted_qty,
                    &line.count_pass,
                    line.status.to_db_str(),
                    &line.skip_reason,
                    &serial_json,
                    &photo_json,
                    &line.counted_by,
                    line.counted_at.map(fmt_ts),
                ],
            )?;
        }

        tx.commit()?;
        Ok(journal.journal_id.clone())
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按 journal_id 查询盘点单
    pub fn find_by_id(&self, journal_id: &str) -> RepositoryResult<Option<Journal>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE journal_id = ?", JOURNAL_SELECT),
            params![journal_id],
            Self::map_journal_row,
        ) {
            Ok(journal) => Ok(Some(journal)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按 journal_id 查询, 不存在时报 NotFound
    pub fn get_by_id(&self, journal_id: &str) -> RepositoryResult<Journal> {
        self.find_by_id(journal_id)?.ok_or(RepositoryError::NotFound {
            entity: "Journal".to_string(),
            id: journal_id.to_string(),
        })
    }

    /// 查询计划下的全部盘点单
    pub fn list_by_plan(&self, plan_id: &str) -> RepositoryResult<Vec<Journal>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare(&format!("{} WHERE plan_id = ? ORDER BY created_at", JOURNAL_SELECT))?;
        let journals = stmt
            .query_map(params![plan_id], Self::map_journal_row)?
            .collect::<Result<Vec<Journal>, _>>()?;

        Ok(journals)
    }

    /// 查询可领取的盘点单 (待领取, 或租约已过期的已领取单)
    ///
    /// 说明: 租约过期走惰性判定, 这里按统一时间戳格式做字典序比较
    pub fn list_claimable(&self, now: NaiveDateTime) -> RepositoryResult<Vec<Journal>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"{} WHERE status = 'PENDING'
                  OR (status IN ('ASSIGNED', 'IN_PROGRESS')
                      AND lease_expires_at IS NOT NULL AND lease_expires_at < ?)
               ORDER BY created_at"#,
            JOURNAL_SELECT
        ))?;

        let journals = stmt
            .query_map(params![fmt_ts(now)], Self::map_journal_row)?
            .collect::<Result<Vec<Journal>, _>>()?;

        Ok(journals)
    }

    /// 统计计划下未调账完成的盘点单数量
    pub fn count_open_by_plan(&self, plan_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM journal WHERE plan_id = ? AND status != 'RECONCILED'",
            params![plan_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// 查询盘点单的全部明细 (按序号排列)
    pub fn find_lines(&self, journal_id: &str) -> RepositoryResult<Vec<JournalLine>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare(&format!("{} WHERE journal_id = ? ORDER BY seq_no", LINE_SELECT))?;
        let lines = stmt
            .query_map(params![journal_id], Self::map_line_row)?
            .collect::<Result<Vec<JournalLine>, _>>()?;

        Ok(lines)
    }

    /// 按 line_id 查询明细
    pub fn find_line(&self, line_id: &str) -> RepositoryResult<Option<JournalLine>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE line_id = ?", LINE_SELECT),
            params![line_id],
            Self::map_line_row,
        ) {
            Ok(line) => Ok(Some(line)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ==========================================
    // 领取/释放 (单条 CAS UPDATE, 并发领取只有一个赢家)
    // ==========================================

    /// 领取 CAS: 待领取 或 租约过期 的盘点单才可被抢占
    ///
    /// # 并发控制
    /// 单条 UPDATE 的 WHERE 同时校验状态与租约, SQLite 行级原子性保证
    /// 两个并发领取者恰有一个 rows_affected=1; 输家通过回读区分原因。
    pub fn try_claim(
        &self,
        journal_id: &str,
        operator_id: &str,
        now: NaiveDateTime,
        lease_expires_at: NaiveDateTime,
    ) -> RepositoryResult<ClaimCasResult> {
        let conn = self.get_conn()?;
        let now_s = fmt_ts(now);

        let rows_affected = conn.execute(
            r#"UPDATE journal
               SET status = 'ASSIGNED', assigned_operator = ?1, claimed_at = ?2,
                   lease_expires_at = ?3, revision = revision + 1, updated_at = ?2
               WHERE journal_id = ?4
                 AND (status = 'PENDING'
                      OR (status IN ('ASSIGNED', 'IN_PROGRESS')
                          AND lease_expires_at IS NOT NULL AND lease_expires_at < ?2))"#,
            params![operator_id, now_s, fmt_ts(lease_expires_at), journal_id],
        )?;

        if rows_affected == 1 {
            return Ok(ClaimCasResult::Won);
        }

        // 回读区分: 不存在 / 他人持有 / 状态不可领取
        let (status_str, holder): (String, Option<String>) = conn
            .query_row(
                "SELECT status, assigned_operator FROM journal WHERE journal_id = ?",
                params![journal_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                    entity: "Journal".to_string(),
                    id: journal_id.to_string(),
                },
                e => e.into(),
            })?;

        let status = JournalStatus::from_str(&status_str).ok_or_else(|| {
            RepositoryError::FieldValueError {
                field: "status".to_string(),
                message: format!("未知状态: {}", status_str),
            }
        })?;

        match status {
            JournalStatus::Assigned | JournalStatus::InProgress => Ok(ClaimCasResult::HeldByOther {
                operator: holder.unwrap_or_default(),
            }),
            other => Ok(ClaimCasResult::IneligibleStatus { status: other }),
        }
    }

    /// 释放 CAS: 仅当前有效持有人可释放, 回到待领取
    ///
    /// # 返回
    /// - Ok(true): 释放成功
    /// - Ok(false): 非持有人或状态不匹配
    pub fn try_release(
        &self,
        journal_id: &str,
        operator_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE journal
               SET status = 'PENDING', assigned_operator = NULL, claimed_at = NULL,
                   lease_expires_at = NULL, revision = revision + 1, updated_at = ?1
               WHERE journal_id = ?2
                 AND status IN ('ASSIGNED', 'IN_PROGRESS')
                 AND assigned_operator = ?3"#,
            params![fmt_ts(now), journal_id, operator_id],
        )?;

        Ok(rows_affected == 1)
    }

    /// 续租 CAS: 仅当前有效持有人可续租
    pub fn try_renew_lease(
        &self,
        journal_id: &str,
        operator_id: &str,
        now: NaiveDateTime,
        lease_expires_at: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE journal
               SET lease_expires_at = ?1, revision = revision + 1, updated_at = ?2
               WHERE journal_id = ?3
                 AND status IN ('ASSIGNED', 'IN_PROGRESS')
                 AND assigned_operator = ?4
                 AND lease_expires_at IS NOT NULL AND lease_expires_at >= ?2"#,
            params![fmt_ts(lease_expires_at), fmt_ts(now), journal_id, operator_id],
        )?;

        Ok(rows_affected == 1)
    }

    /// 改派 CAS: 当前持有人 → 新持有人, 单条 UPDATE 原子完成
    ///
    /// # 返回
    /// - Ok(true): 改派成功
    /// - Ok(false): from 非当前持有人或状态不匹配
    pub fn try_reassign(
        &self,
        journal_id: &str,
        from_operator: &str,
        to_operator: &str,
        now: NaiveDateTime,
        lease_expires_at: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE journal
               SET status = 'ASSIGNED', assigned_operator = ?1, claimed_at = ?2,
                   lease_expires_at = ?3, revision = revision + 1, updated_at = ?2
               WHERE journal_id = ?4
                 AND status IN ('ASSIGNED', 'IN_PROGRESS')
                 AND assigned_operator = ?5"#,
            params![
                to_operator,
                fmt_ts(now),
                fmt_ts(lease_expires_at),
                journal_id,
                from_operator
            ],
        )?;

        Ok(rows_affected == 1)
    }

    /// 开盘 CAS: 已领取 → 盘点中 (首次录入时触发)
    pub fn try_mark_in_progress(
        &self,
        journal_id: &str,
        operator_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE journal
               SET status = 'IN_PROGRESS', revision = revision + 1, updated_at = ?1
               WHERE journal_id = ?2 AND status = 'ASSIGNED' AND assigned_operator = ?3"#,
            params![fmt_ts(now), journal_id, operator_id],
        )?;

        Ok(rows_affected == 1)
    }

    // ==========================================
    // 明细写入 (提交前, 同轮次覆盖)
    // ==========================================

    /// 记录盘点数量 (同轮次覆盖, 不留历史; 历史由差异记录按轮次保留)
    pub fn update_line_count(
        &self,
        line_id: &str,
        counted_qty: f64,
        serial_refs: &[String],
        photo_refs: &[String],
        counted_by: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let serial_json = serde_json::to_string(serial_refs)
            .map_err(|e| RepositoryError::ValidationError(format!("序列号序列化失败: {}", e)))?;
        let photo_json = serde_json::to_string(photo_refs)
            .map_err(|e| RepositoryError::ValidationError(format!("照片引用序列化失败: {}", e)))?;

        let rows_affected = conn.execute(
            r#"UPDATE journal_line
               SET counted_qty = ?, status = 'COUNTED', skip_reason = NULL,
                   serial_json = ?, photo_json = ?, counted_by = ?, counted_at = ?
               WHERE line_id = ?"#,
            params![counted_qty, serial_json, photo_json, counted_by, fmt_ts(now), line_id],
        )?;

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "JournalLine".to_string(),
                id: line_id.to_string(),
            });
        }

        Ok(())
    }

    /// 记录跳过 (带原因)
    pub fn update_line_skip(
        &self,
        line_id: &str,
        reason: &str,
        skipped_by: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE journal_line
               SET counted_qty = NULL, status = 'SKIPPED', skip_reason = ?,
                   counted_by = ?, counted_at = ?
               WHERE line_id = ?"#,
            params![reason, skipped_by, fmt_ts(now), line_id],
        )?;

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "JournalLine".to_string(),
                id: line_id.to_string(),
            });
        }

        Ok(())
    }

    // ==========================================
    // 提交 (差异记录与状态流转同事务落库)
    // ==========================================

    /// 提交盘点单: 状态 CAS + 差异记录整体替换写入, 单事务完成
    ///
    /// # 并发控制
    /// WHERE 校验 (状态, 持有人, revision); revision 取自引擎读取时刻,
    /// 读取与提交之间发生过释放/抢占则 CAS 失败, 返回 Ok(false)。
    ///
    /// # 红线
    /// 差异记录与 SUBMITTED 状态同事务写入, 外部观察不到
    /// "已提交但差异未计算" 的窗口。
    pub fn try_submit_with_variances(
        &self,
        journal_id: &str,
        operator_id: &str,
        expected_revision: i32,
        required_tier: ApprovalTier,
        variances: &[VarianceRecord],
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            r#"UPDATE journal
               SET status = 'SUBMITTED', required_tier = ?1,
                   revision = revision + 1, updated_at = ?2
               WHERE journal_id = ?3
                 AND status IN ('ASSIGNED', 'IN_PROGRESS')
                 AND assigned_operator = ?4
                 AND revision = ?5"#,
            params![
                required_tier.to_db_str(),
                fmt_ts(now),
                journal_id,
                operator_id,
                expected_revision
            ],
        )?;

        if rows_affected == 0 {
            // CAS 失败, 整个事务放弃
            return Ok(false);
        }

        for record in variances {
            // 同 (明细, 轮次) 整体替换, 不合并
            tx.execute(
                "DELETE FROM variance_record WHERE line_id = ? AND count_pass = ?",
                params![&record.line_id, &record.count_pass],
            )?;
            tx.execute(
                r#"INSERT INTO variance_record (
                    variance_id, journal_id, line_id, count_pass,
                    expected_qty, counted_qty, delta_qty, delta_pct,
                    severity, required_tier, reason, computed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    &record.variance_id,
                    &record.journal_id,
                    &record.line_id,
                    &record.count_pass,
                    &record.expected_qty,
                    &record.counted_qty,
                    &record.delta_qty,
                    &record.delta_pct,
                    record.severity.to_db_str(),
                    record.required_tier.to_db_str(),
                    &record.reason,
                    fmt_ts(record.computed_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    // ==========================================
    // 审批侧流转
    // ==========================================

    /// 通用状态流转 CAS
    ///
    /// # 返回
    /// - Ok(true): 流转成功
    /// - Ok(false): 当前状态不在 from 集合内 (已被并发流转)
    pub fn try_transition(
        &self,
        journal_id: &str,
        from: &[JournalStatus],
        to: JournalStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let from_list = from
            .iter()
            .map(|s| format!("'{}'", s.to_db_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let rows_affected = conn.execute(
            &format!(
                r#"UPDATE journal
                   SET status = ?1, revision = revision + 1, updated_at = ?2
                   WHERE journal_id = ?3 AND status IN ({})"#,
                from_list
            ),
            params![to.to_db_str(), fmt_ts(now), journal_id],
        )?;

        Ok(rows_affected == 1)
    }

    /// 驳回复盘: 选中明细进入新轮次, 盘点单回到盘点中 (单事务)
    ///
    /// 说明: 明细的历史盘点值保留在上一轮差异记录中, 不改写;
    /// 原持有人保留并获得新租约, 若其已离场则租约过期后可被再领取。
    pub fn try_reject_lines_for_recount(
        &self,
        journal_id: &str,
        line_ids: &[String],
        expected_revision: i32,
        lease_expires_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            r#"UPDATE journal
               SET status = 'IN_PROGRESS', lease_expires_at = ?1,
                   revision = revision + 1, updated_at = ?2
               WHERE journal_id = ?3 AND status = 'UNDER_REVIEW' AND revision = ?4"#,
            params![fmt_ts(lease_expires_at), fmt_ts(now), journal_id, expected_revision],
        )?;

        if rows_affected == 0 {
            return Ok(false);
        }

        for line_id in line_ids {
            let updated = tx.execute(
                r#"UPDATE journal_line
                   SET status = 'RECOUNT_REQUESTED', count_pass = count_pass + 1,
                       counted_qty = NULL, skip_reason = NULL,
                       serial_json = '[]', photo_json = '[]',
                       counted_by = NULL, counted_at = NULL
                   WHERE line_id = ? AND journal_id = ?"#,
                params![line_id, journal_id],
            )?;

            if updated == 0 {
                return Err(RepositoryError::NotFound {
                    entity: "JournalLine".to_string(),
                    id: line_id.clone(),
                });
            }
        }

        tx.commit()?;
        Ok(true)
    }

    // ==========================================
    // 行映射
    // ==========================================

    /// 映射数据库行到 Journal 对象
    fn map_journal_row(row: &rusqlite::Row) -> rusqlite::Result<Journal> {
        let status_str: String = row.get(5)?;
        let tier_str: Option<String> = row.get(9)?;

        Ok(Journal {
            journal_id: row.get(0)?,
            plan_id: row.get(1)?,
            location_code: row.get(2)?,
            zone: row.get(3)?,
            required_skill: row.get(4)?,
            status: JournalStatus::from_str(&status_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    format!("未知盘点单状态: {}", status_str).into(),
                )
            })?,
            assigned_operator: row.get(6)?,
            claimed_at: parse_row_ts_opt(row, 7)?,
            lease_expires_at: parse_row_ts_opt(row, 8)?,
            required_tier: tier_str.as_deref().and_then(ApprovalTier::from_str),
            revision: row.get(10)?,
            created_at: parse_row_ts(row, 11)?,
            updated_at: parse_row_ts(row, 12)?,
        })
    }

    /// 映射数据库行到 JournalLine 对象
    fn map_line_row(row: &rusqlite::Row) -> rusqlite::Result<JournalLine> {
        let status_str: String = row.get(8)?;
        let serial_json: String = row.get(10)?;
        let photo_json: String = row.get(11)?;

        Ok(JournalLine {
            line_id: row.get(0)?,
            journal_id: row.get(1)?,
            seq_no: row.get(2)?,
            location_code: row.get(3)?,
            item_code: row.get(4)?,
            expected_qty: row.get(5)?,
            counted_qty: row.get(6)?,
            count_pass: row.get(7)?,
            status: LineStatus::from_str(&status_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    8,
                    rusqlite::types::Type::Text,
                    format!("未知明细状态: {}", status_str).into(),
                )
            })?,
            skip_reason: row.get(9)?,
            serial_refs: serde_json::from_str(&serial_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    10,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            photo_refs: serde_json::from_str(&photo_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    11,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            counted_by: row.get(12)?,
            counted_at: parse_row_ts_opt(row, 13)?,
        })
    }
}

/// 盘点单查询列集
const JOURNAL_SELECT: &str = r#"SELECT journal_id, plan_id, location_code, zone, required_skill,
       status, assigned_operator, claimed_at, lease_expires_at,
       required_tier, revision, created_at, updated_at
FROM journal"#;

/// 明细查询列集
const LINE_SELECT: &str = r#"SELECT line_id, journal_id, seq_no, location_code, item_code,
       expected_qty, counted_qty, count_pass, status, skip_reason,
       serial_json, photo_json, counted_by, counted_at
FROM journal_line"#;
