// ==========================================
// 仓库循环盘点系统 - 盘点计划仓储
// ==========================================
// 红线: Repository 不含业务逻辑, 所有查询参数化
// ==========================================

use crate::db::{fmt_ts, parse_ts};
use crate::domain::plan::{CountPlan, ScopeSelector};
use crate::domain::types::PlanStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// CountPlanRepository - 盘点计划仓储
// ==========================================
pub struct CountPlanRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CountPlanRepository {
    /// 创建新的 CountPlanRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建计划
    pub fn create(&self, plan: &CountPlan) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let scope_json = serde_json::to_string(&plan.scope)
            .map_err(|e| RepositoryError::ValidationError(format!("范围序列化失败: {}", e)))?;

        conn.execute(
            r#"INSERT INTO count_plan (
                plan_id, plan_name, scope_json, cadence_days,
                due_start, due_end, status, created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &plan.plan_id,
                &plan.plan_name,
                &scope_json,
                &plan.cadence_days,
                fmt_ts(plan.due_start),
                fmt_ts(plan.due_end),
                plan.status.to_db_str(),
                &plan.created_by,
                fmt_ts(plan.created_at),
                fmt_ts(plan.updated_at),
            ],
        )?;

        Ok(plan.plan_id.clone())
    }

    /// 按 plan_id 查询计划
    pub fn find_by_id(&self, plan_id: &str) -> RepositoryResult<Option<CountPlan>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT plan_id, plan_name, scope_json, cadence_days,
                      due_start, due_end, status, created_by, created_at, updated_at
               FROM count_plan
               WHERE plan_id = ?"#,
            params![plan_id],
            Self::map_row,
        ) {
            Ok(plan) => Ok(Some(plan)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询指定状态的计划列表
    pub fn list_by_status(&self, status: PlanStatus) -> RepositoryResult<Vec<CountPlan>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT plan_id, plan_name, scope_json, cadence_days,
                      due_start, due_end, status, created_by, created_at, updated_at
               FROM count_plan
               WHERE status = ?
               ORDER BY created_at DESC"#,
        )?;

        let plans = stmt
            .query_map(params![status.to_db_str()], Self::map_row)?
            .collect::<Result<Vec<CountPlan>, _>>()?;

        Ok(plans)
    }

    /// 状态流转 (CAS: 仅当前状态匹配时生效)
    ///
    /// # 返回
    /// - Ok(true): 流转成功
    /// - Ok(false): 当前状态不匹配 (已被其他调用方流转)
    pub fn transition_status(
        &self,
        plan_id: &str,
        from: PlanStatus,
        to: PlanStatus,
        now: chrono::NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            "UPDATE count_plan SET status = ?, updated_at = ? WHERE plan_id = ? AND status = ?",
            params![to.to_db_str(), fmt_ts(now), plan_id, from.to_db_str()],
        )?;

        if rows_affected == 0 {
            // 区分记录不存在与状态不匹配
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM count_plan WHERE plan_id = ?",
                    params![plan_id],
                    |_row| Ok(true),
                )
                .unwrap_or(false);

            if !exists {
                return Err(RepositoryError::NotFound {
                    entity: "CountPlan".to_string(),
                    id: plan_id.to_string(),
                });
            }
            return Ok(false);
        }

        Ok(true)
    }

    /// 映射数据库行到 CountPlan 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<CountPlan> {
        let scope_json: String = row.get(2)?;
        let scope: Vec<ScopeSelector> = serde_json::from_str(&scope_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let status_str: String = row.get(6)?;

        Ok(CountPlan {
            plan_id: row.get(0)?,
            plan_name: row.get(1)?,
            scope,
            cadence_days: row.get(3)?,
            due_start: parse_row_ts(row, 4)?,
            due_end: parse_row_ts(row, 5)?,
            status: PlanStatus::from_str(&status_str),
            created_by: row.get(7)?,
            created_at: parse_row_ts(row, 8)?,
            updated_at: parse_row_ts(row, 9)?,
        })
    }
}

/// 解析行中的时间戳列
pub(crate) fn parse_row_ts(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<chrono::NaiveDateTime> {
    let s: String = row.get(idx)?;
    parse_ts(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// 解析行中可空的时间戳列
pub(crate) fn parse_row_ts_opt(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<chrono::NaiveDateTime>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => parse_ts(&s)
            .map(Some)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
        None => Ok(None),
    }
}
