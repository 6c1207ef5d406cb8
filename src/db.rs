// ==========================================
// 仓库循环盘点系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为, 避免"部分模块外键开启/部分不开启"
// - 统一 busy_timeout, 减少并发写入时的偶发 busy 错误
// - 统一时间戳存储格式 (定宽、可按字典序比较, 租约判定依赖此性质)
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout (毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳统一存储格式
///
/// 说明: 定宽微秒精度, 字符串字典序与时间序一致,
/// 租约到期的 CAS 判定 (lease_expires_at < now) 依赖这一点。
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// 格式化时间戳为统一存储格式
pub fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 从统一存储格式解析时间戳
pub fn parse_ts(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
}

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version (若表不存在则返回 None)
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema (幂等)
///
/// 说明: 引擎对存储技术不做假设, 仅要求单盘点单内的事务一致性;
/// 这里提供 SQLite 的参考 schema, 所有表使用 IF NOT EXISTS 保证可重入。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS count_plan (
            plan_id TEXT PRIMARY KEY,
            plan_name TEXT NOT NULL,
            scope_json TEXT NOT NULL,
            cadence_days INTEGER NOT NULL,
            due_start TEXT NOT NULL,
            due_end TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'DRAFT',
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS journal (
            journal_id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL REFERENCES count_plan(plan_id),
            location_code TEXT NOT NULL,
            zone TEXT,
            required_skill TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            assigned_operator TEXT,
            claimed_at TEXT,
            lease_expires_at TEXT,
            required_tier TEXT,
            revision INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_journal_plan ON journal(plan_id);
        CREATE INDEX IF NOT EXISTS idx_journal_status ON journal(status);

        CREATE TABLE IF NOT EXISTS journal_line (
            line_id TEXT PRIMARY KEY,
            journal_id TEXT NOT NULL REFERENCES journal(journal_id),
            seq_no INTEGER NOT NULL,
            location_code TEXT NOT NULL,
            item_code TEXT NOT NULL,
            expected_qty REAL NOT NULL,
            counted_qty REAL,
            count_pass INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'UNCOUNTED',
            skip_reason TEXT,
            serial_json TEXT NOT NULL DEFAULT '[]',
            photo_json TEXT NOT NULL DEFAULT '[]',
            counted_by TEXT,
            counted_at TEXT,
            UNIQUE(journal_id, seq_no)
        );
        CREATE INDEX IF NOT EXISTS idx_line_journal ON journal_line(journal_id);

        CREATE TABLE IF NOT EXISTS variance_record (
            variance_id TEXT PRIMARY KEY,
            journal_id TEXT NOT NULL REFERENCES journal(journal_id),
            line_id TEXT NOT NULL REFERENCES journal_line(line_id),
            count_pass INTEGER NOT NULL,
            expected_qty REAL NOT NULL,
            counted_qty REAL,
            delta_qty REAL NOT NULL,
            delta_pct REAL NOT NULL,
            severity TEXT NOT NULL,
            required_tier TEXT NOT NULL,
            reason TEXT NOT NULL,
            computed_at TEXT NOT NULL,
            UNIQUE(line_id, count_pass)
        );
        CREATE INDEX IF NOT EXISTS idx_variance_journal ON variance_record(journal_id);

        CREATE TABLE IF NOT EXISTS approval_decision (
            decision_id TEXT PRIMARY KEY,
            journal_id TEXT NOT NULL REFERENCES journal(journal_id),
            line_id TEXT REFERENCES journal_line(line_id),
            actor TEXT NOT NULL,
            actor_role TEXT NOT NULL,
            action TEXT NOT NULL,
            comment TEXT,
            decided_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_decision_journal ON approval_decision(journal_id);

        CREATE TABLE IF NOT EXISTS recon_txn (
            txn_id TEXT PRIMARY KEY,
            journal_id TEXT NOT NULL REFERENCES journal(journal_id),
            line_id TEXT NOT NULL REFERENCES journal_line(line_id),
            location_code TEXT NOT NULL,
            item_code TEXT NOT NULL,
            delta_qty REAL NOT NULL,
            applied_at TEXT NOT NULL,
            UNIQUE(journal_id, line_id)
        );
        CREATE INDEX IF NOT EXISTS idx_recon_journal ON recon_txn(journal_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_roundtrip_and_ordering() {
        let a = chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_micro_opt(8, 0, 0, 1)
            .unwrap();
        let b = a + chrono::Duration::microseconds(5);

        assert_eq!(parse_ts(&fmt_ts(a)).unwrap(), a);
        // 字典序与时间序一致
        assert!(fmt_ts(a) < fmt_ts(b));
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }
}
