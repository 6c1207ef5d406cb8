// ==========================================
// 仓库循环盘点系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::variance_rules::{
    default_rules, normalize_rules, SeverityTierMap, VarianceRule,
};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 领取租约时长默认值 (秒)
pub const DEFAULT_CLAIM_LEASE_SECONDS: i64 = 1_800;

/// 配置键: 差异分级规则 (JSON 数组)
pub const KEY_VARIANCE_RULES: &str = "variance_rules";

/// 配置键: 严重度 → 审批层级映射 (JSON 对象)
pub const KEY_SEVERITY_TIER_MAP: &str = "severity_tier_map";

/// 配置键: 领取租约时长 (秒)
pub const KEY_CLAIM_LEASE_SECONDS: &str = "claim_lease_seconds";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明: 为保证连接行为一致, 会对传入连接再次应用统一 PRAGMA (幂等)。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值 (scope_id='global')
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        Ok(())
    }

    /// 读取 global scope 的配置值 (公开方法, 供其他模块复用)
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    // ==========================================
    // 盘点领域配置
    // ==========================================

    /// 读取差异分级规则 (缺失或损坏时回退出厂默认并告警)
    pub fn get_variance_rules(&self) -> Vec<VarianceRule> {
        match self.get_config_value(KEY_VARIANCE_RULES) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<VarianceRule>>(&raw) {
                Ok(rules) if !rules.is_empty() => normalize_rules(rules),
                Ok(_) => {
                    tracing::warn!("差异分级规则配置为空, 回退出厂默认");
                    default_rules()
                }
                Err(e) => {
                    tracing::warn!("差异分级规则配置解析失败, 回退出厂默认: {}", e);
                    default_rules()
                }
            },
            Ok(None) => default_rules(),
            Err(e) => {
                tracing::warn!("差异分级规则配置读取失败, 回退出厂默认: {}", e);
                default_rules()
            }
        }
    }

    /// 写入差异分级规则
    pub fn set_variance_rules(&self, rules: &[VarianceRule]) -> Result<(), Box<dyn Error>> {
        let raw = serde_json::to_string(rules)?;
        self.set_config_value(KEY_VARIANCE_RULES, &raw)
    }

    /// 读取严重度 → 审批层级映射 (非单调或损坏时回退出厂默认并告警)
    pub fn get_severity_tier_map(&self) -> SeverityTierMap {
        match self.get_config_value(KEY_SEVERITY_TIER_MAP) {
            Ok(Some(raw)) => {
                match serde_json::from_str::<BTreeMap<crate::domain::types::Severity, crate::domain::types::ApprovalTier>>(&raw) {
                    Ok(map) => match SeverityTierMap::try_new(map) {
                        Some(tier_map) => tier_map,
                        None => {
                            tracing::warn!("审批层级映射不完整或非单调, 回退出厂默认");
                            SeverityTierMap::default_map()
                        }
                    },
                    Err(e) => {
                        tracing::warn!("审批层级映射解析失败, 回退出厂默认: {}", e);
                        SeverityTierMap::default_map()
                    }
                }
            }
            Ok(None) => SeverityTierMap::default_map(),
            Err(e) => {
                tracing::warn!("审批层级映射读取失败, 回退出厂默认: {}", e);
                SeverityTierMap::default_map()
            }
        }
    }

    /// 读取领取租约时长 (秒)
    pub fn get_claim_lease_seconds(&self) -> i64 {
        match self.get_config_value(KEY_CLAIM_LEASE_SECONDS) {
            Ok(Some(raw)) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                tracing::warn!("租约时长配置非法: {}, 回退默认值", raw);
                DEFAULT_CLAIM_LEASE_SECONDS
            }),
            _ => DEFAULT_CLAIM_LEASE_SECONDS,
        }
    }

    /// 写入领取租约时长 (秒)
    pub fn set_claim_lease_seconds(&self, seconds: i64) -> Result<(), Box<dyn Error>> {
        self.set_config_value(KEY_CLAIM_LEASE_SECONDS, &seconds.to_string())
    }

    // ==========================================
    // 配置快照 (审计用)
    // ==========================================

    /// 获取所有配置的快照 (JSON 格式)
    ///
    /// # 用途
    /// - 审批/调账争议回溯时固定当时生效的阈值配置
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 注意
    /// - 此方法会覆盖现有的 global 配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            let affected = conn.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            count += affected;
        }

        conn.execute("COMMIT", [])?;
        Ok(count)
    }
}
