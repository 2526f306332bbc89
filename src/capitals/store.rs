//! 首都数据源：SQLite 表 capitals_wikipedia(name, inhabitants, size)
//!
//! 连接由 Mutex 保护，查询在 spawn_blocking 中执行；参数一律绑定，不拼接进 SQL。

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 数据源错误；查无此城不是错误（lookup 返回 Ok(None)）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for DataSourceError {
    fn from(e: rusqlite::Error) -> Self {
        DataSourceError::Unavailable(e.to_string())
    }
}

/// 单个首都的人口与面积（km²）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapitalNumbers {
    pub inhabitants: f64,
    pub size: f64,
}

/// 内置示例数据（name, inhabitants, size）
const SAMPLE: &[(&str, f64, f64)] = &[
    ("Berlin", 3_755_251.0, 891.3),
    ("Paris", 2_102_650.0, 105.4),
    ("Madrid", 3_332_035.0, 604.3),
    ("Rome", 2_748_109.0, 1_287.4),
    ("Vienna", 1_982_097.0, 414.9),
    ("Warsaw", 1_861_975.0, 517.2),
];

/// SQLite 支撑的首都表
#[derive(Clone)]
pub struct CapitalStore {
    conn: Arc<Mutex<Connection>>,
}

impl CapitalStore {
    /// 打开（或创建）数据库文件并确保表存在
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        Self::init(Connection::open(path.as_ref())?)
    }

    /// 空的内存库
    pub fn in_memory() -> Result<Self, DataSourceError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// 内存库并写入示例数据
    pub fn sample() -> Result<Self, DataSourceError> {
        let store = Self::in_memory()?;
        for (name, inhabitants, size) in SAMPLE {
            store.insert(name, *inhabitants, *size)?;
        }
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, DataSourceError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS capitals_wikipedia (
                name TEXT PRIMARY KEY,
                inhabitants REAL NOT NULL,
                size REAL NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DataSourceError> {
        self.conn
            .lock()
            .map_err(|_| DataSourceError::Unavailable("connection mutex poisoned".to_string()))
    }

    /// 写入或覆盖一行
    pub fn insert(&self, name: &str, inhabitants: f64, size: f64) -> Result<(), DataSourceError> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO capitals_wikipedia (name, inhabitants, size) VALUES (?1, ?2, ?3)",
            params![name, inhabitants, size],
        )?;
        Ok(())
    }

    /// 按名称精确查询；无记录返回 Ok(None)
    pub async fn lookup(&self, name: &str) -> Result<Option<CapitalNumbers>, DataSourceError> {
        let store = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.lock()?;
            let row = conn
                .query_row(
                    "SELECT inhabitants, size FROM capitals_wikipedia WHERE name = ?1",
                    params![name],
                    |row| {
                        Ok(CapitalNumbers {
                            inhabitants: row.get(0)?,
                            size: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            tracing::debug!(capital = %name, found = row.is_some(), "capital lookup");
            Ok::<_, DataSourceError>(row)
        })
        .await
        .map_err(|e| DataSourceError::Unavailable(e.to_string()))?
    }
}
