//! 词典存储 - SQLite 嵌入式存储
//!
//! 存储方案：
//! - dict_entries：词条（id 主键 + frequency 索引 + meanings JSON）
//! - dict_forms：词形（entry_id / value / length / repeat / primary 均建索引）
//! - dict_form_chars：词形假名字符集，一行一个字符（支持 contains-any / contains-none）
//! - dict_meta：构建元数据（完成标记、统计、构建时间）
//!
//! 特性：
//! - 每次重建一个独立数据库文件 + WAL 模式
//! - 每个批次一个事务（批次内原子提交）+ 重试机制

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};

use super::error::{DictError, Result};
use super::schema::{DictEntry, Entry, Form, Meaning};

/// Indexed form fields a query can constrain / 可查询的词形字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    EntryId,
    Value,
    Length,
    RepeatCount,
    RepeatCountNormalized,
    IsPrimary,
    IsKanji,
}

impl FormField {
    fn column(self) -> &'static str {
        match self {
            FormField::EntryId => "entry_id",
            FormField::Value => "value",
            FormField::Length => "length",
            FormField::RepeatCount => "repeat_count",
            FormField::RepeatCountNormalized => "repeat_count_normalized",
            FormField::IsPrimary => "is_primary",
            FormField::IsKanji => "is_kanji",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Bool(bool),
}

/// One predicate over forms / 单个词形条件
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(FormField, FieldValue),
    Gt(FormField, i64),
    /// Inclusive range / 闭区间
    Between(FormField, i64, i64),
    /// Character set shares at least one character (empty set matches nothing)
    CharsAny(Vec<char>),
    /// Character set shares no character (empty set matches everything)
    CharsNone(Vec<char>),
}

/// Conjunctive query plan over forms / 词形查询计划（条件之间为 AND）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormQuery {
    pub conditions: Vec<Condition>,
}

impl FormQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: FormField, value: FieldValue) -> Self {
        self.conditions.push(Condition::Eq(field, value));
        self
    }

    pub fn gt(mut self, field: FormField, value: i64) -> Self {
        self.conditions.push(Condition::Gt(field, value));
        self
    }

    pub fn between(mut self, field: FormField, min: i64, max: i64) -> Self {
        self.conditions.push(Condition::Between(field, min, max));
        self
    }

    pub fn chars_any(mut self, chars: Vec<char>) -> Self {
        self.conditions.push(Condition::CharsAny(chars));
        self
    }

    pub fn chars_none(mut self, chars: Vec<char>) -> Self {
        self.conditions.push(Condition::CharsNone(chars));
        self
    }

    /// Append ` WHERE ...` for alias `f` / 生成 WHERE 子句
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        for cond in &self.conditions {
            match cond {
                Condition::Eq(field, value) => {
                    qb.push(" AND f.").push(field.column()).push(" = ");
                    match value {
                        FieldValue::Int(v) => qb.push_bind(*v),
                        FieldValue::Text(v) => qb.push_bind(v.clone()),
                        FieldValue::Bool(v) => qb.push_bind(*v),
                    };
                }
                Condition::Gt(field, v) => {
                    qb.push(" AND f.").push(field.column()).push(" > ").push_bind(*v);
                }
                Condition::Between(field, min, max) => {
                    qb.push(" AND f.")
                        .push(field.column())
                        .push(" BETWEEN ")
                        .push_bind(*min)
                        .push(" AND ")
                        .push_bind(*max);
                }
                Condition::CharsAny(chars) => {
                    if chars.is_empty() {
                        qb.push(" AND 0");
                    } else {
                        qb.push(" AND EXISTS (SELECT 1 FROM dict_form_chars c WHERE c.form_id = f.id AND c.ch IN (");
                        push_char_list(qb, chars);
                        qb.push("))");
                    }
                }
                Condition::CharsNone(chars) => {
                    if !chars.is_empty() {
                        qb.push(" AND NOT EXISTS (SELECT 1 FROM dict_form_chars c WHERE c.form_id = f.id AND c.ch IN (");
                        push_char_list(qb, chars);
                        qb.push("))");
                    }
                }
            }
        }
    }
}

fn push_char_list(qb: &mut QueryBuilder<'_, Sqlite>, chars: &[char]) {
    let mut sep = qb.separated(", ");
    for c in chars {
        sep.push_bind(c.to_string());
    }
}

/// Store statistics / 存储统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entry_count: u64,
    pub form_count: u64,
    pub complete: bool,
    pub built_at: Option<i64>,
    pub db_size: u64,
}

/// Embedded dictionary store / 嵌入式词典存储
pub struct DictStore {
    db: Pool<Sqlite>,
    path: PathBuf,
}

impl DictStore {
    /// 打开（或创建）词典数据库 / Open or create the store file
    pub async fn open(path: &Path) -> Result<Self> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // 启用WAL模式，查询与写入互不阻塞；每个连接都应用这些 PRAGMA
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000));

        let db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::info!("Dictionary store opened: {:?} (WAL mode)", path);

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 关闭连接池 / Close the connection pool
    pub async fn close(&self) {
        self.db.close().await;
    }

    /// 初始化表结构（表不存在时创建）
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dict_entries (
                id TEXT PRIMARY KEY,
                frequency REAL,
                meanings TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dict_forms (
                id INTEGER PRIMARY KEY,
                entry_id TEXT NOT NULL REFERENCES dict_entries(id),
                value TEXT NOT NULL,
                chars TEXT NOT NULL,
                length INTEGER,
                repeat_count INTEGER NOT NULL,
                repeat_count_normalized INTEGER NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                is_kanji INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dict_form_chars (
                form_id INTEGER NOT NULL,
                ch TEXT NOT NULL,
                PRIMARY KEY(form_id, ch)
            ) WITHOUT ROWID
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dict_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_entries_frequency ON dict_entries(frequency)",
            "CREATE INDEX IF NOT EXISTS idx_forms_entry ON dict_forms(entry_id)",
            "CREATE INDEX IF NOT EXISTS idx_forms_value ON dict_forms(value)",
            "CREATE INDEX IF NOT EXISTS idx_forms_length ON dict_forms(length)",
            "CREATE INDEX IF NOT EXISTS idx_forms_repeat ON dict_forms(repeat_count)",
            "CREATE INDEX IF NOT EXISTS idx_forms_repeat_norm ON dict_forms(repeat_count_normalized)",
            "CREATE INDEX IF NOT EXISTS idx_forms_primary ON dict_forms(is_primary)",
            "CREATE INDEX IF NOT EXISTS idx_forms_kanji ON dict_forms(is_kanji)",
            "CREATE INDEX IF NOT EXISTS idx_form_chars_ch ON dict_form_chars(ch)",
        ];
        for sql in indexes {
            sqlx::query(sql).execute(&self.db).await?;
        }

        Ok(())
    }

    /// 重置表结构（全量重建时调用）
    pub async fn reset_tables(&self) -> Result<()> {
        for table in ["dict_form_chars", "dict_forms", "dict_entries", "dict_meta"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&self.db)
                .await?;
        }
        self.init().await
    }

    /// 批量插入（一个批次一个事务）- 带重试机制
    pub async fn insert_batch(&self, entries: &[DictEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let max_retries = 3;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.do_insert_batch(entries).await {
                Ok(()) => return Ok(()),
                Err(DictError::Database(e)) if attempt < max_retries && is_busy(&e) => {
                    let delay = 100 * attempt as u64;
                    tracing::debug!(
                        "Database locked, retrying in {}ms (attempt {}/{})",
                        delay,
                        attempt,
                        max_retries
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn do_insert_batch(&self, entries: &[DictEntry]) -> Result<()> {
        let mut tx = self.db.begin().await?;

        for item in entries {
            let meanings = serde_json::to_string(&item.entry.meanings)?;
            sqlx::query("INSERT INTO dict_entries (id, frequency, meanings) VALUES (?, ?, ?)")
                .bind(&item.entry.id)
                .bind(item.entry.frequency)
                .bind(&meanings)
                .execute(&mut *tx)
                .await?;

            for form in &item.forms {
                let chars: String = form.character_set.iter().collect();
                let result = sqlx::query(
                    r#"
                    INSERT INTO dict_forms
                        (entry_id, value, chars, length, repeat_count, repeat_count_normalized, is_primary, is_kanji)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&item.entry.id)
                .bind(&form.value)
                .bind(&chars)
                .bind(form.length.map(i64::from))
                .bind(i64::from(form.repeat_count))
                .bind(i64::from(form.repeat_count_normalized))
                .bind(form.is_primary)
                .bind(form.is_kanji)
                .execute(&mut *tx)
                .await?;

                let form_id = result.last_insert_rowid();
                for c in &form.character_set {
                    sqlx::query("INSERT INTO dict_form_chars (form_id, ch) VALUES (?, ?)")
                        .bind(form_id)
                        .bind(c.to_string())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// 写入元数据
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO dict_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// 读取元数据（读取失败时记录日志并返回 None）
    pub async fn get_meta(&self, key: &str) -> Option<String> {
        match sqlx::query_scalar::<_, String>("SELECT value FROM dict_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read meta {:?} from {:?}: {}", key, self.path, e);
                None
            }
        }
    }

    /// 标记构建完成 / Mark the build as complete
    pub async fn mark_complete(&self) -> Result<()> {
        let stats = self.counts().await?;
        self.set_meta("entry_count", &stats.0.to_string()).await?;
        self.set_meta("form_count", &stats.1.to_string()).await?;
        self.set_meta("built_at", &chrono::Utc::now().timestamp().to_string()).await?;
        self.set_meta("complete", "1").await?;
        // 把 WAL 合并回主文件，方便之后整体切换
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(&self.db).await?;
        Ok(())
    }

    pub async fn is_complete(&self) -> bool {
        self.get_meta("complete").await.as_deref() == Some("1")
    }

    async fn counts(&self) -> Result<(u64, u64)> {
        let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dict_entries")
            .fetch_one(&self.db)
            .await?;
        let forms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dict_forms")
            .fetch_one(&self.db)
            .await?;
        Ok((entries as u64, forms as u64))
    }

    /// 获取统计信息
    pub async fn stats(&self) -> StoreStats {
        let (entry_count, form_count) = match self.counts().await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!("Failed to count rows in {:?}: {}", self.path, e);
                (0, 0)
            }
        };
        StoreStats {
            entry_count,
            form_count,
            complete: self.is_complete().await,
            built_at: self.get_meta("built_at").await.and_then(|v| v.parse().ok()),
            db_size: Self::file_size(&self.path),
        }
    }

    /// Exact lookup by id / 按 id 查找词条
    pub async fn get_entry(&self, id: &str) -> Result<Option<Entry>> {
        let row = sqlx::query("SELECT id, frequency, meanings FROM dict_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    /// Forms matching a query plan, in insertion order / 按条件查找词形
    pub async fn find_forms(&self, query: &FormQuery) -> Result<Vec<Form>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT f.entry_id, f.value, f.chars, f.length, f.repeat_count, f.repeat_count_normalized, \
             f.is_primary, f.is_kanji FROM dict_forms f",
        );
        query.push_where(&mut qb);
        qb.push(" ORDER BY f.id");

        let rows = qb.build().fetch_all(&self.db).await?;
        Ok(rows.iter().map(form_from_row).collect())
    }

    /// Number of distinct entries owning a matching form / 匹配的词条数
    pub async fn count_matching_entries(&self, query: &FormQuery) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT f.entry_id) FROM dict_forms f");
        query.push_where(&mut qb);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.db).await?;
        Ok(count as u64)
    }

    /// Matching entries, frequency descending, unranked last / 按词频降序返回匹配词条
    ///
    /// Ties keep insertion order. `limit = None` means no limit.
    pub async fn matching_entries_by_frequency(
        &self,
        query: &FormQuery,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Entry>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT e.id, e.frequency, e.meanings FROM dict_entries e \
             WHERE e.id IN (SELECT f.entry_id FROM dict_forms f",
        );
        query.push_where(&mut qb);
        qb.push(") ORDER BY e.frequency IS NULL, e.frequency DESC, e.rowid");
        qb.push(" LIMIT ")
            .push_bind(limit.map(|l| l as i64).unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(offset as i64);

        let rows = qb.build().fetch_all(&self.db).await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Primary form values per entry, kanji before readings / 批量获取常用词形
    pub async fn primary_values(&self, entry_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        if entry_ids.is_empty() {
            return Ok(out);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT entry_id, value FROM dict_forms WHERE is_primary = 1 AND entry_id IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for id in entry_ids {
                sep.push_bind(id.clone());
            }
        }
        qb.push(") ORDER BY id");

        let rows = qb.build().fetch_all(&self.db).await?;
        for row in rows {
            let entry_id: String = row.get("entry_id");
            let value: String = row.get("value");
            out.entry(entry_id).or_default().push(value);
        }
        Ok(out)
    }

    /// 数据库文件大小（含 WAL / SHM）
    pub fn file_size(path: &Path) -> u64 {
        [
            path.to_path_buf(),
            path.with_extension("db-shm"),
            path.with_extension("db-wal"),
        ]
        .iter()
        .map(|p| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0))
        .sum()
    }

    /// 删除数据库文件（含 WAL / SHM）
    pub fn delete_files(path: &Path) {
        std::fs::remove_file(path).ok();
        std::fs::remove_file(path.with_extension("db-shm")).ok();
        std::fs::remove_file(path.with_extension("db-wal")).ok();
        tracing::info!("Dictionary store deleted: {:?}", path);
    }
}

fn is_busy(e: &sqlx::Error) -> bool {
    let msg = e.to_string();
    msg.contains("database is locked") || msg.contains("SQLITE_BUSY")
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Entry> {
    let meanings: String = row.get("meanings");
    let meanings: Vec<Meaning> = serde_json::from_str(&meanings)?;
    Ok(Entry {
        id: row.get("id"),
        frequency: row.get("frequency"),
        meanings,
    })
}

fn form_from_row(row: &sqlx::sqlite::SqliteRow) -> Form {
    let chars: String = row.get("chars");
    let length: Option<i64> = row.get("length");
    Form {
        entry_id: row.get("entry_id"),
        value: row.get("value"),
        character_set: chars.chars().collect(),
        repeat_count: row.get::<i64, _>("repeat_count") as u32,
        repeat_count_normalized: row.get::<i64, _>("repeat_count_normalized") as u32,
        is_primary: row.get("is_primary"),
        is_kanji: row.get("is_kanji"),
        length: length.map(|l| l as u32),
    }
}
