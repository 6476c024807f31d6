//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `PaperStore`
//! trait using rusqlite. The connection is opened lazily on first use, so a
//! missing or unreadable database file surfaces as a per-request error
//! rather than a startup failure.
//!
//! # Schema
//! A single `papers` table, one row per paper, dates stored as ISO-8601 text.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use super::{like_substring_pattern, PaperStore, StorageError, StorageResult};
use crate::models::{parse_published_date, MetadataFilterSet, Paper};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS papers (
    entry_id       TEXT PRIMARY KEY NOT NULL,
    title          TEXT NOT NULL,
    summary        TEXT NOT NULL DEFAULT '',
    authors        TEXT NOT NULL DEFAULT '',
    published_date TEXT,
    pdf_url        TEXT,
    categories     TEXT NOT NULL DEFAULT ''
);
";

/// SQL name of the Unicode-aware lowercase function. SQLite's own `LOWER`
/// folds ASCII only.
const UNICODE_LOWER: &str = "unicode_lower";

const SELECT_COLUMNS: &str =
    "SELECT entry_id, title, summary, authors, published_date, pdf_url, categories FROM papers";

/// Where the connection comes from.
enum Source {
    /// Existing database file, opened read-only.
    ReadOnly(PathBuf),
    /// Connection created up front (schema-initialized file or in-memory).
    Owned,
}

struct Inner {
    source: Source,
    conn: Mutex<Option<Connection>>,
}

impl Inner {
    fn open(&self) -> StorageResult<Connection> {
        match &self.source {
            Source::ReadOnly(path) => {
                debug!("Opening paper store read-only at {}", path.display());
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|e| {
                    StorageError::ConnectionError(format!("{}: {}", path.display(), e))
                })
                .and_then(|conn| {
                    register_functions(&conn)?;
                    Ok(conn)
                })
            }
            Source::Owned => Err(StorageError::ConnectionError(
                "owned connection is no longer available".to_string(),
            )),
        }
    }
}

/// SQLite-backed paper store.
///
/// Cloning is cheap and clones share one connection. Each operation runs on
/// the blocking thread pool and holds the connection lock for its duration.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

impl SqliteStore {
    /// Point at an existing database file. Nothing is opened until the first
    /// query.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Source::ReadOnly(path.into()),
                conn: Mutex::new(None),
            }),
        }
    }

    /// Create (or open read-write) a database file and ensure the schema
    /// exists. Used for seeding.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::ConnectionError(format!("{}: {}", path.display(), e)))?;
        info!("Initialized paper store at {}", path.display());
        Self::from_connection(conn)
    }

    /// Fresh in-memory store with the schema applied.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        register_functions(&conn)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::SchemaError(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                source: Source::Owned,
                conn: Mutex::new(Some(conn)),
            }),
        })
    }

    /// Insert a paper. Fails with `DuplicateEntry` if the id already exists.
    pub async fn insert_paper(&self, paper: &Paper) -> StorageResult<()> {
        let paper = paper.clone();
        self.with_connection(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO papers (entry_id, title, summary, authors, published_date, pdf_url, categories)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    paper.entry_id,
                    paper.title,
                    paper.summary,
                    paper.authors,
                    paper.published_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    paper.pdf_url,
                    paper.categories,
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StorageError::DuplicateEntry(paper.entry_id))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn with_connection<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .conn
                .lock()
                .map_err(|_| StorageError::Other("connection lock poisoned".to_string()))?;
            if guard.is_none() {
                *guard = Some(inner.open()?);
            }
            let conn = guard
                .as_ref()
                .ok_or_else(|| StorageError::ConnectionError("no connection".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| StorageError::Other(format!("storage task failed: {}", e)))?
    }

    fn row_to_paper(row: &Row<'_>) -> rusqlite::Result<Paper> {
        let published: Option<String> = row.get(4)?;
        let pdf_url: Option<String> = row.get(5)?;
        Ok(Paper {
            entry_id: row.get(0)?,
            title: row.get(1)?,
            summary: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            authors: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            published_date: published.as_deref().and_then(parse_published_date),
            pdf_url: pdf_url.filter(|url| !url.is_empty()),
            categories: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        })
    }
}

/// Install the scalar functions the search statements rely on.
///
/// `unicode_lower` must fold exactly like `str::to_lowercase`, which is how
/// search patterns and the in-memory filters are lowercased.
fn register_functions(conn: &Connection) -> StorageResult<()> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
    )
    .map_err(|e| StorageError::ConnectionError(format!("registering {}: {}", UNICODE_LOWER, e)))
}

/// Build the lexical search statement and its bound values.
///
/// The query text is matched against title, summary and categories; each
/// present filter adds one `AND` clause with its own parameter.
fn build_search_sql(
    text: &str,
    filters: Option<&MetadataFilterSet>,
    limit: usize,
) -> (String, Vec<Value>) {
    let mut sql = format!(
        r"{SELECT_COLUMNS}
          WHERE ({UNICODE_LOWER}(COALESCE(title, '')) LIKE ?1 ESCAPE '\'
             OR {UNICODE_LOWER}(COALESCE(summary, '')) LIKE ?1 ESCAPE '\'
             OR {UNICODE_LOWER}(COALESCE(categories, '')) LIKE ?1 ESCAPE '\')"
    );
    let mut values = vec![Value::Text(like_substring_pattern(text))];

    if let Some(filters) = filters {
        if let Some(authors) = &filters.authors {
            values.push(Value::Text(like_substring_pattern(authors)));
            sql.push_str(&format!(
                r" AND {}(COALESCE(authors, '')) LIKE ?{} ESCAPE '\'",
                UNICODE_LOWER,
                values.len()
            ));
        }
        if let Some(min_year) = filters.min_year {
            values.push(Value::Integer(i64::from(min_year)));
            sql.push_str(&format!(
                " AND CAST(substr(published_date, 1, 4) AS INTEGER) >= ?{}",
                values.len()
            ));
        }
        if let Some(categories) = &filters.categories {
            values.push(Value::Text(like_substring_pattern(categories)));
            sql.push_str(&format!(
                r" AND {}(COALESCE(categories, '')) LIKE ?{} ESCAPE '\'",
                UNICODE_LOWER,
                values.len()
            ));
        }
    }

    values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    sql.push_str(&format!(" ORDER BY rowid LIMIT ?{}", values.len()));

    (sql, values)
}

#[async_trait]
impl PaperStore for SqliteStore {
    async fn search_text(
        &self,
        text: &str,
        filters: Option<&MetadataFilterSet>,
        limit: usize,
    ) -> StorageResult<Vec<Paper>> {
        let (sql, values) = build_search_sql(text, filters, limit);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let papers = stmt
                .query_map(params_from_iter(values.iter()), |row| Self::row_to_paper(row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(papers)
        })
        .await
    }

    async fn get_paper(&self, entry_id: &str) -> StorageResult<Option<Paper>> {
        let entry_id = entry_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE entry_id = ?1"))?;
            let paper = stmt
                .query_row(params![entry_id], |row| Self::row_to_paper(row))
                .optional()?;
            Ok(paper)
        })
        .await
    }

    async fn count_papers(&self) -> StorageResult<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}
