//! MindsDB knowledge-base client.
//!
//! Talks to the MindsDB HTTP SQL API:
//!
//! - `POST /api/login` with `{"username", "password"}` (only when a password
//!   is configured; the session cookie is kept by the client)
//! - `POST /api/sql/query` with `{"query", "context": {"db"}}`, answered by
//!   `{"type": "table", "column_names": [...], "data": [[...]]}` or
//!   `{"type": "error", "error_message": "..."}`
//!
//! The SQL endpoint has no bound parameters, so the similarity anchor is
//! rendered with [`sql_string_literal`] and identifiers are restricted to
//! `[A-Za-z0-9_]`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{ScoredPaper, SemanticIndex, SemanticIndexError, SemanticResult};
use crate::config::SemanticBackendSettings;
use crate::models::{parse_published_date, Paper};

#[derive(Serialize)]
struct SqlRequest<'a> {
    query: &'a str,
    context: SqlContext<'a>,
}

#[derive(Serialize)]
struct SqlContext<'a> {
    db: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct SqlResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    column_names: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
    #[serde(default)]
    error_message: Option<String>,
}

/// MindsDB knowledge-base client.
pub struct MindsDbClient {
    client: reqwest::Client,
    base_url: String,
    database: String,
    kb_name: String,
    credentials: Option<(String, String)>,
    session: OnceCell<()>,
}

impl MindsDbClient {
    /// Build a client from settings. No network traffic happens here.
    ///
    /// # Errors
    /// Returns `SemanticIndexError::Config` if the database or knowledge-base
    /// name is not a plain identifier, or the HTTP client cannot be built.
    pub fn new(settings: &SemanticBackendSettings) -> SemanticResult<Self> {
        validate_identifier(&settings.database)?;
        validate_identifier(&settings.kb_name)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| SemanticIndexError::Config(e.to_string()))?;

        let credentials = settings
            .credentials()
            .map(|(user, password)| (user.to_string(), password.to_string()));

        info!("MindsDB URL: {}", settings.base_url());
        info!("MindsDB knowledge base: {}", settings.kb_name);

        Ok(Self {
            client,
            base_url: settings.base_url(),
            database: settings.database.clone(),
            kb_name: settings.kb_name.clone(),
            credentials,
            session: OnceCell::new(),
        })
    }

    /// SQL for a similarity query against the knowledge base.
    pub fn similarity_sql(&self, anchor: &str, limit: usize) -> SemanticResult<String> {
        Ok(format!(
            "SELECT entry_id, title, summary, authors, published_date, pdf_url, categories, distance \
             FROM {} WHERE content = {} LIMIT {}",
            self.kb_name,
            sql_string_literal(anchor)?,
            limit
        ))
    }

    async fn ensure_session(&self) -> SemanticResult<()> {
        let Some((username, password)) = &self.credentials else {
            return Ok(());
        };
        self.session
            .get_or_try_init(|| async {
                debug!("Logging in to MindsDB as {}", username);
                let response = self
                    .client
                    .post(format!("{}/api/login", self.base_url))
                    .json(&LoginRequest { username, password })
                    .send()
                    .await
                    .map_err(|e| SemanticIndexError::Connection(e.to_string()))?;
                check_status(response.status(), "login")?;
                Ok::<(), SemanticIndexError>(())
            })
            .await
            .map(|_| ())
    }

    async fn run_sql(&self, sql: &str) -> SemanticResult<SqlResponse> {
        self.ensure_session().await?;

        let request = SqlRequest {
            query: sql,
            context: SqlContext { db: &self.database },
        };
        let response = self
            .client
            .post(format!("{}/api/sql/query", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| SemanticIndexError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<SqlResponse>()
            .await
            .map_err(|e| SemanticIndexError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl SemanticIndex for MindsDbClient {
    async fn similarity_search(&self, anchor: &str, limit: usize) -> SemanticResult<Vec<ScoredPaper>> {
        let sql = self.similarity_sql(anchor, limit)?;
        debug!("Querying knowledge base {} (limit {})", self.kb_name, limit);
        let response = self.run_sql(&sql).await?;
        parse_scored_rows(response)
    }

    fn name(&self) -> &str {
        "mindsdb"
    }
}

const MAX_ERROR_BODY_CHARS: usize = 500;

fn check_status(status: StatusCode, context: &str) -> SemanticResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(status_error(status, context))
    }
}

/// Error for a non-success response. `detail` is the request name or the
/// response body, cut to a readable length.
fn status_error(status: StatusCode, detail: &str) -> SemanticIndexError {
    let detail: String = detail.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SemanticIndexError::Authentication(format!("HTTP {}: {}", status, detail))
        }
        s => SemanticIndexError::Execution(format!("HTTP {}: {}", s, detail)),
    }
}

/// Render text as a single-quoted SQL string literal.
///
/// Single quotes are doubled. Backslashes are doubled too, since a MySQL-style
/// parser would otherwise read `\'` as an escaped quote and end the literal
/// early. NUL bytes are rejected.
pub fn sql_string_literal(text: &str) -> SemanticResult<String> {
    if text.contains('\0') {
        return Err(SemanticIndexError::InvalidInput(
            "query text contains a NUL byte".to_string(),
        ));
    }
    let mut literal = String::with_capacity(text.len() + 2);
    literal.push('\'');
    for ch in text.chars() {
        match ch {
            '\'' => literal.push_str("''"),
            '\\' => literal.push_str("\\\\"),
            _ => literal.push(ch),
        }
    }
    literal.push('\'');
    Ok(literal)
}

fn validate_identifier(name: &str) -> SemanticResult<()> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SemanticIndexError::Config(format!(
            "'{}' is not a valid identifier",
            name
        )))
    }
}

fn cell_text(row: &[Value], index: Option<usize>) -> Option<String> {
    match index.and_then(|i| row.get(i))? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn cell_f64(row: &[Value], index: usize) -> Option<f64> {
    match row.get(index)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn a SQL API table into scored papers, ascending by distance.
fn parse_scored_rows(response: SqlResponse) -> SemanticResult<Vec<ScoredPaper>> {
    match response.kind.as_str() {
        "table" => {}
        "error" => {
            return Err(SemanticIndexError::Execution(
                response
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
        other => {
            return Err(SemanticIndexError::MalformedResponse(format!(
                "unexpected response type '{}'",
                other
            )))
        }
    }

    let column = |name: &str| {
        response
            .column_names
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    };
    let missing = |name: &str| SemanticIndexError::MalformedResponse(format!("missing column '{}'", name));

    let entry_id_col = column("entry_id").ok_or_else(|| missing("entry_id"))?;
    let distance_col = column("distance").ok_or_else(|| missing("distance"))?;
    let title_col = column("title");
    let summary_col = column("summary");
    let authors_col = column("authors");
    let date_col = column("published_date");
    let pdf_col = column("pdf_url");
    let categories_col = column("categories");

    let mut papers = Vec::with_capacity(response.data.len());
    for row in &response.data {
        let entry_id = cell_text(row, Some(entry_id_col))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SemanticIndexError::MalformedResponse("row without entry_id".to_string()))?;
        let distance = cell_f64(row, distance_col).ok_or_else(|| {
            SemanticIndexError::MalformedResponse(format!("row {} has no numeric distance", entry_id))
        })?;

        papers.push(ScoredPaper {
            paper: Paper {
                entry_id,
                title: cell_text(row, title_col).unwrap_or_default(),
                summary: cell_text(row, summary_col).unwrap_or_default(),
                authors: cell_text(row, authors_col).unwrap_or_default(),
                published_date: cell_text(row, date_col)
                    .as_deref()
                    .and_then(parse_published_date),
                pdf_url: cell_text(row, pdf_col).filter(|url| !url.is_empty()),
                categories: cell_text(row, categories_col).unwrap_or_default(),
            },
            distance,
        });
    }

    papers.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(papers)
}
