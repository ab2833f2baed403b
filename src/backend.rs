//! Backend store adapter.
//!
//! The dashboard talks to a hosted PostgREST endpoint. Reads always fetch the
//! whole dataset; writes are fire-and-await and carry no response body. The
//! `Backend` trait is the seam the synchroniser and the tests plug into.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::db::Snapshot;
use crate::department::Department;
use crate::error::{Error, Result};
use crate::fields::Id;
use crate::member::Member;
use crate::realtime::{self, Channel, ChangeNotification, Subscription};
use crate::task::Task;

/// Backend tables the client reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Departments,
    Tasks,
    Subtasks,
    Comments,
    Members,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Departments => "departments",
            Table::Tasks => "tasks",
            Table::Subtasks => "subtasks",
            Table::Comments => "comments",
            Table::Members => "members",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        match name {
            "departments" => Some(Table::Departments),
            "tasks" => Some(Table::Tasks),
            "subtasks" => Some(Table::Subtasks),
            "comments" => Some(Table::Comments),
            "members" => Some(Table::Members),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mutation, built by the CRUD layer and executed by a `Backend`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert { table: Table, payload: Value },
    Update { table: Table, id: Id, payload: Value },
    Delete { table: Table, id: Id },
}

impl WriteOp {
    pub fn table(&self) -> Table {
        match self {
            WriteOp::Insert { table, .. }
            | WriteOp::Update { table, .. }
            | WriteOp::Delete { table, .. } => *table,
        }
    }

    /// Short human-readable label used in status messages and logs.
    pub fn describe(&self) -> String {
        match self {
            WriteOp::Insert { table, .. } => format!("insert into {}", table),
            WriteOp::Update { table, id, .. } => format!("update {} {}", table, id),
            WriteOp::Delete { table, id } => format!("delete from {} {}", table, id),
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Read all departments, tasks (with subtasks and comments) and members.
    /// All-or-nothing: any failed query fails the whole fetch.
    async fn fetch_all(&self) -> Result<Snapshot>;

    async fn insert(&self, table: Table, payload: Value) -> Result<()>;

    async fn update(&self, table: Table, id: &Id, payload: Value) -> Result<()>;

    async fn delete(&self, table: Table, id: &Id) -> Result<()>;

    /// Start forwarding row-level change notifications for `channels` to `tx`.
    /// The feed stops when the returned handle is unsubscribed or dropped.
    fn subscribe(
        &self,
        channels: &[Channel],
        tx: UnboundedSender<ChangeNotification>,
    ) -> Result<Subscription>;

    async fn apply(&self, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::Insert { table, payload } => self.insert(*table, payload.clone()).await,
            WriteOp::Update { table, id, payload } => {
                self.update(*table, id, payload.clone()).await
            }
            WriteOp::Delete { table, id } => self.delete(*table, id).await,
        }
    }
}

/// PostgREST adapter over `reqwest`.
pub struct RestBackend {
    client: reqwest::Client,
    base: Option<Url>,
    key: String,
}

impl RestBackend {
    /// Never fails: a missing or malformed endpoint is reported by the first request.
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(10)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let base = Url::parse(config.backend_url.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"));

        RestBackend {
            client,
            base,
            key: config.api_key.trim().to_string(),
        }
    }

    fn base(&self) -> Result<&Url> {
        match &self.base {
            Some(url) if !self.key.is_empty() => Ok(url),
            Some(_) => Err(Error::Connection("FLOWDESK_KEY is not set".into())),
            None => Err(Error::Connection("FLOWDESK_URL is not set or not a valid URL".into())),
        }
    }

    fn table_url(&self, table: Table) -> Result<Url> {
        let base = self.base()?;
        let raw = format!("{}/rest/v1/{}", base.as_str().trim_end_matches('/'), table);
        Url::parse(&raw).map_err(|e| Error::Connection(e.to_string()))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn select<T: DeserializeOwned>(&self, table: Table, select: &str, order: &str) -> Result<Vec<T>> {
        let url = self.table_url(table)?;
        let connection = |e: reqwest::Error| Error::Connection(format!("{}: {}", table, e));

        let response = self
            .request(reqwest::Method::GET, url)
            .query(&[("select", select), ("order", order)])
            .send()
            .await
            .map_err(connection)?
            .error_for_status()
            .map_err(connection)?;

        let rows: Vec<T> = response.json().await.map_err(connection)?;
        debug!(%table, rows = rows.len(), "fetched");
        Ok(rows)
    }

    async fn write(&self, op: &str, builder: reqwest::RequestBuilder) -> Result<()> {
        let response = builder
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(|e| Error::write(op, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(op, "write accepted");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };
        Err(Error::write(op, message))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn fetch_all(&self) -> Result<Snapshot> {
        let (departments, mut tasks, members) = tokio::try_join!(
            self.select::<Department>(Table::Departments, "*", "created_at.asc"),
            self.select::<Task>(Table::Tasks, "*,subtasks(*),comments(*)", "created_at.asc"),
            self.select::<Member>(Table::Members, "*", "name.asc"),
        )?;

        for task in &mut tasks {
            task.comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }

        Ok(Snapshot { departments, tasks, members })
    }

    async fn insert(&self, table: Table, payload: Value) -> Result<()> {
        let op = format!("insert into {}", table);
        let url = self.table_url(table).map_err(|e| Error::write(&op, e.to_string()))?;
        self.write(&op, self.request(reqwest::Method::POST, url).json(&payload))
            .await
    }

    async fn update(&self, table: Table, id: &Id, payload: Value) -> Result<()> {
        let op = format!("update {} {}", table, id);
        let url = self.table_url(table).map_err(|e| Error::write(&op, e.to_string()))?;
        let builder = self
            .request(reqwest::Method::PATCH, url)
            .query(&[("id", format!("eq.{}", id))])
            .json(&payload);
        self.write(&op, builder).await
    }

    async fn delete(&self, table: Table, id: &Id) -> Result<()> {
        let op = format!("delete from {} {}", table, id);
        let url = self.table_url(table).map_err(|e| Error::write(&op, e.to_string()))?;
        let builder = self
            .request(reqwest::Method::DELETE, url)
            .query(&[("id", format!("eq.{}", id))]);
        self.write(&op, builder).await
    }

    fn subscribe(
        &self,
        channels: &[Channel],
        tx: UnboundedSender<ChangeNotification>,
    ) -> Result<Subscription> {
        let base = self.base()?;
        realtime::subscribe(base, &self.key, channels, tx)
    }
}
