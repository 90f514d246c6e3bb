//! Connection manager: the only code that talks to PostgreSQL.
//!
//! Rows come back as JSON objects keyed by column name (`to_jsonb` over the
//! query), so callers see one record shape regardless of the projection.
//! Every call runs in autocommit; there is no transaction spanning calls.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Array, Double, Integer, Jsonb, Nullable, Text};
use diesel::{Connection, PgConnection, QueryableByName};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, PoolError};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::DatabaseSettings;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

type DbPool = Pool<AsyncPgConnection>;

/// One result row, field name to value.
pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not connected to the database")]
    NotConnected,

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(#[from] DieselError),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("failed to decode record: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// The database could not be reached at all, as opposed to rejecting a query.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::NotConnected | Self::Unavailable(_) => true,
            Self::Query(DieselError::DatabaseError(kind, _)) => matches!(
                kind,
                DatabaseErrorKind::ClosedConnection | DatabaseErrorKind::UnableToSendCommand
            ),
            _ => false,
        }
    }

    /// Message of a constraint the database refused the write with, if any.
    pub fn constraint_violation(&self) -> Option<&str> {
        match self {
            Self::Query(DieselError::DatabaseError(kind, info)) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation => Some(info.message()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<bb8::RunError<PoolError>> for StoreError {
    fn from(e: bb8::RunError<PoolError>) -> Self {
        match e {
            bb8::RunError::User(e) => Self::Unavailable(e.to_string()),
            bb8::RunError::TimedOut => {
                Self::Unavailable("timed out waiting for a connection".to_string())
            }
        }
    }
}

/// Positional parameter for a query or routine call, bound as `$1`, `$2`, ...
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(Option<i32>),
    Double(f64),
    Text(Option<String>),
    IntArray(Vec<i32>),
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        Self::Int(Some(v))
    }
}

impl From<Option<i32>> for SqlParam {
    fn from(v: Option<i32>) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(Some(v.to_string()))
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::Text(Some(v))
    }
}

impl From<Option<String>> for SqlParam {
    fn from(v: Option<String>) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<i32>> for SqlParam {
    fn from(v: Vec<i32>) -> Self {
        Self::IntArray(v)
    }
}

/// Database-side routines the service delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    PlaceOrder,
    ProcessPayment,
    UpdateTracking,
    GetCustomerOrders,
}

impl Procedure {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlaceOrder => "place_order",
            Self::ProcessPayment => "process_payment",
            Self::UpdateTracking => "update_tracking",
            Self::GetCustomerOrders => "get_customer_orders",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four primitives the tracking service is built on.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs an insert/update; returns the affected row count.
    async fn execute_statement(&self, sql: &str, params: Vec<SqlParam>) -> Result<usize, StoreError>;

    async fn fetch_one(&self, sql: &str, params: Vec<SqlParam>) -> Result<Option<Record>, StoreError>;

    async fn fetch_all(&self, sql: &str, params: Vec<SqlParam>) -> Result<Vec<Record>, StoreError>;

    /// Calls a routine and flattens every row it returns.
    async fn call_procedure(
        &self,
        procedure: Procedure,
        params: Vec<SqlParam>,
    ) -> Result<Vec<Record>, StoreError>;
}

pub fn decode<T: DeserializeOwned>(record: Record) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Applies embedded migrations over a blocking libpq connection.
pub fn run_migrations(settings: &DatabaseSettings) -> anyhow::Result<usize> {
    let mut conn = PgConnection::establish(&settings.connection_string())?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(applied.len())
}

pub struct ConnectionManager {
    settings: DatabaseSettings,
    pool: RwLock<Option<DbPool>>,
}

impl ConnectionManager {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self {
            settings,
            pool: RwLock::new(None),
        }
    }

    /// Opens the connection. Calling it while connected is a no-op.
    pub async fn connect(&self) -> Result<(), StoreError> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let conn_str = self.settings.connection_string();

        // Surfaces the server's own error instead of a pool checkout timeout.
        if let Err(e) = AsyncPgConnection::establish(&conn_str).await {
            error!("Error connecting to {}: {}", self.settings.display_target(), e);
            return Err(StoreError::Unavailable(e.to_string()));
        }

        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(conn_str);
        let pool = Pool::builder()
            .max_size(self.settings.pool_size)
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(manager)
            .await
            .map_err(|e| {
                error!("Error building connection pool: {}", e);
                StoreError::Unavailable(e.to_string())
            })?;

        info!(
            "Connected to {} (pool size {})",
            self.settings.display_target(),
            self.settings.pool_size
        );
        *slot = Some(pool);
        Ok(())
    }

    /// Releases the connection if open.
    pub async fn disconnect(&self) {
        if self.pool.write().await.take().is_some() {
            info!("Disconnected from {}", self.settings.display_target());
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    async fn pool(&self) -> Result<DbPool, StoreError> {
        self.pool.read().await.clone().ok_or(StoreError::NotConnected)
    }

    async fn load_records(&self, sql: String, params: Vec<SqlParam>) -> Result<Vec<Record>, StoreError> {
        let pool = self.pool().await?;
        let mut conn = pool.get().await?;

        debug!(%sql, params = params.len(), "Loading records");
        let rows = bind_all(sql, params)
            .load::<JsonRecord>(&mut conn)
            .await?;

        rows.into_iter().map(JsonRecord::into_record).collect()
    }

    async fn execute(&self, sql: String, params: Vec<SqlParam>) -> Result<usize, StoreError> {
        let pool = self.pool().await?;
        let mut conn = pool.get().await?;

        debug!(%sql, params = params.len(), "Executing statement");
        Ok(bind_all(sql, params).execute(&mut conn).await?)
    }
}

#[async_trait]
impl Backend for ConnectionManager {
    async fn execute_statement(&self, sql: &str, params: Vec<SqlParam>) -> Result<usize, StoreError> {
        self.execute(sql.to_string(), params).await.map_err(|e| {
            error!("Error executing statement: {}", e);
            e
        })
    }

    async fn fetch_one(&self, sql: &str, params: Vec<SqlParam>) -> Result<Option<Record>, StoreError> {
        let wrapped = format!("{} LIMIT 1", as_records(sql));
        match self.load_records(wrapped, params).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(e) => {
                error!("Error fetching row: {}", e);
                Err(e)
            }
        }
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlParam>) -> Result<Vec<Record>, StoreError> {
        self.load_records(as_records(sql), params).await.map_err(|e| {
            error!("Error fetching rows: {}", e);
            e
        })
    }

    async fn call_procedure(
        &self,
        procedure: Procedure,
        params: Vec<SqlParam>,
    ) -> Result<Vec<Record>, StoreError> {
        let sql = as_records(&procedure_sql(procedure, params.len()));
        self.load_records(sql, params).await.map_err(|e| {
            error!("Error calling procedure {}: {}", procedure, e);
            e
        })
    }
}

#[derive(QueryableByName)]
struct JsonRecord {
    #[diesel(sql_type = Jsonb)]
    record: Value,
}

impl JsonRecord {
    fn into_record(self) -> Result<Record, StoreError> {
        match self.record {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Malformed(format!(
                "expected a row object, got {}",
                other
            ))),
        }
    }
}

/// Wraps a query so each row comes back as a single `record` jsonb column.
/// `INSERT ... RETURNING` is only accepted inside a CTE, not a FROM subquery.
///
/// List order comes from the inner `ORDER BY`. PostgreSQL keeps it through
/// this plain projection (no join, aggregate or outer sort), but SQL does not
/// promise it; adding any of those to the outer query needs its own ORDER BY.
fn as_records(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';');
    format!("WITH q AS ({}) SELECT to_jsonb(q) AS record FROM q", inner)
}

fn procedure_sql(procedure: Procedure, arity: usize) -> String {
    let placeholders = (1..=arity)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT * FROM {}({})", procedure.name(), placeholders)
}

fn bind_all<'f>(sql: String, params: Vec<SqlParam>) -> BoxedSqlQuery<'f, Pg, SqlQuery> {
    params
        .into_iter()
        .fold(diesel::sql_query(sql).into_boxed(), |query, param| match param {
            SqlParam::Int(v) => query.bind::<Nullable<Integer>, _>(v),
            SqlParam::Double(v) => query.bind::<Double, _>(v),
            SqlParam::Text(v) => query.bind::<Nullable<Text>, _>(v),
            SqlParam::IntArray(v) => query.bind::<Array<Integer>, _>(v),
        })
}
