//! Database handle: connection, dialect, schema summary for prompting and
//! plain-text execution of generated queries.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};

/// What the user sees for any failed execution. Failure classes are not
/// distinguished.
pub const EXECUTION_ERROR_PLACEHOLDER: &str = "An error occurred :(";

/// Longest sample value written into the schema summary.
const SAMPLE_VALUE_MAX_CHARS: usize = 100;

const NULL_TEXT: &str = "NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            _ => Err(AppError::Config(format!(
                "unsupported database url scheme: {scheme:?}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgresql",
            Dialect::MySql => "mysql",
        }
    }

    fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

/// Runs a query and hands back something displayable, never an error.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> String;
}

/// One pool per backend so every column type the driver knows can be
/// rendered.
enum Pool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

/// Fully rendered result set.
struct Rows {
    columns: Vec<String>,
    values: Vec<Vec<String>>,
}

impl Rows {
    fn collect<R: Row>(
        rows: &[R],
        render: fn(&R, usize) -> std::result::Result<String, sqlx::Error>,
    ) -> std::result::Result<Self, sqlx::Error> {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let values = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| render(row, i)).collect())
            .collect::<std::result::Result<Vec<Vec<String>>, _>>()?;

        Ok(Self { columns, values })
    }
}

pub struct SqlDatabase {
    pool: Pool,
    dialect: Dialect,
    sample_rows: usize,
}

#[async_trait]
impl QueryExecutor for SqlDatabase {
    /// Only `sqlx::Error` can come out of `run`, and every one of them is
    /// collapsed into [`EXECUTION_ERROR_PLACEHOLDER`].
    async fn execute(&self, query: &str) -> String {
        match self.run(query).await {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("Query execution failed: {}", e);
                EXECUTION_ERROR_PLACEHOLDER.to_string()
            }
        }
    }
}

impl SqlDatabase {
    pub async fn connect(url: &str, max_connections: u32, sample_rows: usize) -> Result<Self> {
        let dialect = Dialect::from_url(url)?;

        let pool = match dialect {
            Dialect::Sqlite => Pool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await?,
            ),
            Dialect::Postgres => Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await?,
            ),
            Dialect::MySql => Pool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await?,
            ),
        };

        info!(dialect = dialect.name(), "Connected to database");

        Ok(Self {
            pool,
            dialect,
            sample_rows,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Executes `query` verbatim and renders one `(v1, v2, ...)` line per row.
    pub async fn run(&self, query: &str) -> std::result::Result<String, sqlx::Error> {
        debug!("Executing query: {}", query);

        let rows = self.fetch(query, None).await?;
        let lines: Vec<String> = rows
            .values
            .iter()
            .map(|values| format!("({})", values.join(", ")))
            .collect();

        debug!("Query returned {} rows", lines.len());
        Ok(lines.join("\n"))
    }

    /// `CREATE TABLE` statements for every user table, each followed by a few
    /// sample rows, separated by blank lines.
    pub async fn table_info(&self) -> Result<String> {
        let tables = self.get_tables().await?;
        let mut sections = Vec::with_capacity(tables.len());

        for table in &tables {
            let ddl = self.get_table_ddl(table).await?;
            let samples = if self.sample_rows > 0 {
                Some(self.get_sample_rows(table).await)
            } else {
                None
            };
            sections.push(table_section(table, ddl, samples));
        }

        debug!("Built table info for {} tables", tables.len());
        Ok(sections.join("\n\n"))
    }

    async fn fetch(
        &self,
        query: &str,
        param: Option<&str>,
    ) -> std::result::Result<Rows, sqlx::Error> {
        match &self.pool {
            Pool::Sqlite(pool) => {
                let mut q = sqlx::query::<sqlx::Sqlite>(query);
                if let Some(param) = param {
                    q = q.bind(param);
                }
                let rows = q.fetch_all(pool).await?;
                Rows::collect(&rows, render_sqlite_value)
            }
            Pool::Postgres(pool) => {
                let mut q = sqlx::query::<sqlx::Postgres>(query);
                if let Some(param) = param {
                    q = q.bind(param);
                }
                let rows = q.fetch_all(pool).await?;
                Rows::collect(&rows, render_pg_value)
            }
            Pool::MySql(pool) => {
                let mut q = sqlx::query::<sqlx::MySql>(query);
                if let Some(param) = param {
                    q = q.bind(param);
                }
                let rows = q.fetch_all(pool).await?;
                Rows::collect(&rows, render_mysql_value)
            }
        }
    }

    async fn get_tables(&self) -> Result<Vec<String>> {
        let query = match self.dialect {
            Dialect::Sqlite => {
                "SELECT name AS table_name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Dialect::Postgres => {
                "SELECT table_name::text AS table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name"
            }
            Dialect::MySql => {
                "SELECT CAST(table_name AS CHAR) AS table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name"
            }
        };

        let rows = self.fetch(query, None).await?;
        Ok(rows.values.into_iter().filter_map(|row| row.into_iter().next()).collect())
    }

    async fn get_table_ddl(&self, table: &str) -> Result<String> {
        if self.dialect == Dialect::Sqlite {
            let rows = self
                .fetch(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
                    Some(table),
                )
                .await?;
            let sql = rows
                .values
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .ok_or(sqlx::Error::RowNotFound)?;
            return Ok(sql.trim().to_string());
        }

        let query = match self.dialect {
            Dialect::Postgres => {
                "SELECT column_name::text AS column_name, data_type::text AS data_type, \
                 is_nullable::text AS is_nullable FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position"
            }
            _ => {
                "SELECT CAST(column_name AS CHAR) AS column_name, \
                 CAST(column_type AS CHAR) AS data_type, \
                 CAST(is_nullable AS CHAR) AS is_nullable FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? \
                 ORDER BY ordinal_position"
            }
        };

        let rows = self.fetch(query, Some(table)).await?;
        let mut columns = Vec::with_capacity(rows.values.len());
        for row in &rows.values {
            let [name, data_type, nullable] = row.as_slice() else {
                continue;
            };

            let mut column = format!(
                "\t{} {}",
                self.dialect.quote_identifier(name),
                data_type.to_uppercase()
            );
            if nullable.eq_ignore_ascii_case("NO") {
                column.push_str(" NOT NULL");
            }
            columns.push(column);
        }

        Ok(format!(
            "CREATE TABLE {} (\n{}\n)",
            self.dialect.quote_identifier(table),
            columns.join(",\n")
        ))
    }

    async fn get_sample_rows(&self, table: &str) -> std::result::Result<String, sqlx::Error> {
        let query = format!(
            "SELECT * FROM {} LIMIT {}",
            self.dialect.quote_identifier(table),
            self.sample_rows
        );
        let rows = self.fetch(&query, None).await?;

        let mut lines = vec![format!("{} rows from {} table:", rows.values.len(), table)];
        if !rows.columns.is_empty() {
            lines.push(rows.columns.join("\t"));
        }
        for values in rows.values {
            let values: Vec<String> = values
                .into_iter()
                .map(|v| truncate(v, SAMPLE_VALUE_MAX_CHARS))
                .collect();
            lines.push(values.join("\t"));
        }

        Ok(format!("/*\n{}\n*/", lines.join("\n")))
    }
}

/// A table's DDL, followed by its sample rows when there are any. A failed
/// sample query keeps the DDL and drops only the samples.
fn table_section(
    table: &str,
    ddl: String,
    samples: Option<std::result::Result<String, sqlx::Error>>,
) -> String {
    match samples {
        Some(Ok(samples)) => format!("{ddl}\n\n{samples}"),
        Some(Err(e)) => {
            warn!("Could not sample rows from {}: {}", table, e);
            ddl
        }
        None => ddl,
    }
}

fn decoded<'r, R, T>(row: &'r R, index: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<T, usize>(index).ok()
}

fn undecodable<R: Row>(row: &R, index: usize) -> sqlx::Error {
    let type_name = row.columns()[index].type_info().name().to_string();
    sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: format!("cannot render values of type {type_name}").into(),
    }
}

fn hex_blob(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

/// SQLite is dynamically typed; the stored type of each value decides how it
/// decodes, whatever the column was declared as.
fn render_sqlite_value(row: &SqliteRow, index: usize) -> std::result::Result<String, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(NULL_TEXT.to_string());
    }

    if let Some(val) = decoded::<_, i64>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, f64>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, String>(row, index) {
        return Ok(val);
    }
    if let Some(val) = decoded::<_, Vec<u8>>(row, index) {
        return Ok(hex_blob(&val));
    }
    if let Some(val) = decoded::<_, bool>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveDateTime>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveDate>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveTime>(row, index) {
        return Ok(val.to_string());
    }

    Err(undecodable(row, index))
}

fn render_pg_value(row: &PgRow, index: usize) -> std::result::Result<String, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(NULL_TEXT.to_string());
    }

    if let Some(val) = decoded::<_, bool>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, i16>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, i32>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, i64>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, f32>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, f64>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, Decimal>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, String>(row, index) {
        return Ok(val);
    }
    if let Some(val) = decoded::<_, DateTime<Utc>>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveDateTime>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveDate>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveTime>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, Uuid>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, JsonValue>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, Vec<u8>>(row, index) {
        return Ok(hex_blob(&val));
    }

    Err(undecodable(row, index))
}

fn render_mysql_value(row: &MySqlRow, index: usize) -> std::result::Result<String, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(NULL_TEXT.to_string());
    }

    if let Some(val) = decoded::<_, i64>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, u64>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, f64>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, f32>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, Decimal>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, String>(row, index) {
        return Ok(val);
    }
    if let Some(val) = decoded::<_, DateTime<Utc>>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveDateTime>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveDate>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, NaiveTime>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, JsonValue>(row, index) {
        return Ok(val.to_string());
    }
    if let Some(val) = decoded::<_, Vec<u8>>(row, index) {
        return Ok(hex_blob(&val));
    }

    Err(undecodable(row, index))
}

fn truncate(value: String, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value,
    }
}
