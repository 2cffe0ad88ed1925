use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// A row as the store returns it: one JSON object per record.
pub type Row = serde_json::Value;

/// Typed filter value, bound as a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Decimal(Decimal),
    Int(i64),
    Bool(bool),
}

macro_rules! param_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Param {
            fn from(value: $ty) -> Self {
                Self::$variant(value.into())
            }
        })*
    };
}

param_from! {
    String => Text,
    &str => Text,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
    NaiveDate => Date,
    Decimal => Decimal,
    i64 => Int,
    bool => Bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Param),
    Gte(String, Param),
    Lte(String, Param),
    /// Case-insensitive substring match on the text form of a column.
    ILike(String, String),
    /// `ILike` over several columns, any of which may match.
    AnyILike(Vec<String>, String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Param>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn gte(column: &str, value: impl Into<Param>) -> Self {
        Self::Gte(column.to_string(), value.into())
    }

    pub fn lte(column: &str, value: impl Into<Param>) -> Self {
        Self::Lte(column.to_string(), value.into())
    }

    pub fn ilike(column: &str, needle: &str) -> Self {
        Self::ILike(column.to_string(), needle.to_string())
    }

    pub fn any_ilike(columns: &[&str], needle: &str) -> Self {
        Self::AnyILike(
            columns.iter().map(|c| (*c).to_string()).collect(),
            needle.to_string(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Read request: projection, filters, ordering and an offset/limit window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Select {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            descending: true,
        });
        self
    }

    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Generic table client. Every call is a single independent request; there
/// is no transaction spanning calls.
#[async_trait::async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, table: &str, query: &Select) -> anyhow::Result<Vec<Row>>;
    async fn count(&self, table: &str, filters: &[Filter]) -> anyhow::Result<u64>;
    async fn insert(&self, table: &str, rows: Vec<Row>) -> anyhow::Result<Vec<Row>>;
    /// Applies `patch` to every matching row and returns the updated rows.
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> anyhow::Result<Vec<Row>>;
    async fn delete(&self, table: &str, filters: &[Filter]) -> anyhow::Result<u64>;
}

pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RowStore for PgRowStore {
    async fn select(&self, table: &str, query: &Select) -> anyhow::Result<Vec<Row>> {
        let mut qb = select_sql(table, query)?;
        let rows = qb
            .build_query_scalar::<serde_json::Value>()
            .fetch_all(&self.pool)
            .await?;
        tracing::debug!(table, rows = rows.len(), "row store select");
        Ok(rows)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> anyhow::Result<u64> {
        let mut qb = count_sql(table, filters)?;
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = insert_sql(table, rows)?;
        let inserted = qb
            .build_query_scalar::<serde_json::Value>()
            .fetch_all(&self.pool)
            .await?;
        tracing::debug!(table, rows = inserted.len(), "row store insert");
        Ok(inserted)
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> anyhow::Result<Vec<Row>> {
        let mut qb = update_sql(table, patch, filters)?;
        let updated = qb
            .build_query_scalar::<serde_json::Value>()
            .fetch_all(&self.pool)
            .await?;
        tracing::debug!(table, rows = updated.len(), "row store update");
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> anyhow::Result<u64> {
        let mut qb = delete_sql(table, filters)?;
        let result = qb.build().execute(&self.pool).await?;
        tracing::debug!(table, rows = result.rows_affected(), "row store delete");
        Ok(result.rows_affected())
    }
}

/// Quotes a table or column name after checking it is a plain identifier.
/// Values never go through here; they are always bound.
fn ident(name: &str) -> anyhow::Result<String> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("invalid identifier: {name:?}");
    }
    Ok(format!("\"{name}\""))
}

fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_param(qb: &mut QueryBuilder<'static, Postgres>, param: &Param) {
    match param {
        Param::Text(v) => qb.push_bind(v.clone()),
        Param::Uuid(v) => qb.push_bind(*v),
        Param::Timestamp(v) => qb.push_bind(*v),
        Param::Date(v) => qb.push_bind(*v),
        Param::Decimal(v) => qb.push_bind(*v),
        Param::Int(v) => qb.push_bind(*v),
        Param::Bool(v) => qb.push_bind(*v),
    };
}

fn push_where(qb: &mut QueryBuilder<'static, Postgres>, filters: &[Filter]) -> anyhow::Result<()> {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq(column, value) => {
                qb.push(format!("t.{} = ", ident(column)?));
                push_param(qb, value);
            }
            Filter::Gte(column, value) => {
                qb.push(format!("t.{} >= ", ident(column)?));
                push_param(qb, value);
            }
            Filter::Lte(column, value) => {
                qb.push(format!("t.{} <= ", ident(column)?));
                push_param(qb, value);
            }
            Filter::ILike(column, needle) => {
                qb.push(format!("t.{}::text ILIKE ", ident(column)?));
                qb.push_bind(like_pattern(needle));
            }
            Filter::AnyILike(columns, needle) => {
                if columns.is_empty() {
                    anyhow::bail!("search filter without columns");
                }
                qb.push("(");
                for (j, column) in columns.iter().enumerate() {
                    if j > 0 {
                        qb.push(" OR ");
                    }
                    qb.push(format!("t.{}::text ILIKE ", ident(column)?));
                    qb.push_bind(like_pattern(needle));
                }
                qb.push(")");
            }
        }
    }
    Ok(())
}

fn select_sql(table: &str, query: &Select) -> anyhow::Result<QueryBuilder<'static, Postgres>> {
    let projection = if query.columns.is_empty() {
        "to_jsonb(t)".to_string()
    } else {
        let pairs = query
            .columns
            .iter()
            .map(|c| Ok(format!("'{c}', t.{}", ident(c)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        format!("jsonb_build_object({})", pairs.join(", "))
    };

    let mut qb = QueryBuilder::new(format!("SELECT {projection} FROM {} t", ident(table)?));
    push_where(&mut qb, &query.filters)?;

    for (i, order) in query.order.iter().enumerate() {
        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push(format!(
            "t.{} {}",
            ident(&order.column)?,
            if order.descending { "DESC" } else { "ASC" }
        ));
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(offset) = query.offset {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
    Ok(qb)
}

fn count_sql(table: &str, filters: &[Filter]) -> anyhow::Result<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} t", ident(table)?));
    push_where(&mut qb, filters)?;
    Ok(qb)
}

fn object_keys(rows: &[Row]) -> anyhow::Result<Vec<String>> {
    let mut keys: Vec<String> = Vec::new();
    for row in rows {
        let object = row
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("row is not a JSON object"))?;
        for key in object.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }
    Ok(keys)
}

// columns absent from the payload fall back to NULL, not the column default,
// so callers send every column they care about
fn insert_sql(table: &str, rows: Vec<Row>) -> anyhow::Result<QueryBuilder<'static, Postgres>> {
    let table = ident(table)?;
    let columns = object_keys(&rows)?
        .iter()
        .map(|c| ident(c))
        .collect::<anyhow::Result<Vec<_>>>()?
        .join(", ");
    if columns.is_empty() {
        anyhow::bail!("insert without columns");
    }

    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {table} AS t ({columns}) \
         SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, "
    ));
    qb.push_bind(serde_json::Value::Array(rows));
    qb.push(") RETURNING to_jsonb(t)");
    Ok(qb)
}

fn update_sql(
    table: &str,
    patch: Row,
    filters: &[Filter],
) -> anyhow::Result<QueryBuilder<'static, Postgres>> {
    if filters.is_empty() {
        anyhow::bail!("refusing to update {table} without a filter");
    }
    let table = ident(table)?;
    let assignments = object_keys(std::slice::from_ref(&patch))?
        .iter()
        .map(|c| ident(c).map(|c| format!("{c} = p.{c}")))
        .collect::<anyhow::Result<Vec<_>>>()?
        .join(", ");
    if assignments.is_empty() {
        anyhow::bail!("update without columns");
    }

    let mut qb = QueryBuilder::new(format!(
        "UPDATE {table} AS t SET {assignments} FROM jsonb_populate_record(NULL::{table}, "
    ));
    qb.push_bind(patch);
    qb.push(") AS p");
    push_where(&mut qb, filters)?;
    qb.push(" RETURNING to_jsonb(t)");
    Ok(qb)
}

fn delete_sql(table: &str, filters: &[Filter]) -> anyhow::Result<QueryBuilder<'static, Postgres>> {
    if filters.is_empty() {
        anyhow::bail!("refusing to delete from {table} without a filter");
    }
    let mut qb = QueryBuilder::new(format!("DELETE FROM {} AS t", ident(table)?));
    push_where(&mut qb, filters)?;
    Ok(qb)
}
