//! In-process `RowStore` used by the function tests.

use super::row_store::{Filter, Param, Row, RowStore, Select};
use crate::schema::lenient::{amount_from_value, parse_timestamp};
use chrono::NaiveDate;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryRowStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    failing: Mutex<Vec<String>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Every later call touching `table` errors.
    pub fn fail_table(&self, table: &str) {
        self.failing.lock().unwrap().push(table.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, table: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().iter().any(|t| t == table) {
            anyhow::bail!("table {table} unavailable");
        }
        Ok(())
    }
}

fn compare(param: &Param, value: &Value) -> Option<Ordering> {
    match param {
        Param::Text(expected) => value.as_str().map(|s| s.cmp(expected.as_str())),
        Param::Uuid(expected) => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(|u| u.cmp(expected)),
        Param::Timestamp(expected) => value
            .as_str()
            .and_then(parse_timestamp)
            .map(|t| t.cmp(expected)),
        Param::Date(expected) => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
            .map(|d| d.cmp(expected)),
        Param::Decimal(expected) => {
            (!value.is_null()).then(|| amount_from_value(value).cmp(expected))
        }
        Param::Int(expected) => value.as_i64().map(|n| n.cmp(expected)),
        Param::Bool(expected) => value.as_bool().map(|b| b.cmp(expected)),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn contains_ci(value: &Value, needle: &str) -> bool {
    !value.is_null() && text_of(value).to_lowercase().contains(&needle.to_lowercase())
}

fn matches(row: &Row, filters: &[Filter]) -> bool {
    let field = |column: &str| row.get(column).cloned().unwrap_or(Value::Null);
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, param) => compare(param, &field(column)) == Some(Ordering::Equal),
        Filter::Gte(column, param) => matches!(
            compare(param, &field(column)),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::Lte(column, param) => matches!(
            compare(param, &field(column)),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::ILike(column, needle) => contains_ci(&field(column), needle),
        Filter::AnyILike(columns, needle) => columns.iter().any(|c| contains_ci(&field(c), needle)),
    })
}

fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => text_of(a).cmp(&text_of(b)),
    }
}

#[async_trait::async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, table: &str, query: &Select) -> anyhow::Result<Vec<Row>> {
        self.check(table)?;
        let mut rows: Vec<Row> = self
            .rows(table)
            .into_iter()
            .filter(|row| matches(row, &query.filters))
            .collect();

        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|o| {
                    let ord = order_values(
                        a.get(&o.column).unwrap_or(&Value::Null),
                        b.get(&o.column).unwrap_or(&Value::Null),
                    );
                    if o.descending { ord.reverse() } else { ord }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                if query.columns.is_empty() {
                    return row;
                }
                let projected = query
                    .columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(projected)
            })
            .collect())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> anyhow::Result<u64> {
        self.check(table)?;
        Ok(self.rows(table).iter().filter(|row| matches(row, filters)).count() as u64)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        self.check(table)?;
        self.seed(table, rows.clone());
        Ok(rows)
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> anyhow::Result<Vec<Row>> {
        self.check(table)?;
        anyhow::ensure!(!filters.is_empty(), "refusing to update {table} without a filter");
        let mut tables = self.tables.lock().unwrap();
        let mut updated = Vec::new();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if !matches(row, filters) {
                continue;
            }
            if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                for (key, value) in changes {
                    target.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> anyhow::Result<u64> {
        self.check(table)?;
        anyhow::ensure!(!filters.is_empty(), "refusing to delete from {table} without a filter");
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| !matches(row, filters));
        Ok((before - rows.len()) as u64)
    }
}
