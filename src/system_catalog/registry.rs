use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use polars::prelude::{DataFrame, NamedFrom, Series};
use std::sync::Arc;

use crate::catalog::AggRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColType {
    Integer,
    BigInt,
    Boolean,
    Text,
}

#[derive(Clone, Copy, Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub coltype: ColType,
}

pub trait SystemTable: Send + Sync {
    fn schema(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn columns(&self) -> &'static [ColumnDef];
    fn build(&self, _registry: &AggRegistry) -> Option<DataFrame> {
        // Default build: declared columns, no rows
        build_empty(self.columns())
    }
}

pub fn build_empty(cols: &[ColumnDef]) -> Option<DataFrame> {
    let mut series: Vec<Series> = Vec::with_capacity(cols.len());
    for c in cols {
        match c.coltype {
            ColType::Integer => series.push(Series::new(c.name.into(), Vec::<i32>::new())),
            ColType::BigInt => series.push(Series::new(c.name.into(), Vec::<i64>::new())),
            ColType::Boolean => series.push(Series::new(c.name.into(), Vec::<bool>::new())),
            ColType::Text => series.push(Series::new(c.name.into(), Vec::<String>::new())),
        }
    }
    DataFrame::new(series.into_iter().map(|s| s.into()).collect()).ok()
}

static REGISTRY: OnceCell<Mutex<Vec<Arc<dyn SystemTable>>>> = OnceCell::new();

fn registry() -> &'static Mutex<Vec<Arc<dyn SystemTable>>> {
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Add a table; a table with the same schema and name is replaced.
pub fn register(table: Box<dyn SystemTable>) {
    let mut reg = registry().lock();
    reg.retain(|t| !(t.schema() == table.schema() && t.name() == table.name()));
    reg.push(Arc::from(table));
}

pub fn ensure_registered() {
    // If empty, populate defaults
    let empty = registry().lock().is_empty();
    if empty {
        super::pg_catalog::register_defaults();
    }
}

pub fn all() -> Vec<Arc<dyn SystemTable>> {
    registry().lock().iter().cloned().collect()
}

pub fn find(schema: &str, name: &str) -> Option<Arc<dyn SystemTable>> {
    let reg = registry().lock();
    reg.iter()
        .find(|t| t.schema().eq_ignore_ascii_case(schema) && t.name().eq_ignore_ascii_case(name))
        .cloned()
}

/// Resolve an identifier such as `pg_catalog.pg_aggregate`, `"pg_proc"` or a
/// bare `pg_aggregate` to a registered system table.
pub fn lookup_from_str(input: &str) -> Option<Arc<dyn SystemTable>> {
    ensure_registered();
    // Normalize: trim, strip alias after whitespace, strip quotes and semicolon
    let mut base = input.trim().to_string();
    if let Some(idx) = base.find(|c: char| c.is_whitespace()) { base.truncate(idx); }
    if base.ends_with(';') { base.pop(); }
    if base.len() >= 2 && ((base.starts_with('"') && base.ends_with('"')) || (base.starts_with('\'') && base.ends_with('\''))) {
        base = base[1..base.len() - 1].to_string();
    }
    let ident = base.replace(['\\', '/'], ".").to_lowercase();
    let parts: Vec<&str> = ident.split('.').collect();
    let last1 = parts.last().copied().unwrap_or("");
    if parts.len() >= 2 {
        if let Some(t) = find(parts[parts.len() - 2], last1) { return Some(t); }
    }
    // Bare name: pg_catalog is the only schema served
    find("pg_catalog", last1)
}

/// Build the frame for an identifier, or `None` when no such table exists.
pub fn frame_for(input: &str, aggs: &AggRegistry) -> Option<DataFrame> {
    lookup_from_str(input).and_then(|t| t.build(aggs))
}
