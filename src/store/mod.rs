//! Record storage boundary
//!
//! The engine reads and writes ACL records only through [`RecordStore`].
//! Two stores ship with the crate: [`MemoryStore`] and the LMDB-backed
//! [`LmdbStore`]. Both evaluate [`Query`] values with [`execute`].

use std::collections::HashSet;

use crate::condition::{Bindings, Query};
use crate::error::Result;
use crate::record::{Record, Value};

pub mod lmdb;
pub mod memory;

pub use lmdb::LmdbStore;
pub use memory::MemoryStore;

/// Storage collaborator the engine is written against
pub trait RecordStore: Send + Sync {
    /// All rows produced by the query
    fn find_all(&self, query: &Query) -> Result<Vec<Record>>;

    /// First row produced by the query
    fn find_one(&self, query: &Query) -> Result<Option<Record>> {
        let q = query.clone().limit(1);
        Ok(self.find_all(&q)?.into_iter().next())
    }

    /// Insert when the record carries no primary key, update otherwise.
    /// The assigned key is written back into `record` and returned.
    fn save(&self, table: &str, record: &mut Record) -> Result<i64>;

    /// Returns false when the row did not exist
    fn delete(&self, table: &str, record: &Record) -> Result<bool>;

    fn current_primary_key(&self, record: &Record) -> Option<i64> {
        record.id()
    }
}

/// Reference interpreter for [`Query`]: nested-loop inner joins over whole
/// tables. `load` returns every row of the named table.
pub fn execute<F>(query: &Query, mut load: F) -> Result<Vec<Record>>
where
    F: FnMut(&str) -> Result<Vec<Record>>,
{
    if query.limit == Some(0) {
        return Ok(Vec::new());
    }
    let base = load(&query.table)?;
    let mut tables = Vec::with_capacity(query.joins.len());
    for j in &query.joins {
        tables.push(load(&j.table)?);
    }

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for row in &base {
        let mut b = Bindings::new();
        b.bind(&query.alias, row);
        if !walk(query, &tables, 0, &mut b, &mut out, &mut seen) {
            break;
        }
    }
    Ok(out)
}

/// Returns false once the limit is reached
fn walk<'a>(
    query: &'a Query,
    tables: &'a [Vec<Record>],
    depth: usize,
    b: &mut Bindings<'a>,
    out: &mut Vec<Record>,
    seen: &mut HashSet<Record>,
) -> bool {
    if depth == query.joins.len() {
        if !query.condition.evaluate(b) {
            return true;
        }
        let row = project(query, b);
        if query.distinct && !seen.insert(row.clone()) {
            return true;
        }
        out.push(row);
        return query.limit.map_or(true, |n| out.len() < n);
    }

    let join = &query.joins[depth];
    for row in &tables[depth] {
        b.bind(&join.alias, row);
        if join.on.evaluate(b) && !walk(query, tables, depth + 1, b, out, seen) {
            b.unbind(&join.alias);
            return false;
        }
    }
    b.unbind(&join.alias);
    true
}

fn project(query: &Query, b: &Bindings<'_>) -> Record {
    if query.select.is_empty() {
        return b.row(&query.alias).cloned().unwrap_or_default();
    }
    let mut r = Record::new();
    for p in &query.select {
        let v = b.row(&p.alias).map(|row| row.get(&p.field).clone()).unwrap_or(Value::Null);
        r.set(&p.name, v);
    }
    r
}
