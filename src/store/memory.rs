//! In-process record store

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::condition::Query;
use crate::constants::ID;
use crate::error::{AclError, Result};
use crate::record::Record;
use crate::store::{execute, RecordStore};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Record>,
}

/// Thread-safe, in-memory [`RecordStore`].
///
/// Each table is created on first write. Ids start at 1 per table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

fn poisoned<T>(_: T) -> AclError {
    AclError::Store("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a table
    pub fn count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.get(table).map_or(0, |t| t.rows.len()))
    }
}

impl RecordStore for MemoryStore {
    fn find_all(&self, query: &Query) -> Result<Vec<Record>> {
        let tables = self.tables.read().map_err(poisoned)?;
        execute(query, |name| {
            Ok(tables.get(name).map(|t| t.rows.values().cloned().collect()).unwrap_or_default())
        })
    }

    fn save(&self, table: &str, record: &mut Record) -> Result<i64> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let t = tables.entry(table.to_string()).or_default();
        let id = match record.id() {
            Some(id) => id,
            None => {
                let id = t.next_id.max(1);
                record.set(ID, id);
                id
            }
        };
        t.next_id = t.next_id.max(id + 1);
        t.rows.insert(id, record.clone());
        Ok(id)
    }

    fn delete(&self, table: &str, record: &Record) -> Result<bool> {
        let Some(id) = self.current_primary_key(record) else {
            return Ok(false);
        };
        let mut tables = self.tables.write().map_err(poisoned)?;
        Ok(tables.get_mut(table).map_or(false, |t| t.rows.remove(&id).is_some()))
    }
}
