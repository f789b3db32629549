//! LMDB-backed record store
//!
//! Storage layout:
//! - one named database per table: `id (u64 BE) -> record JSON`
//! - `meta`: `table name -> next id`

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use heed::types::{Str, U64};
use heed::{Database, Env, EnvOpenOptions};

use crate::condition::Query;
use crate::constants::ID;
use crate::error::{err, AclError, Result};
use crate::record::Record;
use crate::store::{execute, RecordStore};

type TableDb = Database<U64<byteorder::BigEndian>, Str>;
type MetaDb = Database<Str, U64<byteorder::BigEndian>>;

/// Upper bound on named databases (tables + meta)
const MAX_DBS: u32 = 64;

/// Persistent [`RecordStore`] on a single LMDB environment
pub struct LmdbStore {
    env: Env,
    meta: MetaDb,
    tables: RwLock<HashMap<String, TableDb>>,
}

fn key(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| AclError::Store(format!("negative primary key {}", id)))
}

fn poisoned<T>(_: T) -> AclError {
    AclError::Store("table handle cache poisoned".into())
}

impl LmdbStore {
    /// Open (or create) the environment at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1 << 30)
                .max_dbs(MAX_DBS)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let meta: MetaDb = env.create_database(&mut tx, Some("meta")).map_err(err)?;
        tx.commit().map_err(err)?;
        tracing::debug!(path = %path.display(), "opened lmdb record store");
        Ok(LmdbStore { env, meta, tables: RwLock::new(HashMap::new()) })
    }

    /// Handle for a table, creating the named database on first use.
    /// Must not be called while a write transaction is open on this thread.
    fn table(&self, name: &str) -> Result<TableDb> {
        if let Some(db) = self.tables.read().map_err(poisoned)?.get(name) {
            return Ok(*db);
        }
        let mut tables = self.tables.write().map_err(poisoned)?;
        if let Some(db) = tables.get(name) {
            return Ok(*db);
        }
        let db_name = format!("t:{}", name);
        let mut tx = self.env.write_txn().map_err(err)?;
        let db: TableDb = self.env.create_database(&mut tx, Some(db_name.as_str())).map_err(err)?;
        tx.commit().map_err(err)?;
        tables.insert(name.to_string(), db);
        Ok(db)
    }

    fn load(&self, tx: &heed::RoTxn, db: TableDb) -> Result<Vec<Record>> {
        let mut rows = Vec::new();
        for item in db.iter(tx).map_err(err)? {
            let (_, json) = item.map_err(err)?;
            rows.push(serde_json::from_str(json).map_err(err)?);
        }
        Ok(rows)
    }
}

impl RecordStore for LmdbStore {
    fn find_all(&self, query: &Query) -> Result<Vec<Record>> {
        let mut handles = HashMap::new();
        handles.insert(query.table.clone(), self.table(&query.table)?);
        for j in &query.joins {
            if !handles.contains_key(&j.table) {
                handles.insert(j.table.clone(), self.table(&j.table)?);
            }
        }
        let tx = self.env.read_txn().map_err(err)?;
        execute(query, |name| match handles.get(name) {
            Some(db) => self.load(&tx, *db),
            None => Ok(Vec::new()),
        })
    }

    fn save(&self, table: &str, record: &mut Record) -> Result<i64> {
        let db = self.table(table)?;
        let mut tx = self.env.write_txn().map_err(err)?;
        let next = self.meta.get(&tx, table).map_err(err)?.unwrap_or(1);
        let id = match record.id() {
            Some(id) => id,
            None => {
                let id = i64::try_from(next).map_err(err)?;
                record.set(ID, id);
                id
            }
        };
        let k = key(id)?;
        if k >= next {
            self.meta.put(&mut tx, table, &(k + 1)).map_err(err)?;
        }
        let json = serde_json::to_string(record).map_err(err)?;
        db.put(&mut tx, &k, &json).map_err(err)?;
        tx.commit().map_err(err)?;
        Ok(id)
    }

    fn delete(&self, table: &str, record: &Record) -> Result<bool> {
        let Some(id) = self.current_primary_key(record) else {
            return Ok(false);
        };
        let db = self.table(table)?;
        let mut tx = self.env.write_txn().map_err(err)?;
        let removed = db.delete(&mut tx, &key(id)?).map_err(err)?;
        tx.commit().map_err(err)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let s = LmdbStore::open(dir.path()).unwrap();
            let mut r = Record::new().with("model", "Post").with("foreign_key", 7);
            s.save("PmAco", &mut r).unwrap()
        };
        let s = LmdbStore::open(dir.path()).unwrap();
        let r = s.find_one(&Query::table("PmAco").where_eq("id", id)).unwrap().unwrap();
        assert_eq!(r.int("foreign_key"), Some(7));
        let mut r2 = Record::new().with("model", "Post");
        assert_eq!(s.save("PmAco", &mut r2).unwrap(), id + 1);
    }

    #[test]
    fn delete_row() {
        let dir = TempDir::new().unwrap();
        let s = LmdbStore::open(dir.path()).unwrap();
        let mut r = Record::new().with("name", "read");
        s.save("PmAction", &mut r).unwrap();
        assert!(s.delete("PmAction", &r).unwrap());
        assert!(!s.delete("PmAction", &r).unwrap());
        assert!(s.find_all(&Query::table("PmAction")).unwrap().is_empty());
    }
}
