//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::{Arc, Once};

use acltree::{
    AclConfig, AclError, AclObject, Engine, MemoryStore, Protectable, Query, Record, RecordStore, Result, Side,
    StrategyKind,
};

static TRACING: Once = Once::new();

/// Route engine logs to the test output (`RUST_LOG=acltree=debug`)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const STRATEGIES: [StrategyKind; 2] = [StrategyKind::NestedSet, StrategyKind::PathMaterialization];

pub fn setup_with(config: AclConfig, store: Arc<dyn RecordStore>) -> Engine {
    init_tracing();
    let e = Engine::from_config(config, store).unwrap();
    e.install_default_actions().unwrap();
    e
}

pub fn setup(strategy: StrategyKind) -> Engine {
    setup_with(AclConfig { strategy, ..AclConfig::default() }, Arc::new(MemoryStore::new()))
}

pub fn user(e: &Engine, id: i64) -> AclObject {
    match e.find_object(Side::Aro, "User", Some(id)).unwrap() {
        Some(o) => o,
        None => e.create_object(Side::Aro, Some("User"), Some(id), None).unwrap(),
    }
}

pub fn aco(e: &Engine, model: &str, id: i64) -> AclObject {
    match e.find_object(Side::Aco, model, Some(id)).unwrap() {
        Some(o) => o,
        None => e.create_object(Side::Aco, Some(model), Some(id), None).unwrap(),
    }
}

pub fn permission_count(e: &Engine) -> usize {
    e.store().find_all(&Query::table(e.registry().table(acltree::Role::Permission))).unwrap().len()
}

pub struct Post {
    pub id: Option<i64>,
}

impl Protectable for Post {
    fn model(&self) -> &str {
        "Post"
    }

    fn primary_key(&self) -> Option<i64> {
        self.id
    }
}

/// Memory store whose writes to one table fail
pub struct FailingStore {
    pub inner: MemoryStore,
    pub table: String,
}

impl FailingStore {
    pub fn new(table: &str) -> Self {
        FailingStore { inner: MemoryStore::new(), table: table.to_string() }
    }
}

impl RecordStore for FailingStore {
    fn find_all(&self, query: &Query) -> Result<Vec<Record>> {
        self.inner.find_all(query)
    }

    fn save(&self, table: &str, record: &mut Record) -> Result<i64> {
        if table == self.table {
            return Err(AclError::Store(format!("{} is read-only", table)));
        }
        self.inner.save(table, record)
    }

    fn delete(&self, table: &str, record: &Record) -> Result<bool> {
        self.inner.delete(table, record)
    }
}
