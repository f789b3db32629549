//! acltree - Hierarchical ARO/ACO access control
//!
//! Subjects (Aros) and resources (Acos) hold positions in two trees. A grant
//! is a fact (aro node, aco node, action); it covers the Aco node's subtree
//! and, with subject inheritance, every subject below the Aro node.
//!
//! ```ignore
//! let engine = Engine::from_config(AclConfig::default(), Arc::new(MemoryStore::new()))?;
//! engine.install_default_actions()?;
//! let hooks = AuthorizationHooks::new(&engine, &current_user);
//! hooks.pre_write(&post, true)?;
//! // ... persist post ...
//! hooks.post_create(&post)?;
//! let visible = hooks.pre_read("Post", Query::table("Post"))?;
//! ```

pub mod condition;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod model;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod rules;
pub mod store;
pub mod tree;

// Re-exports
pub use condition::{col, lit, CmpOp, Condition, Join, Operand, Query};
pub use config::{AclConfig, ActionSet, RuleLookup, StrategyKind};
pub use engine::{BypassGuard, Engine, ResolveOptions};
pub use error::{AclError, Result};
pub use filter::Filter;
pub use hooks::{AuthorizationHooks, Protectable, SubjectContext};
pub use model::{AclObject, Action, Decision, Node, Permission, Position, Resource, SubjectRef};
pub use record::{Record, Value};
pub use registry::{Registry, RegistryBuilder, Role, Side};
pub use resolver::PermittedSubject;
pub use rules::{BusinessRule, FnRule, RuleContext};
pub use store::{LmdbStore, MemoryStore, RecordStore};
pub use tree::{NestedSet, PathMaterialization, TreeStrategy};
