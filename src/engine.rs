//! ACL engine: objects, positions, actions and grant facts
//!
//! Resolution lives in `resolver`, filter synthesis in `filter`; both are
//! further `impl Engine` blocks over the operations defined here.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::condition::{col, lit, Condition, Query};
use crate::config::{AclConfig, ActionSet};
use crate::constants::{ACTION_ID, ALIAS, COLLECTION_ID, DEFAULT_ACTIONS, FOREIGN_KEY, GRANT, ID, MODEL, NAME};
use crate::error::{AclError, Result};
use crate::model::{AclObject, Action, Node, Permission, Resource, SubjectRef};
use crate::record::{Record, Value};
use crate::registry::{Registry, Role, Side};
use crate::rules::BusinessRule;
use crate::store::RecordStore;
use crate::tree::{TreeStrategy, TreeTables};

/// Per-call knobs threaded through resolution and filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Only grants on the resource's own nodes count
    pub disable_inheritance: bool,
}

impl ResolveOptions {
    pub fn without_inheritance() -> Self {
        ResolveOptions { disable_inheritance: true }
    }
}

/// Scoped bypass of every check on an engine (and its clones).
/// Dropping the guard restores normal checking, also on early returns.
#[must_use = "the bypass ends when the guard is dropped"]
pub struct BypassGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for BypassGuard {
    fn drop(&mut self) {
        let left = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::debug!(remaining = left, "acl bypass released");
    }
}

/// The permission engine. Cheap to clone; clones share the store, the
/// registry, the bypass state and the tree write lock.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    store: Arc<dyn RecordStore>,
    rules: Vec<Arc<dyn BusinessRule>>,
    bypass: Arc<AtomicUsize>,
    /// Node inserts read then rewrite positions; one writer per engine
    tree_lock: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn RecordStore>) -> Self {
        Engine {
            registry,
            store,
            rules: Vec::new(),
            bypass: Arc::new(AtomicUsize::new(0)),
            tree_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Convenience: registry from configuration
    pub fn from_config(config: AclConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        Ok(Self::new(Arc::new(Registry::from_config(config)?), store))
    }

    /// Register a business rule (consulted only when enabled in config)
    pub fn with_rule(mut self, rule: Arc<dyn BusinessRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &AclConfig {
        self.registry.config()
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub(crate) fn rules(&self) -> &[Arc<dyn BusinessRule>] {
        &self.rules
    }

    pub(crate) fn table(&self, role: Role) -> &str {
        self.registry.table(role)
    }

    fn tree_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.tree_lock.lock().map_err(|_| AclError::Consistency("tree lock poisoned".into()))
    }

    fn tree_tables(&self, side: Side) -> TreeTables<'_> {
        TreeTables { nodes: self.table(side.node()), permissions: self.table(Role::Permission) }
    }

    // ========================================================================
    // Bypass
    // ========================================================================

    /// Suspend all checks until the guard is dropped. For privileged
    /// internal operations only.
    pub fn bypass(&self) -> BypassGuard {
        let depth = self.bypass.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(depth, "acl bypass acquired");
        BypassGuard { depth: Arc::clone(&self.bypass) }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::SeqCst) > 0
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Create the named actions that do not exist yet
    pub fn install_actions(&self, names: &[&str]) -> Result<Vec<Action>> {
        let table = self.table(Role::Action);
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let existing = self.store.find_one(&Query::table(table).where_eq(NAME, *name))?;
            let record = match existing {
                Some(r) => r,
                None => {
                    let mut r = Record::new().with(NAME, *name);
                    self.store.save(table, &mut r)?;
                    tracing::debug!(action = name, "installed action");
                    r
                }
            };
            out.push(Action::from_record(&record)?);
        }
        Ok(out)
    }

    /// `create`, `read`, `update`, `delete`, `grant`
    pub fn install_default_actions(&self) -> Result<Vec<Action>> {
        self.install_actions(DEFAULT_ACTIONS)
    }

    /// Resolve an action by name. Unknown names are a configuration fault.
    pub fn action(&self, name: &str) -> Result<Action> {
        self.store
            .find_one(&Query::table(self.table(Role::Action)).where_eq(NAME, name))?
            .map(|r| Action::from_record(&r))
            .transpose()?
            .ok_or_else(|| AclError::UnknownAction(name.to_string()))
    }

    /// Expand an action set; `*` means every installed action
    pub fn translate_actions(&self, actions: &ActionSet) -> Result<Vec<Action>> {
        match actions {
            ActionSet::All => self
                .store
                .find_all(&Query::table(self.table(Role::Action)))?
                .iter()
                .map(Action::from_record)
                .collect(),
            ActionSet::Named(names) => names.iter().map(|n| self.action(n)).collect(),
        }
    }

    // ========================================================================
    // Objects
    // ========================================================================

    fn object_query(&self, side: Side, model: &str, foreign_key: Option<i64>) -> Query {
        let q = Query::table(self.table(side.object())).where_eq(MODEL, model);
        match foreign_key {
            Some(k) => q.where_eq(FOREIGN_KEY, k),
            None => q.filter(Condition::IsNull(col("t", FOREIGN_KEY))),
        }
    }

    /// Object bound to `(model, foreign_key)`; `None` key finds the
    /// class-level object
    pub fn find_object(&self, side: Side, model: &str, foreign_key: Option<i64>) -> Result<Option<AclObject>> {
        self.store
            .find_one(&self.object_query(side, model, foreign_key))?
            .map(|r| AclObject::from_record(&r))
            .transpose()
    }

    pub fn find_by_alias(&self, side: Side, alias: &str) -> Result<Option<AclObject>> {
        self.store
            .find_one(&Query::table(self.table(side.object())).where_eq(ALIAS, alias))?
            .map(|r| AclObject::from_record(&r))
            .transpose()
    }

    pub fn find_subject(&self, subject: &SubjectRef) -> Result<Option<AclObject>> {
        match subject {
            SubjectRef::Entity { model, foreign_key } => self.find_object(Side::Aro, model, Some(*foreign_key)),
            SubjectRef::Alias(alias) => self.find_by_alias(Side::Aro, alias),
        }
    }

    pub fn find_resource(&self, resource: &Resource) -> Result<Option<AclObject>> {
        self.find_object(Side::Aco, resource.model(), resource.foreign_key())
    }

    /// Create an object with one root position. At most one object per
    /// `(model, foreign_key)` and per alias.
    pub fn create_object(&self, side: Side, model: Option<&str>, foreign_key: Option<i64>, alias: Option<&str>) -> Result<AclObject> {
        if let (Some(m), Some(_)) = (model, foreign_key) {
            if let Some(existing) = self.find_object(side, m, foreign_key)? {
                return Err(AclError::Consistency(format!("{:?} object {} already exists", side, existing)));
            }
        }
        if let Some(a) = alias {
            if self.find_by_alias(side, a)?.is_some() {
                return Err(AclError::Consistency(format!("{:?} alias '{}' already taken", side, a)));
            }
        }
        let mut r = Record::new().with(MODEL, model).with(FOREIGN_KEY, foreign_key).with(ALIAS, alias);
        self.store.save(self.table(side.object()), &mut r)?;
        let obj = AclObject::from_record(&r)?;
        let node = Record::new().with(COLLECTION_ID, obj.id);
        {
            let _tree = self.tree_guard()?;
            self.registry.strategy().insert(self.store(), self.tree_tables(side), side, None, node)?;
        }
        tracing::debug!(side = ?side, object = %obj, "created acl object");
        Ok(obj)
    }

    /// Standalone named group
    pub fn create_group(&self, side: Side, alias: &str) -> Result<AclObject> {
        self.create_object(side, None, None, Some(alias))
    }

    pub(crate) fn create_subject(&self, subject: &SubjectRef) -> Result<AclObject> {
        match subject {
            SubjectRef::Entity { model, foreign_key } => self.create_object(Side::Aro, Some(model), Some(*foreign_key), None),
            SubjectRef::Alias(alias) => self.create_group(Side::Aro, alias),
        }
    }

    /// Delete an object, its node subtrees and every permission on them
    pub fn remove_object(&self, side: Side, obj: &AclObject) -> Result<()> {
        let _tree = self.tree_guard()?;
        for node in self.nodes(side, obj)? {
            self.remove_subtree(side, &node)?;
        }
        if !self.store.delete(self.table(side.object()), &obj.to_record())? {
            return Err(AclError::Consistency(format!("{:?} object {} vanished during delete", side, obj)));
        }
        tracing::debug!(side = ?side, object = %obj, "removed acl object");
        Ok(())
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Nodes owned by the object (fresh from the store)
    pub fn nodes(&self, side: Side, obj: &AclObject) -> Result<Vec<Node>> {
        let q = Query::table(self.table(side.node())).where_eq(COLLECTION_ID, obj.id);
        self.store.find_all(&q)?.iter().map(Node::from_record).collect()
    }

    /// Comprised positions: own nodes plus, optionally, all their ancestors
    pub fn positions(&self, side: Side, obj: &AclObject, with_ancestors: bool) -> Result<Vec<Node>> {
        let direct = self.nodes(side, obj)?;
        if !with_ancestors {
            return Ok(direct);
        }
        let s = self.registry.strategy();
        let cond = Condition::any(direct.iter().map(|n| s.ancestry_condition("t", n)));
        let q = Query::table(self.table(side.node())).filter(cond);
        self.store.find_all(&q)?.iter().map(Node::from_record).collect()
    }

    /// Place `child` under every position of `parent`. Each new position
    /// receives a copy of the child's subtree, so all positions of a
    /// collection carry the same descendants whatever the join order.
    pub fn join(&self, side: Side, child: &AclObject, parent: &AclObject) -> Result<Vec<Node>> {
        if child.id == parent.id {
            return Err(AclError::Consistency("Cannot reference self".into()));
        }
        let _tree = self.tree_guard()?;
        let s = self.registry.strategy();
        let child_nodes = self.nodes(side, child)?;
        let parent_nodes = self.nodes(side, parent)?;
        if parent_nodes.iter().any(|p| child_nodes.iter().any(|c| s.is_ancestor_or_self(c, p))) {
            return Err(AclError::Consistency(format!("Circular reference: {} is below {}", parent, child)));
        }

        // Shape of the subtree to replicate, fixed before any insert moves it
        let template = match child_nodes.first() {
            Some(root) => self.subtree(side, root)?,
            None => Vec::new(),
        };
        let shape: Vec<(i64, i64, Option<i64>)> = ordered_by_depth(s, &template)
            .into_iter()
            .map(|n| (n.id, n.collection_id, immediate_parent(s, n, &template).map(|p| p.id)))
            .collect();

        let mut placed = Vec::with_capacity(parent_nodes.len());
        for p in &parent_nodes {
            let top = s.insert(self.store(), self.tree_tables(side), side, Some(p), Record::new().with(COLLECTION_ID, child.id))?;
            let mut copies: Vec<(i64, Node)> = Vec::with_capacity(shape.len());
            for (id, collection_id, up) in &shape {
                let Some(up) = up else { continue };
                let under = match copies.iter().find(|(t, _)| t == up) {
                    Some((_, n)) => n.clone(),
                    None => top.clone(),
                };
                let copy = s.insert(self.store(), self.tree_tables(side), side, Some(&under), Record::new().with(COLLECTION_ID, *collection_id))?;
                copies.push((*id, copy));
            }
            placed.push(top);
        }
        tracing::debug!(side = ?side, child = %child, parent = %parent, nodes = placed.len(), copied = shape.len().saturating_sub(1), "joined");
        Ok(placed)
    }

    /// Remove the positions `child` holds directly below `parent`, with
    /// their subtrees. Positions that only sit deeper below `parent` stay.
    /// Returns how many nodes were removed; 0 when `child` is no member.
    pub fn leave(&self, side: Side, child: &AclObject, parent: &AclObject) -> Result<usize> {
        let _tree = self.tree_guard()?;
        let s = self.registry.strategy();
        let mut removed = 0;
        for c in self.nodes(side, child)? {
            let q = Query::table(self.table(side.node())).filter(s.ancestry_condition("t", &c));
            let ancestors = self.store.find_all(&q)?.iter().map(Node::from_record).collect::<Result<Vec<_>>>()?;
            if immediate_parent(s, &c, &ancestors).map_or(false, |p| p.collection_id == parent.id) {
                removed += self.remove_subtree(side, &c)?;
            }
        }
        tracing::debug!(side = ?side, child = %child, parent = %parent, removed, "left");
        Ok(removed)
    }

    /// Nodes of the subtree rooted at `node`, `node` included
    fn subtree(&self, side: Side, node: &Node) -> Result<Vec<Node>> {
        let q = Query::table(self.table(side.node())).filter(self.registry.strategy().subtree_condition("t", node));
        self.store.find_all(&q)?.iter().map(Node::from_record).collect()
    }

    /// Permissions go first so a failure never leaves facts on missing nodes
    fn remove_subtree(&self, side: Side, node: &Node) -> Result<usize> {
        let nodes_table = self.table(side.node());
        let perm_table = self.table(Role::Permission);
        let q = Query::table(nodes_table).filter(self.registry.strategy().subtree_condition("t", node));
        let rows = self.store.find_all(&q)?;
        let ids: Vec<Value> = rows.iter().filter_map(|r| r.id()).map(Value::Int).collect();
        let perms = self.store.find_all(&Query::table(perm_table).filter(Condition::is_in(col("t", &side.field(ID)), ids)))?;
        for p in &perms {
            self.store.delete(perm_table, p)?;
        }
        for r in &rows {
            self.store.delete(nodes_table, r)?;
        }
        Ok(rows.len())
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Grant `actions` on `aco` to `grantee`, one fact per (grantee node,
    /// aco node, action). `owned` grants (auto permissions of a creator)
    /// skip the grant restrictions. Returns the number of new facts.
    pub fn grant(&self, actor: Option<&SubjectRef>, grantee: &AclObject, aco: &AclObject, actions: &ActionSet, owned: bool) -> Result<usize> {
        let actions = self.translate_actions(actions)?;
        if !owned {
            self.check_grant_restriction(actor, aco, &actions)?;
        }
        let _tree = self.tree_guard()?;
        let aro_nodes = self.nodes(Side::Aro, grantee)?;
        let aco_nodes = self.nodes(Side::Aco, aco)?;
        if aro_nodes.is_empty() || aco_nodes.is_empty() {
            return Err(AclError::Consistency(format!("cannot grant {} on {}: object without position", grantee, aco)));
        }

        let s = self.registry.strategy();
        let table = self.table(Role::Permission);
        let mut created = 0;
        for aro in &aro_nodes {
            for node in &aco_nodes {
                for action in &actions {
                    let exists = Query::table(table)
                        .where_eq(&Side::Aro.field(ID), aro.id)
                        .where_eq(&Side::Aco.field(ID), node.id)
                        .where_eq(ACTION_ID, action.id);
                    if self.store.find_one(&exists)?.is_some() {
                        continue;
                    }
                    let mut r = Record::new()
                        .with(&Side::Aro.field(ID), aro.id)
                        .with(&Side::Aco.field(ID), node.id)
                        .with(ACTION_ID, action.id);
                    for (k, v) in s.snapshot(Side::Aro, aro).into_iter().chain(s.snapshot(Side::Aco, node)) {
                        r.set(&k, v);
                    }
                    self.store.save(table, &mut r)?;
                    created += 1;
                }
            }
        }
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        tracing::debug!(grantee = %grantee, aco = %aco, actions = ?names, created, owned, "granted");
        Ok(created)
    }

    fn check_grant_restriction(&self, actor: Option<&SubjectRef>, aco: &AclObject, actions: &[Action]) -> Result<()> {
        let config = self.config();
        if !config.enable_grant_restriction && !config.enable_specific_grant_restriction {
            return Ok(());
        }
        let resource = match (&aco.model, aco.foreign_key) {
            (Some(m), Some(k)) => Resource::instance(m, k),
            (Some(m), None) => Resource::class(m),
            (None, _) => return Err(AclError::denied(GRANT, aco)),
        };
        let opts = ResolveOptions::default();
        if config.enable_grant_restriction && !self.resolve(actor, &resource, GRANT, opts)?.is_allowed() {
            return Err(AclError::denied(GRANT, &resource));
        }
        if config.enable_specific_grant_restriction {
            for a in actions {
                if !self.resolve(actor, &resource, &a.name, opts)?.is_allowed() {
                    return Err(AclError::denied(&format!("{} {}", GRANT, a.name), &resource));
                }
            }
        }
        Ok(())
    }

    /// Remove the facts granting `actions` on `aco` to `grantee`'s own nodes
    pub fn revoke(&self, grantee: &AclObject, aco: &AclObject, actions: &ActionSet) -> Result<usize> {
        let action_ids: Vec<Value> = self.translate_actions(actions)?.iter().map(|a| Value::Int(a.id)).collect();
        let aro_ids: Vec<Value> = self.nodes(Side::Aro, grantee)?.iter().map(|n| Value::Int(n.id)).collect();
        let aco_ids: Vec<Value> = self.nodes(Side::Aco, aco)?.iter().map(|n| Value::Int(n.id)).collect();
        let table = self.table(Role::Permission);
        let q = Query::table(table)
            .filter(Condition::is_in(col("t", &Side::Aro.field(ID)), aro_ids))
            .filter(Condition::is_in(col("t", &Side::Aco.field(ID)), aco_ids))
            .filter(Condition::is_in(col("t", ACTION_ID), action_ids));
        let mut removed = 0;
        for r in self.store.find_all(&q)? {
            if self.store.delete(table, &r)? {
                removed += 1;
            }
        }
        tracing::debug!(grantee = %grantee, aco = %aco, removed, "revoked");
        Ok(removed)
    }

    /// Facts attached to the object's own nodes on `side`
    pub fn permissions(&self, side: Side, obj: &AclObject) -> Result<Vec<Permission>> {
        let ids = Self::node_ids(&self.nodes(side, obj)?);
        let q = Query::table(self.table(Role::Permission)).filter(Condition::is_in(col("t", &side.field(ID)), ids));
        self.store.find_all(&q)?.iter().map(Permission::from_record).collect()
    }

    /// Ids of the given nodes as literal values
    pub(crate) fn node_ids(nodes: &[Node]) -> Vec<Value> {
        let mut seen = HashSet::new();
        nodes.iter().filter(|n| seen.insert(n.id)).map(|n| Value::Int(n.id)).collect()
    }

    /// `alias.field = value` shorthand for composed queries
    pub(crate) fn field_eq(alias: &str, field: &str, value: impl Into<Value>) -> Condition {
        Condition::eq(col(alias, field), lit(value))
    }
}

/// Closest strict ancestor of `node` among `candidates`
fn immediate_parent<'a>(s: &dyn TreeStrategy, node: &Node, candidates: &'a [Node]) -> Option<&'a Node> {
    candidates
        .iter()
        .filter(|a| a.id != node.id && s.is_ancestor_or_self(a, node))
        .fold(None, |best: Option<&'a Node>, a| match best {
            Some(b) if !s.is_ancestor_or_self(b, a) => Some(b),
            _ => Some(a),
        })
}

/// Ancestors before descendants
fn ordered_by_depth<'a>(s: &dyn TreeStrategy, nodes: &'a [Node]) -> Vec<&'a Node> {
    let depth = |n: &Node| nodes.iter().filter(|a| a.id != n.id && s.is_ancestor_or_self(a, n)).count();
    let mut out: Vec<&Node> = nodes.iter().collect();
    out.sort_by_key(|n| depth(n));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> Engine {
        let e = Engine::from_config(AclConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        e.install_default_actions().unwrap();
        e
    }

    #[test]
    fn install_is_idempotent() {
        let e = engine();
        let again = e.install_default_actions().unwrap();
        assert_eq!(again.len(), DEFAULT_ACTIONS.len());
        assert_eq!(e.translate_actions(&ActionSet::All).unwrap().len(), DEFAULT_ACTIONS.len());
    }

    #[test]
    fn unknown_action_is_fatal() {
        let e = engine();
        assert_eq!(e.action("fly").unwrap_err(), AclError::UnknownAction("fly".into()));
        assert!(e.translate_actions(&ActionSet::named(["read", "fly"])).is_err());
    }

    #[test]
    fn one_object_per_binding() {
        let e = engine();
        e.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
        assert!(matches!(
            e.create_object(Side::Aro, Some("User"), Some(1), None),
            Err(AclError::Consistency(_))
        ));
        e.create_group(Side::Aro, "Admins").unwrap();
        assert!(e.create_group(Side::Aro, "Admins").is_err());
    }

    #[test]
    fn class_object_is_distinct_from_instances() {
        let e = engine();
        let inst = e.create_object(Side::Aco, Some("Post"), Some(1), None).unwrap();
        assert_eq!(e.find_object(Side::Aco, "Post", None).unwrap(), None);
        let class = e.create_object(Side::Aco, Some("Post"), None, None).unwrap();
        assert_eq!(e.find_object(Side::Aco, "Post", None).unwrap(), Some(class));
        assert_eq!(e.find_object(Side::Aco, "Post", Some(1)).unwrap(), Some(inst));
    }

    #[test]
    fn join_rejects_cycles() {
        let e = engine();
        let a = e.create_group(Side::Aro, "A").unwrap();
        let b = e.create_group(Side::Aro, "B").unwrap();
        e.join(Side::Aro, &b, &a).unwrap();
        assert!(e.join(Side::Aro, &a, &b).is_err());
        assert!(e.join(Side::Aro, &a, &a).is_err());
    }

    #[test]
    fn join_copies_members_below_new_position() {
        let e = engine();
        let staff = e.create_group(Side::Aro, "Staff").unwrap();
        let editors = e.create_group(Side::Aro, "Editors").unwrap();
        let user = e.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
        e.join(Side::Aro, &user, &editors).unwrap();
        let placed = e.join(Side::Aro, &editors, &staff).unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(e.nodes(Side::Aro, &editors).unwrap().len(), 2);
        assert_eq!(e.nodes(Side::Aro, &user).unwrap().len(), 3);

        let s = e.registry().strategy();
        let staff_node = &e.nodes(Side::Aro, &staff).unwrap()[0];
        let below = e.positions(Side::Aro, &user, true).unwrap();
        assert!(below.iter().any(|n| n.id == staff_node.id));
        assert!(e.nodes(Side::Aro, &user).unwrap().iter().any(|n| s.is_ancestor_or_self(staff_node, n)));
    }

    #[test]
    fn positions_include_ancestors() {
        let e = engine();
        let staff = e.create_group(Side::Aro, "Staff").unwrap();
        let editors = e.create_group(Side::Aro, "Editors").unwrap();
        let user = e.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
        e.join(Side::Aro, &editors, &staff).unwrap();
        e.join(Side::Aro, &user, &editors).unwrap();

        let own = e.positions(Side::Aro, &user, false).unwrap();
        assert_eq!(own.len(), 3); // own root + under each editors node
        let all: HashSet<i64> = e.positions(Side::Aro, &user, true).unwrap().iter().map(|n| n.collection_id).collect();
        assert_eq!(all, HashSet::from([staff.id, editors.id, user.id]));
    }

    #[test]
    fn remove_object_cascades() {
        let e = engine();
        let user = e.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
        let post = e.create_object(Side::Aco, Some("Post"), Some(1), None).unwrap();
        assert_eq!(e.grant(None, &user, &post, &ActionSet::named(["read", "update"]), true).unwrap(), 2);
        assert_eq!(e.permissions(Side::Aro, &user).unwrap().len(), 2);
        e.remove_object(Side::Aco, &post).unwrap();
        assert!(e.permissions(Side::Aro, &user).unwrap().is_empty());
        let perms = e.store().find_all(&Query::table(e.table(Role::Permission))).unwrap();
        assert!(perms.is_empty());
        assert!(e.nodes(Side::Aco, &post).unwrap().is_empty());
        assert!(e.remove_object(Side::Aco, &post).is_err());
    }

    #[test]
    fn grant_is_idempotent_and_revocable() {
        let e = engine();
        let user = e.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
        let post = e.create_object(Side::Aco, Some("Post"), Some(1), None).unwrap();
        let read = ActionSet::named(["read"]);
        assert_eq!(e.grant(None, &user, &post, &read, false).unwrap(), 1);
        assert_eq!(e.grant(None, &user, &post, &read, false).unwrap(), 0);
        assert_eq!(e.revoke(&user, &post, &read).unwrap(), 1);
        assert_eq!(e.revoke(&user, &post, &read).unwrap(), 0);
    }

    #[test]
    fn bypass_guard_nests_and_releases() {
        let e = engine();
        assert!(!e.is_bypassed());
        {
            let _outer = e.bypass();
            let clone = e.clone();
            {
                let _inner = clone.bypass();
                assert!(e.is_bypassed());
            }
            assert!(e.is_bypassed());
        }
        assert!(!e.is_bypassed());
    }
}
