//! Permission resolution
//!
//! Order of checks for `resolve(subject, resource, action)`:
//! 1. configured general permission for (class, action)
//! 2. active bypass
//! 3. subject, else the guest group, else deny
//! 4. subject grant on the class-level Aco (`enable_general_permissions`)
//! 5. grant on one of the resource's positions, inherited unless disabled
//! 6. business rules may veto an allow

use crate::condition::{col, Condition, Join, Query};
use crate::config::ActionSet;
use crate::constants::{ACO_NODE_ALIAS, ACTION_ID, ALIAS, ARO_NODE_ALIAS, COLLECTION_ID, ENTITY_ALIAS, FOREIGN_KEY, ID, MAP_ALIAS, MODEL};
use crate::engine::{Engine, ResolveOptions};
use crate::error::{AclError, Result};
use crate::model::{AclObject, Action, Decision, Resource, SubjectRef};
use crate::record::{Record, Value};
use crate::registry::{Role, Side};
use crate::rules::{self, RuleContext};

/// A subject holding a direct grant on a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermittedSubject {
    pub collection_id: i64,
    pub model: Option<String>,
    pub foreign_key: Option<i64>,
    pub alias: Option<String>,
    pub action_id: i64,
}

impl PermittedSubject {
    fn from_record(r: &Record) -> Result<Self> {
        Ok(PermittedSubject {
            collection_id: r.require_int(COLLECTION_ID)?,
            model: r.text(MODEL).map(str::to_string),
            foreign_key: r.int(FOREIGN_KEY),
            alias: r.text(ALIAS).map(str::to_string),
            action_id: r.require_int(ACTION_ID)?,
        })
    }
}

impl Engine {
    /// Decide whether `subject` (or the guest group when `None`) may perform
    /// `action` on `resource`. Faults (unknown action, missing Aco in strict
    /// mode, store errors) are errors, never a deny.
    pub fn resolve(&self, subject: Option<&SubjectRef>, resource: &Resource, action: &str, options: ResolveOptions) -> Result<Decision> {
        let act = self.action(action)?;
        let class = resource.model();

        if self.config().is_general(class, action) {
            tracing::debug!(class, action, "general permission");
            return Ok(Decision::Allow);
        }
        if self.is_bypassed() {
            tracing::debug!(%resource, action, "bypassed");
            return Ok(Decision::Allow);
        }

        let Some(aro) = self.subject_object(subject)? else {
            tracing::debug!(%resource, action, "no subject and no guest group");
            return Ok(Decision::Deny);
        };
        let positions = self.subject_positions(&aro)?;

        if self.general_fact(class, &positions, &act, options)? {
            tracing::debug!(subject = %aro, class, action, "general grant");
            return Ok(Decision::Allow);
        }

        let aco = match resource {
            Resource::Class(_) => self.find_object(Side::Aco, class, None)?,
            Resource::Instance { foreign_key, .. } => match self.find_resource(resource)? {
                Some(o) => Some(o),
                None if self.config().strict_mode => {
                    return Err(AclError::Consistency(format!("no Aco for {}", resource)));
                }
                None => {
                    tracing::debug!(%resource, "creating missing Aco");
                    self.create_object(Side::Aco, Some(class), Some(*foreign_key), None)?;
                    None
                }
            },
        };
        let Some(aco) = aco else {
            return Ok(Decision::Deny);
        };

        let mut allowed = self.has_grant(&aco, &positions, &act, options)?;
        if allowed && !self.rules_pass(&aro, resource, action) {
            tracing::debug!(subject = %aro, %resource, action, "vetoed by business rule");
            allowed = false;
        }
        tracing::debug!(subject = %aro, %resource, action, allowed, "resolved");
        Ok(allowed.into())
    }

    /// `resolve` with default options, as a bool
    pub fn may(&self, subject: Option<&SubjectRef>, resource: &Resource, action: &str) -> Result<bool> {
        Ok(self.resolve(subject, resource, action, ResolveOptions::default())?.is_allowed())
    }

    /// `resolve`, turning a deny into [`AclError::Denied`]
    pub fn check(&self, subject: Option<&SubjectRef>, resource: &Resource, action: &str, options: ResolveOptions) -> Result<()> {
        match self.resolve(subject, resource, action, options)? {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AclError::denied(action, resource)),
        }
    }

    /// Subjects with a grant of one of `actions` on the resource's positions
    /// or their ancestors. The subject's own nodes only, no subject-side
    /// inheritance.
    pub fn directly_permitted(&self, resource: &Resource, actions: &ActionSet) -> Result<Vec<PermittedSubject>> {
        let Some(aco) = self.find_resource(resource)? else {
            if self.config().strict_mode {
                return Err(AclError::Consistency(format!("no Aco for {}", resource)));
            }
            return Ok(Vec::new());
        };
        let aco_ids = Self::node_ids(&self.positions(Side::Aco, &aco, true)?);
        let action_ids: Vec<Value> = self.translate_actions(actions)?.iter().map(|a| Value::Int(a.id)).collect();

        let on_node = Condition::eq(col(ARO_NODE_ALIAS, COLLECTION_ID), col(ENTITY_ALIAS, ID));
        let on_map = Condition::all([
            Condition::eq(col(MAP_ALIAS, &Side::Aro.field(ID)), col(ARO_NODE_ALIAS, ID)),
            Condition::is_in(col(MAP_ALIAS, &Side::Aco.field(ID)), aco_ids),
            Condition::is_in(col(MAP_ALIAS, ACTION_ID), action_ids),
        ]);
        let q = Query::table(self.table(Role::Aro))
            .join(Join::inner(self.table(Role::AroNode), ARO_NODE_ALIAS, on_node))
            .join(Join::inner(self.table(Role::Permission), MAP_ALIAS, on_map))
            .select(ENTITY_ALIAS, ID, COLLECTION_ID)
            .select(ENTITY_ALIAS, FOREIGN_KEY, FOREIGN_KEY)
            .select(ENTITY_ALIAS, MODEL, MODEL)
            .select(ENTITY_ALIAS, ALIAS, ALIAS)
            .select(MAP_ALIAS, ACTION_ID, ACTION_ID)
            .distinct();
        self.store().find_all(&q)?.iter().map(PermittedSubject::from_record).collect()
    }

    // ========================================================================
    // Building blocks shared with the filter builder
    // ========================================================================

    /// The subject's Aro; unknown subjects are created on the fly unless
    /// strict, in which case the guest group stands in
    pub(crate) fn subject_object(&self, subject: Option<&SubjectRef>) -> Result<Option<AclObject>> {
        if let Some(s) = subject {
            if let Some(aro) = self.find_subject(s)? {
                return Ok(Some(aro));
            }
            if !self.config().strict_mode {
                tracing::debug!(subject = %s, "creating missing Aro");
                return self.create_subject(s).map(Some);
            }
            tracing::debug!(subject = %s, "unknown subject, falling back to guest group");
        }
        self.guest()
    }

    /// Aro of the configured guest group, if any
    pub fn guest(&self) -> Result<Option<AclObject>> {
        match self.config().guest_group.as_deref() {
            Some(alias) => self.find_by_alias(Side::Aro, alias),
            None => Ok(None),
        }
    }

    pub(crate) fn subject_positions(&self, aro: &AclObject) -> Result<Vec<Value>> {
        let nodes = self.positions(Side::Aro, aro, self.config().subject_inheritance)?;
        Ok(Self::node_ids(&nodes))
    }

    /// Join condition of the Permission alias onto the Aco node alias
    pub(crate) fn mapping_condition(&self, positions: &[Value], action: &Action, options: ResolveOptions) -> Condition {
        let tree = self
            .registry()
            .strategy()
            .build_tree_join_condition(ACO_NODE_ALIAS, MAP_ALIAS, Side::Aco, options.disable_inheritance);
        Condition::all([
            tree,
            Condition::is_in(col(MAP_ALIAS, &Side::Aro.field(ID)), positions.to_vec()),
            Self::field_eq(MAP_ALIAS, ACTION_ID, action.id),
        ])
    }

    fn has_grant(&self, aco: &AclObject, positions: &[Value], action: &Action, options: ResolveOptions) -> Result<bool> {
        if positions.is_empty() {
            return Ok(false);
        }
        let q = Query::aliased(self.table(Role::AcoNode), ACO_NODE_ALIAS)
            .join(Join::inner(self.table(Role::Permission), MAP_ALIAS, self.mapping_condition(positions, action, options)))
            .filter(Self::field_eq(ACO_NODE_ALIAS, COLLECTION_ID, aco.id));
        Ok(self.store().find_one(&q)?.is_some())
    }

    /// Grant on the class-level Aco counting for every instance
    pub(crate) fn general_fact(&self, class: &str, positions: &[Value], action: &Action, options: ResolveOptions) -> Result<bool> {
        if !self.config().enable_general_permissions {
            return Ok(false);
        }
        match self.find_object(Side::Aco, class, None)? {
            Some(aco) => self.has_grant(&aco, positions, action, options),
            None => Ok(false),
        }
    }

    fn rules_pass(&self, aro: &AclObject, resource: &Resource, action: &str) -> bool {
        let config = self.config();
        if !rules::applies(config.enable_business_rules, action) {
            return true;
        }
        rules::sides(config.lookup_business_rules).iter().all(|&side| {
            let ctx = RuleContext { side, subject: aro, resource, action };
            self.rules().iter().all(|r| {
                let ok = r.evaluate(&ctx);
                if !ok {
                    tracing::debug!(rule = r.name(), side = ?side, "rule failed");
                }
                ok
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::AclConfig;
    use crate::store::MemoryStore;

    fn engine(config: AclConfig) -> Engine {
        let e = Engine::from_config(config, Arc::new(MemoryStore::new())).unwrap();
        e.install_default_actions().unwrap();
        e
    }

    fn user(id: i64) -> SubjectRef {
        SubjectRef::entity("User", id)
    }

    #[test]
    fn unknown_action_is_a_fault_not_a_deny() {
        let e = engine(AclConfig::default());
        let r = e.resolve(Some(&user(1)), &Resource::instance("Post", 1), "publish", ResolveOptions::default());
        assert_eq!(r, Err(AclError::UnknownAction("publish".into())));
    }

    #[test]
    fn general_permission_needs_no_facts() {
        let e = engine(AclConfig::default());
        assert!(e.may(None, &Resource::class("Post"), "create").unwrap());
        assert!(!e.may(None, &Resource::class("Post"), "read").unwrap());
    }

    #[test]
    fn direct_grant_allows() {
        let e = engine(AclConfig::default());
        let aro = e.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
        let aco = e.create_object(Side::Aco, Some("Post"), Some(1), None).unwrap();
        e.grant(None, &aro, &aco, &ActionSet::named(["read"]), false).unwrap();
        let post = Resource::instance("Post", 1);
        assert!(e.may(Some(&user(1)), &post, "read").unwrap());
        assert!(!e.may(Some(&user(1)), &post, "update").unwrap());
        assert!(!e.may(Some(&user(2)), &post, "read").unwrap());
    }

    #[test]
    fn strict_mode_missing_aco_is_a_fault() {
        let e = engine(AclConfig { strict_mode: true, ..AclConfig::default() });
        let r = e.resolve(Some(&user(1)), &Resource::instance("Post", 9), "read", ResolveOptions::default());
        assert!(matches!(r, Err(AclError::Consistency(_))));
    }

    #[test]
    fn lenient_mode_creates_missing_objects() {
        let e = engine(AclConfig::default());
        assert!(!e.may(Some(&user(1)), &Resource::instance("Post", 9), "read").unwrap());
        assert!(e.find_object(Side::Aco, "Post", Some(9)).unwrap().is_some());
        assert!(e.find_subject(&user(1)).unwrap().is_some());
    }

    #[test]
    fn bypass_allows_everything_while_held() {
        let e = engine(AclConfig::default());
        let post = Resource::instance("Post", 1);
        {
            let _g = e.bypass();
            assert!(e.may(None, &post, "delete").unwrap());
        }
        assert!(!e.may(None, &post, "delete").unwrap());
    }

    #[test]
    fn check_reports_denial() {
        let e = engine(AclConfig::default());
        let err = e.check(None, &Resource::instance("Post", 1), "update", ResolveOptions::default()).unwrap_err();
        assert!(err.is_denied());
    }
}
