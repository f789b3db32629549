//! Authorization hooks around the persistence lifecycle of protected entities
//!
//! The hosting data layer calls these before reads, writes and deletes and
//! after creation. A domain type opts in by implementing [`Protectable`]; the
//! acting subject comes from a [`SubjectContext`].

use crate::condition::Query;
use crate::config::ActionSet;
use crate::constants::{CREATE, DELETE, READ, UPDATE};
use crate::engine::{Engine, ResolveOptions};
use crate::error::{AclError, Result};
use crate::model::{AclObject, Resource, SubjectRef};
use crate::registry::Side;
use crate::resolver::PermittedSubject;

/// A domain entity under access control
pub trait Protectable {
    /// Entity class, e.g. `"Post"`
    fn model(&self) -> &str;

    /// `None` until the record is persisted
    fn primary_key(&self) -> Option<i64>;

    /// Actions granted to the creator; `None` defers to configuration
    fn auto_permissions(&self) -> Option<ActionSet> {
        None
    }
}

/// Supplies the acting subject, `None` when nobody is signed in
pub trait SubjectContext {
    fn current_subject(&self) -> Option<SubjectRef>;
}

impl SubjectContext for Option<SubjectRef> {
    fn current_subject(&self) -> Option<SubjectRef> {
        self.clone()
    }
}

impl SubjectContext for SubjectRef {
    fn current_subject(&self) -> Option<SubjectRef> {
        Some(self.clone())
    }
}

fn instance<E: Protectable + ?Sized>(entity: &E) -> Result<Resource> {
    entity
        .primary_key()
        .map(|k| Resource::instance(entity.model(), k))
        .ok_or_else(|| AclError::Consistency(format!("{} record has no primary key", entity.model())))
}

pub struct AuthorizationHooks<'a, C: ?Sized> {
    engine: &'a Engine,
    context: &'a C,
    options: ResolveOptions,
}

impl<'a, C: SubjectContext + ?Sized> AuthorizationHooks<'a, C> {
    pub fn new(engine: &'a Engine, context: &'a C) -> Self {
        AuthorizationHooks { engine, context, options: ResolveOptions::default() }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Restrict `query` over `model` rows to the readable ones. The base
    /// condition of `query` is kept and ANDed with the filter.
    pub fn pre_read(&self, model: &str, query: Query) -> Result<Query> {
        let subject = self.context.current_subject();
        let filter = self.engine.build_filter(subject.as_ref(), model, READ, self.options)?;
        Ok(filter.apply(query))
    }

    /// `create` on the class for new records, `update` on the instance
    /// otherwise
    pub fn pre_write<E: Protectable + ?Sized>(&self, entity: &E, is_new: bool) -> Result<()> {
        let subject = self.context.current_subject();
        if is_new {
            self.engine.check(subject.as_ref(), &Resource::class(entity.model()), CREATE, self.options)
        } else {
            self.engine.check(subject.as_ref(), &instance(entity)?, UPDATE, self.options)
        }
    }

    /// Check `delete`, then remove the entity's Aco with all its positions
    /// and grants. A missing Aco or a failed removal is a fault.
    pub fn pre_delete<E: Protectable + ?Sized>(&self, entity: &E) -> Result<()> {
        let resource = instance(entity)?;
        if self.engine.config().is_general(entity.model(), DELETE) {
            tracing::debug!(%resource, "delete generally permitted");
        } else {
            let subject = self.context.current_subject();
            self.engine.check(subject.as_ref(), &resource, DELETE, self.options)?;
        }

        let aco = self
            .engine
            .find_resource(&resource)?
            .ok_or_else(|| AclError::Consistency(format!("no Aco for {}", resource)))?;
        self.engine
            .remove_object(Side::Aco, &aco)
            .map_err(|e| AclError::Consistency(format!("unable to delete Aco of {}: {}", resource, e)))
    }

    /// Provision the Aco of a freshly committed record and grant the auto
    /// permissions to the current subject (or the guest group). A failure
    /// leaves no Aco behind and is a fault: the caller must roll back the
    /// record.
    pub fn post_create<E: Protectable + ?Sized>(&self, entity: &E) -> Result<AclObject> {
        let resource = instance(entity)?;
        let aco = self
            .engine
            .create_object(Side::Aco, Some(entity.model()), resource.foreign_key(), None)
            .map_err(|e| AclError::Consistency(format!("unable to create Aco for new {}: {}", resource, e)))?;

        let subject = self.context.current_subject();
        let grantee = match self.engine.subject_object(subject.as_ref()) {
            Ok(Some(aro)) => aro,
            Ok(None) => {
                tracing::warn!(%resource, "no subject and no guest group, created without auto permissions");
                return Ok(aco);
            }
            Err(e) => return Err(self.compensate(&aco, &resource, e)),
        };

        let actions = entity
            .auto_permissions()
            .unwrap_or_else(|| self.engine.config().auto_permissions_for(entity.model()).clone());
        match self.engine.grant(subject.as_ref(), &grantee, &aco, &actions, true) {
            Ok(n) => {
                tracing::debug!(%resource, owner = %grantee, granted = n, "protected new record");
                Ok(aco)
            }
            Err(e) => Err(self.compensate(&aco, &resource, e)),
        }
    }

    fn compensate(&self, aco: &AclObject, resource: &Resource, cause: AclError) -> AclError {
        if let Err(e) = self.engine.remove_object(Side::Aco, aco) {
            tracing::error!(%resource, error = %e, "could not roll back Aco");
        }
        AclError::Consistency(format!("unable to grant auto permissions on {}: {}", resource, cause))
    }

    /// Subjects holding one of `actions` directly on the entity
    pub fn directly_permitted<E: Protectable + ?Sized>(&self, entity: &E, actions: &ActionSet) -> Result<Vec<PermittedSubject>> {
        self.engine.directly_permitted(&instance(entity)?, actions)
    }

    /// May the current subject perform `action` on the entity (on its class
    /// while unsaved)
    pub fn grants<E: Protectable + ?Sized>(&self, entity: &E, action: &str) -> Result<bool> {
        let resource = match entity.primary_key() {
            Some(k) => Resource::instance(entity.model(), k),
            None => Resource::class(entity.model()),
        };
        let subject = self.context.current_subject();
        Ok(self.engine.resolve(subject.as_ref(), &resource, action, self.options)?.is_allowed())
    }
}
