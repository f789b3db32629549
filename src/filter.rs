//! Read filters: the set-based counterpart of `resolve`
//!
//! A [`Filter`] restricts a query over an entity table to the rows whose Aco
//! the subject may act on. The entity is joined to its Aco (`acoC`), the Aco's
//! positions (`aco`) and the covering grant facts (`map`), deduplicated. The
//! engine only builds the condition; the store evaluates it.

use crate::condition::{col, Condition, Join, Query};
use crate::constants::{ACO_NODE_ALIAS, ACO_OBJECT_ALIAS, COLLECTION_ID, ENTITY_ALIAS, FOREIGN_KEY, ID, MAP_ALIAS, MODEL};
use crate::engine::{Engine, ResolveOptions};
use crate::error::Result;
use crate::model::SubjectRef;
use crate::registry::Role;

/// Joins and condition to attach to an entity query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub joins: Vec<Join>,
    pub condition: Condition,
    pub distinct: bool,
}

impl Filter {
    /// Every row passes
    pub fn unrestricted() -> Self {
        Filter { joins: Vec::new(), condition: Condition::True, distinct: false }
    }

    /// No row passes
    pub fn nothing() -> Self {
        Filter { joins: Vec::new(), condition: Condition::False, distinct: false }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.joins.is_empty() && self.condition == Condition::True
    }

    /// Attach to `query`, whose base alias must be `t`
    pub fn apply(self, query: Query) -> Query {
        let mut q = query;
        for j in self.joins {
            q = q.join(j);
        }
        q = q.filter(self.condition);
        if self.distinct {
            q = q.distinct();
        }
        q
    }
}

impl Engine {
    /// Filter selecting the rows of `class` on which the subject (or the
    /// guest group) may perform `action`. Agrees with `resolve` row by row
    /// for every row that has an Aco.
    pub fn build_filter(&self, subject: Option<&SubjectRef>, class: &str, action: &str, options: ResolveOptions) -> Result<Filter> {
        let act = self.action(action)?;

        if self.config().is_general(class, action) {
            tracing::debug!(class, action, "general permission, unrestricted filter");
            return Ok(Filter::unrestricted());
        }
        if self.is_bypassed() {
            return Ok(Filter::unrestricted());
        }
        let Some(aro) = self.subject_object(subject)? else {
            tracing::debug!(class, action, "no subject and no guest group, empty filter");
            return Ok(Filter::nothing());
        };
        let positions = self.subject_positions(&aro)?;
        if self.general_fact(class, &positions, &act, options)? {
            return Ok(Filter::unrestricted());
        }

        let on_object = Condition::all([
            Self::field_eq(ACO_OBJECT_ALIAS, MODEL, class),
            Condition::eq(col(ACO_OBJECT_ALIAS, FOREIGN_KEY), col(ENTITY_ALIAS, ID)),
        ]);
        let on_node = Condition::eq(col(ACO_NODE_ALIAS, COLLECTION_ID), col(ACO_OBJECT_ALIAS, ID));
        let joins = vec![
            Join::inner(self.table(Role::Aco), ACO_OBJECT_ALIAS, on_object),
            Join::inner(self.table(Role::AcoNode), ACO_NODE_ALIAS, on_node),
            Join::inner(self.table(Role::Permission), MAP_ALIAS, self.mapping_condition(&positions, &act, options)),
        ];
        tracing::debug!(subject = %aro, class, action, positions = positions.len(), "built filter");
        Ok(Filter { joins, condition: Condition::True, distinct: true })
    }
}
