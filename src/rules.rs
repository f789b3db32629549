//! Business rules: application predicates that can veto an allow
//!
//! Rules never widen access. They run after a grant was found, for every
//! action except `read`, and only when `enable_business_rules` is set.

use crate::config::RuleLookup;
use crate::constants::READ;
use crate::model::{AclObject, Resource};
use crate::registry::Side;

/// What a rule gets to look at
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Side the rule is consulted for
    pub side: Side,
    pub subject: &'a AclObject,
    pub resource: &'a Resource,
    pub action: &'a str,
}

pub trait BusinessRule: Send + Sync {
    fn name(&self) -> &str;

    /// False vetoes the allow
    fn evaluate(&self, ctx: &RuleContext<'_>) -> bool;
}

/// Any `Fn(&RuleContext) -> bool` is a rule
pub struct FnRule<F> {
    name: String,
    f: F,
}

impl<F> FnRule<F>
where
    F: Fn(&RuleContext<'_>) -> bool + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        FnRule { name: name.to_string(), f }
    }
}

impl<F> BusinessRule for FnRule<F>
where
    F: Fn(&RuleContext<'_>) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> bool {
        (self.f)(ctx)
    }
}

pub(crate) fn sides(lookup: RuleLookup) -> &'static [Side] {
    match lookup {
        RuleLookup::Both => &[Side::Aro, Side::Aco],
        RuleLookup::SubjectSide => &[Side::Aro],
        RuleLookup::ResourceSide => &[Side::Aco],
    }
}

/// Whether rules take part in a check of `action`
pub(crate) fn applies(enabled: bool, action: &str) -> bool {
    enabled && action != READ
}
