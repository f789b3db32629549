//! Engine configuration
//!
//! Loaded once at process start and shared read-only afterwards. Every key is
//! optional; missing keys take the shipped defaults.
//!
//! ```toml
//! prefix = "Pm"
//! strict_mode = false
//! guest_group = "Guest"
//! strategy = "path_materialization"
//! auto_permissions = "*"
//! general_permissions = ["create"]
//! # guest_group = "" switches the guest fallback off
//!
//! [class_auto_permissions]
//! Invoice = ["read"]
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{ALL_ACTIONS, DEFAULT_GENERAL_PERMISSIONS, DEFAULT_GUEST_GROUP, DEFAULT_PREFIX};
use crate::error::{err, AclError, Result};

/// A set of action names, or every installed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ActionSetRepr", into = "ActionSetRepr")]
pub enum ActionSet {
    All,
    Named(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ActionSetRepr {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<ActionSetRepr> for ActionSet {
    type Error = String;

    fn try_from(r: ActionSetRepr) -> std::result::Result<Self, Self::Error> {
        match r {
            ActionSetRepr::One(s) if s == ALL_ACTIONS => Ok(ActionSet::All),
            ActionSetRepr::One(s) if s.trim().is_empty() => Err("empty action name".into()),
            ActionSetRepr::One(s) => Ok(ActionSet::Named(vec![s])),
            ActionSetRepr::Many(v) if v.iter().any(|s| s == ALL_ACTIONS) => Ok(ActionSet::All),
            ActionSetRepr::Many(v) => Ok(ActionSet::Named(v)),
        }
    }
}

impl From<ActionSet> for ActionSetRepr {
    fn from(s: ActionSet) -> Self {
        match s {
            ActionSet::All => ActionSetRepr::One(ALL_ACTIONS.to_string()),
            ActionSet::Named(v) => ActionSetRepr::Many(v),
        }
    }
}

impl ActionSet {
    pub fn named<I: IntoIterator<Item = S>, S: Into<String>>(names: I) -> Self {
        ActionSet::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, action: &str) -> bool {
        match self {
            ActionSet::All => true,
            ActionSet::Named(v) => v.iter().any(|a| a == action),
        }
    }
}

/// Which tree representation positions use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    NestedSet,
    PathMaterialization,
}

/// Side(s) on which business rules are consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLookup {
    Both,
    #[serde(alias = "aro")]
    SubjectSide,
    #[serde(alias = "aco")]
    ResourceSide,
}

/// Configuration surface of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AclConfig {
    /// Prefix of the bound table names (`{prefix}Aro`, `{prefix}AcoNode`, ...)
    pub prefix: String,
    /// Missing objects are faults instead of being created on the fly
    pub strict_mode: bool,
    /// Alias of the Aro used when no subject can be determined
    pub guest_group: Option<String>,
    pub strategy: StrategyKind,
    /// Positions of a subject include the ancestors of its nodes
    pub subject_inheritance: bool,
    /// Class-level grants act as general permissions
    pub enable_general_permissions: bool,
    /// Consult business rules for every action except read
    pub enable_business_rules: bool,
    pub lookup_business_rules: RuleLookup,
    /// Actions granted to the creator of a new object
    pub auto_permissions: ActionSet,
    pub class_auto_permissions: HashMap<String, ActionSet>,
    /// Granting requires the granter to hold `grant` on the object
    pub enable_grant_restriction: bool,
    /// Granting requires the granter to hold every granted action
    pub enable_specific_grant_restriction: bool,
    /// Actions every subject may perform on every class
    pub general_permissions: ActionSet,
    pub class_general_permissions: HashMap<String, ActionSet>,
}

impl Default for AclConfig {
    fn default() -> Self {
        AclConfig {
            prefix: DEFAULT_PREFIX.to_string(),
            strict_mode: false,
            guest_group: Some(DEFAULT_GUEST_GROUP.to_string()),
            strategy: StrategyKind::PathMaterialization,
            subject_inheritance: true,
            enable_general_permissions: false,
            enable_business_rules: false,
            lookup_business_rules: RuleLookup::Both,
            auto_permissions: ActionSet::All,
            class_auto_permissions: HashMap::new(),
            enable_grant_restriction: false,
            enable_specific_grant_restriction: false,
            general_permissions: ActionSet::named(DEFAULT_GENERAL_PERMISSIONS.iter().copied()),
            class_general_permissions: HashMap::new(),
        }
    }
}

impl AclConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: AclConfig = toml::from_str(s).map_err(|e| AclError::Configuration(e.to_string()))?;
        // TOML has no null: an empty alias switches the guest fallback off
        if config.guest_group.as_deref().map_or(false, |g| g.trim().is_empty()) {
            config.guest_group = None;
        }
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(err)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.trim().is_empty() {
            return Err(AclError::Configuration("prefix must not be empty".into()));
        }
        if self.guest_group.as_deref().map_or(false, |g| g.trim().is_empty()) {
            return Err(AclError::Configuration("guest_group must be a non-empty alias or absent".into()));
        }
        Ok(())
    }

    /// Does the configuration grant `action` on `class` to everybody
    pub fn is_general(&self, class: &str, action: &str) -> bool {
        self.general_permissions.contains(action)
            || self.class_general_permissions.get(class).map_or(false, |s| s.contains(action))
    }

    /// Auto permissions for `class`, honoring the per-class override
    pub fn auto_permissions_for(&self, class: &str) -> &ActionSet {
        self.class_auto_permissions.get(class).unwrap_or(&self.auto_permissions)
    }
}
