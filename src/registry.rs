//! Binding of abstract roles to concrete tables
//!
//! Built once at process start from the configuration, then shared read-only.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{AclConfig, StrategyKind};
use crate::error::{AclError, Result};
use crate::tree::{NestedSet, PathMaterialization, TreeStrategy};

/// Abstract record roles the engine reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Aro,
    Aco,
    AroNode,
    AcoNode,
    Permission,
    Action,
}

impl Role {
    pub const ALL: [Role; 6] = [Role::Aro, Role::Aco, Role::AroNode, Role::AcoNode, Role::Permission, Role::Action];

    pub fn name(self) -> &'static str {
        match self {
            Role::Aro => "Aro",
            Role::Aco => "Aco",
            Role::AroNode => "AroNode",
            Role::AcoNode => "AcoNode",
            Role::Permission => "Permission",
            Role::Action => "Action",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Subject tree or resource tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Aro,
    Aco,
}

impl Side {
    pub fn object(self) -> Role {
        match self {
            Side::Aro => Role::Aro,
            Side::Aco => Role::Aco,
        }
    }

    pub fn node(self) -> Role {
        match self {
            Side::Aro => Role::AroNode,
            Side::Aco => Role::AcoNode,
        }
    }

    /// Name of a Permission column referring to this side, e.g. `aco_path`
    pub fn field(self, name: &str) -> String {
        match self {
            Side::Aro => format!("aro_{}", name),
            Side::Aco => format!("aco_{}", name),
        }
    }
}

/// Role bindings, engine configuration and tree strategy
pub struct Registry {
    config: AclConfig,
    tables: HashMap<Role, String>,
    strategy: Arc<dyn TreeStrategy>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tables", &self.tables)
            .field("strategy", &self.strategy.kind())
            .finish()
    }
}

impl Registry {
    /// Bind every role to `{prefix}{Role}` and pick the configured strategy
    pub fn from_config(config: AclConfig) -> Result<Self> {
        config.validate()?;
        let mut b = RegistryBuilder::new(config.clone());
        for role in Role::ALL {
            b = b.bind(role, &format!("{}{}", config.prefix, role.name()));
        }
        b.build()
    }

    pub fn builder(config: AclConfig) -> RegistryBuilder {
        RegistryBuilder::new(config)
    }

    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    pub fn strategy(&self) -> &dyn TreeStrategy {
        self.strategy.as_ref()
    }

    /// Bound table for a role. Every role is bound once built.
    pub fn table(&self, role: Role) -> &str {
        self.tables.get(&role).map(String::as_str).unwrap_or_default()
    }
}

/// Explicit registration of tables and strategy
pub struct RegistryBuilder {
    config: AclConfig,
    tables: HashMap<Role, String>,
    strategy: Option<Arc<dyn TreeStrategy>>,
}

impl RegistryBuilder {
    pub fn new(config: AclConfig) -> Self {
        RegistryBuilder { config, tables: HashMap::new(), strategy: None }
    }

    pub fn bind(mut self, role: Role, table: &str) -> Self {
        self.tables.insert(role, table.to_string());
        self
    }

    /// Overrides the strategy named in the configuration
    pub fn strategy(mut self, strategy: Arc<dyn TreeStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Fails if any role is unbound or two roles share a table
    pub fn build(self) -> Result<Registry> {
        self.config.validate()?;
        for role in Role::ALL {
            match self.tables.get(&role) {
                Some(t) if !t.is_empty() => {}
                _ => return Err(AclError::Unbound(role)),
            }
        }
        let mut seen: HashMap<&str, Role> = HashMap::new();
        for role in Role::ALL {
            let t = self.tables[&role].as_str();
            if let Some(other) = seen.insert(t, role) {
                return Err(AclError::Configuration(format!("{} and {} both bound to '{}'", other, role, t)));
            }
        }
        let strategy = match self.strategy {
            Some(s) => s,
            None => match self.config.strategy {
                StrategyKind::NestedSet => Arc::new(NestedSet) as Arc<dyn TreeStrategy>,
                StrategyKind::PathMaterialization => Arc::new(PathMaterialization),
            },
        };
        if strategy.kind() != self.config.strategy {
            tracing::warn!(configured = ?self.config.strategy, used = ?strategy.kind(), "strategy override differs from configuration");
        }
        Ok(Registry { config: self.config, tables: self.tables, strategy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_binds_every_role() {
        let r = Registry::from_config(AclConfig::default()).unwrap();
        assert_eq!(r.table(Role::Aro), "PmAro");
        assert_eq!(r.table(Role::AcoNode), "PmAcoNode");
        assert_eq!(r.table(Role::Permission), "PmPermission");
        assert_eq!(r.strategy().kind(), StrategyKind::PathMaterialization);
    }

    #[test]
    fn missing_binding_is_a_configuration_fault() {
        let e = Registry::builder(AclConfig::default())
            .bind(Role::Aro, "aro")
            .bind(Role::Aco, "aco")
            .build()
            .unwrap_err();
        assert_eq!(e, AclError::Unbound(Role::AroNode));
    }

    #[test]
    fn shared_table_is_rejected() {
        let mut b = Registry::builder(AclConfig::default());
        for role in Role::ALL {
            b = b.bind(role, role.name());
        }
        assert!(b.bind(Role::Action, "Permission").build().is_err());
    }

    #[test]
    fn side_fields() {
        assert_eq!(Side::Aco.field("path"), "aco_path");
        assert_eq!(Side::Aro.node(), Role::AroNode);
    }
}
