//! Action names, field names and shipped defaults

// Built-in action names
pub const CREATE: &str = "create";
pub const READ: &str = "read";
pub const UPDATE: &str = "update";
pub const DELETE: &str = "delete";
pub const GRANT: &str = "grant";

/// Actions installed by `Engine::install_default_actions`
pub const DEFAULT_ACTIONS: &[&str] = &[CREATE, READ, UPDATE, DELETE, GRANT];

/// Wildcard accepted wherever an action set is configured
pub const ALL_ACTIONS: &str = "*";

// Shipped configuration defaults
pub const DEFAULT_PREFIX: &str = "Pm";
pub const DEFAULT_GUEST_GROUP: &str = "Guest";
pub const DEFAULT_GENERAL_PERMISSIONS: &[&str] = &[CREATE];

// Record fields shared by all roles
pub const ID: &str = "id";
pub const MODEL: &str = "model";
pub const FOREIGN_KEY: &str = "foreign_key";
pub const ALIAS: &str = "alias";
pub const NAME: &str = "name";
pub const COLLECTION_ID: &str = "collection_id";
pub const ACTION_ID: &str = "action_id";

// Positional fields (nested set / materialized path)
pub const LFT: &str = "lft";
pub const RGT: &str = "rgt";
pub const PATH: &str = "path";

/// Separator between node ids in a materialized path
pub const PATH_DELIMITER: char = '/';

// Aliases used when composing queries
pub const ENTITY_ALIAS: &str = "t";
pub const ACO_OBJECT_ALIAS: &str = "acoC";
pub const ACO_NODE_ALIAS: &str = "aco";
pub const MAP_ALIAS: &str = "map";
pub const ARO_NODE_ALIAS: &str = "n";
