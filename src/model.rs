//! Typed views of the ACL records
//!
//! - `AclObject`: an Aro or Aco, the collection its nodes belong to
//! - `Node`: one tree position of an object
//! - `Action`: named operation
//! - `Permission`: (aro node, aco node, action) grant fact

use std::fmt;

use crate::constants::{ACTION_ID, ALIAS, COLLECTION_ID, FOREIGN_KEY, ID, LFT, MODEL, NAME, PATH, RGT};
use crate::error::{AclError, Result};
use crate::record::Record;
use crate::registry::Side;

/// Aro or Aco: the permission-bearing identity of a subject or resource.
/// Its nodes reference it through `collection_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclObject {
    pub id: i64,
    /// Class of the bound entity; `None` for standalone groups
    pub model: Option<String>,
    pub foreign_key: Option<i64>,
    pub alias: Option<String>,
}

impl AclObject {
    pub fn from_record(r: &Record) -> Result<Self> {
        Ok(AclObject {
            id: r.require_int(ID)?,
            model: r.text(MODEL).map(str::to_string),
            foreign_key: r.int(FOREIGN_KEY),
            alias: r.text(ALIAS).map(str::to_string),
        })
    }

    pub fn to_record(&self) -> Record {
        Record::new()
            .with(ID, self.id)
            .with(MODEL, self.model.clone())
            .with(FOREIGN_KEY, self.foreign_key)
            .with(ALIAS, self.alias.clone())
    }
}

impl fmt::Display for AclObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.model, self.foreign_key, &self.alias) {
            (_, _, Some(alias)) => write!(f, "{}", alias),
            (Some(m), Some(k), None) => write!(f, "{}#{}", m, k),
            (Some(m), None, None) => write!(f, "{}", m),
            (None, _, None) => write!(f, "#{}", self.id),
        }
    }
}

/// Strategy-specific location of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Nested set interval `[lft, rgt]`
    Interval { lft: i64, rgt: i64 },
    /// Materialized path of node ids, own id included, e.g. `1/4/9/`
    Path(String),
}

/// A tree position of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: i64,
    pub collection_id: i64,
    pub position: Position,
}

impl Node {
    pub fn from_record(r: &Record) -> Result<Self> {
        let position = match (r.text(PATH), r.int(LFT), r.int(RGT)) {
            (Some(p), _, _) => Position::Path(p.to_string()),
            (None, Some(lft), Some(rgt)) => Position::Interval { lft, rgt },
            _ => return Err(AclError::Malformed(format!("node {:?} has no position", r.id()))),
        };
        Ok(Node { id: r.require_int(ID)?, collection_id: r.require_int(COLLECTION_ID)?, position })
    }

    pub fn to_record(&self) -> Record {
        let r = Record::new().with(ID, self.id).with(COLLECTION_ID, self.collection_id);
        match &self.position {
            Position::Interval { lft, rgt } => r.with(LFT, *lft).with(RGT, *rgt),
            Position::Path(p) => r.with(PATH, p.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: i64,
    pub name: String,
}

impl Action {
    pub fn from_record(r: &Record) -> Result<Self> {
        Ok(Action { id: r.require_int(ID)?, name: r.require_text(NAME)?.to_string() })
    }
}

/// A grant fact. Position snapshots of both nodes are stored alongside
/// (`aco_path` or `aco_lft`/`aco_rgt`, same for aro) so trees can be joined
/// without reading the granted node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: i64,
    pub aro_id: i64,
    pub aco_id: i64,
    pub action_id: i64,
}

impl Permission {
    pub fn from_record(r: &Record) -> Result<Self> {
        Ok(Permission {
            id: r.require_int(ID)?,
            aro_id: r.require_int(&Side::Aro.field(ID))?,
            aco_id: r.require_int(&Side::Aco.field(ID))?,
            action_id: r.require_int(ACTION_ID)?,
        })
    }
}

/// Identity of a subject as supplied by the hosting layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectRef {
    /// A domain entity, e.g. a user row
    Entity { model: String, foreign_key: i64 },
    /// A named group, e.g. the guest group
    Alias(String),
}

impl SubjectRef {
    pub fn entity(model: &str, foreign_key: i64) -> Self {
        SubjectRef::Entity { model: model.to_string(), foreign_key }
    }

    pub fn alias(alias: &str) -> Self {
        SubjectRef::Alias(alias.to_string())
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectRef::Entity { model, foreign_key } => write!(f, "{}#{}", model, foreign_key),
            SubjectRef::Alias(a) => write!(f, "{}", a),
        }
    }
}

/// What a permission check is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// One entity instance
    Instance { model: String, foreign_key: i64 },
    /// A whole class, e.g. for `create`
    Class(String),
}

impl Resource {
    pub fn instance(model: &str, foreign_key: i64) -> Self {
        Resource::Instance { model: model.to_string(), foreign_key }
    }

    pub fn class(model: &str) -> Self {
        Resource::Class(model.to_string())
    }

    pub fn model(&self) -> &str {
        match self {
            Resource::Instance { model, .. } | Resource::Class(model) => model,
        }
    }

    pub fn foreign_key(&self) -> Option<i64> {
        match self {
            Resource::Instance { foreign_key, .. } => Some(*foreign_key),
            Resource::Class(_) => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Instance { model, foreign_key } => write!(f, "{}#{}", model, foreign_key),
            Resource::Class(model) => write!(f, "{}", model),
        }
    }
}

/// Outcome of a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

impl From<bool> for Decision {
    fn from(b: bool) -> Self {
        if b { Decision::Allow } else { Decision::Deny }
    }
}
