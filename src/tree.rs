//! Tree representations for Aro and Aco positions
//!
//! Two interchangeable strategies:
//! - `NestedSet`: each node owns the interval `[lft, rgt]`, ancestor test is
//!   interval containment. One numbering space per side, so a forest of
//!   roots never overlaps.
//! - `PathMaterialization`: each node stores the ids from its root down to
//!   itself (`1/4/9/`), ancestor test is a prefix match.
//!
//! Permission records carry a snapshot of both nodes' positions, which is
//! what `build_tree_join_condition` compares against.

use std::fmt;

use crate::condition::{col, lit, CmpOp, Condition, Query};
use crate::config::StrategyKind;
use crate::constants::{ID, LFT, PATH, PATH_DELIMITER, RGT};
use crate::error::{AclError, Result};
use crate::model::{Node, Position};
use crate::record::{Record, Value};
use crate::registry::Side;
use crate::store::RecordStore;

/// Tables a strategy maintains when inserting nodes
#[derive(Debug, Clone, Copy)]
pub struct TreeTables<'a> {
    pub nodes: &'a str,
    pub permissions: &'a str,
}

/// Pluggable tree operations
pub trait TreeStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> StrategyKind;

    fn is_ancestor_or_self(&self, ancestor: &Node, node: &Node) -> bool;

    /// Rows of `alias` lying in the subtree rooted at `node` (node included)
    fn subtree_condition(&self, alias: &str, node: &Node) -> Condition;

    /// Rows of `alias` that are ancestors of `node` (node included)
    fn ancestry_condition(&self, alias: &str, node: &Node) -> Condition;

    /// Permission rows of `mapping_alias` whose `side` node covers the node
    /// bound to `resource_alias`. Without inheritance only the node itself.
    fn build_tree_join_condition(
        &self,
        resource_alias: &str,
        mapping_alias: &str,
        side: Side,
        disable_inheritance: bool,
    ) -> Condition;

    /// Position columns copied into a Permission for the `side` node
    fn snapshot(&self, side: Side, node: &Node) -> Vec<(String, Value)>;

    /// Persist `record` (carrying `collection_id`) as a new node under
    /// `parent`, or as a new root.
    ///
    /// Reads positions and rewrites them in separate store calls. Callers
    /// serialize inserts (the engine holds its tree lock); stores shared
    /// between processes need their own transaction around a tree write.
    fn insert(&self, store: &dyn RecordStore, tables: TreeTables<'_>, side: Side, parent: Option<&Node>, record: Record) -> Result<Node>;
}

fn mismatch(kind: StrategyKind, node: &Node) -> AclError {
    AclError::Configuration(format!("node {} is not positioned for {:?}", node.id, kind))
}

// ============================================================================
// Nested Set
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct NestedSet;

impl NestedSet {
    fn interval(node: &Node) -> Option<(i64, i64)> {
        match node.position {
            Position::Interval { lft, rgt } => Some((lft, rgt)),
            Position::Path(_) => None,
        }
    }

    /// Add 2 to every `lft`/`rgt` column at or beyond `from`
    fn shift(store: &dyn RecordStore, table: &str, lft: &str, rgt: &str, from: i64) -> Result<()> {
        let q = Query::table(table).filter(Condition::cmp(col("t", rgt), CmpOp::Ge, lit(from)));
        for mut r in store.find_all(&q)? {
            let r_rgt = r.require_int(rgt)?;
            r.set(rgt, r_rgt + 2);
            if let Some(l) = r.int(lft) {
                if l >= from {
                    r.set(lft, l + 2);
                }
            }
            store.save(table, &mut r)?;
        }
        Ok(())
    }
}

impl TreeStrategy for NestedSet {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NestedSet
    }

    fn is_ancestor_or_self(&self, ancestor: &Node, node: &Node) -> bool {
        match (Self::interval(ancestor), Self::interval(node)) {
            (Some((al, ar)), Some((nl, nr))) => al <= nl && nr <= ar,
            _ => false,
        }
    }

    fn subtree_condition(&self, alias: &str, node: &Node) -> Condition {
        match Self::interval(node) {
            Some((lft, rgt)) if rgt == lft + 1 => Condition::eq(col(alias, ID), lit(node.id)),
            Some((lft, rgt)) => Condition::cmp(col(alias, LFT), CmpOp::Ge, lit(lft))
                .and(Condition::cmp(col(alias, RGT), CmpOp::Le, lit(rgt))),
            None => Condition::False,
        }
    }

    fn ancestry_condition(&self, alias: &str, node: &Node) -> Condition {
        match Self::interval(node) {
            Some((lft, rgt)) => Condition::cmp(col(alias, LFT), CmpOp::Le, lit(lft))
                .and(Condition::cmp(col(alias, RGT), CmpOp::Ge, lit(rgt))),
            None => Condition::False,
        }
    }

    fn build_tree_join_condition(&self, resource_alias: &str, mapping_alias: &str, side: Side, disable_inheritance: bool) -> Condition {
        if disable_inheritance {
            return Condition::eq(col(resource_alias, ID), col(mapping_alias, &side.field(ID)));
        }
        Condition::cmp(col(mapping_alias, &side.field(LFT)), CmpOp::Le, col(resource_alias, LFT))
            .and(Condition::cmp(col(resource_alias, RGT), CmpOp::Le, col(mapping_alias, &side.field(RGT))))
    }

    fn snapshot(&self, side: Side, node: &Node) -> Vec<(String, Value)> {
        match Self::interval(node) {
            Some((lft, rgt)) => vec![(side.field(LFT), Value::Int(lft)), (side.field(RGT), Value::Int(rgt))],
            None => Vec::new(),
        }
    }

    fn insert(&self, store: &dyn RecordStore, tables: TreeTables<'_>, side: Side, parent: Option<&Node>, mut record: Record) -> Result<Node> {
        let (lft, rgt) = match parent {
            None => {
                let max = store
                    .find_all(&Query::table(tables.nodes))?
                    .iter()
                    .filter_map(|r| r.int(RGT))
                    .max()
                    .unwrap_or(0);
                (max + 1, max + 2)
            }
            Some(p) => {
                // Re-read: earlier inserts may have moved the parent
                let fresh = store
                    .find_one(&Query::table(tables.nodes).where_eq(ID, p.id))?
                    .ok_or_else(|| AclError::Consistency(format!("parent node {} vanished", p.id)))?;
                let fresh = Node::from_record(&fresh)?;
                let (_, prgt) = Self::interval(&fresh).ok_or_else(|| mismatch(self.kind(), &fresh))?;
                Self::shift(store, tables.nodes, LFT, RGT, prgt)?;
                Self::shift(store, tables.permissions, &side.field(LFT), &side.field(RGT), prgt)?;
                (prgt, prgt + 1)
            }
        };
        record.set(LFT, lft);
        record.set(RGT, rgt);
        store.save(tables.nodes, &mut record)?;
        Node::from_record(&record)
    }
}

// ============================================================================
// Materialized Path
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct PathMaterialization;

impl PathMaterialization {
    fn path(node: &Node) -> Option<&str> {
        match &node.position {
            Position::Path(p) => Some(p.as_str()),
            Position::Interval { .. } => None,
        }
    }

    /// `1/4/9/` -> `["1/", "1/4/", "1/4/9/"]`
    fn prefixes(path: &str) -> Vec<String> {
        path.match_indices(PATH_DELIMITER).map(|(i, _)| path[..=i].to_string()).collect()
    }
}

impl TreeStrategy for PathMaterialization {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PathMaterialization
    }

    fn is_ancestor_or_self(&self, ancestor: &Node, node: &Node) -> bool {
        match (Self::path(ancestor), Self::path(node)) {
            (Some(a), Some(n)) => n.starts_with(a),
            _ => false,
        }
    }

    fn subtree_condition(&self, alias: &str, node: &Node) -> Condition {
        match Self::path(node) {
            Some(p) => Condition::starts_with(col(alias, PATH), lit(p)),
            None => Condition::False,
        }
    }

    fn ancestry_condition(&self, alias: &str, node: &Node) -> Condition {
        match Self::path(node) {
            Some(p) => Condition::is_in(col(alias, PATH), Self::prefixes(p).into_iter().map(Value::Text).collect()),
            None => Condition::False,
        }
    }

    fn build_tree_join_condition(&self, resource_alias: &str, mapping_alias: &str, side: Side, disable_inheritance: bool) -> Condition {
        if disable_inheritance {
            Condition::eq(col(resource_alias, PATH), col(mapping_alias, &side.field(PATH)))
        } else {
            Condition::starts_with(col(resource_alias, PATH), col(mapping_alias, &side.field(PATH)))
        }
    }

    fn snapshot(&self, side: Side, node: &Node) -> Vec<(String, Value)> {
        match Self::path(node) {
            Some(p) => vec![(side.field(PATH), Value::Text(p.to_string()))],
            None => Vec::new(),
        }
    }

    fn insert(&self, store: &dyn RecordStore, tables: TreeTables<'_>, _side: Side, parent: Option<&Node>, mut record: Record) -> Result<Node> {
        let base = match parent {
            None => String::new(),
            Some(p) => Self::path(p).ok_or_else(|| mismatch(self.kind(), p))?.to_string(),
        };
        // The path ends with the node's own id, which only exists after the first save
        record.set(PATH, Value::Null);
        let id = store.save(tables.nodes, &mut record)?;
        record.set(PATH, format!("{}{}{}", base, id, PATH_DELIMITER));
        store.save(tables.nodes, &mut record)?;
        Node::from_record(&record)
    }
}
