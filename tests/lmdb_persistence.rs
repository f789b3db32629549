//! Engine over the LMDB store: facts outlive the process handle

mod common;

use std::sync::Arc;

use acltree::{AclConfig, ActionSet, AuthorizationHooks, Engine, LmdbStore, Resource, Side, StrategyKind, SubjectRef};
use common::{setup_with, Post, STRATEGIES};
use tempfile::TempDir;

fn open(dir: &TempDir, strategy: StrategyKind) -> Engine {
    let store = LmdbStore::open(dir.path()).unwrap();
    setup_with(AclConfig { strategy, ..AclConfig::default() }, Arc::new(store))
}

#[test]
fn test_grants_survive_reopen() {
    for s in STRATEGIES {
        let dir = TempDir::new().unwrap();
        {
            let e = open(&dir, s);
            let team = e.create_group(Side::Aro, "Team").unwrap();
            let frank = e.create_object(Side::Aro, Some("User"), Some(6), None).unwrap();
            e.join(Side::Aro, &frank, &team).unwrap();
            let project = e.create_object(Side::Aco, Some("Project"), Some(1), None).unwrap();
            let task = e.create_object(Side::Aco, Some("Task"), Some(1), None).unwrap();
            e.join(Side::Aco, &task, &project).unwrap();
            e.grant(None, &team, &project, &ActionSet::named(["update"]), false).unwrap();
        }

        let e = open(&dir, s);
        let who = SubjectRef::entity("User", 6);
        assert!(e.may(Some(&who), &Resource::instance("Task", 1), "update").unwrap());
        assert!(!e.may(Some(&who), &Resource::instance("Task", 1), "delete").unwrap());
    }
}

#[test]
fn test_hooks_over_lmdb() {
    let dir = TempDir::new().unwrap();
    let e = open(&dir, StrategyKind::NestedSet);
    let owner = SubjectRef::entity("User", 1);
    let hooks = AuthorizationHooks::new(&e, &owner);
    let post = Post { id: Some(11) };
    hooks.post_create(&post).unwrap();
    hooks.pre_write(&post, false).unwrap();
    hooks.pre_delete(&post).unwrap();
    assert!(e.find_resource(&Resource::instance("Post", 11)).unwrap().is_none());
}
