//! Persistence lifecycle of a protected entity through the hooks

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use acltree::{
    AclConfig, AclError, ActionSet, AuthorizationHooks, Decision, MemoryStore, Query, Record, RecordStore, Resource,
    ResolveOptions, Side, SubjectRef,
};
use common::{permission_count, setup, setup_with, FailingStore, Post, STRATEGIES};

#[test]
fn test_create_read_update_delete() {
    for s in STRATEGIES {
        let e = setup(s);
        let owner = SubjectRef::entity("User", 1);
        let hooks = AuthorizationHooks::new(&e, &owner);

        let draft = Post { id: None };
        hooks.pre_write(&draft, true).unwrap();
        let post = Post { id: Some(1) };
        e.store().save("Post", &mut Record::new().with("title", "hello")).unwrap();
        hooks.post_create(&post).unwrap();

        let q = hooks.pre_read("Post", Query::table("Post")).unwrap();
        assert_eq!(e.store().find_all(&q).unwrap().len(), 1);
        hooks.pre_write(&post, false).unwrap();
        hooks.pre_delete(&post).unwrap();
        assert_eq!(permission_count(&e), 0);
    }
}

#[test]
fn test_pre_read_keeps_base_condition() {
    let e = setup(acltree::StrategyKind::PathMaterialization);
    let owner = SubjectRef::entity("User", 1);
    let hooks = AuthorizationHooks::new(&e, &owner);
    for (i, title) in ["a", "b"].iter().enumerate() {
        e.store().save("Post", &mut Record::new().with("title", *title)).unwrap();
        hooks.post_create(&Post { id: Some(i as i64 + 1) }).unwrap();
    }
    let base = Query::table("Post").where_eq("title", "b");
    let rows = e.store().find_all(&hooks.pre_read("Post", base).unwrap()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("title"), Some("b"));

    let stranger = SubjectRef::entity("User", 2);
    let q = AuthorizationHooks::new(&e, &stranger).pre_read("Post", Query::table("Post")).unwrap();
    assert!(e.store().find_all(&q).unwrap().is_empty());
}

#[test]
fn test_update_denied_for_stranger() {
    let e = setup(acltree::StrategyKind::NestedSet);
    AuthorizationHooks::new(&e, &SubjectRef::entity("User", 1)).post_create(&Post { id: Some(3) }).unwrap();
    let stranger = SubjectRef::entity("User", 2);
    let err = AuthorizationHooks::new(&e, &stranger).pre_write(&Post { id: Some(3) }, false).unwrap_err();
    assert_eq!(err, AclError::Denied { action: "update".into(), resource: "Post#3".into() });
}

#[test]
fn test_create_needs_permission_without_general() {
    let config = AclConfig { general_permissions: ActionSet::Named(vec![]), ..AclConfig::default() };
    let e = setup_with(config, Arc::new(MemoryStore::new()));
    let nobody: Option<SubjectRef> = None;
    assert!(AuthorizationHooks::new(&e, &nobody).pre_write(&Post { id: None }, true).unwrap_err().is_denied());
}

#[test]
fn test_delete_without_aco_is_a_fault() {
    // Strict mode: the check itself finds no Aco
    let strict = setup_with(AclConfig { strict_mode: true, ..AclConfig::default() }, Arc::new(MemoryStore::new()));
    strict.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
    let me = SubjectRef::entity("User", 1);
    let err = AuthorizationHooks::new(&strict, &me).pre_delete(&Post { id: Some(8) }).unwrap_err();
    assert!(matches!(err, AclError::Consistency(_)));

    // Generally permitted delete skips the check, the Aco is still required
    let config = AclConfig { general_permissions: ActionSet::named(["create", "delete"]), ..AclConfig::default() };
    let lenient = setup_with(config, Arc::new(MemoryStore::new()));
    let err = AuthorizationHooks::new(&lenient, &me).pre_delete(&Post { id: Some(8) }).unwrap_err();
    assert!(matches!(err, AclError::Consistency(_)));
}

#[test]
fn test_lenient_delete_without_grant_is_denied() {
    let e = setup(acltree::StrategyKind::PathMaterialization);
    let me = SubjectRef::entity("User", 1);
    let err = AuthorizationHooks::new(&e, &me).pre_delete(&Post { id: Some(8) }).unwrap_err();
    assert!(err.is_denied());
}

#[test]
fn test_failed_aco_creation_is_a_fault() {
    let e = setup_with(AclConfig::default(), Arc::new(FailingStore::new("PmAco")));
    let me = SubjectRef::entity("User", 1);
    let err = AuthorizationHooks::new(&e, &me).post_create(&Post { id: Some(1) }).unwrap_err();
    assert!(matches!(err, AclError::Consistency(_)));
}

#[test]
fn test_failed_grant_rolls_back_aco() {
    let e = setup_with(AclConfig::default(), Arc::new(FailingStore::new("PmPermission")));
    let me = SubjectRef::entity("User", 1);
    let err = AuthorizationHooks::new(&e, &me).post_create(&Post { id: Some(1) }).unwrap_err();
    assert!(matches!(err, AclError::Consistency(_)));
    assert!(e.find_resource(&Resource::instance("Post", 1)).unwrap().is_none());
}

#[test]
fn test_anonymous_creation_grants_guest() {
    let e = setup(acltree::StrategyKind::PathMaterialization);
    let guest = e.create_group(Side::Aro, "Guest").unwrap();
    let nobody: Option<SubjectRef> = None;
    let hooks = AuthorizationHooks::new(&e, &nobody);
    hooks.post_create(&Post { id: Some(1) }).unwrap();
    assert!(hooks.grants(&Post { id: Some(1) }, "read").unwrap());

    let permitted = hooks.directly_permitted(&Post { id: Some(1) }, &ActionSet::named(["read"])).unwrap();
    assert_eq!(permitted.len(), 1);
    assert_eq!(permitted[0].collection_id, guest.id);
    assert_eq!(permitted[0].alias.as_deref(), Some("Guest"));
}

#[test]
fn test_class_auto_permissions_override() {
    let config = AclConfig {
        class_auto_permissions: [("Post".to_string(), ActionSet::named(["read"]))].into(),
        ..AclConfig::default()
    };
    let e = setup_with(config, Arc::new(MemoryStore::new()));
    let me = SubjectRef::entity("User", 1);
    let hooks = AuthorizationHooks::new(&e, &me);
    hooks.post_create(&Post { id: Some(1) }).unwrap();
    assert!(hooks.grants(&Post { id: Some(1) }, "read").unwrap());
    assert!(!hooks.grants(&Post { id: Some(1) }, "update").unwrap());
}

#[test]
fn test_directly_permitted_lists_subjects_once() {
    for s in STRATEGIES {
        let e = setup(s);
        let owner = SubjectRef::entity("User", 1);
        let hooks = AuthorizationHooks::new(&e, &owner);
        let post = Post { id: Some(1) };
        hooks.post_create(&post).unwrap();

        let editors = e.create_group(Side::Aro, "Editors").unwrap();
        let member = e.create_object(Side::Aro, Some("User"), Some(2), None).unwrap();
        e.join(Side::Aro, &member, &editors).unwrap();
        let aco = e.find_resource(&Resource::instance("Post", 1)).unwrap().unwrap();
        e.grant(None, &editors, &aco, &ActionSet::named(["update"]), false).unwrap();

        let got: HashSet<(i64, i64)> = hooks
            .directly_permitted(&post, &ActionSet::named(["update"]))
            .unwrap()
            .into_iter()
            .map(|p| (p.collection_id, p.action_id))
            .collect();
        let update = e.action("update").unwrap().id;
        let owner_aro = e.find_subject(&owner).unwrap().unwrap();
        // Group member inherits, but holds no direct grant
        assert_eq!(got, HashSet::from([(owner_aro.id, update), (editors.id, update)]));
    }
}

#[test]
fn test_bypass_guard_lifts_checks_for_its_scope() {
    let e = setup(acltree::StrategyKind::NestedSet);
    let nobody: Option<SubjectRef> = None;
    let hooks = AuthorizationHooks::new(&e, &nobody);
    let post = Post { id: Some(1) };
    AuthorizationHooks::new(&e, &SubjectRef::entity("User", 1)).post_create(&post).unwrap();
    {
        let _guard = e.bypass();
        hooks.pre_write(&post, false).unwrap();
    }
    assert!(hooks.pre_write(&post, false).is_err());
}

#[test]
fn test_checks_after_delete() {
    // Strict: the Aco is gone with the record
    let strict = setup_with(AclConfig { strict_mode: true, ..AclConfig::default() }, Arc::new(MemoryStore::new()));
    strict.create_object(Side::Aro, Some("User"), Some(1), None).unwrap();
    let me = SubjectRef::entity("User", 1);
    let hooks = AuthorizationHooks::new(&strict, &me);
    let post = Post { id: Some(4) };
    hooks.post_create(&post).unwrap();
    hooks.pre_delete(&post).unwrap();
    let err = strict.resolve(Some(&me), &Resource::instance("Post", 4), "read", ResolveOptions::default()).unwrap_err();
    assert!(matches!(err, AclError::Consistency(_)));

    // Lenient: deny, and an orphan Aco without facts takes its place
    for s in STRATEGIES {
        let e = setup(s);
        let hooks = AuthorizationHooks::new(&e, &me);
        hooks.post_create(&post).unwrap();
        hooks.pre_delete(&post).unwrap();
        let res = Resource::instance("Post", 4);
        assert!(e.find_resource(&res).unwrap().is_none());
        assert_eq!(e.resolve(Some(&me), &res, "read", ResolveOptions::default()).unwrap(), Decision::Deny);
        let orphan = e.find_resource(&res).unwrap().unwrap();
        assert_eq!(e.nodes(Side::Aco, &orphan).unwrap().len(), 1);
        assert_eq!(permission_count(&e), 0);
    }
}
