//! Integration test: registry promotion on the local file store

use std::sync::Arc;
use water_scan::registry::{ModelRegistry, Stage, VERSION_DESCRIPTION};
use water_scan::tracking::FileStore;

const NAME: &str = "water_potability_rf";

#[test]
fn test_promotion_archives_previous_production() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let registry = ModelRegistry::new(store.clone());

    let v1 = registry
        .publish("runs:/aaa/random_forest", NAME, "Water potability model", Stage::Production)
        .unwrap();
    let v2 = registry
        .publish("runs:/bbb/random_forest", NAME, "Water potability model", Stage::Production)
        .unwrap();

    assert_eq!((v1.version, v2.version), (1, 2));
    assert_eq!(v2.run_id.as_deref(), Some("bbb"));
    assert_eq!(v2.description.as_deref(), Some(VERSION_DESCRIPTION));

    // Survives a reopen of the store
    let reopened = FileStore::open(dir.path()).unwrap();
    let model = reopened.registered_model(NAME).unwrap();
    assert_eq!(model.description.as_deref(), Some("Water potability model"));
    let stages: Vec<Stage> = model.versions.iter().map(|v| v.current_stage).collect();
    assert_eq!(stages, vec![Stage::Archived, Stage::Production]);

    let registry = ModelRegistry::new(Arc::new(reopened));
    let current = registry.current_version(NAME, Stage::Production).unwrap().unwrap();
    assert_eq!(current.source, "runs:/bbb/random_forest");
}

#[test]
fn test_current_version_by_stage() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(Arc::new(FileStore::open(dir.path()).unwrap()));
    assert!(registry.current_version("nobody", Stage::Production).is_err());

    registry
        .publish("runs:/aaa/random_forest", NAME, "d", Stage::Staging)
        .unwrap();
    assert!(registry.current_version(NAME, Stage::Production).unwrap().is_none());
    assert_eq!(registry.current_version(NAME, Stage::Staging).unwrap().unwrap().version, 1);
}

#[test]
fn test_empty_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(Arc::new(FileStore::open(dir.path()).unwrap()));
    assert!(registry
        .publish("runs:/aaa/random_forest", "", "d", Stage::Production)
        .is_err());
}
