use std::io::{self, Write};

use super::*;
use crate::model::{RoleGrant, StepName, StepOutcome};
use crate::store::{DatabaseHandle, DatabaseSnapshot, MemoryStore, Store, StoreErrorKind};

fn example_config() -> InitConfig {
    InitConfig::new("meshcentral", "mc_app", "x")
}

async fn run_once(store: &MemoryStore, config: &InitConfig) -> (InitReport, String) {
    let mut progress = Progress::new(Vec::new());
    let report = initialize(store, config, &mut progress).await;
    let output = String::from_utf8(progress.into_inner()).expect("progress output is utf-8");
    (report, output)
}

async fn snapshot(store: &MemoryStore, database: &str) -> DatabaseSnapshot {
    store
        .select_database(database)
        .snapshot()
        .await
        .expect("memory snapshot never fails")
}

#[tokio::test]
async fn example_scenario_builds_full_baseline() {
    let store = MemoryStore::new();
    let (report, _) = run_once(&store, &example_config()).await;

    assert!(report.completed);
    assert!(report.failed_steps().is_empty());
    assert!(report.steps.iter().all(|step| step.outcome.is_applied()));

    let state = snapshot(&store, "meshcentral").await;
    assert_eq!(state.users.len(), 1);
    let user = state.user("mc_app").expect("user created");
    assert_eq!(
        user.roles,
        vec![
            RoleGrant::new("readWrite", "meshcentral"),
            RoleGrant::new("dbAdmin", "meshcentral"),
        ]
    );

    assert_eq!(state.collections.len(), 1);
    let collection = state.collection("meshcentral").expect("collection created");
    assert!(collection.has_validator);
}

#[tokio::test]
async fn indexes_are_exactly_the_four_fields_plus_id() {
    let store = MemoryStore::new();
    run_once(&store, &example_config()).await;

    let state = snapshot(&store, "meshcentral").await;
    let collection = state.collection("meshcentral").expect("collection created");
    let mut names = collection.index_names();
    names.sort_unstable();
    assert_eq!(names, vec!["_id_", "domain_1", "email_1", "meshid_1", "type_1"]);
    assert!(
        collection
            .indexes
            .iter()
            .all(|index| index.keys.len() == 1 && index.keys[0].1 == 1)
    );
}

#[tokio::test]
async fn second_run_leaves_same_state_and_skips_existing_objects() {
    let store = MemoryStore::new();
    let config = example_config();

    run_once(&store, &config).await;
    let after_first = snapshot(&store, "meshcentral").await;

    let (report, output) = run_once(&store, &config).await;
    let after_second = snapshot(&store, "meshcentral").await;

    assert_eq!(after_first, after_second);
    assert!(report.completed);
    assert!(report.failed_steps().is_empty());
    assert!(matches!(
        report.outcome(StepName::CreateUser),
        Some(StepOutcome::Skipped {
            reason: StoreErrorKind::AlreadyExists,
            ..
        })
    ));
    assert!(matches!(
        report.outcome(StepName::CreateCollection),
        Some(StepOutcome::Skipped { .. })
    ));
    assert_eq!(
        report.outcome(StepName::CreateIndexes),
        Some(&StepOutcome::Applied)
    );
    assert!(output.contains("⚠ User creation failed (may already exist)"));
}

#[tokio::test]
async fn failed_user_creation_does_not_block_later_steps() {
    let store = MemoryStore::new().fail_create_user(StoreErrorKind::PermissionDenied);
    let (report, output) = run_once(&store, &example_config()).await;

    assert_eq!(report.failed_steps(), vec![StepName::CreateUser]);
    assert_eq!(
        report.outcome(StepName::CreateCollection),
        Some(&StepOutcome::Applied)
    );
    assert_eq!(
        report.outcome(StepName::CreateIndexes),
        Some(&StepOutcome::Applied)
    );
    assert!(output.contains("✓ Created meshcentral collection"));
    assert!(output.contains("✓ Created performance indexes"));

    let state = snapshot(&store, "meshcentral").await;
    assert!(state.users.is_empty());
    assert_eq!(
        state
            .collection("meshcentral")
            .expect("collection created")
            .indexes
            .len(),
        5
    );
}

#[tokio::test]
async fn rejecting_store_still_completes_successfully() {
    let store = MemoryStore::new().reject_everything(StoreErrorKind::Unreachable);
    let (report, output) = run_once(&store, &example_config()).await;

    assert!(report.completed);
    assert!(report.finished_at.is_some());
    assert_eq!(
        report.failed_steps(),
        vec![
            StepName::CreateUser,
            StepName::CreateCollection,
            StepName::CreateIndexes,
        ]
    );
    assert_eq!(output.matches('⚠').count(), 3);
    assert!(output.contains("MongoDB initialization completed successfully"));
}

#[tokio::test]
async fn index_batch_failure_is_reported_once() {
    let store = MemoryStore::new().fail_create_indexes(StoreErrorKind::InvalidSpec);
    let (report, output) = run_once(&store, &example_config()).await;

    assert_eq!(report.failed_steps(), vec![StepName::CreateIndexes]);
    assert_eq!(output.matches("⚠ Index creation warning").count(), 1);
}

#[tokio::test]
async fn progress_lines_follow_fixed_order() {
    let store = MemoryStore::new();
    let (_, output) = run_once(&store, &example_config()).await;

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines,
        vec![
            progress::BANNER,
            "Starting MongoDB initialization for MeshCentral",
            progress::BANNER,
            "Creating MeshCentral database: meshcentral",
            "Creating MeshCentral user: mc_app",
            "✓ Successfully created MeshCentral user",
            "✓ Created meshcentral collection",
            "✓ Created performance indexes",
            progress::BANNER,
            "MongoDB initialization completed successfully",
            "Database: meshcentral",
            "User: mc_app",
            progress::BANNER,
        ]
    );
}

#[tokio::test]
async fn empty_configuration_is_passed_through_and_caught() {
    let store = MemoryStore::new();
    let (report, output) = run_once(&store, &InitConfig::new("", "", "")).await;

    assert!(report.completed);
    assert_eq!(report.failed_steps().len(), 3);
    assert!(output.contains("invalid_spec"));
}

#[tokio::test]
async fn roles_never_reach_other_databases() {
    let store = MemoryStore::new();
    run_once(&store, &InitConfig::new("tenant_a", "mc_app", "x")).await;

    let other = snapshot(&store, "admin").await;
    assert!(other.users.is_empty());

    let state = snapshot(&store, "tenant_a").await;
    let user = state.user("mc_app").expect("user created");
    assert!(user.roles.iter().all(|grant| grant.db == "tenant_a"));
}

struct BrokenWriter;

impl Write for BrokenWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn broken_progress_writer_does_not_stop_the_run() {
    let store = MemoryStore::new();
    let mut progress = Progress::new(BrokenWriter);
    let report = initialize(&store, &example_config(), &mut progress).await;

    assert!(report.completed);
    assert!(report.failed_steps().is_empty());
}

#[tokio::test]
async fn report_serializes_step_statuses() {
    let store = MemoryStore::new().fail_create_user(StoreErrorKind::PermissionDenied);
    let (report, _) = run_once(&store, &example_config()).await;

    let value = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(value["store"], "memory");
    assert_eq!(value["completed"], true);
    assert_eq!(value["steps"][1]["step"], "create_user");
    assert_eq!(value["steps"][1]["status"], "failed");
    assert_eq!(value["steps"][1]["kind"], "permission_denied");
    assert!(!value.to_string().contains("\"x\""));
}
