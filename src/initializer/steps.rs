use std::io::Write;

use tracing::{info, warn};

use super::Progress;
use crate::config::InitConfig;
use crate::model::{
    COLLECTION_NAME, CollectionSpec, INDEX_FIELDS, IndexSpec, StepName, StepOutcome, StepReport,
    UserSpec,
};
use crate::store::{DatabaseHandle, Store, StoreResult};

pub(super) fn select_database<S, W>(
    store: &S,
    config: &InitConfig,
    progress: &mut Progress<W>,
) -> (S::Handle, StepReport)
where
    S: Store,
    W: Write,
{
    let handle = store.select_database(&config.database);
    progress.line(format!("Creating MeshCentral database: {}", config.database));
    info!(database = %handle.name(), step = StepName::SelectDatabase.as_str(), "database selected");

    let report = StepReport {
        step: StepName::SelectDatabase,
        outcome: StepOutcome::Applied,
    };
    (handle, report)
}

pub(super) async fn create_user<D, W>(
    database: &D,
    config: &InitConfig,
    progress: &mut Progress<W>,
) -> StepReport
where
    D: DatabaseHandle,
    W: Write,
{
    progress.line(format!("Creating MeshCentral user: {}", config.username));

    let user = UserSpec::application(config);
    let result = database.create_user(&user).await;

    finish_step(
        StepName::CreateUser,
        database,
        result,
        progress,
        "✓ Successfully created MeshCentral user",
        "⚠ User creation failed (may already exist)",
    )
}

pub(super) async fn create_collection<D, W>(database: &D, progress: &mut Progress<W>) -> StepReport
where
    D: DatabaseHandle,
    W: Write,
{
    let result = database.create_collection(&CollectionSpec::baseline()).await;

    finish_step(
        StepName::CreateCollection,
        database,
        result,
        progress,
        "✓ Created meshcentral collection",
        "⚠ Collection creation skipped (may already exist)",
    )
}

pub(super) async fn create_indexes<D, W>(database: &D, progress: &mut Progress<W>) -> StepReport
where
    D: DatabaseHandle,
    W: Write,
{
    let result = database
        .create_indexes(COLLECTION_NAME, &IndexSpec::baseline())
        .await;

    if result.is_ok() {
        info!(fields = ?INDEX_FIELDS, collection = COLLECTION_NAME, "indexes asserted");
    }

    finish_step(
        StepName::CreateIndexes,
        database,
        result,
        progress,
        "✓ Created performance indexes",
        "⚠ Index creation warning",
    )
}

fn finish_step<D, W>(
    step: StepName,
    database: &D,
    result: StoreResult<()>,
    progress: &mut Progress<W>,
    success_line: &str,
    warning_prefix: &str,
) -> StepReport
where
    D: DatabaseHandle,
    W: Write,
{
    match &result {
        Ok(()) => {
            progress.line(success_line);
            info!(database = %database.name(), step = step.as_str(), "step applied");
        }
        Err(err) => {
            progress.line(format!("{warning_prefix}: {err}"));
            warn!(
                database = %database.name(),
                step = step.as_str(),
                error_kind = err.kind.as_str(),
                error = %err.message,
                "step did not apply; continuing"
            );
        }
    }

    StepReport {
        step,
        outcome: StepOutcome::from_result(result),
    }
}
