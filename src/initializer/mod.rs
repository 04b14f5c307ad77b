//! One-shot bootstrap of the MeshCentral database baseline.
//!
//! The four steps run in a fixed order and each runs whatever happened to
//! the ones before it. Failures are logged, recorded in the returned
//! [`InitReport`], and never propagated.

use std::io::Write;

use chrono::Utc;

use crate::config::InitConfig;
use crate::model::{InitReport, REPORT_VERSION};
use crate::store::Store;
use crate::util::{now_utc_string, utc_compact_string};

mod progress;
mod steps;
#[cfg(test)]
mod tests;

pub use progress::Progress;

pub async fn initialize<S, W>(
    store: &S,
    config: &InitConfig,
    progress: &mut Progress<W>,
) -> InitReport
where
    S: Store,
    W: Write,
{
    let started = Utc::now();
    let mut report = InitReport {
        report_version: REPORT_VERSION,
        run_id: format!("init-{}", utc_compact_string(started)),
        store: store.kind().to_string(),
        database: config.database.clone(),
        username: config.username.clone(),
        started_at: now_utc_string(),
        finished_at: None,
        completed: false,
        steps: Vec::with_capacity(4),
    };

    progress.banner();
    progress.line("Starting MongoDB initialization for MeshCentral");
    progress.banner();

    let (database, selected) = steps::select_database(store, config, progress);
    report.steps.push(selected);
    report
        .steps
        .push(steps::create_user(&database, config, progress).await);
    report
        .steps
        .push(steps::create_collection(&database, progress).await);
    report
        .steps
        .push(steps::create_indexes(&database, progress).await);

    // Completion is reported regardless of step outcomes; callers that care
    // inspect `report.failed_steps()`.
    progress.banner();
    progress.line("MongoDB initialization completed successfully");
    progress.line(format!("Database: {}", config.database));
    progress.line(format!("User: {}", config.username));
    progress.banner();

    report.finished_at = Some(now_utc_string());
    report.completed = true;
    report
}
