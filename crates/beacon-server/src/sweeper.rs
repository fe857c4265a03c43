use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use beacon_db::Database;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub purged: usize,
}

/// Background task that expires stale messages and purges delete-pending ones.
///
/// The next run is scheduled only once the previous one has finished, so
/// sweeps never overlap. Errors are logged and the loop keeps going.
pub async fn run_sweeper(db: Arc<Database>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let db = db.clone();
        match tokio::task::spawn_blocking(move || sweep_once(&db, Utc::now())).await {
            Ok(report) => info!(expired = report.expired, purged = report.purged, "sweep finished"),
            Err(e) => error!("sweep task failed: {e}"),
        }
    }
}

/// One sweep. Each phase runs even when the other fails.
pub fn sweep_once(db: &Database, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    match db.expire_stale(now) {
        Ok(count) => report.expired = count,
        Err(e) => error!("expire phase failed: {e}"),
    }
    match db.purge_delete_pending() {
        Ok(count) => report.purged = count,
        Err(e) => error!("purge phase failed: {e}"),
    }
    report
}
