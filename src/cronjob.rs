//! Cronjob module for scheduled tasks.
//!
//! This module schedules the best posts digest with `tokio-cron-scheduler`.

use std::sync::Arc;

use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::DigestConfig;
use crate::digest::{run_digest, DigestSink};
use crate::twitter::XClient;

/// Creates a scheduler with the digest job on `digest.schedule`.
///
/// The scheduler is returned unstarted; call `start()` on it. Each run builds
/// its own operation on the shared client, so a failed run is logged and the
/// next one proceeds normally.
///
/// # Errors
///
/// Fails if the scheduler cannot be created or the cron expression is invalid.
pub async fn start_digest_cronjob(
    client: Arc<XClient>,
    digest: DigestConfig,
    sink: DigestSink,
) -> Result<JobScheduler, Box<dyn std::error::Error + Send + Sync>> {
    let sched = JobScheduler::new().await?;
    let schedule = digest.schedule.clone();
    let digest = Arc::new(digest);
    let sink = Arc::new(sink);

    sched
        .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let client = Arc::clone(&client);
            let digest = Arc::clone(&digest);
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                info!("Starting scheduled digest for @{}", digest.username);
                match run_digest(&client, &digest, &sink).await {
                    Ok(count) => {
                        info!("Scheduled digest completed with {} posts", count);
                    }
                    Err(e) => {
                        error!("Scheduled digest failed ({}): {}", e.kind(), e);
                    }
                }
            })
        })?)
        .await?;

    info!("Cronjob scheduler configured to send the digest on '{}'", schedule);
    Ok(sched)
}
