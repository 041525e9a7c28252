//! Notification delivery worker.
//!
//! Sent notifications produce [`DeliveryJob`]s on a bounded queue. The worker
//! hands each job to a [`Transport`] and records the delivery time on success;
//! failed jobs are logged and dropped.

use std::{future::Future, sync::Arc};

use campus_core::{notification::DeliveryJob, store::Store};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outbound channel for email and SMS messages.
pub trait Transport: Send + Sync + 'static {
  fn deliver(&self, job: &DeliveryJob) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Writes every message to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

impl Transport for LogTransport {
  async fn deliver(&self, job: &DeliveryJob) -> anyhow::Result<()> {
    info!(
      notification_id = %job.notification_id,
      channel = %job.channel,
      address = %job.address,
      title = %job.title,
      "delivering notification"
    );
    Ok(())
  }
}

/// Consume `jobs` until every sender is dropped.
pub async fn run<S, T>(store: Arc<S>, transport: T, mut jobs: mpsc::Receiver<DeliveryJob>)
where
  S: Store + 'static,
  T: Transport,
{
  while let Some(job) = jobs.recv().await {
    if let Err(e) = transport.deliver(&job).await {
      warn!(
        notification_id = %job.notification_id,
        user_id = %job.user_id,
        channel = %job.channel,
        error = %e,
        "delivery failed"
      );
      continue;
    }
    if let Err(e) = store
      .mark_delivered(job.notification_id, job.user_id, job.channel, Utc::now())
      .await
    {
      warn!(notification_id = %job.notification_id, error = %e, "failed to record delivery");
    }
  }
  debug!("delivery queue closed");
}
