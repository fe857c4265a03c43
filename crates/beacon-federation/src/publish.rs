use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use beacon_content::xml::strip_declaration;
use beacon_db::Database;
use beacon_types::models::DistributionElement;

use crate::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::error::FederationError;

/// Resolves the federation targets for an accepted message and starts
/// delivering `body` to each of them. Returns the destinations that were
/// enqueued. Deliveries run in the background and never fail the caller.
pub async fn federate(
    db: Arc<Database>,
    dispatcher: &Dispatcher,
    de: DistributionElement,
    body: &str,
) -> Result<Vec<String>, FederationError> {
    let message_id = de.message_id();
    let targets = tokio::task::spawn_blocking(move || db.federation_targets(&de))
        .await
        .map_err(|e| FederationError::Enqueue(e.to_string()))?
        .map_err(|e| FederationError::Enqueue(e.to_string()))?;

    if targets.is_empty() {
        debug!(message_id, "no federation targets");
        return Ok(Vec::new());
    }

    let payload = Bytes::from(strip_declaration(body).to_string());
    let batch = dispatcher.dispatch(targets, payload);
    let enqueued: Vec<String> = batch.tasks.iter().map(|(uri, _)| uri.clone()).collect();
    info!(message_id, destinations = enqueued.len(), "federation enqueued");

    tokio::spawn(async move {
        for (uri, result) in batch.join().await {
            match result {
                Ok(DeliveryOutcome::Delivered { attempts }) => {
                    debug!(message_id, %uri, attempts, "federated")
                }
                Ok(DeliveryOutcome::Suspended { attempts }) => {
                    warn!(message_id, %uri, attempts, "federation gave up")
                }
                Err(e) => warn!(message_id, %uri, "delivery task failed: {e}"),
            }
        }
    });

    Ok(enqueued)
}
