use std::{future::Future, time::Duration};

use anyhow::{Error, Result, anyhow};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{
    models::event::Event,
    notifications::service::{HandleOutcome, NotificationService},
};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .init();
}

/// Decodes one queue payload and runs it through the notification pipeline.
/// Only a malformed payload is an error.
pub async fn process_message(
    payload: &[u8],
    service: &NotificationService,
) -> Result<HandleOutcome, Error> {
    let trace_id = Uuid::new_v4();

    let event = Event::decode(payload).map_err(|e| anyhow!("Malformed event: {}", e))?;

    info!(trace_id = %trace_id, event = %event.kind(), origin = event.origin(), "Processing event");

    let outcome = service.handle(&event).await;

    debug!(trace_id = %trace_id, outcome = ?outcome, "Event processed");

    Ok(outcome)
}

/// Bounds an external call. A timeout surfaces as the call's own error type.
pub async fn with_timeout<T, E, F>(duration: Duration, operation: &str, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Error>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(E::from(anyhow!(
            "{} timed out after {}ms",
            operation,
            duration.as_millis()
        ))),
    }
}
