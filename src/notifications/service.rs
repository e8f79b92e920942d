use tracing::{debug, info, warn};

use crate::{
    models::event::Event,
    notifications::{
        content::ContentBuilder,
        targets::TargetResolver,
        worker::Job,
    },
    pool::Dispatcher,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Dispatched { targets: usize },
    NoTargets,
    BuildFailed,
    ResolutionFailed,
    DispatchFailed,
}

/// Entry point for one event: build the notification and resolve its
/// recipients side by side, then hand the job to the delivery pool.
///
/// Nothing here fails the caller; a bad or unlucky event is logged and
/// dropped so the next one can proceed.
pub struct NotificationService {
    content: ContentBuilder,
    resolver: TargetResolver,
    dispatcher: Dispatcher<Job>,
}

impl NotificationService {
    pub fn new(
        content: ContentBuilder,
        resolver: TargetResolver,
        dispatcher: Dispatcher<Job>,
    ) -> Self {
        Self {
            content,
            resolver,
            dispatcher,
        }
    }

    pub async fn handle(&self, event: &Event) -> HandleOutcome {
        let kind = event.kind();
        let (notification, targets) =
            tokio::join!(self.content.build(event), self.resolver.targets(event));

        let notification = match notification {
            Ok(notification) => notification,
            Err(e) => {
                info!(event = %kind, reason = %e, "Skipping event, no notification built");
                return HandleOutcome::BuildFailed;
            }
        };

        let targets = match targets {
            Ok(targets) => targets,
            Err(e) => {
                warn!(event = %kind, error = %e, "Skipping event, target resolution failed");
                return HandleOutcome::ResolutionFailed;
            }
        };

        if targets.is_empty() {
            debug!(event = %kind, "No recipients for event");
            return HandleOutcome::NoTargets;
        }

        let count = targets.len();
        match self
            .dispatcher
            .dispatch(Job {
                targets,
                notification,
            })
            .await
        {
            Ok(()) => HandleOutcome::Dispatched { targets: count },
            Err(e) => {
                warn!(event = %kind, error = %e, "Failed to dispatch notification");
                HandleOutcome::DispatchFailed
            }
        }
    }
}
