use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{info, warn};

use crate::{
    pool::Dispatcher,
    recommendations::worker::RecommendationJob,
    stores::FollowRecommender,
    utils::with_timeout,
};

/// Periodically feeds recently active users into the recommendation pool.
pub struct RecommendationScheduler {
    recommender: Arc<dyn FollowRecommender>,
    dispatcher: Dispatcher<RecommendationJob>,
    batch_size: i64,
    call_timeout: Duration,
}

impl RecommendationScheduler {
    pub fn new(
        recommender: Arc<dyn FollowRecommender>,
        dispatcher: Dispatcher<RecommendationJob>,
        batch_size: i64,
        call_timeout: Duration,
    ) -> Self {
        Self {
            recommender,
            dispatcher,
            batch_size,
            call_timeout,
        }
    }

    /// Dispatches one round of jobs and returns how many were queued.
    pub async fn run_once(&self) -> Result<usize, Error> {
        let candidates = with_timeout(
            self.call_timeout,
            "recommendation candidates",
            self.recommender.candidates(self.batch_size),
        )
        .await?;

        let mut dispatched = 0;
        for user_id in candidates {
            self.dispatcher.dispatch(RecommendationJob { user_id }).await?;
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// The first round runs one interval after start.
    pub async fn run(self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.run_once().await {
                    Ok(count) => info!(jobs = count, "Recommendation round dispatched"),
                    Err(e) => warn!(error = %e, "Recommendation round failed"),
                },
                _ = shutdown.changed() => break,
            }
        }
    }
}
