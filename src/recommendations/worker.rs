use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    models::event::Event,
    pool::JobHandler,
    stores::{EventPublisher, FollowRecommender},
    utils::with_timeout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationJob {
    pub user_id: i64,
}

/// Computes follow recommendations for one user and publishes them as an
/// event, which the notification pipeline then delivers.
pub struct RecommendationWorker {
    recommender: Arc<dyn FollowRecommender>,
    publisher: Arc<dyn EventPublisher>,
    queue: String,
    limit: i64,
    call_timeout: Duration,
}

impl RecommendationWorker {
    pub fn new(
        recommender: Arc<dyn FollowRecommender>,
        publisher: Arc<dyn EventPublisher>,
        queue: String,
        limit: i64,
        call_timeout: Duration,
    ) -> Self {
        Self {
            recommender,
            publisher,
            queue,
            limit,
            call_timeout,
        }
    }

    pub async fn process(&self, job: RecommendationJob) {
        let recommendations = match with_timeout(
            self.call_timeout,
            "follow recommendations",
            self.recommender.recommend(job.user_id, self.limit),
        )
        .await
        {
            Ok(recommendations) => recommendations,
            Err(e) => {
                warn!(user_id = job.user_id, error = %e, "Failed to compute recommendations");
                return;
            }
        };

        if recommendations.is_empty() {
            debug!(user_id = job.user_id, "No follow recommendations");
            return;
        }

        let event = Event::FollowRecommendations {
            user: job.user_id,
            recommendations,
        };

        match with_timeout(
            self.call_timeout,
            "recommendation publish",
            self.publisher.publish(&self.queue, &event),
        )
        .await
        {
            Ok(()) => info!(user_id = job.user_id, "Published follow recommendations"),
            Err(e) => warn!(user_id = job.user_id, error = %e, "Failed to publish recommendations"),
        }
    }
}

#[async_trait]
impl JobHandler<RecommendationJob> for RecommendationWorker {
    async fn handle(&mut self, job: RecommendationJob) {
        self.process(job).await;
    }
}
