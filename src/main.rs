use std::sync::Arc;

use anyhow::{Error, Result};
use push_dispatcher::{
    api::run_api_server,
    clients::{
        database::DatabaseClient, fcm::FcmClient, health::HealthChecker, rbmq::RabbitMqClient,
        redis::RedisCache, rooms::RoomServiceClient,
    },
    config::Config,
    notifications::{
        content::ContentBuilder,
        history::HistoryStore,
        lifecycle::DeviceLifecycleSink,
        limiter::RateLimiter,
        service::NotificationService,
        targets::TargetResolver,
        worker::{DeliveryContext, DeliveryWorker, Job},
    },
    pool::WorkerPool,
    recommendations::{
        scheduler::RecommendationScheduler,
        worker::{RecommendationJob, RecommendationWorker},
    },
    stores::CacheStore,
    utils::init_tracing,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    init_tracing();

    let config = Config::load()?;
    let call_timeout = config.call_timeout();

    let database = Arc::new(DatabaseClient::connect(&config.database_url).await?);
    let cache = RedisCache::connect(&config).await?;
    let broker = Arc::new(RabbitMqClient::connect(&config).await?);
    let gateway = Arc::new(FcmClient::new(&config).await?);
    let rooms = Arc::new(RoomServiceClient::new(&config)?);

    let cache_store: Arc<dyn CacheStore> = Arc::new(cache.clone());
    let context = Arc::new(DeliveryContext {
        limiter: RateLimiter::new(Arc::clone(&cache_store), config.limiter_config()),
        devices: database.clone(),
        gateway,
        history: HistoryStore::new(cache_store, config.history_cap, call_timeout),
        call_timeout,
        target_concurrency: config.target_concurrency,
    });

    let mut sinks = Vec::with_capacity(config.worker_pool_size);
    let delivery_pool = WorkerPool::<Job>::start(
        "delivery",
        config.worker_pool_size,
        config.job_queue_capacity,
        |_| {
            let (unregistered, sink) = DeviceLifecycleSink::spawn(
                database.clone(),
                config.unregistered_sink_capacity,
                call_timeout,
            );
            sinks.push(sink);
            DeliveryWorker::new(Arc::clone(&context), unregistered)
        },
    );

    let recommendation_pool = WorkerPool::<RecommendationJob>::start(
        "recommendations",
        config.recommendation_pool_size,
        config.job_queue_capacity,
        |_| {
            RecommendationWorker::new(
                database.clone(),
                broker.clone(),
                config.user_events_queue.clone(),
                config.recommendation_limit,
                call_timeout,
            )
        },
    );

    let service = Arc::new(NotificationService::new(
        ContentBuilder::new(database.clone(), rooms, call_timeout),
        TargetResolver::new(
            database.clone(),
            config.welcome_room_greeters.clone(),
            config.welcome_room_recent_limit,
            call_timeout,
        ),
        delivery_pool.dispatcher(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumers = [&config.user_events_queue, &config.room_events_queue].map(|queue| {
        tokio::spawn(Arc::clone(&broker).consume(
            queue.clone(),
            Arc::clone(&service),
            shutdown_rx.clone(),
        ))
    });

    let scheduler = tokio::spawn(
        RecommendationScheduler::new(
            database.clone(),
            recommendation_pool.dispatcher(),
            config.recommendation_batch_size,
            call_timeout,
        )
        .run(config.recommendation_interval(), shutdown_rx.clone()),
    );

    let health_checker = HealthChecker::new(database.clone(), cache, broker.clone(), call_timeout);
    let api = tokio::spawn(run_api_server(
        config.server_port,
        health_checker,
        shutdown_rx,
    ));

    info!("Push dispatcher running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    for consumer in consumers {
        match consumer.await {
            Ok(Err(e)) => warn!(error = %e, "Consumer failed"),
            Err(e) => warn!(error = %e, "Consumer task panicked"),
            Ok(Ok(())) => {}
        }
    }
    if let Err(e) = scheduler.await {
        warn!(error = %e, "Recommendation scheduler panicked");
    }
    match api.await {
        Ok(Err(e)) => warn!(error = %e, "Health check server failed"),
        Err(e) => warn!(error = %e, "Health check server panicked"),
        Ok(Ok(())) => {}
    }

    recommendation_pool.stop().await;
    delivery_pool.stop().await;

    for sink in sinks {
        let _ = sink.await;
    }

    info!("Push dispatcher stopped");
    Ok(())
}
