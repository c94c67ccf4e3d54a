use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinSet;
use tonic::transport::Server as GrpcServer;
use tonic_health::server::health_reporter;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_service::config::{CacheBackend, Config};
use feed_service::consumers::KafkaPostEventSource;
use feed_service::grpc::clients::{
    lazy_channel, GraphClient, PostClient, PostContent, SocialGraph, UserClient, UserProfiles,
};
use feed_service::grpc::{feed_service_server::FeedServiceServer, FeedServiceImpl};
use feed_service::{
    FanoutWriter, FeedAssembler, InMemoryTimelineCache, RedisTimelineCache, TimelineCache,
    TimelineCacheConfig,
};

const SERVICE_NAME: &str = "feed-service";

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// `/health`: 200 while serving, 503 once shutdown has begun
async fn health(serving: web::Data<AtomicBool>) -> HttpResponse {
    if serving.load(Ordering::Acquire) {
        HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": SERVICE_NAME,
        }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "down",
            "service": SERVICE_NAME,
        }))
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();
}

async fn build_cache(config: &Config) -> anyhow::Result<Arc<dyn TimelineCache>> {
    match config.redis.backend {
        CacheBackend::Redis => {
            let cache = RedisTimelineCache::new(
                &config.redis.url,
                TimelineCacheConfig {
                    key_prefix: config.redis.key_prefix.clone(),
                    max_row_size: config.redis.max_row_size,
                },
            )
            .await
            .context("Failed to connect timeline cache")?;
            cache.ping().await.context("Timeline cache is not reachable")?;
            info!(max_row_size = config.redis.max_row_size, "Redis timeline cache ready");
            Ok(Arc::new(cache))
        }
        CacheBackend::Memory => {
            warn!("Using in-memory timeline cache; rows are lost on restart");
            Ok(Arc::new(InMemoryTimelineCache::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let cache = build_cache(&config).await?;

    let grpc_cfg = &config.grpc;
    let graph: Arc<dyn SocialGraph> = Arc::new(GraphClient::new(
        lazy_channel(&grpc_cfg.social_graph_url, grpc_cfg.downstream_timeout)?,
        grpc_cfg.downstream_timeout,
        grpc_cfg.classify_timeout,
    ));
    let posts: Arc<dyn PostContent> = Arc::new(PostClient::new(
        lazy_channel(&grpc_cfg.post_service_url, grpc_cfg.downstream_timeout)?,
        grpc_cfg.downstream_timeout,
    ));
    let profiles: Arc<dyn UserProfiles> = Arc::new(UserClient::new(
        lazy_channel(&grpc_cfg.user_service_url, grpc_cfg.downstream_timeout)?,
        grpc_cfg.downstream_timeout,
    ));
    info!(
        graph = %grpc_cfg.social_graph_url,
        posts = %grpc_cfg.post_service_url,
        users = %grpc_cfg.user_service_url,
        "Downstream gRPC clients configured"
    );

    let assembler = Arc::new(FeedAssembler::new(
        cache.clone(),
        graph.clone(),
        posts,
        profiles,
        config.feed.default_page_size,
    ));
    let writer = FanoutWriter::new(cache.clone(), graph, config.fanout.clone());
    let source =
        KafkaPostEventSource::new(&config.kafka).context("Failed to create post events consumer")?;

    // HTTP: health and metrics
    let serving = web::Data::new(AtomicBool::new(true));
    let http_serving = serving.clone();
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(http_serving.clone())
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(feed_service::metrics::serve_metrics))
    })
    .disable_signals()
    .bind(("0.0.0.0", config.app.http_port))?
    .run();
    let http_handle = http_server.handle();
    info!("HTTP server listening on 0.0.0.0:{}", config.app.http_port);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    tasks.spawn(async move {
        http_server.await.context("HTTP server error")
    });

    // gRPC: FeedService + health
    let grpc_addr: SocketAddr = format!("0.0.0.0:{}", config.app.grpc_port).parse()?;
    let (mut grpc_health, health_service) = health_reporter();
    grpc_health
        .set_serving::<FeedServiceServer<FeedServiceImpl>>()
        .await;
    let feed_svc = FeedServiceImpl::new(assembler, config.grpc.request_timeout).into_server();
    let (grpc_stop_tx, grpc_stop_rx) = oneshot::channel::<()>();
    tasks.spawn(async move {
        info!("gRPC server listening on {}", grpc_addr);
        GrpcServer::builder()
            .add_service(health_service)
            .add_service(feed_svc)
            .serve_with_shutdown(grpc_addr, async move {
                let _ = grpc_stop_rx.await;
            })
            .await
            .context("gRPC server error")
    });

    let writer_shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move {
        writer
            .run(source, writer_shutdown)
            .await
            .context("Fanout writer error")
    });

    let mut first_error: Option<anyhow::Error> = None;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tokio::select! {
        result = tasks.join_next() => {
            match result {
                Some(Ok(Ok(()))) => warn!("A server task exited early"),
                Some(Ok(Err(e))) => {
                    error!("Task returned error: {:#}", e);
                    first_error = Some(e);
                }
                Some(Err(e)) => {
                    error!("Task join error: {}", e);
                    first_error = Some(anyhow::anyhow!(e));
                }
                None => {}
            }
        }
        _ = &mut shutdown => {
            info!("Shutdown signal received");
        }
    }

    // Report down first so the gateway stops routing here
    serving.store(false, Ordering::Release);
    grpc_health
        .set_not_serving::<FeedServiceServer<FeedServiceImpl>>()
        .await;
    if first_error.is_none() {
        info!(drain_secs = config.app.shutdown_drain.as_secs(), "Draining before stop");
        tokio::time::sleep(config.app.shutdown_drain).await;
    }

    // gRPC first, then HTTP, then the fanout writer
    let _ = grpc_stop_tx.send(());
    http_handle.stop(true).await;
    let _ = shutdown_tx.send(());

    let deadline = config.fanout.shutdown_grace + Duration::from_secs(5);
    let drained = tokio::time::timeout(deadline, async {
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Task returned error during shutdown: {:#}", e),
                Err(e) => error!("Task join error during shutdown: {}", e),
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!("Tasks did not stop in time, aborting");
        tasks.shutdown().await;
    }

    if let Err(e) = cache.close().await {
        warn!("Failed to close timeline cache: {}", e);
    }
    info!("{} stopped", SERVICE_NAME);

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
