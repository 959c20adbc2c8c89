use std::{process, sync::Arc, time::Duration};

use chirp::{
    application::{
        access::{AccessGate, SessionVerifier},
        error::AppError,
        feed::FeedService,
        identity::IdentityProvider,
        posts::PostService,
        profile::{self, ProfileService},
        rate_limit::PostRateLimiter,
        repos::{PostsRepo, PostsWriteRepo},
    },
    cache::{AuthorCache, CacheConfig, CacheConsumer, CacheTrigger, EventQueue, FeedViewStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        identity::{
            HttpIdentityProvider, HttpSessionVerifier, IdentityClientConfig, IdentityHttpClient,
        },
        telemetry,
    },
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    info!(
        target = "chirp::migrate",
        pool_size = repositories.pool().size(),
        "Migrations applied"
    );
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    let maintenance = spawn_maintenance(&app);
    let result = serve_http(&settings, app.http_state, app.gate).await;

    maintenance.abort();
    let _ = maintenance.await;

    result
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

struct ApplicationContext {
    http_state: HttpState,
    gate: Arc<AccessGate>,
    authors: Arc<AuthorCache>,
    consumer: Arc<CacheConsumer>,
    limiter: PostRateLimiter,
    sweep_interval: Duration,
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories;

    let identity_http = IdentityHttpClient::new(IdentityClientConfig {
        base_url: settings.identity.base_url.clone(),
        secret_key: settings.identity.secret_key.clone(),
        timeout: settings.identity.timeout,
    })?;
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityProvider::new(identity_http.clone()));
    let sessions: Arc<dyn SessionVerifier> = Arc::new(HttpSessionVerifier::new(identity_http));

    let cache_config = CacheConfig::from(&settings.cache);
    let sweep_interval = cache_config.sweep_interval;
    let authors = Arc::new(AuthorCache::new(identity.clone(), &cache_config));
    let feed_views = Arc::new(FeedViewStore::new(&cache_config));
    let queue = Arc::new(EventQueue::new());
    let consumer = Arc::new(CacheConsumer::new(
        cache_config,
        queue.clone(),
        feed_views.clone(),
    ));
    let trigger = Arc::new(CacheTrigger::new(queue, consumer.clone()));

    let feed = FeedService::new(posts_repo.clone(), authors.clone(), settings.feed)
        .with_view_cache(feed_views);

    let limiter = PostRateLimiter::new(
        settings.rate_limit.window,
        settings.rate_limit.max_posts.get(),
    );
    let posts = PostService::new(
        posts_write_repo,
        limiter.clone(),
        settings.posts.max_content_length.get(),
    )
    .with_cache_trigger(trigger);

    let profiles = ProfileService::new(
        identity,
        Some(authors.clone()),
        profile::ProfileSettings {
            revalidate_after: settings.profile.revalidate,
            max_snapshots: settings.profile.max_snapshots,
        },
    );

    let gate = Arc::new(AccessGate::new(settings.access.clone(), sessions));

    let http_state = HttpState {
        feed: Arc::new(feed),
        posts: Arc::new(posts),
        profiles: Arc::new(profiles),
        health: posts_repo,
    };

    Ok(ApplicationContext {
        http_state,
        gate,
        authors,
        consumer,
        limiter,
        sweep_interval,
    })
}

/// Periodic upkeep: expired authors, idle rate-limit counters, pending
/// feed invalidations.
fn spawn_maintenance(app: &ApplicationContext) -> JoinHandle<()> {
    let authors = app.authors.clone();
    let consumer = app.consumer.clone();
    let limiter = app.limiter.clone();
    let period = app.sweep_interval;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let swept = authors.sweep_expired();
            let purged = limiter.purge_idle();
            let consumed = consumer.consume();
            debug!(
                target = "chirp::maintenance",
                swept, purged, consumed, "maintenance pass"
            );
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    gate: Arc<AccessGate>,
) -> Result<(), AppError> {
    let router = http::build_router(http_state, gate);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "chirp::serve",
        addr = %settings.server.addr,
        "Listening"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        },
    );
    let mut server_task = tokio::spawn(async move { server.await });

    let joined = tokio::select! {
        joined = &mut server_task => joined,
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(target = "chirp::serve", error = %err, "failed to listen for shutdown signal");
            }
            info!(target = "chirp::serve", "Shutdown requested; draining connections");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server_task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        target = "chirp::serve",
                        timeout_secs = settings.server.graceful_shutdown.as_secs(),
                        "Graceful shutdown timed out; aborting open connections"
                    );
                    server_task.abort();
                    return Ok(());
                }
            }
        }
    };

    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}
