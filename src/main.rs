use std::{process::ExitCode, sync::Arc};

use plaudit::{
    application::{
        error::AppError,
        jobs::spawn_reconcile_job,
        likes::LikeService,
        reconcile::{ReconcileReport, Reconciler},
        repos::LikesRepo,
    },
    cache::{CacheConfig, LikeCache},
    config,
    infra::{self, db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_application_error(&error);
            ExitCode::from(error.exit_code())
        }
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report, source = report.source, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report, source = report.source, "application error");
    });
}

/// Services wired against one record store and one cache backend.
struct Runtime {
    repositories: PostgresRepositories,
    likes: LikeService,
    reconciler: Reconciler,
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    let runtime = init_runtime(&settings).await?;

    match command {
        config::Command::Serve(_) => run_serve(&settings, runtime).await,
        config::Command::Reconcile(_) => run_reconcile(runtime).await,
        config::Command::Count(args) => run_count(runtime, &args.items).await,
        config::Command::Top(args) => run_top(runtime, args.limit).await,
        config::Command::Toggle(args) => run_toggle(runtime, args.item, args.actor).await,
        config::Command::Invalidate(args) => run_invalidate(runtime, args.item).await,
    }
}

async fn init_runtime(settings: &config::Settings) -> Result<Runtime, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        InfraError::configuration("database.url must be set (PLAUDIT__DATABASE__URL)")
    })?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(format!("failed to connect to database: {err}")))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(format!("failed to run migrations: {err}")))?;
    let repositories = PostgresRepositories::new(pool);

    let store = infra::cache::connect(&settings.cache).await?;
    let cache = LikeCache::new(store, CacheConfig::from(&settings.cache));

    let repo: Arc<dyn LikesRepo> = Arc::new(repositories.clone());
    Ok(Runtime {
        repositories,
        likes: LikeService::new(repo.clone(), cache.clone()),
        reconciler: Reconciler::new(repo, cache),
    })
}

async fn run_serve(settings: &config::Settings, runtime: Runtime) -> Result<(), AppError> {
    runtime
        .repositories
        .health_check()
        .await
        .map_err(|err| InfraError::database(format!("database health check failed: {err}")))?;

    // Repair drift left by a previous process before serving.
    if let Err(err) = runtime.reconciler.run_once().await {
        warn!(error = %err, "startup reconciliation failed; periodic pass will retry");
    }

    let job = settings
        .reconciler
        .enabled
        .then(|| spawn_reconcile_job(runtime.reconciler.clone(), settings.reconciler.interval));
    if job.is_none() {
        info!("periodic reconciliation disabled");
    }

    info!(
        backend = %settings.cache.backend,
        "plaudit running; press Ctrl-C to stop"
    );
    let signal = wait_for_shutdown_signal().await;

    if let Some(job) = job {
        job.shutdown().await;
    }
    runtime.repositories.pool().close().await;
    info!("shutdown complete");

    signal
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<(), AppError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).map_err(|err| {
        AppError::unexpected(format!("failed to install SIGINT handler: {err}"))
    })?;
    let mut terminate = signal(SignalKind::terminate()).map_err(|err| {
        AppError::unexpected(format!("failed to install SIGTERM handler: {err}"))
    })?;

    tokio::select! {
        _ = interrupt.recv() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<(), AppError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::unexpected(format!("failed to listen for Ctrl-C: {err}")))?;
    info!("received Ctrl-C");
    Ok(())
}

async fn run_reconcile(runtime: Runtime) -> Result<(), AppError> {
    let ReconcileReport {
        dirty,
        reconciled,
        zeroed,
    } = runtime.reconciler.run_once().await?;
    println!("dirty={dirty} reconciled={reconciled} zeroed={zeroed}");
    Ok(())
}

async fn run_count(runtime: Runtime, items: &[i64]) -> Result<(), AppError> {
    for entry in runtime.likes.get_counts(items).await? {
        println!("{}\t{}", entry.item, entry.count);
    }
    Ok(())
}

async fn run_top(runtime: Runtime, limit: usize) -> Result<(), AppError> {
    for entry in runtime.likes.top_liked(limit).await? {
        println!("{}\t{}", entry.item, entry.score);
    }
    Ok(())
}

async fn run_toggle(runtime: Runtime, item: i64, actor: i64) -> Result<(), AppError> {
    let outcome = runtime.likes.toggle(item, actor).await?;
    let rendered = serde_json::to_string(&outcome)
        .map_err(|err| AppError::unexpected(format!("failed to encode outcome: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_invalidate(runtime: Runtime, item: i64) -> Result<(), AppError> {
    runtime.likes.invalidate_item(item).await?;
    println!("invalidated {item}");
    Ok(())
}
