use std::{future::IntoFuture, process, sync::Arc};

use calclog::{
    application::{
        calculator::{CalculationService, CalculatorTimeouts},
        error::AppError,
        repos::{HistoryRepo, ResultCache},
    },
    config::{self, connections},
    infra::{
        cache::RedisResultCache,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let source = connections::secret_source(&settings.secrets)
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
    let resolved = connections::resolve(source.as_ref(), settings.secrets.mode)
        .await
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    match command {
        config::Command::Serve(_) => run_serve(&settings, &resolved).await,
        config::Command::Setup(_) => run_setup(&settings, &resolved).await,
    }
}

async fn connect_database(
    settings: &config::Settings,
    resolved: &connections::ConnectionSettings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = PostgresRepositories::connect(&resolved.database, &settings.database)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn run_setup(
    settings: &config::Settings,
    resolved: &connections::ConnectionSettings,
) -> Result<(), AppError> {
    let repositories = connect_database(settings, resolved).await?;
    let outcome = repositories
        .ensure_schema()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())));
    repositories.close().await;
    outcome?;

    info!(target = "calclog::setup", "hist_log table is ready");
    Ok(())
}

async fn run_serve(
    settings: &config::Settings,
    resolved: &connections::ConnectionSettings,
) -> Result<(), AppError> {
    let repositories = connect_database(settings, resolved).await?;
    let cache = RedisResultCache::connect(&resolved.cache)
        .await
        .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;

    let history: Arc<dyn HistoryRepo> = repositories.clone();
    let cache: Arc<dyn ResultCache> = Arc::new(cache);
    let calculator = CalculationService::new(
        cache,
        history,
        CalculatorTimeouts {
            cache: settings.cache.operation_timeout,
            database: settings.database.acquire_timeout + settings.database.statement_timeout,
        },
    );

    let state = HttpState {
        calculator: Arc::new(calculator),
    };
    let result = serve_http(settings, state).await;

    // The router owned the last cache handle, so only the pool is left to close.
    repositories.close().await;
    info!(target = "calclog::server", "shutdown complete");
    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "calclog::server",
        addr = %settings.server.addr,
        "listening"
    );

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::from(InfraError::from(err)))?;
        }
        _ = drain_deadline => {
            warn!(
                target = "calclog::server",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "calclog::server", error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "calclog::server", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(target = "calclog::server", "received Ctrl+C");
        },
        _ = terminate => {
            info!(target = "calclog::server", "received terminate signal");
        },
    }
}
