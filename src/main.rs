use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use screen_ai::config::AppConfig;
use screen_ai::error::AppError;
use screen_ai::screening::{
    load_question_sets, screening_router, CatalogLoadError, DisabledJudge, InMemoryQuestionSets,
    InMemorySessionStore, LoggingReportSink, QuestionSet, ScreeningService,
};
use screen_ai::telemetry;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Screening Session Engine",
    about = "Administer timed, token-based candidate screening interviews",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Question catalog utilities
    Questions {
        #[command(subcommand)]
        command: QuestionsCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum QuestionsCommand {
    /// Validate a JSON question catalog without starting the server
    Validate {
        /// Path to the catalog file
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Questions {
            command: QuestionsCommand::Validate { file },
        } => run_validate(&file),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let catalog = match &config.screening.question_sets {
        Some(path) => {
            let sets = load_question_sets(path)?;
            info!(count = sets.len(), path = %path.display(), "question catalog loaded");
            InMemoryQuestionSets::with_sets(sets).map_err(CatalogLoadError::from)?
        }
        None => {
            info!("no question catalog configured; serving the built-in sample set");
            InMemoryQuestionSets::with_sets(vec![QuestionSet::sample()])
                .map_err(CatalogLoadError::from)?
        }
    };

    let service = Arc::new(ScreeningService::new(
        Arc::new(catalog),
        Arc::new(InMemorySessionStore::default()),
        Arc::new(DisabledJudge),
        Arc::new(LoggingReportSink),
        config.screening.validity_window(),
    ));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(screening_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "screening session engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_validate(file: &PathBuf) -> Result<(), AppError> {
    let sets = load_question_sets(file)?;
    for set in &sets {
        println!(
            "{}: '{}' ({} question(s), threshold {}%)",
            set.id,
            set.name,
            set.questions.len(),
            set.approval_threshold
        );
    }
    println!("catalog ok: {} question set(s)", sets.len());
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": ready })))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
