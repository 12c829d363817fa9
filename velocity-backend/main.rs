mod ai;
mod api;
mod config;
mod credits;
mod generations;
mod sandbox;

use anyhow::Context;
use axum::body::Body;
use axum::extract::Request;
use clap::Parser;
use dotenvy::dotenv;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::ai::HttpCodeGenerator;
use crate::config::{AiSettings, SandboxSettings};
use crate::credits::CreditLedger;
use crate::credits::memory::InMemoryCreditLedger;
use crate::generations::file_repository::FileGenerationRepository;
use crate::generations::orchestrator::GenerationOrchestrator;
use crate::generations::repository::GenerationRepository;
use crate::sandbox::{SandboxFactory, SandboxManager};

#[derive(Parser)]
#[command(name = "velocity", about = "AI app builder with live sandbox previews")]
enum Cli {
    /// Start the HTTP server (default when no subcommand is given)
    #[command(alias = "run")]
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 { Cli::Serve } else { Cli::parse() };

    match cli {
        Cli::Serve => run_server().await,
    }
}

async fn run_server() -> Result<(), Box<dyn Error>> {
    let config = config::Config::from_env();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("velocity=info,tower_http=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();

    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            send_default_pii: true,
            traces_sample_rate: 0.2,
            enable_logs: true,
            ..Default::default()
        },
    ));

    let generations: Arc<dyn GenerationRepository> =
        Arc::new(FileGenerationRepository::new(&config.data_dir));
    generations
        .load_all()
        .await
        .context("failed to load generation records")?;

    let credits: Arc<dyn CreditLedger> =
        Arc::new(InMemoryCreditLedger::new(config.default_credit_balance));

    let generator = Arc::new(
        HttpCodeGenerator::new(AiSettings::from_env()).context("failed to build AI client")?,
    );

    let sandbox_settings = SandboxSettings::from_env(&config.data_dir);
    let sandbox_factory =
        SandboxFactory::from_settings(&sandbox_settings).context("failed to initialize sandbox backend")?;
    let sandbox_manager = Arc::new(SandboxManager::new());

    let orchestrator = GenerationOrchestrator {
        generations: generations.clone(),
        credits: credits.clone(),
        generator,
        factory: sandbox_factory.clone(),
        manager: sandbox_manager.clone(),
        static_preview_base: config.static_preview_base.clone(),
    };

    if config.auth_tokens.is_empty() {
        tracing::warn!("AUTH_TOKENS not set, every request runs as the local user");
    }

    let app_state = api::AppState {
        sandbox_manager,
        sandbox_factory,
        generations,
        credits,
        orchestrator,
        auth_tokens: Arc::new(config.auth_tokens.clone()),
    };

    let app = api::create_app(app_state)
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let port = config.port;
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
