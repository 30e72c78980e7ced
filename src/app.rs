/*
 * Responsibility
 * - tracing / panic hook の初期化
 * - Config読み込み → 依存生成 (db / validator / tools) → Router 組み立て
 * - Middleware の適用順 (http → CORS → security headers → auth)
 * - axum::serve() で起動
 */
use std::{env, panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::auth::TokenValidator;
use crate::services::tools::ToolService;
use crate::services::tools::file_operations::FileOperations;
use crate::services::tools::weather::WeatherClient;
use crate::state::AppState;
use crate::{api, middleware, repos, services};

/// `RUST_LOG` wins when set. `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    // Ex:
    // RUST_LOG=info,mcp_tools_server=debug,tower_http=debug cargo run
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let json = env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr can be hidden depending on how the process is launched
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    // .env is loaded before tracing so LOG_FORMAT / RUST_LOG from it apply
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        env = ?config.app_env,
        addr = %config.addr,
        issuer = %config.auth.issuer,
        allowed_paths = ?config.files.allowed_paths,
        "starting MCP server"
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("server stopped");
    Ok(())
}

/// Process-level services, built once and shared through `AppState`.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let db = repos::connect(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;

    let auth_http = services::http_client(config.auth.http_timeout).context("building OAuth HTTP client")?;
    let validator = Arc::new(TokenValidator::new(&config.auth, auth_http));

    let weather_http =
        services::http_client(config.weather.timeout).context("building weather HTTP client")?;
    let tools = Arc::new(ToolService::new(
        db,
        FileOperations::new(&config.files),
        WeatherClient::new(&config.weather, weather_http),
    ));

    Ok(AppState::new(validator, tools, config.auth.exempt_paths.clone()))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = middleware::auth::access::apply(api::routes(), state.clone()).with_state(state);
    let router = middleware::security_headers::apply(router);
    let router = middleware::cors::apply(router, config);
    middleware::http::apply(router, config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
