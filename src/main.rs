use anyhow::Context;
use std::env;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use simdoc_worker::{
    app::{ComponentRegistry, build_router},
    config::Config,
};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Probe the local control plane's liveness endpoint, for use as a container
/// health command. Exit code 0 on success, 1 on failure.
///
/// The port is taken from `SIMDOC_HTTP_BIND` so the probe follows whatever
/// bind the service itself was configured with.
fn run_healthcheck() -> i32 {
    let bind = env::var("SIMDOC_HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:9010".to_string());
    let port = bind.rsplit(':').next().unwrap_or("9010");
    let url = format!("http://127.0.0.1:{port}/health/live");

    let probe = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|error| error.to_string())
        .and_then(|client| client.get(&url).send().map_err(|error| error.to_string()));

    match probe {
        Ok(response) if response.status().is_success() => 0,
        Ok(response) => {
            eprintln!("healthcheck failed: status {}", response.status());
            1
        }
        Err(error) => {
            eprintln!("healthcheck failed: {error}");
            1
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 && args[1] == "healthcheck" {
        std::process::exit(run_healthcheck());
    }

    // Tracing and the panic hook are initialized by Telemetry::new() inside
    // the registry build.
    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.http_bind();
    let registry = ComponentRegistry::build(config)
        .await
        .context("failed to build component registry")?;
    let router = build_router(registry);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

    info!(%bind_addr, "listening");

    if let Err(error) = axum::serve(listener, router).await {
        warn!(error = %error, "server exited with error");
    }

    Ok(())
}
