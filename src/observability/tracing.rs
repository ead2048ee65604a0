use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Initialize the tracing subscriber and panic hook exactly once.
///
/// Uses the standard JSON fmt layer with an env-filter (`RUST_LOG`,
/// defaulting to `info`). Panics anywhere in the process are routed through
/// `tracing::error!` so they land in the same structured stream as the rest
/// of the logs.
///
/// # Errors
/// Returns an error when the subscriber fails to install.
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|error| Error::msg(error.to_string()))?;

        install_panic_hook();
        info!("tracing initialized");

        Ok::<(), Error>(())
    })?;
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("opaque panic payload");

        // Location implements Display as file:line:column.
        match info.location() {
            Some(location) => {
                error!(thread = thread_name, %location, message, "panic");
            }
            None => {
                error!(thread = thread_name, message, "panic without location");
            }
        }
    }));
}
