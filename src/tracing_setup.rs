use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,gxproxy=debug,tower_http=debug"
    } else {
        "info"
    }
}

fn env_filter(verbose: bool) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_filter(verbose))
            .wrap_err_with(|| format!("Invalid log filter: {}", default_filter(verbose))),
    }
}

/// Initialize logging: JSON lines when `json` is set, console output otherwise.
///
/// `RUST_LOG` takes precedence over `verbose`.
pub fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let filter = env_filter(verbose)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(verbose)
        .with_line_number(verbose);

    if json {
        Registry::default()
            .with(filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init()
            .wrap_err("Failed to install JSON log subscriber")?;
    } else {
        Registry::default()
            .with(filter)
            .with(fmt_layer.pretty())
            .try_init()
            .wrap_err("Failed to install console log subscriber")?;
    }

    tracing::debug!(verbose, json, "gxproxy logging initialized");
    Ok(())
}
