use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug and
/// `--quiet` drops to warnings. `--no-color` turns off ANSI styling.
/// Safe to call more than once (later calls are ignored).
pub fn init(verbose: bool, quiet: bool, no_color: bool) {
    let default_level = if verbose {
        "birdhouse=debug,info"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_ansi(!no_color)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S".to_string()));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
