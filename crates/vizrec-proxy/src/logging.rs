//! Log filter and subscriber setup

use tracing_subscriber::{
    filter::Directive, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Filter used when `RUST_LOG` is unset or unparseable
pub const DEFAULT_LOG_FILTER: &str = "vizrec_proxy=info,vizrec_core=info";

/// Extra directives enabled by `--verbose`
const VERBOSE_DIRECTIVES: &[&str] = &[
    "vizrec_proxy=debug",
    "vizrec_core=debug",
    "tower_http=debug",
];

/// Build the log filter from `RUST_LOG`-style directives, layering the
/// verbose directives on top when requested
pub fn log_filter(verbose: bool, env_directives: Option<&str>) -> EnvFilter {
    let mut filter = env_directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    if verbose {
        for directive in VERBOSE_DIRECTIVES {
            if let Ok(directive) = directive.parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

/// Initialize tracing/logging
pub fn init_tracing(verbose: bool) {
    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::registry()
        .with(log_filter(verbose, env_directives.as_deref()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
