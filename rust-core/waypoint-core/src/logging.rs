//! Tracing bootstrap.

use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

/// Directive used when the caller's directive does not parse
pub const DEFAULT_DIRECTIVE: &str = "waypoint_core=info";

/// Install a JSON fmt subscriber filtered by `RUST_LOG` plus `default_directive`
///
/// Returns `false` if a global subscriber was already installed, so calling
/// this more than once is harmless.
pub fn init_tracing(default_directive: &str) -> bool {
    let directive: Directive = default_directive
        .parse()
        .or_else(|_| DEFAULT_DIRECTIVE.parse())
        .unwrap_or_else(|_| Directive::from(LevelFilter::INFO));

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .json()
        .try_init()
        .is_ok()
}
