use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Default filter when neither `RUST_LOG` nor an explicit directive is given.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Installs the global `fmt` subscriber once.
///
/// `directive` wins over `RUST_LOG`; calling this again is a no-op, as is
/// calling it after another subscriber has been set.
pub fn init_logging(directive: Option<&str>) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    INIT.call_once(|| {
        let filter = match directive {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        };
        // Another crate may have won the race since the check above.
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
