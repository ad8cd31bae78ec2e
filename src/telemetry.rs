//! Logging setup for binaries built on this crate.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing to stderr.
///
/// The filter comes from `RUST_LOG` when set, otherwise `default_filter`
/// (e.g. `"warn"` or `"ragline=debug"`). Calling this more than once is a
/// no-op; returns whether this call installed the subscriber.
pub fn init(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init("warn");
        assert!(!init("debug"));
    }
}
