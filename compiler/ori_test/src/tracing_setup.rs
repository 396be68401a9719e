//! Tracing subscriber setup.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for the test engine.
///
/// Does nothing unless `RUST_LOG` is set, e.g. `RUST_LOG=ori_test=debug`.
/// With `ORI_LOG_TREE` also set, output is rendered as an indented span tree
/// instead of flat lines, which makes the orchestrator's phases easier to
/// follow.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_err() {
            return;
        }

        let filter = EnvFilter::from_default_env();
        let registry = tracing_subscriber::registry().with(filter);
        let installed = if std::env::var("ORI_LOG_TREE").is_ok() {
            registry
                .with(
                    tracing_tree::HierarchicalLayer::new(2)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(true).with_level(true))
                .try_init()
        };

        // Another subscriber (e.g. the host compiler's) already owns the slot.
        if let Err(e) = installed {
            tracing::debug!("tracing subscriber not installed: {e}");
        }
    });
}
