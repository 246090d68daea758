use crate::error::{LogError, Result};
use crate::layer::ArchiveLayer;
use crate::logger::Logger;
use crate::record::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for routing `tracing` events into the archive.
///
/// **Fields**
/// - `min_level`: events below this level are not archived.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`ArchiveLayer`] and events are also printed.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            min_level: Level::Debug,
            enable_stdout: false,
        }
    }
}

/// Install a global `tracing` subscriber that archives events through
/// `logger`.
///
/// **Returns**
/// - `Err(SubscriberInit)` if a global default subscriber is already set.
pub fn init_tracing_with_config(logger: Logger, config: BridgeConfig) -> Result<()> {
    let layer = ArchiveLayer::new(logger).with_min_level(config.min_level);

    // The two subscriber shapes have different types, hence two branches.
    let installed = if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.map_err(|e| LogError::SubscriberInit(e.to_string()))
}

/// [`init_tracing_with_config`] with [`BridgeConfig::default`].
pub fn init_tracing(logger: Logger) -> Result<()> {
    init_tracing_with_config(logger, BridgeConfig::default())
}
