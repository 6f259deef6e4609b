use std::sync::{Arc, OnceLock};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::backend::BuildError;
use crate::config::LogConfig;
use crate::handle::LoggerHandle;
use crate::layer::HandleLayer;

static DEFAULT: OnceLock<Arc<LoggerHandle>> = OnceLock::new();

/// Errors from process-wide initialization.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("default logger already initialized")]
    AlreadyInitialized,

    #[error("global tracing subscriber already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Build the process default handle from `cfg`.
///
/// Can succeed once per process. A second call returns
/// [`InitError::AlreadyInitialized`] and leaves the first handle in place;
/// use [`LoggerHandle::reload`] to change the configuration later.
pub fn init_default(cfg: &LogConfig) -> Result<Arc<LoggerHandle>, InitError> {
    if DEFAULT.get().is_some() {
        return Err(InitError::AlreadyInitialized);
    }
    let handle = Arc::new(LoggerHandle::from_config(cfg)?);
    DEFAULT
        .set(Arc::clone(&handle))
        .map_err(|_| InitError::AlreadyInitialized)?;
    Ok(handle)
}

/// The handle created by [`init_default`], if any.
pub fn default_handle() -> Option<Arc<LoggerHandle>> {
    DEFAULT.get().cloned()
}

/// Install a global `tracing` subscriber that forwards every event to
/// `handle`.
///
/// When `enable_stdout` is set, a `fmt` layer is stacked on top so events
/// are also printed in the usual `tracing_subscriber` format.
pub fn init_tracing_with_stdout(handle: Arc<LoggerHandle>, enable_stdout: bool) -> Result<(), InitError> {
    let layer = HandleLayer::new(handle);

    // The two subscriber types differ, so each branch installs its own.
    if enable_stdout {
        let subscriber = Registry::default()
            .with(layer)
            .with(tracing_subscriber::fmt::layer());
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Install the forwarding subscriber without the extra `fmt` output.
pub fn init_tracing(handle: Arc<LoggerHandle>) -> Result<(), InitError> {
    init_tracing_with_stdout(handle, false)
}
