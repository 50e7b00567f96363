//! Scheduler backend selection.
//!
//! Both backends run on tokio and share every layer above the socket; they
//! differ in where the TLS handshake is driven:
//! - `tokio`: multi-thread scheduler, handshake spawned onto a worker and joined
//! - `tokio-current-thread`: current-thread scheduler, handshake polled on the
//!   caller's task

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::Deserialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;

use crate::error::{Result, WireError};

/// Aborts the spawned task if the caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Supported scheduler backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Multi-thread tokio runtime.
    Tokio,
    /// Current-thread tokio runtime.
    TokioCurrentThread,
}

impl Backend {
    /// All supported backends.
    pub const ALL: [Backend; 2] = [Backend::Tokio, Backend::TokioCurrentThread];

    /// Configuration name of this backend.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Tokio => "tokio",
            Backend::TokioCurrentThread => "tokio-current-thread",
        }
    }

    /// Check that this backend's scheduler is the one running the caller.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when no runtime is entered or its flavor differs.
    pub fn ensure_available(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| WireError::BackendUnavailable {
            backend: self.name(),
            reason: "no tokio runtime is running".to_string(),
        })?;

        match (self, handle.runtime_flavor()) {
            (Backend::Tokio, RuntimeFlavor::MultiThread)
            | (Backend::TokioCurrentThread, RuntimeFlavor::CurrentThread) => Ok(()),
            (_, flavor) => Err(WireError::BackendUnavailable {
                backend: self.name(),
                reason: format!("caller runs on a {flavor:?} runtime"),
            }),
        }
    }

    /// Drive `fut` to completion the way this backend runs blocking setup
    /// work. The caller always waits for the result.
    ///
    /// Dropping the returned future (e.g. on a connect timeout) drops `fut`
    /// on both backends; a spawned task is aborted.
    pub(crate) async fn drive<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        match self {
            Backend::Tokio => {
                let mut task = AbortOnDrop(tokio::spawn(fut));
                (&mut task.0).await.map_err(|e| {
                    WireError::Handshake(format!("handshake task did not complete: {e}"))
                })?
            }
            Backend::TokioCurrentThread => fut.await,
        }
    }
}

impl FromStr for Backend {
    type Err = WireError;

    fn from_str(name: &str) -> Result<Self> {
        Backend::ALL
            .into_iter()
            .find(|backend| backend.name() == name)
            .ok_or_else(|| WireError::UnsupportedBackend(name.to_string()))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
