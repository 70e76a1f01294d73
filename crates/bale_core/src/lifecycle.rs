//! Explicit component lifecycle.

use async_trait::async_trait;

/// A component with an explicit start and shutdown.
///
/// Composites start their parts in dependency order and shut them down in
/// reverse. Both calls should be idempotent.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Error returned by lifecycle transitions.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Starts background work, if any.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Stops background work and flushes state.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}
