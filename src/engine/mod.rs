//! Core engine: the check → size → price → submit drain loop.

pub mod oracle;
pub mod sizer;
pub mod controller;
pub mod driver;

use std::future::Future;
use std::time::Duration;

/// Await `fut`, failing with a timeout error once `limit` elapses.
///
/// A timeout is reported like any other failure of the call, so callers
/// route it through the same error path.
pub(crate) async fn bounded<T, F>(limit: Option<Duration>, what: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| anyhow::anyhow!("{what} timed out after {}ms", limit.as_millis()))?,
        None => fut.await,
    }
}
