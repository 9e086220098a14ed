//! Capability traits shared by the database collaborators.

use async_trait::async_trait;

use crate::error::Result;

/// Connection liveness probe.
///
/// Large-table extraction can leave a connection idle for long stretches
/// while data streams to the spool file; callers issue an explicit ping
/// between long-running phases instead of assuming connections tolerate
/// arbitrary idle time.
#[async_trait]
pub trait Liveness: Send + Sync {
    /// Issue a trivial query to validate (and if necessary re-establish)
    /// the connection.
    async fn ping(&self) -> Result<()>;
}
