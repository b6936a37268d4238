//! Per-server tablet query seam.

use async_trait::async_trait;

use crate::errors::RpcError;
use crate::model::{ServerId, TableId, TabletStat};

/// The slice of the tablet-server RPC surface the balancer needs: listing
/// the online tablets of one table on one server. The caller supplies a
/// time-bounded client; the balancer imposes no timeouts of its own.
#[async_trait]
pub trait TabletRpc: Send + Sync {
    async fn online_tablets_for_table(
        &self,
        server: &ServerId,
        table: &TableId,
    ) -> Result<Vec<TabletStat>, RpcError>;
}
