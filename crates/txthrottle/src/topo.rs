//! Topology queries used to derive the watched cell set.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{error, warn};

use txthrottle_core::Target;

/// Upper bound on a single topology read.
pub const REMOTE_OPERATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Boxed future alias for a known-cells query.
pub type KnownCellsFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + 'a>>;

/// Read-only view of the cluster topology store.
pub trait TopoServer: Send + Sync {
    /// List every cell the topology knows about.
    fn known_cells(&self) -> KnownCellsFuture<'_>;
}

/// A topology with a fixed cell list.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    cells: Vec<String>,
}

impl StaticTopology {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }
}

impl TopoServer for StaticTopology {
    fn known_cells(&self) -> KnownCellsFuture<'_> {
        let cells = self.cells.clone();
        Box::pin(async move { Ok(cells) })
    }
}

/// Fetch the known cells, falling back to the local cell.
///
/// Errors, timeouts and an empty listing all resolve to `[target.cell]`.
/// The result is sorted and de-duplicated.
pub async fn fetch_known_cells(
    topo: &dyn TopoServer,
    target: &Target,
    timeout: Duration,
) -> Vec<String> {
    let cells = match tokio::time::timeout(timeout, topo.known_cells()).await {
        Ok(Ok(cells)) if !cells.is_empty() => cells,
        Ok(Ok(_)) => {
            warn!(cell = %target.cell, "txThrottler: topology returned no cells, using local cell");
            vec![target.cell.clone()]
        }
        Ok(Err(e)) => {
            error!(
                cell = %target.cell,
                error = %e,
                "txThrottler: falling back to local cell due to error fetching cells from topology"
            );
            vec![target.cell.clone()]
        }
        Err(_) => {
            error!(
                cell = %target.cell,
                timeout_ms = timeout.as_millis() as u64,
                "txThrottler: falling back to local cell, topology cell fetch timed out"
            );
            vec![target.cell.clone()]
        }
    };
    normalize_cells(cells)
}

/// Sort and de-duplicate a cell list.
pub fn normalize_cells<I>(cells: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    cells
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
