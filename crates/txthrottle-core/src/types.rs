//! Node identity and health-sample types.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Replication role of a tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    #[serde(alias = "master")]
    Primary,
    Replica,
    #[serde(alias = "batch")]
    Rdonly,
    Spare,
    Experimental,
    Backup,
    Restore,
    Drained,
}

impl TabletType {
    /// Upper-case name used as the `db_type` metric label.
    pub fn label(&self) -> &'static str {
        match self {
            TabletType::Primary => "PRIMARY",
            TabletType::Replica => "REPLICA",
            TabletType::Rdonly => "RDONLY",
            TabletType::Spare => "SPARE",
            TabletType::Experimental => "EXPERIMENTAL",
            TabletType::Backup => "BACKUP",
            TabletType::Restore => "RESTORE",
            TabletType::Drained => "DRAINED",
        }
    }
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a tablet type name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTabletType(pub String);

impl fmt::Display for UnknownTabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tablet type: {}", self.0)
    }
}

impl std::error::Error for UnknownTabletType {}

impl FromStr for TabletType {
    type Err = UnknownTabletType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "master" => Ok(TabletType::Primary),
            "replica" => Ok(TabletType::Replica),
            "rdonly" | "batch" => Ok(TabletType::Rdonly),
            "spare" => Ok(TabletType::Spare),
            "experimental" => Ok(TabletType::Experimental),
            "backup" => Ok(TabletType::Backup),
            "restore" => Ok(TabletType::Restore),
            "drained" => Ok(TabletType::Drained),
            other => Err(UnknownTabletType(other.to_string())),
        }
    }
}

/// Identity of a tablet: where it lives and what role it plays.
///
/// The facade stores one of these for the local node; every health
/// sample carries one for the tablet it describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub cell: String,
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
}

impl Target {
    pub fn new(cell: &str, keyspace: &str, shard: &str, tablet_type: TabletType) -> Self {
        Self {
            cell: cell.to_string(),
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
            tablet_type,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} ({})",
            self.cell, self.keyspace, self.shard, self.tablet_type
        )
    }
}

/// A single health observation delivered by the health feed.
///
/// Transient: consumed by the throttler as soon as it arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct TabletHealth {
    /// `cell-uid` alias of the reporting tablet.
    pub tablet_alias: String,
    pub target: Target,
    /// Whether the tablet is currently serving queries.
    pub serving: bool,
    pub replication_lag: Duration,
    pub observed_at: SystemTime,
}

impl TabletHealth {
    pub fn new(tablet_alias: &str, target: Target, replication_lag: Duration) -> Self {
        Self {
            tablet_alias: tablet_alias.to_string(),
            target,
            serving: true,
            replication_lag,
            observed_at: SystemTime::now(),
        }
    }

    pub fn with_observed_at(mut self, observed_at: SystemTime) -> Self {
        self.observed_at = observed_at;
        self
    }
}
