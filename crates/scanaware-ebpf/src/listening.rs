//! Listening-port whitelist.
//!
//! Reads bound ports from `/proc/net/{tcp,tcp6,udp,udp6}` and mirrors them
//! into the table the classifier consults, so that probes at ports with a
//! local listener are never reported. TCP sockets count when in `LISTEN`
//! (`0A`); UDP sockets count when bound and unconnected (`07`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scanaware_common::error::Result;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Default location of the socket tables.
pub const PROC_NET: &str = "/proc/net";

const TCP_LISTEN: &str = "0A";
const UDP_UNCONNECTED: &str = "07";

/// Socket table files and the state that marks a port as bound.
const SOURCES: [(&str, &str); 4] = [
    ("tcp", TCP_LISTEN),
    ("tcp6", TCP_LISTEN),
    ("udp", UDP_UNCONNECTED),
    ("udp6", UDP_UNCONNECTED),
];

/// Extracts the local ports in `state` from one socket table.
///
/// Lines look like `sl local_address rem_address st ...` with addresses in
/// `HEX_ADDR:HEX_PORT` form. The header line and malformed lines are
/// ignored.
pub fn parse_socket_table(contents: &str, state: &str) -> BTreeSet<u16> {
    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[3] != state {
                return None;
            }
            let (_, port) = fields[1].rsplit_once(':')?;
            u16::from_str_radix(port, 16).ok()
        })
        .collect()
}

/// Reads every socket table under `root` and returns the union of bound
/// ports. Missing tables (for example `tcp6` with IPv6 disabled) are
/// skipped.
pub fn read_listening_ports(root: &Path) -> BTreeSet<u16> {
    let mut ports = BTreeSet::new();
    for (file, state) in SOURCES {
        let path = root.join(file);
        match std::fs::read_to_string(&path) {
            Ok(contents) => ports.extend(parse_socket_table(&contents, state)),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping socket table"),
        }
    }
    ports
}

/// The kernel-side whitelist, or a stand-in for it.
pub trait PortTable {
    /// Marks `port` as having a local listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the table rejects the update.
    fn insert(&mut self, port: u16) -> Result<()>;

    /// Clears `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table rejects the update.
    fn remove(&mut self, port: u16) -> Result<()>;
}

/// Ports added and removed by one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Newly whitelisted ports.
    pub added: Vec<u16>,
    /// Ports no longer whitelisted.
    pub removed: Vec<u16>,
    /// Updates the table rejected; retried on the next pass.
    pub failed: usize,
}

/// Keeps a [`PortTable`] equal to the host's bound ports by applying only
/// the difference since the previous pass.
#[derive(Debug)]
pub struct WhitelistSync {
    proc_root: PathBuf,
    applied: BTreeSet<u16>,
}

impl Default for WhitelistSync {
    fn default() -> Self {
        Self::new(PROC_NET)
    }
}

impl WhitelistSync {
    /// Creates a sync reading socket tables under `proc_root`.
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            applied: BTreeSet::new(),
        }
    }

    /// Ports currently present in the table, as far as this sync knows.
    #[must_use]
    pub const fn applied(&self) -> &BTreeSet<u16> {
        &self.applied
    }

    /// Reads the socket tables and applies the difference to `table`.
    pub fn sync(&mut self, table: &mut impl PortTable) -> SyncOutcome {
        let current = read_listening_ports(&self.proc_root);
        self.apply(current, table)
    }

    /// Applies the difference between `current` and the previous state.
    ///
    /// A port whose update fails keeps its old state here, so the next
    /// pass attempts it again.
    pub fn apply(&mut self, current: BTreeSet<u16>, table: &mut impl PortTable) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        let stale: Vec<u16> = self.applied.difference(&current).copied().collect();
        for port in stale {
            match table.remove(port) {
                Ok(()) => {
                    let _ = self.applied.remove(&port);
                    outcome.removed.push(port);
                }
                Err(e) => {
                    warn!(port, error = %e, "failed to remove stale listening port");
                    outcome.failed += 1;
                }
            }
        }

        let fresh: Vec<u16> = current.difference(&self.applied).copied().collect();
        for port in fresh {
            match table.insert(port) {
                Ok(()) => {
                    let _ = self.applied.insert(port);
                    outcome.added.push(port);
                }
                Err(e) => {
                    warn!(port, error = %e, "failed to whitelist listening port");
                    outcome.failed += 1;
                }
            }
        }

        if !outcome.added.is_empty() || !outcome.removed.is_empty() {
            debug!(
                added = outcome.added.len(),
                removed = outcome.removed.len(),
                total = self.applied.len(),
                "listening-port whitelist updated"
            );
        }
        outcome
    }

    /// Re-syncs every `period` until `shutdown` fires or its sender is
    /// dropped. The first pass runs one period after the call; callers do
    /// the initial sync themselves.
    pub async fn run<T: PortTable>(
        mut self,
        mut table: T,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let outcome = self.sync(&mut table);
                    trace!(?outcome, "whitelist sync pass");
                }
            }
        }
        debug!("whitelist sync stopped");
    }
}
