//! Linux scanner: aya loader, TC attach, ring-buffer reader.

use std::time::Duration;

use aya::Ebpf;
use aya::maps::{HashMap, MapData, RingBuf};
use aya::programs::tc::SchedClassifierLinkId;
use aya::programs::{SchedClassifier, TcAttachType, tc};
use scanaware_classifier::{EVENTS_MAP, LISTENING_PORTS_MAP, PROGRAM_NAME};
use scanaware_common::constants::WHITELIST_SYNC_INTERVAL;
use scanaware_common::error::{Result, ScanError};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Attachment;
use super::attach::{Hook, attach_all, attachable, detach_all};
use crate::interfaces;
use crate::listening::{PortTable, WhitelistSync};
use crate::programs;
use crate::reader::{Delivery, Forwarder};

/// Pause after a failed readiness poll before polling again.
const READ_RETRY: Duration = Duration::from_millis(100);

/// Lifts the locked-memory limit so older kernels can create the maps, and
/// puts the previous limit back on drop.
struct Memlock {
    previous: Option<libc::rlimit>,
}

impl Memlock {
    #[allow(unsafe_code)]
    fn raise() -> Self {
        let mut previous = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: getrlimit only writes into the struct passed by pointer.
        if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut previous) } != 0 {
            debug!("failed to read limit on locked memory");
            return Self { previous: None };
        }
        let unlimited = libc::rlimit {
            rlim_cur: libc::RLIM_INFINITY,
            rlim_max: libc::RLIM_INFINITY,
        };
        // SAFETY: setrlimit only reads the struct passed by reference.
        if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &unlimited) } != 0 {
            debug!("failed to remove limit on locked memory");
            return Self { previous: None };
        }
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for Memlock {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // SAFETY: setrlimit only reads the struct passed by reference.
            if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &previous) } != 0 {
                debug!("failed to restore limit on locked memory");
            }
        }
    }
}

fn compile_failed<E: ToString>(reason: E) -> ScanError {
    ScanError::CompileFailed {
        reason: reason.to_string(),
    }
}

fn classifier(ebpf: &mut Ebpf) -> Result<&mut SchedClassifier> {
    ebpf.program_mut(PROGRAM_NAME)
        .ok_or_else(|| compile_failed(format!("program {PROGRAM_NAME} missing from object")))?
        .try_into()
        .map_err(compile_failed)
}

/// Loads the embedded object, creating both maps, and verifies the
/// classifier. The caller holds a [`Memlock`] across the load.
fn load() -> Result<Ebpf> {
    let mut ebpf = Ebpf::load(programs::object()).map_err(compile_failed)?;
    classifier(&mut ebpf)?.load().map_err(compile_failed)?;
    Ok(ebpf)
}

pub(super) fn supported() -> bool {
    let _memlock = Memlock::raise();
    match load() {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "eBPF scan detection unavailable");
            false
        }
    }
}

pub(super) const fn ensure_available() -> Result<()> {
    Ok(())
}

/// The `LISTENING_PORTS` map as seen from user space.
struct KernelPorts(HashMap<MapData, u16, u8>);

impl PortTable for KernelPorts {
    fn insert(&mut self, port: u16) -> Result<()> {
        self.0
            .insert(port, 1u8, 0)
            .map_err(|e| ScanError::WhitelistUpdate {
                port,
                reason: e.to_string(),
            })
    }

    fn remove(&mut self, port: u16) -> Result<()> {
        self.0.remove(&port).map_err(|e| ScanError::WhitelistUpdate {
            port,
            reason: e.to_string(),
        })
    }
}

/// TC ingress attach on a loaded object.
struct TcHook<'a>(&'a mut Ebpf);

impl Hook for TcHook<'_> {
    type Link = SchedClassifierLinkId;

    fn attach(&mut self, interface: &str) -> Result<SchedClassifierLinkId> {
        attachable(interface, interfaces::find_interface(interface)?.as_ref())?;
        // Fails with EEXIST when the clsact qdisc is already present.
        if let Err(e) = tc::qdisc_add_clsact(interface) {
            debug!(interface, error = %e, "clsact qdisc not added");
        }
        classifier(self.0)?
            .attach(interface, TcAttachType::Ingress)
            .map_err(|e| ScanError::AttachFailed {
                interface: interface.to_string(),
                reason: e.to_string(),
            })
    }

    fn detach(&mut self, interface: &str, link: SchedClassifierLinkId) -> Result<()> {
        classifier(self.0)?
            .detach(link)
            .map_err(|e| ScanError::AttachFailed {
                interface: interface.to_string(),
                reason: e.to_string(),
            })
    }
}

/// A loaded classifier attached to one or more interfaces.
struct Session {
    ebpf: Ebpf,
    links: Vec<(String, SchedClassifierLinkId)>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    // Dropped last so the limit is restored after the maps are released.
    _memlock: Memlock,
}

impl Attachment for Session {
    fn shutdown(&mut self) -> Result<()> {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        detach_all(&mut TcHook(&mut self.ebpf), std::mem::take(&mut self.links))
    }

    fn take_tasks(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.tasks)
    }
}

pub(super) fn open(
    interfaces: &[String],
    forwarder: Forwarder,
    runtime: &Handle,
) -> Result<Box<dyn Attachment>> {
    let memlock = Memlock::raise();
    let mut ebpf = load()?;

    let ring = RingBuf::try_from(
        ebpf.take_map(EVENTS_MAP)
            .ok_or_else(|| compile_failed(format!("map {EVENTS_MAP} missing from object")))?,
    )
    .map_err(compile_failed)?;
    let ports = HashMap::try_from(
        ebpf.take_map(LISTENING_PORTS_MAP)
            .ok_or_else(|| compile_failed(format!("map {LISTENING_PORTS_MAP} missing from object")))?,
    )
    .map_err(compile_failed)?;
    let mut ports = KernelPorts(ports);

    // Whitelist before attaching so local services are never reported.
    let mut sync = WhitelistSync::default();
    let _ = sync.sync(&mut ports);
    info!(ports = sync.applied().len(), "listening-port whitelist loaded");

    let links = attach_all(&mut TcHook(&mut ebpf), interfaces)?;

    let (shutdown, stop) = watch::channel(false);
    let tasks = vec![
        runtime.spawn(read_events(ring, forwarder, stop.clone())),
        runtime.spawn(sync.run(ports, WHITELIST_SYNC_INTERVAL, stop)),
    ];

    Ok(Box::new(Session {
        ebpf,
        links,
        shutdown,
        tasks,
        _memlock: memlock,
    }))
}

/// Drains the ring buffer on every readiness edge until shutdown.
async fn read_events(
    ring: RingBuf<MapData>,
    forwarder: Forwarder,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ring = match AsyncFd::with_interest(ring, Interest::READABLE) {
        Ok(fd) => fd,
        Err(e) => {
            let err = ScanError::ReadFailed {
                reason: e.to_string(),
            };
            warn!(error = %err, "ring buffer reader not started");
            return;
        }
    };
    debug!("ring buffer reader started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            ready = ring.readable_mut() => match ready {
                Ok(mut guard) => {
                    let buffer = guard.get_inner_mut();
                    while let Some(item) = buffer.next() {
                        if forwarder.forward(&item) == Delivery::Closed {
                            debug!("event consumer gone, ring buffer reader stopping");
                            return;
                        }
                    }
                    guard.clear_ready();
                }
                Err(e) => {
                    let err = ScanError::ReadFailed {
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "ring buffer readiness poll failed");
                    tokio::time::sleep(READ_RETRY).await;
                }
            }
        }
    }
    debug!("ring buffer reader stopped");
}
