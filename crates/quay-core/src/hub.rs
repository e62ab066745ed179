use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use quay_wire::{Packet, WireError, WireStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{Config, peer::spawn_heartbeat};

/// The naming service.
///
/// Owns the authoritative slot → dock-address table. Docks register the
/// slots they host over a persistent control connection; the table entry
/// lives exactly as long as that connection. A slot name maps to at most
/// one address at any instant, enforced by rejecting duplicate
/// registrations atomically per batch.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: Config,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    table: Mutex<HashMap<String, String>>,
    next_port: AtomicU32,
    shutdown_tx: watch::Sender<bool>,
}

impl Hub {
    /// Binds the control listener. `addr` may carry port 0 for an
    /// ephemeral port; see [`local_addr`](Hub::local_addr).
    pub async fn bind(addr: &str, config: Config) -> io::Result<Hub> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);
        info!(addr = %local_addr, "hub listening");
        Ok(Hub {
            inner: Arc::new(HubInner {
                next_port: AtomicU32::new(config.dock_port_base as u32),
                config,
                local_addr,
                listener: Mutex::new(Some(listener)),
                table: Mutex::new(HashMap::new()),
                shutdown_tx,
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Accepts control connections until [`close`](Hub::close).
    pub async fn run(&self) -> io::Result<()> {
        let listener = self
            .inner
            .listener
            .lock()
            .take()
            .ok_or_else(|| io::Error::other("hub is already running"))?;
        let mut shutdown = self.inner.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let inner = self.inner.clone();
                    let shutdown = self.inner.shutdown_tx.subscribe();
                    tokio::spawn(serve_conn(inner, stream, peer, shutdown));
                }
            }
        }
        info!(addr = %self.inner.local_addr, "hub stopped");
        Ok(())
    }

    pub fn close(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// Current address for a slot, if any. Test and tooling hook; the
    /// protocol path goes through query frames.
    pub fn lookup(&self, slot: &str) -> Option<String> {
        self.inner.table.lock().get(slot).cloned()
    }

    pub fn slot_count(&self) -> usize {
        self.inner.table.lock().len()
    }
}

impl HubInner {
    fn alloc_port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::Relaxed) as u16
    }

    /// Admits a registration batch atomically: either every slot maps to
    /// the new address, or (on any duplicate, within the batch or against
    /// the table) nothing is admitted.
    fn register(&self, peer: SocketAddr, slots: &[String], owned: &mut Vec<String>) -> Packet {
        let mut table = self.table.lock();

        for (i, slot) in slots.iter().enumerate() {
            if table.contains_key(slot) || slots[..i].contains(slot) {
                debug!(slot = %slot, peer = %peer, "rejecting duplicate registration");
                return Packet::Error {
                    message: format!("duplicate slot: {slot}"),
                };
            }
        }

        let port = self.alloc_port();
        let addr = format!("{}:{}", peer.ip(), port);
        for slot in slots {
            table.insert(slot.clone(), addr.clone());
            owned.push(slot.clone());
        }
        info!(peer = %peer, addr = %addr, slots = slots.len(), "dock registered");
        Packet::HubRegisterResponse { port }
    }
}

async fn serve_conn(
    inner: Arc<HubInner>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let wire = WireStream::new(stream);
    spawn_heartbeat(
        wire.clone(),
        inner.config.heartbeat_interval,
        shutdown.clone(),
    );

    let cutoff = inner.config.idle_cutoff();
    // Slots admitted over this connection; purged when it ends.
    let mut owned: Vec<String> = Vec::new();

    loop {
        let packet = tokio::select! {
            _ = shutdown.changed() => break,
            outcome = tokio::time::timeout(cutoff, wire.recv()) => match outcome {
                Err(_) => {
                    debug!(peer = %peer, "control connection idle past cutoff, closing");
                    break;
                }
                Ok(Ok(packet)) => packet,
                Ok(Err(WireError::Closed)) => break,
                Ok(Err(e)) => {
                    warn!(peer = %peer, error = %e, "control connection failed");
                    break;
                }
            },
        };

        let reply = match packet {
            Packet::RegisterRequest { slots } => {
                Some(inner.register(peer, &slots, &mut owned))
            }
            Packet::QueryRequest { slot } => Some(match inner.table.lock().get(&slot) {
                Some(addr) => Packet::QueryResponse {
                    dock_addr: addr.clone(),
                },
                None => Packet::Error {
                    message: format!("unknown slot: {slot}"),
                },
            }),
            Packet::ImportRequest { slots } => {
                let table = inner.table.lock();
                let docks = slots
                    .iter()
                    .map(|s| table.get(s).cloned().unwrap_or_default())
                    .collect();
                drop(table);
                Some(Packet::ImportResponse { docks })
            }
            Packet::Heartbeat => None,
            Packet::Error { message } => {
                warn!(peer = %peer, error = %message, "dock reported error");
                None
            }
            other => {
                debug!(peer = %peer, kind = other.kind(), "ignoring unexpected packet");
                None
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = wire.send(&reply).await {
                warn!(peer = %peer, error = %e, "failed to send control reply");
                break;
            }
        }
    }

    wire.close();
    if !owned.is_empty() {
        let mut table = inner.table.lock();
        for slot in &owned {
            table.remove(slot);
        }
        info!(peer = %peer, slots = owned.len(), "purged slots for departed dock");
    }
}
