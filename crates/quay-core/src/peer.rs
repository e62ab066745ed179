use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use quay_codec::Value;
use quay_wire::{Packet, WireError, WireStream};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::{CallError, Config, PendingTable};

/// Sends a heartbeat every `interval` until the connection or the owning
/// component shuts down. Heartbeats are one-way; nobody replies.
pub(crate) fn spawn_heartbeat(
    wire: WireStream,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if wire.is_closed() || wire.send(&Packet::Heartbeat).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// An outbound connection to a peer dock, shared by every caller that
/// resolved a slot to that address.
///
/// The reader task owns response correlation; callers interact through
/// [`call`](PeerConn::call) / [`call_with_result`](PeerConn::call_with_result)
/// and never touch the stream's read half.
pub(crate) struct PeerConn {
    addr: String,
    wire: WireStream,
    pending: PendingTable,
    /// Slots this peer has confirmed hosting, so the import round-trip
    /// runs once per slot per connection.
    confirmed: Mutex<HashSet<String>>,
    /// Import replies carry no index; they answer requests in order.
    import_waiters: Mutex<VecDeque<oneshot::Sender<Result<Vec<String>, CallError>>>>,
    /// Serializes enqueue-then-send so reply order matches waiter order.
    import_seq: tokio::sync::Mutex<()>,
}

impl PeerConn {
    /// Dials `addr`, spawns the reader and heartbeat tasks, and returns
    /// the shared handle. `on_dead` runs exactly once when the connection
    /// ends, however it ends.
    pub(crate) async fn connect(
        addr: String,
        config: &Config,
        shutdown: watch::Receiver<bool>,
        on_dead: impl FnOnce() + Send + 'static,
    ) -> Result<Arc<PeerConn>, CallError> {
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| CallError::Wire(WireError::Io(e)))?;
        let wire = WireStream::new(stream);
        debug!(addr = %addr, "peer connection established");

        let conn = Arc::new(PeerConn {
            addr,
            wire: wire.clone(),
            pending: PendingTable::new(),
            confirmed: Mutex::new(HashSet::new()),
            import_waiters: Mutex::new(VecDeque::new()),
            import_seq: tokio::sync::Mutex::new(()),
        });

        spawn_heartbeat(wire, config.heartbeat_interval, shutdown.clone());
        tokio::spawn(Self::read_loop(
            conn.clone(),
            config.idle_cutoff(),
            shutdown,
            on_dead,
        ));
        Ok(conn)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.wire.is_closed()
    }

    async fn read_loop(
        self: Arc<Self>,
        cutoff: Duration,
        mut shutdown: watch::Receiver<bool>,
        on_dead: impl FnOnce() + Send + 'static,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                outcome = tokio::time::timeout(cutoff, self.wire.recv()) => match outcome {
                    Err(_) => {
                        debug!(addr = %self.addr, "peer idle past cutoff, closing");
                        break;
                    }
                    Ok(Ok(packet)) => self.on_packet(packet),
                    Ok(Err(WireError::Closed)) => break,
                    Ok(Err(e)) => {
                        warn!(addr = %self.addr, error = %e, "peer connection failed");
                        break;
                    }
                },
            }
        }

        self.wire.close();
        self.pending.fail_all(|| CallError::ConnectionReset);
        let waiters: Vec<_> = self.import_waiters.lock().drain(..).collect();
        for tx in waiters {
            let _ = tx.send(Err(CallError::ConnectionReset));
        }
        on_dead();
    }

    fn on_packet(&self, packet: Packet) {
        match packet {
            Packet::RpcResponse {
                index,
                slot,
                err,
                result,
                ..
            } => {
                let outcome = if err.is_empty() {
                    Ok(result)
                } else {
                    Err(CallError::Remote(err))
                };
                if !self.pending.complete(index, outcome) {
                    debug!(index, slot = %slot, "dropping stale rpc response");
                }
            }
            Packet::ImportResponse { docks } => {
                match self.import_waiters.lock().pop_front() {
                    Some(tx) => {
                        let _ = tx.send(Ok(docks));
                    }
                    None => debug!(addr = %self.addr, "unsolicited import response"),
                }
            }
            Packet::Error { message } => match self.import_waiters.lock().pop_front() {
                Some(tx) => {
                    let _ = tx.send(Err(CallError::Remote(message)));
                }
                None => warn!(addr = %self.addr, error = %message, "peer reported error"),
            },
            Packet::Heartbeat => {}
            other => debug!(addr = %self.addr, kind = other.kind(), "ignoring unexpected packet"),
        }
    }

    /// Confirms, once per connection, that the peer actually hosts `slot`
    /// before calls are issued against it.
    pub(crate) async fn ensure_import(&self, slot: &str) -> Result<(), CallError> {
        if self.confirmed.lock().contains(slot) {
            return Ok(());
        }

        let rx = {
            let _guard = self.import_seq.lock().await;
            let (tx, rx) = oneshot::channel();
            self.import_waiters.lock().push_back(tx);
            self.wire
                .send(&Packet::ImportRequest {
                    slots: vec![slot.to_owned()],
                })
                .await?;
            rx
        };

        let docks = rx.await.map_err(|_| CallError::ConnectionReset)??;
        if docks.first().is_some_and(|d| d == slot) {
            self.confirmed.lock().insert(slot.to_owned());
            Ok(())
        } else {
            Err(CallError::UnknownSlot(slot.to_owned()))
        }
    }

    /// Fire-and-forget invocation: no pending entry, no response frame.
    pub(crate) async fn call(
        &self,
        slot: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<(), CallError> {
        let index = self.pending.next_index();
        self.wire
            .send(&Packet::RpcRequest {
                index,
                slot: slot.to_owned(),
                method: method.to_owned(),
                args,
                want_result: false,
            })
            .await?;
        Ok(())
    }

    /// Invocation that waits for the correlated response, optionally
    /// bounded by a deadline.
    pub(crate) async fn call_with_result(
        &self,
        slot: &str,
        method: &str,
        args: Vec<Value>,
        deadline: Option<Duration>,
    ) -> Result<Vec<Value>, CallError> {
        let index = self.pending.next_index();
        let rx = self.pending.register(index);

        let send = self
            .wire
            .send(&Packet::RpcRequest {
                index,
                slot: slot.to_owned(),
                method: method.to_owned(),
                args,
                want_result: true,
            })
            .await;
        if let Err(e) = send {
            self.pending.reap(index);
            return Err(e.into());
        }

        match deadline {
            None => rx.await.map_err(|_| CallError::ConnectionReset)?,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome.map_err(|_| CallError::ConnectionReset)?,
                Err(_) => {
                    self.pending.reap(index);
                    Err(CallError::Timeout)
                }
            },
        }
    }
}
