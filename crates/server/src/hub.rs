use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use dashmap::DashMap;
use interface::{ClientMsg, Outbound, ServerMsg, TransportError};
use tracing::{debug, info, warn};

/// Something the control thread has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A client message, already stamped with its sender's id.
    Message(ClientMsg),
    /// Pointer position from an interactive front end, in world coordinates.
    Pointer { x: f64, y: f64 },
    /// Stop the control loop.
    Shutdown,
}

/// Transport seen from the control thread: one inbound event queue, and
/// outbound delivery to a single client or to all of them.
pub trait MessageChannel: Send {
    /// Blocks until the next event.
    fn recv(&self) -> Result<Event, TransportError>;

    /// Waits at most `timeout` for the next event.
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Event>, TransportError>;

    fn send(&self, client_id: u64, msg: Outbound) -> Result<(), TransportError>;

    fn broadcast(&self, msg: Outbound);

    /// Waits, at most `timeout`, for every queued outbound message to be
    /// handed to its client. Returns false on timeout.
    fn flush(&self, timeout: Duration) -> bool;
}

/// Per-client outbound queue.
///
/// For remote clients `in_flight` counts messages queued but not yet taken
/// by the gRPC response stream.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub remote: bool,
    pub outbound_tx: Sender<ServerMsg>,
    pub outbound_rx: Receiver<ServerMsg>,
    pub in_flight: Arc<AtomicUsize>,
}

impl ClientInfo {
    fn push(&self, msg: ServerMsg) -> bool {
        if self.remote {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        let sent = self.outbound_tx.send(msg).is_ok();
        if !sent && self.remote {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        sent
    }

    fn is_drained(&self) -> bool {
        self.outbound_rx.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }
}

/// Shared message hub: clients (local or gRPC) push into one inbound queue
/// and get their replies on their own outbound queue.
#[derive(Debug)]
pub struct Hub {
    next_client_id: AtomicU64,
    inbound_tx: Sender<Event>,
    inbound_rx: Receiver<Event>,
    clients: DashMap<u64, ClientInfo>,
}

pub type SharedHub = Arc<Hub>;

impl Hub {
    pub fn new() -> SharedHub {
        let (inbound_tx, inbound_rx) = unbounded();
        Arc::new(Self {
            next_client_id: AtomicU64::new(1),
            inbound_tx,
            inbound_rx,
            clients: DashMap::new(),
        })
    }

    fn add_client(&self, remote: bool) -> (u64, Receiver<ServerMsg>) {
        let (outbound_tx, outbound_rx) = unbounded::<ServerMsg>();
        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        self.clients.insert(
            client_id,
            ClientInfo {
                remote,
                outbound_tx,
                outbound_rx: outbound_rx.clone(),
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
        );
        (client_id, outbound_rx)
    }

    /// Registers an in-process client. Messages sent on the returned sender
    /// are stamped with the client id and queued for the control thread; the
    /// client is unregistered once the sender is dropped.
    pub fn register_local(self: &Arc<Self>) -> (u64, Sender<ClientMsg>, Receiver<ServerMsg>) {
        let (to_server_tx, to_server_rx) = unbounded::<ClientMsg>();
        let (client_id, from_server_rx) = self.add_client(false);

        let hub = self.clone();
        thread::spawn(move || {
            for msg in to_server_rx.iter() {
                if hub.submit(client_id, msg).is_err() {
                    break;
                }
            }
            debug!("client #{client_id} hung up");
            hub.unregister(client_id);
        });

        info!("registered local client #{client_id}");
        (client_id, to_server_tx, from_server_rx)
    }

    /// Registers a gRPC client; the caller forwards its stream through
    /// [`Hub::submit`] and drains the returned receiver.
    pub fn register_remote(&self) -> (u64, Receiver<ServerMsg>) {
        let (client_id, rx) = self.add_client(true);
        info!("registered remote client #{client_id}");
        (client_id, rx)
    }

    /// A message for `client_id` left the hub's hands (taken by the gRPC
    /// response stream).
    pub fn delivered(&self, client_id: u64) {
        if let Some(client) = self.clients.get(&client_id) {
            let taken = client
                .in_flight
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if taken.is_err() {
                debug!("client #{client_id}: delivery reported with nothing in flight");
            }
        }
    }

    /// Drops every client's outbound queue. Remote response streams end once
    /// their forwarders have drained what was queued.
    pub fn close(&self) {
        let count = self.clients.len();
        self.clients.clear();
        info!("closed {count} client queue(s)");
    }

    pub fn unregister(&self, client_id: u64) {
        if self.clients.remove(&client_id).is_some() {
            info!("unregistered client #{client_id}");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Queues a client message for the control thread.
    pub fn submit(&self, client_id: u64, mut msg: ClientMsg) -> Result<(), TransportError> {
        msg.client_id = client_id;
        self.inbound_tx
            .send(Event::Message(msg))
            .map_err(|_| TransportError::Closed)
    }

    /// Pointer moved over the playground.
    pub fn pointer(&self, x: f64, y: f64) {
        if self.inbound_tx.send(Event::Pointer { x, y }).is_err() {
            warn!("pointer at ({x}, {y}) dropped: control loop is gone");
        }
    }

    /// Asks the control loop to stop.
    pub fn shutdown(&self) {
        if self.inbound_tx.send(Event::Shutdown).is_err() {
            debug!("shutdown requested but the control loop is already gone");
        }
    }
}

impl MessageChannel for Arc<Hub> {
    fn recv(&self) -> Result<Event, TransportError> {
        self.inbound_rx.recv().map_err(|_| TransportError::Closed)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Event>, TransportError> {
        match self.inbound_rx.recv_timeout(timeout) {
            Ok(ev) => Ok(Some(ev)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn send(&self, client_id: u64, msg: Outbound) -> Result<(), TransportError> {
        let client = self
            .clients
            .get(&client_id)
            .ok_or(TransportError::UnknownClient(client_id))?;
        debug!("-> #{client_id} {}", msg.kind());
        if client.push(msg.encode()) {
            Ok(())
        } else {
            Err(TransportError::Disconnected(client_id))
        }
    }

    fn broadcast(&self, msg: Outbound) {
        let kind = msg.kind();
        debug!("-> * {}", kind);
        let wire = msg.encode();
        for entry in self.clients.iter() {
            if !entry.push(wire.clone()) {
                warn!("broadcast {} not delivered to #{}", kind, entry.key());
            }
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.clients.iter().all(|c| c.is_drained()) {
                return true;
            }
            if Instant::now() >= deadline {
                warn!("outbound queues not drained after {timeout:?}");
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use interface::{Inbound, MessageKind};

    use super::*;

    #[test]
    fn local_messages_are_stamped_with_the_client_id() {
        let hub = Hub::new();
        let (id, tx, _rx) = hub.register_local();
        tx.send(Inbound::Hello.encode(0)).unwrap();

        match hub.recv_timeout(Duration::from_secs(1)).unwrap() {
            Some(Event::Message(msg)) => {
                assert_eq!(msg.client_id, id);
                assert_eq!(msg.tag, MessageKind::Hello.tag());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn replies_go_to_the_requesting_client_only() {
        let hub = Hub::new();
        let (a, _tx_a, rx_a) = hub.register_local();
        let (_b, _tx_b, rx_b) = hub.register_local();

        hub.send(a, Outbound::Step).unwrap();
        assert_eq!(rx_a.try_iter().count(), 1);
        assert!(rx_b.try_iter().next().is_none());

        hub.broadcast(Outbound::Bye);
        assert_eq!(rx_a.try_iter().count(), 1);
        assert_eq!(rx_b.try_iter().count(), 1);
    }

    #[test]
    fn sending_to_an_unknown_client_fails() {
        let hub = Hub::new();
        assert_eq!(
            hub.send(42, Outbound::Hello),
            Err(TransportError::UnknownClient(42))
        );
    }

    #[test]
    fn remote_replies_are_flushed_once_the_stream_takes_them() {
        let hub = Hub::new();
        let (id, rx) = hub.register_remote();
        hub.send(id, Outbound::Exit).unwrap();

        assert!(!hub.flush(Duration::from_millis(10)));
        // the forwarder emptied the queue, the response stream has not
        // taken the message yet
        assert!(rx.try_recv().is_ok());
        assert!(!hub.flush(Duration::from_millis(10)));

        hub.delivered(id);
        assert!(hub.flush(Duration::from_millis(10)));
    }

    #[test]
    fn local_replies_are_flushed_once_received() {
        let hub = Hub::new();
        let (id, _tx, rx) = hub.register_local();
        hub.send(id, Outbound::Exit).unwrap();

        assert!(!hub.flush(Duration::from_millis(10)));
        assert!(rx.try_recv().is_ok());
        assert!(hub.flush(Duration::from_millis(10)));
    }

    #[test]
    fn pointer_and_shutdown_are_queued_in_order() {
        let hub = Hub::new();
        hub.pointer(120.0, 340.0);
        hub.shutdown();

        assert_eq!(
            hub.recv().unwrap(),
            Event::Pointer { x: 120.0, y: 340.0 }
        );
        assert_eq!(hub.recv().unwrap(), Event::Shutdown);
    }

    #[test]
    fn closing_ends_every_outbound_queue() {
        let hub = Hub::new();
        let (id, rx) = hub.register_remote();
        hub.send(id, Outbound::Exit).unwrap();
        hub.close();

        assert_eq!(hub.client_count(), 0);
        assert_eq!(rx.iter().count(), 1);
    }

    #[test]
    fn dropping_the_sender_unregisters_the_client() {
        let hub = Hub::new();
        let (_id, tx, _rx) = hub.register_local();
        assert_eq!(hub.client_count(), 1);
        drop(tx);

        let deadline = Instant::now() + Duration::from_secs(1);
        while hub.client_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hub.client_count(), 0);
    }
}
