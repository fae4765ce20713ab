use std::{thread::JoinHandle, time::Duration};

use anyhow::{Result, anyhow, bail};
use crossbeam_channel as xchan;
use interface::{
    ArmOrder, ClientMsg, DisplayRequest, GeoBounds, Inbound, MessageKind, Outbound, Readings,
    ResultDump, ServerMsg, SimulationConfig, wire::simulator_client::SimulatorClient,
};
use server::{hub::SharedHub, safe_block_on};
use tracing::{error, info, warn};

// ===== Public sync facade =====================================================

/// Transport-agnostic, synchronous client handle.
///
/// Requests are answered in order, so each typed helper sends one message
/// and waits for its reply. INVERSE_REQUEST broadcasts that arrive in
/// between are kept aside for [`SyncSimClient::take_inverse_requests`].
pub struct SyncSimClient {
    client_id: Option<u64>,
    tx_to_worker: xchan::Sender<ClientMsg>,
    rx_from_worker: xchan::Receiver<ServerMsg>,
    inverse_requests: Vec<Outbound>,
    _join: Option<JoinHandle<()>>,
}

impl SyncSimClient {
    /// Id assigned by the hub; only known for in-process clients.
    pub fn id(&self) -> Option<u64> {
        self.client_id
    }

    /// Send a raw `ClientMsg` (blocking on channel backpressure).
    pub fn send_raw(&self, msg: ClientMsg) -> Result<()> {
        self.tx_to_worker
            .send(msg)
            .map_err(|e| anyhow!("sync_client send error: {e}"))
    }

    pub fn send(&self, msg: &Inbound) -> Result<()> {
        self.send_raw(msg.encode(self.client_id.unwrap_or_default()))
    }

    /// Receive the next raw `ServerMsg` (blocking).
    pub fn recv_raw(&self) -> Result<ServerMsg> {
        self.rx_from_worker
            .recv()
            .map_err(|e| anyhow!("sync_client recv error: {e}"))
    }

    /// Receive and decode the next server message (blocking).
    pub fn recv(&self) -> Result<Outbound> {
        Ok(Outbound::decode(self.recv_raw()?)?)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Outbound>> {
        match self.rx_from_worker.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(Outbound::decode(msg)?)),
            Err(xchan::RecvTimeoutError::Timeout) => Ok(None),
            Err(e) => Err(anyhow!("sync_client recv error: {e}")),
        }
    }

    /// Non-blocking receive; returns `None` if no message is ready.
    pub fn try_recv(&self) -> Option<ServerMsg> {
        self.rx_from_worker.try_recv().ok()
    }

    /// Sends `msg` and waits for the reply carrying the same tag.
    ///
    /// An ERROR reply (a rejected request) becomes an `Err`.
    pub fn request(&mut self, msg: Inbound) -> Result<Outbound> {
        let kind = msg.kind();
        self.send(&msg)?;
        loop {
            match self.recv()? {
                Outbound::Error(text) => bail!("{kind} rejected: {text}"),
                inverse @ Outbound::InverseRequest { .. } if kind != MessageKind::InverseRequest => {
                    self.inverse_requests.push(inverse);
                }
                reply if reply.kind() == kind => return Ok(reply),
                other => warn!("ignoring unexpected {} while waiting for {kind}", other.kind()),
            }
        }
    }

    pub fn hello(&mut self) -> Result<()> {
        self.request(Inbound::Hello).map(drop)
    }

    pub fn bye(&mut self) -> Result<()> {
        self.request(Inbound::Bye).map(drop)
    }

    pub fn configure(&mut self, config: SimulationConfig) -> Result<GeoBounds> {
        match self.request(Inbound::Configure(config))? {
            Outbound::Configured(bounds) => Ok(bounds),
            other => bail!("unexpected CONFIGURE reply {other:?}"),
        }
    }

    /// RESET; returns the fresh readings when the server answers with a
    /// snapshot.
    pub fn reset(&mut self, pose: Option<Vec<f64>>) -> Result<Option<Readings>> {
        match self.request(Inbound::Reset(pose))? {
            Outbound::Reset => Ok(None),
            Outbound::ResetSnapshot(readings) => Ok(Some(readings)),
            other => bail!("unexpected RESET reply {other:?}"),
        }
    }

    pub fn order(&mut self, order: ArmOrder) -> Result<()> {
        self.request(Inbound::Order(order)).map(drop)
    }

    pub fn step(&mut self, count: u32) -> Result<()> {
        self.request(Inbound::Step(count)).map(drop)
    }

    pub fn sensors(&mut self) -> Result<Readings> {
        match self.request(Inbound::SensorQuery)? {
            Outbound::Sensors(readings) => Ok(readings),
            other => bail!("unexpected SENSOR_QUERY reply {other:?}"),
        }
    }

    pub fn result(&mut self) -> Result<ResultDump> {
        match self.request(Inbound::Result)? {
            Outbound::Result(dump) => Ok(dump),
            other => bail!("unexpected RESULT reply {other:?}"),
        }
    }

    pub fn display(&mut self, request: DisplayRequest) -> Result<bool> {
        match self.request(Inbound::Display(request))? {
            Outbound::Display { accepted } => Ok(accepted),
            other => bail!("unexpected DISPLAY reply {other:?}"),
        }
    }

    /// Arms or disarms the inverse request; the server does not answer.
    pub fn set_inverse(&self, enabled: bool) -> Result<()> {
        self.send(&Inbound::InverseToggle(enabled))
    }

    /// INVERSE_REQUEST broadcasts received while waiting for other replies.
    pub fn take_inverse_requests(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.inverse_requests)
    }

    /// Asks the server process to terminate and waits for the
    /// acknowledgement.
    pub fn exit(&mut self) -> Result<()> {
        self.request(Inbound::Exit).map(drop)
    }

    /// Polls SENSOR_QUERY until `channel` holds at least `samples` samples.
    ///
    /// Interactive servers run queued steps one frame at a time, so the STEP
    /// acknowledgement arrives before the steps ran.
    pub fn wait_for_samples(
        &mut self,
        channel: &str,
        samples: usize,
        timeout: Duration,
    ) -> Result<Readings> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let readings = self.sensors()?;
            if readings.get(channel).map_or(0, Vec::len) >= samples {
                return Ok(readings);
            }
            if std::time::Instant::now() >= deadline {
                bail!("`{channel}` did not reach {samples} samples within {timeout:?}");
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Connect to a **remote** gRPC server at the given address.
///
/// You can pass either:
/// - `"127.0.0.1:1989"` → automatically becomes `"http://127.0.0.1:1989"`
/// - `"http://127.0.0.1:1989"` → used as is
pub fn connect_remote(addr: &str) -> Result<SyncSimClient> {
    let (to_worker_tx, to_worker_rx) = xchan::bounded::<ClientMsg>(1024);
    let (to_app_tx, to_app_rx) = xchan::bounded::<ServerMsg>(1024);

    let addr_http = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    };

    info!("[Client] Connecting to {addr_http}");
    let (ready_tx, ready_rx) = xchan::bounded::<Result<(), String>>(1);

    let join = std::thread::spawn(move || {
        // Each worker thread runs its own lightweight single-threaded runtime
        safe_block_on(async move {
            // --- 1) Connect to gRPC server ---
            let mut grpc = match SimulatorClient::connect(addr_http.clone()).await {
                Ok(c) => c,
                Err(e) => {
                    error!("[Client] Failed to connect: {e}");
                    let _ = ready_tx.send(Err(format!("connect error: {e}")));
                    return;
                }
            };

            // --- 2) Outbound stream (ClientMsg) ---
            let (out_tx, out_rx) = tokio::sync::mpsc::channel::<ClientMsg>(1024);

            // --- 3) Open bidirectional stream ---
            let mut srv_stream = match grpc
                .open(tokio_stream::wrappers::ReceiverStream::new(out_rx))
                .await
            {
                Ok(resp) => resp.into_inner(),
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("open stream error: {e}")));
                    return;
                }
            };
            info!("[Client] Connected to gRPC on {addr_http}");
            let _ = ready_tx.send(Ok(()));

            // --- 4) Pump inbound ServerMsg → app channel (async) ---
            let app_tx = to_app_tx.clone();
            let inbound = tokio::spawn(async move {
                while let Ok(Some(msg)) = srv_stream.message().await {
                    if app_tx.send(msg).is_err() {
                        break;
                    }
                }
            });

            // --- 5) Pump outbound App ClientMsg → gRPC stream (blocking thread) ---
            std::thread::spawn(move || {
                while let Ok(m) = to_worker_rx.recv() {
                    if out_tx.blocking_send(m).is_err() {
                        break;
                    }
                }
            });

            // Keep the runtime alive for as long as the server stream is open
            let _ = inbound.await;
        });
    });

    match ready_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => bail!(e),
        Err(_) => bail!("connection worker stopped before connecting"),
    }

    Ok(SyncSimClient {
        client_id: None,
        tx_to_worker: to_worker_tx,
        rx_from_worker: to_app_rx,
        inverse_requests: Vec::new(),
        _join: Some(join),
    })
}

/// Connect to an in-process server through its hub (no gRPC).
pub fn connect_local(hub: &SharedHub) -> Result<SyncSimClient> {
    let (client_id, tx, rx) = hub.register_local();
    Ok(SyncSimClient {
        client_id: Some(client_id),
        tx_to_worker: tx,
        rx_from_worker: rx,
        inverse_requests: Vec::new(),
        _join: None,
    })
}
