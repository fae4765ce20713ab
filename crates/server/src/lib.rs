use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Result;
use simulator::{Policy, Simulation, SimulationSession, scheduler::scheduler_for};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    control::{ControlLoop, EXIT_FLUSH, LoopExit},
    dispatch::{Context, Dispatcher},
    hub::{Hub, SharedHub},
    service::SimulatorService,
};

pub mod control;
pub mod dispatch;
pub mod hub;
pub mod service;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info,server=debug".into()))
        .with_target(false)
        .try_init(); // no panic if already initialized
}

/// Server startup mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMode {
    /// In-process clients only.
    Local,
    /// Also accept gRPC clients at the given address.
    WithGrpc(String),
}

/// How RESET is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ResetReply {
    /// An empty RESET.
    #[default]
    Ack,
    /// The readings of the fresh world, shaped like a SENSOR_QUERY reply.
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub mode: ServerMode,
    pub policy: Policy,
    /// Interactive frame interval.
    pub frame: Duration,
    pub reset_reply: ResetReply,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            mode: ServerMode::Local,
            policy: Policy::Headless,
            frame: Duration::from_millis(16),
            reset_reply: ResetReply::Ack,
        }
    }
}

/// Starts the control thread (and the gRPC endpoint, if asked for).
///
/// Returns the hub clients connect through and the control thread, which
/// ends with the reason the loop stopped. After EXIT the control thread
/// closes every client stream and waits for the gRPC endpoint to wind down,
/// so joining it means the acknowledgement has been written out.
pub fn spawn_server<S: Simulation>(
    options: ServerOptions,
    sim: S,
) -> Result<(SharedHub, JoinHandle<LoopExit>)> {
    let hub = Hub::new();

    let grpc = match options.mode {
        ServerMode::WithGrpc(addr) => Some(GrpcEndpoint::spawn(hub.clone(), addr)?),
        ServerMode::Local => None,
    };

    let dispatcher = Dispatcher::new(Context {
        session: SimulationSession::new(sim),
        scheduler: scheduler_for(options.policy),
        reset_reply: options.reset_reply,
    });
    let control = ControlLoop::new(dispatcher, hub.clone(), options.frame);
    let control_hub = hub.clone();
    let handle = thread::Builder::new()
        .name("control".into())
        .spawn(move || {
            let exit = control.run();
            if exit == LoopExit::Exit {
                control_hub.close();
                if let Some(grpc) = grpc {
                    grpc.stop(EXIT_FLUSH);
                }
            }
            exit
        })?;

    Ok((hub, handle))
}

/// gRPC endpoint running on its own thread until told to stop.
struct GrpcEndpoint {
    stop_tx: oneshot::Sender<()>,
    stopped_rx: crossbeam_channel::Receiver<()>,
}

impl GrpcEndpoint {
    fn spawn(hub: SharedHub, addr: String) -> Result<Self> {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (stopped_tx, stopped_rx) = crossbeam_channel::bounded::<()>(1);
        thread::Builder::new()
            .name("grpc-server".into())
            .spawn(move || {
                safe_block_on(async move {
                    // a dropped sender stops the endpoint too
                    let shutdown = async {
                        stop_rx.await.ok();
                    };
                    if let Err(e) = start_grpc(hub, &addr, shutdown).await {
                        error!("gRPC server on {addr} failed: {e}");
                    }
                });
                if stopped_tx.send(()).is_err() {
                    debug!("gRPC endpoint stopped with nobody waiting");
                }
            })?;
        Ok(Self {
            stop_tx,
            stopped_rx,
        })
    }

    /// Stops accepting connections and waits, at most `timeout`, for open
    /// streams to finish.
    fn stop(self, timeout: Duration) {
        if self.stop_tx.send(()).is_err() {
            debug!("gRPC endpoint already gone");
            return;
        }
        if self.stopped_rx.recv_timeout(timeout).is_err() {
            warn!("gRPC endpoint still draining after {timeout:?}");
        }
    }
}

/// Serves gRPC clients until `shutdown` resolves, then lets open
/// connections finish.
pub async fn start_grpc(
    hub: SharedHub,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let addr = addr.parse()?;
    info!("starting gRPC server on {addr}");
    tonic::transport::Server::builder()
        .add_service(SimulatorService::new(hub).into_server())
        .serve_with_shutdown(addr, shutdown)
        .await?;
    info!("gRPC server on {addr} stopped");
    Ok(())
}

/// Run an async future safely, reusing an existing Tokio runtime if one exists.
///
/// - If already inside a Tokio runtime: executes the future synchronously.
/// - If no runtime exists: creates a lightweight current-thread runtime.
pub fn safe_block_on<F: std::future::Future>(fut: F) -> F::Output {
    if tokio::runtime::Handle::try_current().is_ok() {
        tokio::task::block_in_place(|| futures::executor::block_on(fut))
    } else {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        rt.block_on(fut)
    }
}
