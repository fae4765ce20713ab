use std::pin::Pin;

use crossbeam_channel::Receiver as CbReceiver;
use interface::{
    ClientMsg, ServerMsg,
    wire::simulator_server::{Simulator, SimulatorServer},
};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info};

use crate::hub::SharedHub;

/// gRPC endpoint: every `Open` stream becomes one hub client.
#[derive(Clone)]
pub struct SimulatorService {
    hub: SharedHub,
}

impl SimulatorService {
    pub fn new(hub: SharedHub) -> Self {
        Self { hub }
    }

    pub fn into_server(self) -> SimulatorServer<Self> {
        SimulatorServer::new(self)
    }
}

#[tonic::async_trait]
impl Simulator for SimulatorService {
    type OpenStream = Pin<Box<dyn Stream<Item = Result<ServerMsg, Status>> + Send + 'static>>;

    async fn open(
        &self,
        request: Request<Streaming<ClientMsg>>,
    ) -> Result<Response<Self::OpenStream>, Status> {
        let (client_id, cb_rx): (u64, CbReceiver<ServerMsg>) = self.hub.register_remote();
        info!("remote client #{client_id} opened a stream");

        // --- Inbound: client -> hub ---
        let mut inbound = request.into_inner();
        let hub = self.hub.clone();
        tokio::spawn(async move {
            while let Some(result) = inbound.next().await {
                match result {
                    Ok(msg) => {
                        if hub.submit(client_id, msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("client #{client_id} stream error: {e}");
                        break;
                    }
                }
            }
            info!("remote client #{client_id} disconnected (inbound)");
            hub.unregister(client_id);
        });

        // --- Outbound: hub -> client ---
        // crossbeam receiver blocks; drain it on a plain thread
        let (async_tx, async_rx) = tokio::sync::mpsc::channel::<Result<ServerMsg, Status>>(64);
        let hub = self.hub.clone();
        std::thread::spawn(move || {
            for msg in cb_rx.iter() {
                if async_tx.blocking_send(Ok(msg)).is_err() {
                    break;
                }
            }
            debug!("remote client #{client_id} disconnected (outbound)");
            hub.unregister(client_id);
        });

        // an item pulled by tonic is being written to the wire
        let hub = self.hub.clone();
        let stream = ReceiverStream::new(async_rx).map(move |item| {
            hub.delivered(client_id);
            item
        });
        Ok(Response::new(Box::pin(stream)))
    }
}
