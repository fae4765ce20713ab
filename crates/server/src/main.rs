use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use server::{
    ResetReply, ServerMode, ServerOptions, control::LoopExit, init_tracing, spawn_server,
};
use simulator::{ArmPlayground, Policy};
use tracing::info;

/// Robotic-arm simulation server.
///
/// By default it serves gRPC clients on 127.0.0.1:1989 and paces steps
/// like a render loop. Use `--headless` to run requested steps back to
/// back, and `--local` to skip the network endpoint.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address for gRPC clients (ignored with --local).
    #[arg(long, default_value = "127.0.0.1:1989")]
    addr: String,

    /// Run without gRPC networking (in-process clients only).
    #[arg(long, default_value = "false")]
    local: bool,

    /// Run STEP requests to completion instead of one step per frame.
    #[arg(long, default_value = "false")]
    headless: bool,

    /// Frame interval of the interactive loop, in milliseconds.
    #[arg(long, default_value = "16")]
    frame_ms: u64,

    /// How RESET is answered.
    #[arg(long, value_enum, default_value_t = ResetReply::Ack)]
    reset_reply: ResetReply,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mode = if args.local {
        info!("starting in local mode (no gRPC)");
        ServerMode::Local
    } else {
        info!("starting with gRPC on {}", args.addr);
        ServerMode::WithGrpc(args.addr)
    };
    let options = ServerOptions {
        mode,
        policy: if args.headless {
            Policy::Headless
        } else {
            Policy::Interactive
        },
        frame: Duration::from_millis(args.frame_ms),
        reset_reply: args.reset_reply,
    };

    let (_hub, control) = spawn_server(options, ArmPlayground::new())?;
    let exit = control
        .join()
        .map_err(|_| anyhow!("control thread panicked"))?;

    match exit {
        LoopExit::Exit => {
            info!("EXIT received, terminating");
            std::process::exit(0);
        }
        LoopExit::Shutdown | LoopExit::Closed => Ok(()),
    }
}
