//! sysinit - init daemon
//!
//! Started by the kernel as PID 1. The kernel may pass arbitrary arguments
//! from its command line, so anything not understood boots.
//!
//! `sysinit gen-graph` prints the on-disk unit graph in Graphviz format and
//! exits, which is useful off-target.

use std::rc::Rc;

use clap::error::ErrorKind;
use clap::Parser;
use tokio::task::LocalSet;

use sysinit::config::InitConfig;
use sysinit::logging;
use sysinit::manager::Manager;
use sysinit::pid1::{self, ChildEvents, LinuxHost, LinuxKernel, SignalHandler};
use sysinit::units::build_graph;

#[derive(Parser, Debug, Default)]
#[command(name = "sysinit")]
#[command(version, about = "Minimal init daemon")]
struct Args {
    /// `gen-graph` prints the unit graph as DOT; anything else boots
    mode: Option<String>,

    /// Arguments passed through from the kernel command line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    kernel_args: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => Args::default(),
    };

    let config = InitConfig::default();

    // Logging stays off here so stdout is pure DOT
    if args.mode.as_deref() == Some("gen-graph") {
        print!("{}", build_graph(&config.unit_dirs).to_dot());
        return Ok(());
    }

    logging::init()?;

    if !pid1::is_pid1() {
        log::warn!("Not running as PID 1; mounts and reboot will likely fail");
    }
    if !args.kernel_args.is_empty() {
        log::debug!("Ignoring kernel arguments: {:?}", args.kernel_args);
    }

    let graph = build_graph(&config.unit_dirs);
    let manager = Manager::new(
        config,
        graph,
        Rc::new(LinuxKernel),
        Rc::new(LinuxHost),
    );

    let local = LocalSet::new();
    local
        .run_until(async move {
            manager.boot();

            match SignalHandler::new() {
                Ok(handler) => manager.watch_signals(handler),
                Err(e) => log::warn!("Failed to install signal handlers: {}", e),
            }

            let child_events = match ChildEvents::new() {
                Ok(events) => Some(events),
                Err(e) => {
                    log::warn!("SIGCHLD unavailable, polling only: {}", e);
                    None
                }
            };

            manager.supervisor().supervise(child_events).await;
        })
        .await;

    Ok(())
}
