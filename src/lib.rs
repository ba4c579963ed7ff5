//! sysinit - Minimal init for a single-seat Linux desktop
//!
//! Runs as PID 1 and:
//! - Loads systemd-style .service and .target files into a dependency graph
//! - Starts units lazily and concurrently, each only after its dependencies
//! - Reaps every child and restarts `Restart=always` services with crash-loop
//!   protection
//! - Drops to a rescue shell when the boot target cannot be reached
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                     sysinit                      │
//! ├─────────────────────────────────────────────────┤
//! │  Unit Graph  │  Scheduler  │  Supervisor/Reaper  │
//! ├─────────────────────────────────────────────────┤
//! │        Kernel / Host (nix, libc, std::fs)        │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod fstab;
pub mod logging;
pub mod manager;
pub mod pid1;
pub mod units;

#[cfg(test)]
mod testing;
