//! Framecast Core - Frame-Streaming Engine
//!
//! This crate provides the streaming engine behind framecast, completely
//! independent of any HTTP framework. It loads animation frame sets from
//! disk, caches them for the process lifetime, and drives per-connection
//! push loops that emit color-randomized frames on a fixed cadence.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        framecast-daemon                          │
//! │            (HTTP routing, redirects, port binding)               │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                      FRAMECAST CORE                              │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐  │  │
//! │  │  │ FrameStore  │──▶│ StreamDriver │──▶│  output sink    │  │  │
//! │  │  │ (disk+cache)│   │ (tick loop)  │   │ (one per conn)  │  │  │
//! │  │  └─────────────┘   └──────┬───────┘   └─────────────────┘  │  │
//! │  │                          │                                 │  │
//! │  │                   color selection                          │  │
//! │  │              (uniform, no consecutive repeat)              │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`FrameStore`]: discovers frame sets on disk and memoizes loaded
//!   sequences in a process-wide cache
//! - [`StreamDriver`]: owns one session's periodic emission loop
//! - [`DriverHandle`]: cancellation and state observation for a running
//!   driver
//! - [`ServiceConfig`]: layered configuration (CLI > env > file > default)
//!
//! # Quick Start
//!
//! ```ignore
//! use framecast_core::{DriverConfig, FrameStore, StreamDriver};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = FrameStore::new("./frames");
//!     let frames = store.ensure_cached("parrot").await.unwrap();
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let handle = StreamDriver::new(frames, DriverConfig::default()).start(tx);
//!
//!     while let Some(chunk) = rx.recv().await {
//!         // forward chunk to the client
//!     }
//!     handle.stop();
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`frames`]: frame and frame-set types, disk discovery, the cache
//! - [`color`]: fixed ANSI palette and no-repeat color selection
//! - [`stream`]: the per-session stream driver state machine
//! - [`config`]: layered service configuration
//!
//! # No HTTP Dependencies
//!
//! This crate has **zero** dependencies on axum, hyper, or any other web
//! framework. The daemon owns the HTTP surface; the core only ever sees an
//! output sink.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod color;
pub mod config;
pub mod frames;
pub mod stream;

// Re-exports for convenience
pub use color::{next_color_index, AnsiColor, PALETTE};
pub use config::{
    default_config_path, load_config, load_config_file, ConfigError, ConfigOverrides,
    FramecastToml, ServiceConfig,
};
pub use frames::store::{CacheStats, FrameStore, StoreError};
pub use frames::Frame;
pub use stream::driver::{DriverConfig, DriverHandle, DriverState, StreamDriver};
pub use stream::{SessionId, CLEAR_SCREEN};
