//! A `no_std` channel-multiplexed frame protocol for a resource-constrained
//! device talking to a host over USB CDC, UART, or TCP.
//!
//! The wire format, state machines, and capability negotiation are
//! implementation details of [`engine::Engine`] — embedders construct one
//! `Engine`, register [`channel::Channel`]s for the device endpoints they
//! expose, and drive it from a byte-oriented [`transport::Transport`] in a
//! poll loop.
//!
//! Module map:
//! - [`config`]: engine configuration and the negotiated-capabilities record
//! - [`error`]: internal [`error::Error`] and wire-visible [`error::Status`]
//! - [`core`]: CRC16/CRC32 primitives, the 10-byte header codec, fragment math
//! - [`buffer`]: the ingestion ring buffer
//! - [`recv`]: the byte-driven receive state machine
//! - [`reassembly`]: single in-flight fragment reassembly per direction
//! - [`seq`]: sequence number tracking and duplicate/out-of-order detection
//! - [`rtx`]: bounded exponential-backoff retransmission queue
//! - [`channel`]: the 32-slot channel registry and `Channel` trait
//! - [`dispatch`]: opcode table and fixed-layout reply records
//! - [`events`]: asynchronous event emission
//! - [`stats`]: engine statistics counters
//! - [`transport`]: the `Transport` trait and test/host harnesses
//! - [`engine`]: the top-level orchestrator tying all of the above together

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod buffer;
pub mod channel;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod reassembly;
pub mod recv;
pub mod rtx;
pub mod seq;
pub mod stats;
pub mod transport;

pub use config::{Caps, Config, ConfigBuilder};
pub use dispatch::{opcode, SysInfo, Version};
pub use engine::{Engine, SideEffect};
pub use error::{Error, Result, Status};
pub use transport::Transport;
