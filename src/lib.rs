//! A remote debugging agent: a binary wire protocol, a debugger abstraction
//! over three concrete backends (native OS debug API, GDB remote serial
//! protocol, instrumentation RPC), and a breakpoint-condition evaluator
//! (spec.md §1, §2).
//!
//! The binary in `src/bin/agent.rs` is a thin shell around this library: it
//! parses a connection string, picks a backend, and drives a
//! [`core::DebuggerCore`] dispatch loop per connected peer.

#[macro_use] extern crate log;
extern crate byteorder;

pub mod backend;
pub mod breakpoint;
pub mod condition;
pub mod core;
pub mod error;
pub mod event_queue;
pub mod model;
pub mod proto;
pub mod transport;
pub mod wire;

pub use backend::Backend;
pub use core::{DebuggerCore, State};
pub use error::Error;
pub use transport::{TcpTransport, Transport};
