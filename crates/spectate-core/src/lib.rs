//! # spectate-core
//!
//! Shared vocabulary for the spectate manager crates:
//!
//! - **Errors**: [`SpectateError`], the failure taxonomy of the spectate control client
//! - **Protocol**: [`protocol`] frames exchanged with the spectate control service
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod protocol;

pub use errors::{Result, SpectateError};
pub use protocol::{
    Broadcast, Broadcaster, ClientMessage, SUBPROTOCOL, ServerMessage, ServerOp, SpectatingBroadcast,
};
