//! # spectate-client
//!
//! Protocol client for the spectate remote control service, built in layers:
//!
//! - [`transport`]: the persistent socket and its close signal
//! - [`correlator`]: discriminator-keyed request/response matching with
//!   deadlines, plus routing of unsolicited push events
//! - [`mapping`]: the bidirectional broadcast ↔ dolphin table
//! - [`ids`]: locally generated dolphin ids
//! - [`client`]: the typed operations front ends call

#![deny(unsafe_code)]

pub mod client;
pub mod correlator;
pub mod ids;
pub mod mapping;
pub mod transport;

pub use client::{ClientConfig, SessionEvent, SpectateClient};
pub use correlator::{Correlator, DEFAULT_REQUEST_TIMEOUT};
pub use ids::DolphinIdGenerator;
pub use mapping::MappingStore;
pub use transport::{Transport, TransportState};
