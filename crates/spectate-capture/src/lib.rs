//! # spectate-capture
//!
//! Keeps video-capture sources labeled with the playback instance they show.
//!
//! - [`control`]: the capture-control API seam and its wire types
//! - [`title`]: window-title codec
//! - [`discovery`]: finds the capture sources worth reconciling
//! - [`reconcile`]: assigns broadcasts to capture sources

#![deny(unsafe_code)]

pub mod control;
pub mod discovery;
pub mod errors;
pub mod reconcile;
pub mod title;

pub use control::{CaptureControl, CaptureInput, CaptureOperation, InputSettings, InputSummary};
pub use discovery::discover_inputs;
pub use errors::{CaptureError, ReconcileError};
pub use reconcile::{Assignment, ReconciliationEngine, Spectator};
pub use title::WindowTitle;
