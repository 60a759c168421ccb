//! smsfwd - ModemManager SMS forwarding daemon
//!
//! Watches the modem management service for inbound SMS, forwards each
//! received message as a structured YAML document to mail and command sinks,
//! and rejects incoming voice calls.

pub mod bus;
pub mod config;
pub mod error;
pub mod forward;
pub mod identity;
pub mod mmcli;
pub mod modem;
pub mod reactor;

pub use error::{Error, Result};
