//! Client for the Ufanet intercom API (dom.ufanet.ru) and its typed models.
//! Consumed by the `ufanet` CLI and its HTTP relay.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod redact;

pub use crate::client::UfanetClient;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::models::*;
