//! Drives a GnuPG subprocess over its status, command and message channels,
//! with an optional agent daemon answered by a scripted pinentry.

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod key;
pub mod pgp;
pub mod pinentry;
pub mod status;
pub mod util;

pub use crate::engine::{Engine, EngineErr, Sink, Source};
pub use crate::error::{ErrorCode, PgpErr};
pub use crate::pgp::GpgClient;
