pub mod config;
pub mod error;
pub mod io;
pub mod liveness;
pub mod naming;
pub mod paths;
pub mod platform;
pub mod process;
pub mod provision;
pub mod reclaim;
pub mod registry;
pub mod retry;
pub mod scm;
pub mod vars;

pub use error::{FlashpointError, Result};
