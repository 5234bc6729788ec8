//! Infrastructure shared by every crate in the gateway: command line and
//! environment configuration, and terminal logging.

pub mod config;
pub mod logging;
