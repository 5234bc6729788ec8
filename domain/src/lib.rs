//! Session and streaming rules for the front-door gateway, independent of the
//! HTTP framework that serves them.
//!
//! - `session`: public path allow-list and classification of session cookies
//! - `gateway`: upstream auth gateway (session refresh) and notification service
//!   (event stream) clients
//! - `error`: the error tree the `web` layer turns into redirects and status codes

pub mod error;
pub mod gateway;
pub mod session;

pub use error::Error;
