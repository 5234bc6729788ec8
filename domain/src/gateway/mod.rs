//! Clients for the upstream services the gateway fronts. Each gateway owns its
//! own `reqwest::Client` configured for the shape of its traffic: the auth
//! gateway for short bounded calls, the notification service for long-lived
//! streams.

pub mod auth;
pub mod notification;

pub use auth::AuthGateway;
pub use notification::{EventStream, NotificationGateway};
