//! Client side of the notification event stream.
//!
//! A [`Consumer`] holds one streaming request to the gateway's event relay and
//! decodes it into [`EventFrame`]s. It exposes only the most recent frame: UI
//! code reacts to current status, not history, so there is no queue.
//!
//! # Modules
//!
//! - `frame`: incremental decoding of `text/event-stream` bytes into frames
//! - `consumer`: connection state machine and background reader task
//! - `reconnect`: bounded reconnection schedule after stream failures
//! - `registry`: one shared connection per session, reference counted by
//!   subscribers
//!
//! # Example: sharing a stream between widgets
//!
//! ```rust,ignore
//! use sse::{ConnectionRegistry, ConsumerConfig};
//!
//! let registry = ConnectionRegistry::new(reqwest::Client::new());
//! let config = ConsumerConfig::new("https://app.example.com/api/sse")
//!     .with_cookie(format!("access_token={token}"));
//!
//! let mut badge = registry.subscribe(token.clone(), config.clone());
//! let mut inbox = registry.subscribe(token, config);
//!
//! badge.frames().changed().await?;
//! println!("{:?}", badge.latest());
//! // Dropping both subscriptions closes the stream.
//! ```

pub mod consumer;
pub mod frame;
pub mod reconnect;
pub mod registry;

pub use consumer::{ConnectionState, Consumer, ConsumerConfig};
pub use frame::{EventFrame, FrameDecoder};
pub use reconnect::ReconnectPolicy;
pub use registry::{ConnectionRegistry, Subscription};
