//! Event Relay: the browser-facing endpoint that authenticates once and then
//! proxies the upstream notification stream byte for byte.
//!
//! The relay never parses frames. Upstream chunks are forwarded in order as they
//! arrive; when the browser disconnects, the upstream request is dropped.

pub(crate) mod handler;
