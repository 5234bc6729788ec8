use crate::consumer::{ConnectionState, Consumer, ConsumerConfig};
use crate::frame::EventFrame;
use dashmap::{mapref::entry::Entry, DashMap};
use log::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// Identity of the session a connection belongs to, typically its access token.
pub type SessionKey = String;

/// Unique identifier for one subscriber of a shared connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct SharedConnection {
    consumer: Consumer,
    subscribers: HashSet<SubscriberId>,
}

/// Shares one stream connection between every subscriber of the same session.
///
/// The first subscriber for a key opens the connection and the last one to
/// leave closes it. Both happen while holding the key's map entry, so a
/// concurrent subscribe can never observe a connection that is being torn down.
/// A subscriber joining a connection whose stream has already ended reopens it.
#[derive(Clone)]
pub struct ConnectionRegistry {
    client: reqwest::Client,
    connections: Arc<DashMap<SessionKey, SharedConnection>>,
}

impl ConnectionRegistry {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Joins the connection for `key`, opening it with `config` if none exists.
    /// The config is ignored when the connection already exists, including when
    /// an ended connection is reopened.
    pub fn subscribe(&self, key: impl Into<SessionKey>, config: ConsumerConfig) -> Subscription {
        let key = key.into();
        let id = SubscriberId::new();

        let mut shared = match self.connections.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let mut shared = entry.into_ref();
                if shared.consumer.is_closed() {
                    info!("Shared event stream to {} has ended, reopening", config.url);
                    shared.consumer.reconnect();
                }
                shared
            }
            Entry::Vacant(entry) => {
                info!("Opening shared event stream to {}", config.url);
                entry.insert(SharedConnection {
                    consumer: Consumer::connect(self.client.clone(), config),
                    subscribers: HashSet::new(),
                })
            }
        };
        shared.subscribers.insert(id.clone());
        debug!(
            "Subscriber {} joined ({} total)",
            id.as_str(),
            shared.subscribers.len()
        );

        let frames = shared.consumer.subscribe();
        let states = shared.consumer.state_changes();
        drop(shared);

        Subscription {
            key,
            id,
            frames,
            states,
            connections: Arc::clone(&self.connections),
        }
    }

    /// Number of open shared connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.connections
            .get(key)
            .map(|shared| shared.subscribers.len())
            .unwrap_or(0)
    }

    pub fn state(&self, key: &str) -> Option<ConnectionState> {
        self.connections.get(key).map(|shared| shared.consumer.state())
    }
}

fn unsubscribe(connections: &DashMap<SessionKey, SharedConnection>, key: &str, id: &SubscriberId) {
    // The emptiness check and the removal happen under the same entry lock.
    let removed = connections.remove_if_mut(key, |_, shared| {
        shared.subscribers.remove(id);
        shared.subscribers.is_empty()
    });

    match removed {
        // Dropping the consumer stops its reader task.
        Some(_) => info!("Last subscriber {} left, closing shared event stream", id.as_str()),
        None => debug!("Subscriber {} left", id.as_str()),
    }
}

/// Membership in a shared connection; leaving happens on drop.
pub struct Subscription {
    key: SessionKey,
    id: SubscriberId,
    frames: watch::Receiver<Option<EventFrame>>,
    states: watch::Receiver<ConnectionState>,
    connections: Arc<DashMap<SessionKey, SharedConnection>>,
}

impl Subscription {
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn latest(&self) -> Option<EventFrame> {
        self.frames.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.states.borrow().clone()
    }

    /// Receiver of the latest frame, for awaiting changes.
    pub fn frames(&mut self) -> &mut watch::Receiver<Option<EventFrame>> {
        &mut self.frames
    }

    pub fn states(&mut self) -> &mut watch::Receiver<ConnectionState> {
        &mut self.states
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        unsubscribe(&self.connections, &self.key, &self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::ReconnectPolicy;
    use mockito::{Mock, Server, ServerGuard};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn stream_mock(server: &mut ServerGuard, hits: usize) -> Mock {
        server
            .mock("GET", "/api/sse")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: message\ndata: {\"a\":1}\n\n")
            .expect(hits)
            .create_async()
            .await
    }

    fn config(server: &ServerGuard) -> ConsumerConfig {
        ConsumerConfig::new(format!("{}/api/sse", server.url()))
            .with_reconnect(ReconnectPolicy::disabled())
    }

    async fn first_frame(subscription: &mut Subscription) {
        timeout(
            Duration::from_secs(2),
            subscription.frames().wait_for(|frame| frame.is_some()),
        )
        .await
        .expect("no frame received")
        .unwrap();
    }

    #[tokio::test]
    async fn test_subscribers_of_one_session_share_a_connection() {
        let mut server = Server::new_async().await;
        let upstream = stream_mock(&mut server, 1).await;
        let registry = ConnectionRegistry::new(reqwest::Client::new());

        let mut first = registry.subscribe("a-1", config(&server));
        let mut second = registry.subscribe("a-1", config(&server));
        first_frame(&mut first).await;
        first_frame(&mut second).await;

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.subscriber_count("a-1"), 2);
        assert_eq!(first.latest(), second.latest());
        upstream.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_closes_with_last_subscriber() {
        let mut server = Server::new_async().await;
        let _upstream = stream_mock(&mut server, 1).await;
        let registry = ConnectionRegistry::new(reqwest::Client::new());

        let first = registry.subscribe("a-1", config(&server));
        let second = registry.subscribe("a-1", config(&server));

        drop(first);
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.subscriber_count("a-1"), 1);

        drop(second);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count("a-1"), 0);
        assert_eq!(registry.state("a-1"), None);
    }

    #[tokio::test]
    async fn test_sessions_get_separate_connections() {
        let mut server = Server::new_async().await;
        let upstream = stream_mock(&mut server, 2).await;
        let registry = ConnectionRegistry::new(reqwest::Client::new());

        let mut first = registry.subscribe("a-1", config(&server));
        let mut second = registry.subscribe("a-2", config(&server));
        first_frame(&mut first).await;
        first_frame(&mut second).await;

        assert_eq!(registry.connection_count(), 2);
        assert_ne!(first.id(), second.id());
        upstream.assert_async().await;
    }

    #[tokio::test]
    async fn test_resubscribing_after_teardown_reconnects() {
        let mut server = Server::new_async().await;
        let upstream = stream_mock(&mut server, 2).await;
        let registry = ConnectionRegistry::new(reqwest::Client::new());

        let mut subscription = registry.subscribe("a-1", config(&server));
        first_frame(&mut subscription).await;
        drop(subscription);

        let mut subscription = registry.subscribe("a-1", config(&server));
        first_frame(&mut subscription).await;

        assert_eq!(registry.connection_count(), 1);
        upstream.assert_async().await;
    }

    #[tokio::test]
    async fn test_joining_an_ended_connection_reopens_it() {
        let mut server = Server::new_async().await;
        let upstream = stream_mock(&mut server, 2).await;
        let registry = ConnectionRegistry::new(reqwest::Client::new());

        let mut first = registry.subscribe("a-1", config(&server));
        first_frame(&mut first).await;
        timeout(
            Duration::from_secs(2),
            first.states().wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .expect("stream did not end")
        .unwrap();

        let mut second = registry.subscribe("a-1", config(&server));
        assert_eq!(second.state(), ConnectionState::Connecting);
        timeout(
            Duration::from_secs(2),
            second.states().wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .expect("reopened stream did not end")
        .unwrap();

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.subscriber_count("a-1"), 2);
        assert!(second.latest().is_some());
        upstream.assert_async().await;
    }
}
