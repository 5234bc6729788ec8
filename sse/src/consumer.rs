use crate::frame::{EventFrame, FrameDecoder};
use crate::reconnect::ReconnectPolicy;
use futures_util::StreamExt;
use log::*;
use reqwest::{
    header::{ACCEPT, CACHE_CONTROL, COOKIE, ORIGIN},
    StatusCode,
};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Lifecycle of a consumer's stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Full URL of the event stream endpoint, e.g. `https://app.example.com/api/sse`.
    pub url: String,
    /// Raw `Cookie` header value sent with the stream request.
    pub cookie: Option<String>,
    pub origin: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl ConsumerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cookie: None,
            origin: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// A single stream connection read by a background task.
///
/// Only the most recent frame is kept. Readers that look between two frames
/// see the newer one. Dropping the consumer, or calling [`Consumer::disconnect`],
/// stops the task and releases the in-flight request.
///
/// The consumer owns the state and frame channels, so receivers handed out by
/// [`Consumer::subscribe`] keep working across [`Consumer::reconnect`].
pub struct Consumer {
    client: reqwest::Client,
    config: ConsumerConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    latest: Arc<watch::Sender<Option<EventFrame>>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Consumer {
    /// Starts connecting immediately. Must be called within a tokio runtime.
    pub fn connect(client: reqwest::Client, config: ConsumerConfig) -> Self {
        let state = Arc::new(watch::Sender::new(ConnectionState::Connecting));
        let latest = Arc::new(watch::Sender::new(None));
        let (shutdown, task) = spawn_reader(&client, &config, &state, &latest);

        Self {
            client,
            config,
            state,
            latest,
            shutdown: Some(shutdown),
            task,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn latest(&self) -> Option<EventFrame> {
        self.latest.borrow().clone()
    }

    /// A receiver that observes every new latest frame.
    pub fn subscribe(&self) -> watch::Receiver<Option<EventFrame>> {
        self.latest.subscribe()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// True once the stream has ended or failed for good; no more frames will
    /// arrive until [`Consumer::reconnect`].
    pub fn is_closed(&self) -> bool {
        self.task.is_finished() || *self.state.borrow() == ConnectionState::Disconnected
    }

    /// Opens a new stream connection with the same config, replacing the
    /// current one. Existing receivers see the new connection's state and frames.
    pub fn reconnect(&mut self) {
        // Dropping the sender stops a reader that is still running.
        self.shutdown.take();
        self.task.abort();

        self.state.send_replace(ConnectionState::Connecting);
        let (shutdown, task) = spawn_reader(&self.client, &self.config, &self.state, &self.latest);
        self.shutdown = Some(shutdown);
        self.task = task;
    }

    /// Stops the connection and waits for the reader task to finish.
    pub async fn disconnect(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = self.task.await {
            warn!("Event stream task ended abnormally: {err:?}");
        }
    }
}

fn spawn_reader(
    client: &reqwest::Client,
    config: &ConsumerConfig,
    state: &Arc<watch::Sender<ConnectionState>>,
    latest: &Arc<watch::Sender<Option<EventFrame>>>,
) -> (oneshot::Sender<()>, JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run(
        client.clone(),
        config.clone(),
        Arc::clone(state),
        Arc::clone(latest),
        shutdown_rx,
    ));
    (shutdown_tx, task)
}

#[derive(Debug)]
struct StreamFailure {
    message: String,
    retryable: bool,
}

impl StreamFailure {
    fn retryable(message: String) -> Self {
        Self {
            message,
            retryable: true,
        }
    }

    fn status(status: StatusCode) -> Self {
        Self {
            message: format!("HTTP error {status}"),
            retryable: !matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN),
        }
    }
}

async fn run(
    client: reqwest::Client,
    config: ConsumerConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    latest: Arc<watch::Sender<Option<EventFrame>>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    // A loop that has already finished wins over a shutdown arriving at the
    // same time, so its final state is never overwritten.
    tokio::select! {
        biased;
        _ = connection_loop(&client, &config, &state, &latest) => {}
        _ = &mut shutdown => {
            debug!("Disconnecting from {}", config.url);
            state.send_replace(ConnectionState::Disconnected);
        }
    }
}

async fn connection_loop(
    client: &reqwest::Client,
    config: &ConsumerConfig,
    state: &watch::Sender<ConnectionState>,
    latest: &watch::Sender<Option<EventFrame>>,
) {
    let mut attempts = 0;
    loop {
        state.send_replace(ConnectionState::Connecting);

        let failure = match stream_once(client, config, state, latest, &mut attempts).await {
            Ok(()) => {
                debug!("Event stream from {} ended", config.url);
                state.send_replace(ConnectionState::Disconnected);
                return;
            }
            Err(failure) => failure,
        };

        warn!("Event stream from {} failed: {}", config.url, failure.message);
        state.send_replace(ConnectionState::Error(failure.message));

        let delay = match failure.retryable {
            true => config.reconnect.next_delay(attempts),
            false => None,
        };
        match delay {
            Some(delay) => {
                attempts += 1;
                info!(
                    "Reconnecting to {} in {delay:?} (attempt {attempts}/{})",
                    config.url,
                    config.reconnect.max_attempts()
                );
                tokio::time::sleep(delay).await;
            }
            None => return,
        }
    }
}

async fn stream_once(
    client: &reqwest::Client,
    config: &ConsumerConfig,
    state: &watch::Sender<ConnectionState>,
    latest: &watch::Sender<Option<EventFrame>>,
    attempts: &mut u32,
) -> Result<(), StreamFailure> {
    let mut request = client
        .get(&config.url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache");
    if let Some(cookie) = &config.cookie {
        request = request.header(COOKIE, cookie);
    }
    if let Some(origin) = &config.origin {
        request = request.header(ORIGIN, origin);
    }

    let response = request
        .send()
        .await
        .map_err(|err| StreamFailure::retryable(format!("Connection failed: {err}")))?;

    if !response.status().is_success() {
        return Err(StreamFailure::status(response.status()));
    }

    *attempts = 0;
    state.send_replace(ConnectionState::Connected);
    info!("Connected to event stream {}", config.url);

    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|err| StreamFailure::retryable(format!("Stream read failed: {err}")))?;
        for frame in decoder.feed(&chunk) {
            trace!("Received {} event", frame.event);
            latest.send_replace(Some(frame));
        }
    }
    if let Some(frame) = decoder.finish() {
        latest.send_replace(Some(frame));
    }

    Ok(())
}
