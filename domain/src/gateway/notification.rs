use crate::error::Error;
use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::*;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_TYPE, COOKIE, ORIGIN, SET_COOKIE,
};
use service::config::Config;
use tokio::sync::mpsc;

/// Client for the upstream notification service's event stream.
pub struct NotificationGateway {
    client: reqwest::Client,
    stream_url: reqwest::Url,
    buffer_chunks: usize,
}

/// An open upstream event stream, ready to be handed to the browser.
///
/// The upstream body is read by a background pump that forwards raw chunks, in
/// order and without reframing, through a bounded channel. Dropping the
/// `EventStream` (or the stream returned by [`EventStream::into_body`]) closes that
/// channel, and the pump reacts by dropping the upstream response, which closes
/// the upstream connection.
pub struct EventStream {
    pub content_type: Option<String>,
    pub set_cookies: Vec<String>,
    chunks: mpsc::Receiver<Result<Bytes, Error>>,
}

impl EventStream {
    pub fn into_body(self) -> impl Stream<Item = Result<Bytes, Error>> + Send + 'static {
        let mut chunks = self.chunks;
        stream! {
            while let Some(chunk) = chunks.recv().await {
                yield chunk;
            }
        }
    }
}

impl NotificationGateway {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let stream_url = reqwest::Url::parse(&config.notification_stream_url()).map_err(|err| {
            warn!(
                "Invalid notification service URL {}: {err:?}",
                config.notification_stream_url()
            );
            Error::config("Invalid notification service base URL")
        })?;

        // No overall timeout: an event stream legitimately stays open for hours.
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.upstream_connect_timeout())
            .build()?;

        Ok(Self {
            client,
            stream_url,
            buffer_chunks: config.relay_buffer_chunks.max(1),
        })
    }

    /// Opens the upstream event stream on behalf of the caller identified by `cookie`.
    ///
    /// Compression is refused (`Accept-Encoding: identity`) so every upstream
    /// chunk can be forwarded as soon as it arrives.
    pub async fn open_stream(
        &self,
        cookie: &str,
        origin: Option<&str>,
    ) -> Result<EventStream, Error> {
        let mut request = self
            .client
            .get(self.stream_url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(ACCEPT_ENCODING, "identity")
            .header(CACHE_CONTROL, "no-cache")
            .header(COOKIE, cookie);

        if let Some(origin) = origin {
            request = request.header(ORIGIN, origin);
        }

        let response = request.send().await.map_err(|err| {
            warn!("Failed to connect to notification service: {err:?}");
            Error::from(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Notification service refused event stream: {status}");
            return Err(Error::upstream(status.as_u16(), body));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let (tx, rx) = mpsc::channel(self.buffer_chunks);
        tokio::spawn(pump(response, tx));

        info!("Opened upstream event stream");

        Ok(EventStream {
            content_type,
            set_cookies,
            chunks: rx,
        })
    }
}

/// Copies the upstream body into `tx` until either side goes away.
///
/// `tx.closed()` resolves as soon as the downstream receiver is dropped, so an
/// idle upstream (no chunk for hours) is still released promptly.
async fn pump(response: reqwest::Response, tx: mpsc::Sender<Result<Bytes, Error>>) {
    let mut body = response.bytes_stream();

    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!("Downstream disconnected, closing upstream event stream");
                break;
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    if tx.send(Ok(bytes)).await.is_err() {
                        debug!("Downstream disconnected mid-send, closing upstream event stream");
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!("Upstream event stream failed: {err:?}");
                    let _ = tx.send(Err(Error::from(err))).await;
                    break;
                }
                None => {
                    debug!("Upstream event stream ended");
                    break;
                }
            }
        }
    }
}
