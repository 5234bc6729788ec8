use anyhow::{Context, Result};
use colored::*;
use sse::{ConnectionRegistry, ConnectionState, Consumer, ConsumerConfig, ReconnectPolicy};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::output::{print_event, print_state, TestResult};

/// The gateway under test and the session used to reach it.
pub struct Target {
    pub client: reqwest::Client,
    pub base_url: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl Target {
    fn stream_url(&self) -> String {
        format!("{}/api/sse", self.base_url.trim_end_matches('/'))
    }

    fn anonymous_config(&self) -> ConsumerConfig {
        ConsumerConfig::new(self.stream_url()).with_reconnect(ReconnectPolicy::disabled())
    }

    fn session_config(&self) -> Result<ConsumerConfig> {
        let token = self
            .access_token
            .as_deref()
            .context("this scenario needs --access-token")?;
        Ok(self
            .anonymous_config()
            .with_cookie(format!("access_token={token}")))
    }
}

/// Waits until the connection either succeeds or fails.
async fn settled_state(
    states: &mut watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<ConnectionState> {
    let state = tokio::time::timeout(
        timeout,
        states.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Error(_))),
    )
    .await
    .context("timed out waiting for the event stream")?
    .context("event stream task ended")?;
    Ok(state.clone())
}

pub async fn test_connection(target: &Target) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Connection ===".bright_cyan().bold());

    println!("{} Opening event stream with access token...", "→".blue());
    let consumer = Consumer::connect(target.client.clone(), target.session_config()?);
    let state = settled_state(&mut consumer.state_changes(), target.timeout).await?;
    print_state("Session", &state);
    consumer.disconnect().await;

    Ok(match state {
        ConnectionState::Connected => {
            println!("{} Event stream established", "✓".green());
            TestResult::pass("connection_test", start.elapsed())
        }
        other => TestResult::fail(
            "connection_test",
            format!("expected connected, got {other:?}"),
            start.elapsed(),
        ),
    })
}

pub async fn test_unauthenticated(target: &Target) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Unauthenticated ===".bright_cyan().bold());

    println!("{} Opening event stream without cookies...", "→".blue());
    let consumer = Consumer::connect(target.client.clone(), target.anonymous_config());
    let state = settled_state(&mut consumer.state_changes(), target.timeout).await?;
    print_state("Anonymous", &state);
    consumer.disconnect().await;

    Ok(match state {
        ConnectionState::Error(message) if message.contains("401") => {
            println!("{} Relay refused the stream", "✓".green());
            TestResult::pass("unauthenticated_test", start.elapsed())
        }
        other => TestResult::fail(
            "unauthenticated_test",
            format!("expected a 401 error, got {other:?}"),
            start.elapsed(),
        ),
    })
}

pub async fn test_shared_connection(target: &Target) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Shared Connection ===".bright_cyan().bold());

    let key = target
        .access_token
        .clone()
        .context("this scenario needs --access-token")?;
    let registry = ConnectionRegistry::new(target.client.clone());

    println!("{} Subscribing two widgets to one session...", "→".blue());
    let mut first = registry.subscribe(key.clone(), target.session_config()?);
    let second = registry.subscribe(key.clone(), target.session_config()?);

    let state = settled_state(first.states(), target.timeout).await?;
    print_state("Widget 1", &state);
    print_state("Widget 2", &second.state());

    let connections = registry.connection_count();
    let subscribers = registry.subscriber_count(&key);

    drop(first);
    drop(second);
    let remaining = registry.connection_count();

    let failure = if state != ConnectionState::Connected {
        Some(format!("expected connected, got {state:?}"))
    } else if connections != 1 || subscribers != 2 {
        Some(format!(
            "expected 1 connection with 2 subscribers, got {connections} with {subscribers}"
        ))
    } else if remaining != 0 {
        Some(format!("{remaining} connection(s) left open after unsubscribing"))
    } else {
        None
    };

    Ok(match failure {
        None => {
            println!("{} One connection shared, closed with last subscriber", "✓".green());
            TestResult::pass("shared_test", start.elapsed())
        }
        Some(message) => TestResult::fail("shared_test", message, start.elapsed()),
    })
}

/// Prints every frame and state change until `duration` elapses.
pub async fn listen(target: &Target, duration: Duration) -> Result<TestResult> {
    let start = Instant::now();
    println!(
        "\n{} {:?}",
        "=== LISTENING ===".bright_cyan().bold(),
        duration
    );

    let config = target
        .session_config()?
        .with_reconnect(ReconnectPolicy::default());
    let consumer = Consumer::connect(target.client.clone(), config);
    let mut frames = consumer.subscribe();
    let mut states = consumer.state_changes();

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    let mut received = 0;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(frame) = frames.borrow_and_update().clone() {
                    received += 1;
                    print_event("Session", &frame);
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                print_state("Session", &state);
            }
        }
    }

    let last_state = consumer.state();
    consumer.disconnect().await;
    println!("\n{} {received} frame(s) received", "→".blue());

    Ok(match last_state {
        ConnectionState::Error(message) => TestResult::fail("listen", message, start.elapsed()),
        _ => TestResult::pass("listen", start.elapsed()),
    })
}
