//! Relay from an upstream event stream to a plain-text client stream.
//!
//! A worker task owns the upstream body. It decodes chunks into text
//! fragments and pushes each one through a bounded channel as soon as it is
//! complete. The response body is the receiving half, so:
//! - the output ends exactly once, when the worker drops its sender;
//! - a client disconnect drops the receiver, which the worker observes and
//!   answers by dropping the upstream body;
//! - a slow client applies backpressure through the channel capacity.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use dociq_llm::{BackendError, ByteStream, DeltaDecoder};
use futures::{Stream, StreamExt};
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc;
use tracing::Instrument;

pub const RELAY_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Fragments buffered ahead of a slow client.
    pub buffer: usize,
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            buffer: 32,
            idle_timeout: Some(Duration::from_secs(60)),
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RelayError {
    #[snafu(display("upstream read failed on `{stage}`, {source}"))]
    UpstreamRead {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("upstream sent nothing for {idle_timeout:?} on `{stage}`"))]
    UpstreamIdle {
        stage: &'static str,
        idle_timeout: Duration,
    },
}

/// How a relay worker finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayOutcome {
    Completed,
    Failed,
    ClientGone,
}

/// Client-facing half of a running relay.
pub struct RelayStream {
    receiver: mpsc::Receiver<RelayResult<Bytes>>,
}

impl RelayStream {
    /// Starts relaying `upstream` on a background task.
    ///
    /// Must be called from within a tokio runtime. The worker inherits the
    /// caller's tracing span.
    pub fn spawn(upstream: ByteStream, options: RelayOptions) -> Self {
        let (sender, receiver) = mpsc::channel(options.buffer.max(1));
        tokio::spawn(run_relay_worker(upstream, sender, options).in_current_span());
        Self { receiver }
    }
}

impl Stream for RelayStream {
    type Item = RelayResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl IntoResponse for RelayStream {
    fn into_response(self) -> Response {
        let mut response = Body::from_stream(self).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(RELAY_CONTENT_TYPE),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
        response
    }
}

async fn run_relay_worker(
    mut upstream: ByteStream,
    sender: mpsc::Sender<RelayResult<Bytes>>,
    options: RelayOptions,
) -> RelayOutcome {
    let mut decoder = DeltaDecoder::new();
    let mut fragment_count = 0usize;
    let mut byte_count = 0usize;

    let outcome = 'relay: loop {
        let next = tokio::select! {
            _ = sender.closed() => break 'relay RelayOutcome::ClientGone,
            next = next_chunk(&mut upstream, options.idle_timeout) => next,
        };

        match next {
            Ok(Some(chunk)) => {
                for fragment in decoder.feed(&chunk) {
                    if fragment.is_empty() {
                        continue;
                    }
                    fragment_count += 1;
                    byte_count += fragment.len();
                    if sender.send(Ok(Bytes::from(fragment))).await.is_err() {
                        break 'relay RelayOutcome::ClientGone;
                    }
                }
            }
            Ok(None) => break RelayOutcome::Completed,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    fragment_count,
                    "upstream stream failed mid-relay"
                );
                // Headers are already committed; erroring the body is the only signal left.
                let _ = sender.send(Err(error)).await;
                break RelayOutcome::Failed;
            }
        }
    };

    decoder.finish();
    // Release the upstream connection before reporting.
    drop(upstream);

    match outcome {
        RelayOutcome::Completed => tracing::info!(fragment_count, byte_count, "relay completed"),
        RelayOutcome::ClientGone => {
            tracing::debug!(fragment_count, "client disconnected; upstream released")
        }
        RelayOutcome::Failed => {}
    }

    outcome
}

async fn next_chunk(
    upstream: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> RelayResult<Option<Bytes>> {
    let next = match idle_timeout {
        Some(idle_timeout) => tokio::time::timeout(idle_timeout, upstream.next())
            .await
            .map_err(|_| RelayError::UpstreamIdle {
                stage: "await-upstream-chunk",
                idle_timeout,
            })?,
        None => upstream.next().await,
    };

    next.transpose().context(UpstreamReadSnafu {
        stage: "read-upstream-chunk",
    })
}
