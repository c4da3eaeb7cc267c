// --- Push-channel connection with automatic reconnect -----------------------
//
// Keeps a listener attached to the server's event stream. Any failure (refused
// connection, non-2xx, stream error, server closing the stream) marks the
// listener disconnected and retries after a fixed delay, forever. No catch-up
// logic is needed: the server sends the current state as the first frame of
// every new connection.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::frames::{FrameDecoder, SseFrame};
use crate::{error::ChannelError, timeline::TimelineState};

/// What the connection task reports to the listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Timeline(TimelineState),
    Disconnected { reason: String },
}

pub struct Reconnector {
    http: reqwest::Client,
    stream_url: String,
    retry_delay: Duration,
}

impl Reconnector {
    pub fn new(server_url: &str, retry_delay: Duration) -> Result<Self, ChannelError> {
        // No overall timeout: the response body is meant to stay open.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            stream_url: format!("{}/api/v1/stream", server_url.trim_end_matches('/')),
            retry_delay,
        })
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Connect and forward events until the receiving side goes away.
    pub async fn run(self, events: mpsc::Sender<ChannelEvent>) {
        loop {
            let err = match self.session(&events).await {
                Ok(()) => {
                    debug!("listener gone, stopping push channel");
                    return;
                }
                Err(e) => e,
            };

            warn!(
                "push channel lost: {err}; reconnecting in {:?}",
                self.retry_delay
            );
            let lost = ChannelEvent::Disconnected {
                reason: err.to_string(),
            };
            if events.send(lost).await.is_err() {
                return;
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// One connection attempt. `Ok` means the listener stopped listening.
    async fn session(&self, events: &mpsc::Sender<ChannelEvent>) -> Result<(), ChannelError> {
        let resp = self
            .http
            .get(&self.stream_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChannelError::Status(resp.status()));
        }

        info!(url = %self.stream_url, "push channel connected");
        if events.send(ChannelEvent::Connected).await.is_err() {
            return Ok(());
        }

        let mut decoder = FrameDecoder::default();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                let data = match frame {
                    SseFrame::Data { data, .. } => data,
                    SseFrame::Comment(c) => {
                        trace!("push channel comment: {c}");
                        continue;
                    }
                };
                let state = match serde_json::from_str::<TimelineState>(&data) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("ignoring undecodable timeline frame: {e}");
                        continue;
                    }
                };
                if events.send(ChannelEvent::Timeline(state)).await.is_err() {
                    return Ok(());
                }
            }
        }

        Err(ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_reports_disconnect_and_retries() {
        // Port 9 on loopback is closed on any sane test machine.
        let r = Reconnector::new("http://127.0.0.1:9/", Duration::from_millis(20)).unwrap();
        assert_eq!(r.stream_url(), "http://127.0.0.1:9/api/v1/stream");

        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(r.run(tx));

        for _ in 0..2 {
            let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(ev, ChannelEvent::Disconnected { .. }));
        }

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
