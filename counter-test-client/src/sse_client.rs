use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One counter frame as pushed over the event stream.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CounterFrame {
    pub value: u64,
}

pub struct Connection {
    pub channel_label: String,
    frame_rx: mpsc::UnboundedReceiver<CounterFrame>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub fn establish(base_url: &str, channel_id: &str) -> Result<Self> {
        let url = format!("{}/counter/{}", base_url, channel_id);
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?
            .header("Accept", "text/event-stream")?
            .build();

        let channel_label = format!("channel {}", channel_id);
        let label = channel_label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        match serde_json::from_str::<CounterFrame>(&event.data) {
                            Ok(frame) => {
                                if tx.send(frame).is_err() {
                                    debug!("SSE receiver dropped for {}", label);
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Unparseable counter frame for {}: {}", label, e);
                            }
                        }
                    }
                    Some(Ok(_)) => {
                        // Ignore comments (keep-alive) and connection notices
                    }
                    Some(Err(e)) => {
                        warn!("SSE error for {}: {}", label, e);
                    }
                    None => {
                        debug!("SSE stream ended for {}", label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            channel_label,
            frame_rx: rx,
            _handle: handle,
        })
    }

    pub async fn wait_for_value(&mut self, timeout: Duration) -> Result<u64> {
        let deadline = Instant::now() + timeout;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            anyhow::bail!("Timeout waiting for counter frame");
        }

        match tokio::time::timeout(remaining, self.frame_rx.recv()).await {
            Ok(Some(frame)) => Ok(frame.value),
            Ok(None) => {
                anyhow::bail!("SSE connection closed");
            }
            Err(_) => {
                anyhow::bail!("Timeout waiting for counter frame");
            }
        }
    }
}
