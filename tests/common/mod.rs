#![allow(dead_code)]

use apianalytics_agent::buffer::Batch;
use apianalytics_agent::domain::{Cache, Content, Record, RequestInfo, ResponseInfo, Timings};
use apianalytics_agent::transport::{BatchTransport, TransportError};
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub fn record(status: u16) -> Record {
    Record {
        server_address: "127.0.0.1".to_string(),
        started_at: Utc::now(),
        request: RequestInfo {
            method: "GET".to_string(),
            url: format!("http://localhost/{status}"),
            http_version: "HTTP/1.1".to_string(),
            query_parameters: vec![],
            headers: vec![],
            headers_size: 0,
            body_size: -1,
        },
        response: ResponseInfo {
            status_code: status,
            status_text: String::new(),
            http_version: "HTTP/1.1".to_string(),
            headers: vec![],
            redirect_location: String::new(),
            headers_size: -1,
            body_size: -1,
            content: Content {
                size: -1,
                mime_type: "text/plain".to_string(),
                text: None,
            },
        },
        cache: Cache::default(),
        timings: Timings::default(),
    }
}

/// Transport double that keeps the status codes of every accepted batch.
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<Vec<u16>>>,
    refuse: Mutex<bool>,
}

impl RecordingTransport {
    pub fn batches(&self) -> Vec<Vec<u16>> {
        self.batches.lock().clone()
    }

    pub fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock() = refuse;
    }
}

impl BatchTransport for RecordingTransport {
    fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        if *self.refuse.lock() {
            return Err(TransportError::Closed);
        }
        let statuses = batch
            .entries()
            .iter()
            .map(|record| record.response.status_code)
            .collect();
        self.batches.lock().push(statuses);
        Ok(())
    }
}

/// Loopback collector forwarding every text frame it receives.
///
/// With `close_first` the first connection is closed by the server right
/// after its first message.
pub async fn spawn_collector(close_first: bool) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut connection = 0_usize;
        while let Ok((stream, _)) = listener.accept().await {
            connection += 1;
            let close_after_first = close_first && connection == 1;
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = socket.next().await {
                    if let Message::Text(text) = message {
                        let _ = tx.send(text);
                        if close_after_first {
                            let _ = socket.close(None).await;
                            return;
                        }
                    }
                }
            });
        }
    });

    (addr, rx)
}

pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
    let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("collector received nothing")
        .expect("collector channel closed");
    serde_json::from_str(&text).unwrap()
}

/// Polls `condition` every 10ms for up to five seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn collecting_logger() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    (lines, move |line: &str| sink.lock().push(line.to_string()))
}
