//! In-process HTTP sink and delivery fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sensor_bridge::{Acknowledger, BridgeResult, DeliveryStream, InboundMessage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One request as seen by the fake sink
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

/// Minimal HTTP/1.1 server answering each request from a script
///
/// Request `i` gets `responses[i]`, or the last entry once the script runs out.
/// With an empty script the server reads requests and never answers.
pub struct FakeSink {
    pub url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    handle: JoinHandle<()>,
}

impl FakeSink {
    pub async fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let captured = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let captured = Arc::clone(&captured);
                let responses = responses.clone();
                tokio::spawn(async move {
                    serve_connection(stream, captured, responses).await;
                });
            }
        });

        Self {
            url: format!("http://{}/naranjas/", addr),
            requests,
            handle,
        }
    }

    /// A sink that accepts connections but never answers
    pub async fn silent() -> Self {
        Self::start(Vec::new()).await
    }

    /// A sink that answers `status`, announces a huge body, sends `prefix`
    /// and then stalls without ever finishing the body
    pub async fn endless_body(status: u16, prefix: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let captured = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let captured = Arc::clone(&captured);
                tokio::spawn(async move {
                    let Ok(Some(request)) = read_request(&mut stream).await else {
                        return;
                    };
                    captured.lock().unwrap().push(request);

                    let head = format!(
                        "HTTP/1.1 {} Scripted\r\ncontent-type: text/plain\r\ncontent-length: 1073741824\r\n\r\n{}",
                        status, prefix
                    );
                    if stream.write_all(head.as_bytes()).await.is_err() {
                        return;
                    }
                    let mut sink = [0u8; 64];
                    while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
                });
            }
        });

        Self {
            url: format!("http://{}/naranjas/", addr),
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    responses: Vec<(u16, &'static str)>,
) {
    let Ok(Some(request)) = read_request(&mut stream).await else {
        return;
    };

    let index = {
        let mut requests = captured.lock().unwrap();
        requests.push(request);
        requests.len() - 1
    };

    let Some(&(status, body)) = responses.get(index).or_else(|| responses.last()) else {
        // Silent sink: hold the connection open until the client gives up
        let mut sink = [0u8; 64];
        while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
        return;
    };

    let response = format!(
        "HTTP/1.1 {} Scripted\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<CapturedRequest>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let mut content_length = 0;
    let mut content_type = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "content-type" => content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body_end = buf.len().min(header_end + content_length);
    Ok(Some(CapturedRequest {
        method,
        path,
        content_type,
        body: buf[header_end..body_end].to_vec(),
    }))
}

/// A port nothing listens on
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/naranjas/", addr)
}

/// Replays a fixed list of payloads, then ends
pub struct ReplayStream {
    items: VecDeque<BridgeResult<InboundMessage>>,
}

impl ReplayStream {
    pub fn auto_acked(payloads: Vec<&[u8]>) -> Self {
        let items = payloads
            .into_iter()
            .enumerate()
            .map(|(tag, payload)| Ok(InboundMessage::auto_acked(tag as u64 + 1, payload)))
            .collect();
        Self { items }
    }

    pub fn from_results(items: Vec<BridgeResult<InboundMessage>>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

#[async_trait]
impl DeliveryStream for ReplayStream {
    async fn next_delivery(&mut self) -> Option<BridgeResult<InboundMessage>> {
        self.items.pop_front()
    }
}

/// A stream that never yields, like an idle queue
pub struct IdleStream;

#[async_trait]
impl DeliveryStream for IdleStream {
    async fn next_delivery(&mut self) -> Option<BridgeResult<InboundMessage>> {
        std::future::pending().await
    }
}

/// Settlement as recorded by [`RecordingAcker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Ack(u64),
    Reject { tag: u64, requeue: bool },
}

/// Records ack/reject calls into a shared log
pub struct RecordingAcker {
    pub tag: u64,
    pub log: Arc<Mutex<Vec<Settlement>>>,
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self) -> BridgeResult<()> {
        self.log.lock().unwrap().push(Settlement::Ack(self.tag));
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> BridgeResult<()> {
        self.log.lock().unwrap().push(Settlement::Reject {
            tag: self.tag,
            requeue,
        });
        Ok(())
    }
}
