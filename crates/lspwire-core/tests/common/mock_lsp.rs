use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lspwire_core::lsp::codec::{FrameReader, FramingMode, LengthUnit, encode_frame};
use lspwire_core::{ClientConfig, EventBus, LspClient};
use serde_json::{Value, json};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};

/// How the mock server answers a request for a given method.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Reply with a fixed result.
    Result(Value),
    /// Reply with a fixed result after a delay.
    Delayed(Duration, Value),
    /// Reply with the request params as the result.
    Echo,
    /// Reply with a JSON-RPC error object.
    Error {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    /// Never reply.
    Silent,
}

/// In-memory language server speaking header-framed JSON-RPC.
///
/// Requests for methods without a registered behavior are left unanswered.
#[derive(Debug, Default)]
pub struct MockLspServer {
    behaviors: HashMap<String, MockBehavior>,
}

/// Test-side handle of a running mock server.
#[allow(dead_code)]
pub struct MockHandle {
    writer: Arc<Mutex<WriteHalf<DuplexStream>>>,
    received: mpsc::UnboundedReceiver<Value>,
    task: JoinHandle<()>,
}

impl MockLspServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the behavior for a specific method.
    pub fn on_method(mut self, method: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(method.to_string(), behavior);
        self
    }

    /// Start the server and connect a client session to it.
    #[allow(clippy::unwrap_used)]
    pub fn connect(self, config: &ClientConfig) -> (LspClient, MockHandle) {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_end);
        let (server_read, server_write) = tokio::io::split(server_end);

        let client = LspClient::from_streams(
            client_read,
            client_write,
            config,
            EventBus::new(config.event_capacity),
        )
        .unwrap();

        let writer = Arc::new(Mutex::new(server_write));
        let (received_tx, received) = mpsc::unbounded_channel();
        let task = tokio::spawn(serve(
            FrameReader::new(BufReader::new(server_read), FramingMode::Headers, 1 << 20),
            Arc::clone(&writer),
            Arc::new(self.behaviors),
            received_tx,
        ));

        (
            client,
            MockHandle {
                writer,
                received,
                task,
            },
        )
    }
}

async fn serve<R>(
    mut frames: FrameReader<R>,
    writer: Arc<Mutex<WriteHalf<DuplexStream>>>,
    behaviors: Arc<HashMap<String, MockBehavior>>,
    received: mpsc::UnboundedSender<Value>,
) where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut responders = JoinSet::new();

    while let Ok(Some(body)) = frames.next_frame().await {
        let Ok(message) = serde_json::from_slice::<Value>(&body) else {
            continue;
        };
        let _ = received.send(message.clone());

        let (Some(id), Some(method)) = (message.get("id"), message["method"].as_str()) else {
            continue;
        };
        let Some(behavior) = behaviors.get(method).cloned() else {
            continue;
        };

        let id = id.clone();
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let writer = Arc::clone(&writer);
        responders.spawn(async move {
            let reply = match behavior {
                MockBehavior::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                MockBehavior::Delayed(delay, result) => {
                    tokio::time::sleep(delay).await;
                    json!({"jsonrpc": "2.0", "id": id, "result": result})
                }
                MockBehavior::Echo => json!({"jsonrpc": "2.0", "id": id, "result": params}),
                MockBehavior::Error {
                    code,
                    message,
                    data,
                } => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": code, "message": message, "data": data}
                }),
                MockBehavior::Silent => return,
            };
            write_frame(&writer, &reply).await;
        });
    }
}

#[allow(clippy::unwrap_used)]
async fn write_frame(writer: &Mutex<WriteHalf<DuplexStream>>, message: &Value) {
    let frame = encode_frame(message, LengthUnit::Bytes).unwrap();
    let _ = writer.lock().await.write_all(&frame).await;
}

#[allow(dead_code)]
impl MockHandle {
    /// Write a header-framed message to the client.
    pub async fn send_message(&self, message: &Value) {
        write_frame(&self.writer, message).await;
    }

    /// Write raw bytes to the client.
    #[allow(clippy::unwrap_used)]
    pub async fn send_raw(&self, bytes: &[u8]) {
        self.writer.lock().await.write_all(bytes).await.unwrap();
    }

    /// Next message the server received from the client.
    pub async fn next_received(&mut self) -> Option<Value> {
        self.received.recv().await
    }

    /// Close the server side. The client sees its output reach EOF.
    pub async fn close(self) {
        self.task.abort();
        let _ = self.task.await;
        let _ = self.writer.lock().await.shutdown().await;
    }
}

/// Client config with a short default timeout.
#[allow(dead_code)]
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        request_timeout_ms: 200,
        ..ClientConfig::default()
    }
}

/// A header-framed body, as raw bytes.
#[allow(dead_code)]
pub fn raw_frame(body: &str) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
}
