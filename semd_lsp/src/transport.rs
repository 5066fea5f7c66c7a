//! JSON-RPC transport layer.
//!
//! Frames are a block of `Name: value` header lines terminated by an empty
//! line, followed by exactly `Content-Length` bytes of JSON. The transport
//! does not care what is on the other end of the stream: a child's stdio, a
//! TCP socket or an in-memory pipe in tests.

use semd_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// JSON-RPC message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard code for requests we do not handle.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Request ID (can be number or string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl JsonRpcMessage {
    pub fn request(id: impl Into<RequestId>, method: &str, params: Option<Value>) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.to_string(),
            params,
        })
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        JsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        })
    }

    /// Successful reply to a server-initiated request.
    pub fn reply(id: RequestId, result: Value) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        })
    }

    /// Error reply to a server-initiated request.
    pub fn reject(id: RequestId, code: i64, message: &str) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        })
    }
}

/// A raw frame: headers in arrival order plus the body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Write half of the transport.
pub struct TransportWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> TransportWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one frame. `Content-Length` is always emitted first; any
    /// length header in `headers` is ignored.
    pub async fn write_frame(&mut self, headers: &[(String, String)], body: &[u8]) -> Result<()> {
        let mut header = format!("Content-Length: {}\r\n", body.len());
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            header.push_str(&format!("{}: {}\r\n", name, value));
        }
        header.push_str("\r\n");

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Serializes and sends a JSON-RPC message.
    pub async fn send_message(&mut self, message: &JsonRpcMessage) -> Result<()> {
        let content = serde_json::to_vec(message)?;
        self.write_frame(&[], &content).await?;
        log::trace!("Sent: {}", String::from_utf8_lossy(&content));
        Ok(())
    }

    /// Shuts down the underlying stream.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Read half of the transport.
pub struct TransportReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> TransportReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut headers = Vec::new();
        let mut content_length: Option<usize> = None;
        let mut header_line = String::new();

        loop {
            header_line.clear();
            let bytes_read = self.reader.read_line(&mut header_line).await?;
            if bytes_read == 0 {
                if headers.is_empty() {
                    return Ok(None);
                }
                return Err(Error::MalformedFrame(
                    "stream closed inside header block".to_string(),
                ));
            }

            let line = header_line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if headers.is_empty() {
                    // Stray blank line between frames.
                    continue;
                }
                break;
            }

            let Some((name, value)) = line.split_once(':') else {
                log::debug!("Ignoring malformed header line: {:?}", line);
                headers.push((line.to_string(), String::new()));
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.parse().map_err(|_| {
                    Error::MalformedFrame(format!("invalid Content-Length {:?}", value))
                })?);
            }
            headers.push((name.to_string(), value.to_string()));
        }

        let content_length = content_length
            .ok_or_else(|| Error::MalformedFrame("missing Content-Length header".to_string()))?;

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await.map_err(|e| {
            Error::MalformedFrame(format!("stream closed inside body: {}", e))
        })?;

        Ok(Some(Frame { headers, body }))
    }

    /// Reads the next frame and decodes its body as JSON.
    pub async fn read_message(&mut self) -> Result<Option<Value>> {
        let Some(frame) = self.read_frame().await? else {
            return Ok(None);
        };
        log::trace!("Received: {}", String::from_utf8_lossy(&frame.body));
        Ok(Some(serde_json::from_slice(&frame.body)?))
    }
}

/// Parses a JSON-RPC message to determine its type.
pub fn parse_message(value: &Value) -> Option<JsonRpcMessage> {
    let has_id = value.get("id").is_some_and(|id| !id.is_null());
    let has_method = value.get("method").is_some();

    match (has_id, has_method) {
        (true, false) => serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Response),
        (true, true) => serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Request),
        (false, true) => serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Notification),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn read_all(input: &[u8]) -> Vec<Result<Option<Frame>>> {
        let mut reader = TransportReader::new(input);
        let mut out = Vec::new();
        loop {
            let next = reader.read_frame().await;
            let done = !matches!(next, Ok(Some(_)));
            out.push(next);
            if done {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn test_round_trip_over_pipe() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = TransportWriter::new(client);
        let mut reader = TransportReader::new(server);

        let msg = JsonRpcMessage::request(7i64, "textDocument/hover", Some(json!({ "x": 1 })));
        writer.send_message(&msg).await.unwrap();

        let value = reader.read_message().await.unwrap().unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["method"], json!("textDocument/hover"));
        assert!(matches!(parse_message(&value), Some(JsonRpcMessage::Request(_))));
    }

    #[tokio::test]
    async fn test_unknown_headers_and_case() {
        let input = b"content-length: 2\r\nContent-Type: application/vscode-jsonrpc\r\nX-Extra: 1\r\n\r\n{}";
        let results = read_all(input).await;
        let frame = results[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(frame.body, b"{}");
        assert_eq!(frame.header("X-EXTRA"), Some("1"));
        assert!(matches!(results[1], Ok(None)));
    }

    #[tokio::test]
    async fn test_missing_length_is_malformed() {
        let input = b"Content-Type: foo\r\n\r\n{}";
        let results = read_all(input).await;
        assert!(matches!(results[0], Err(Error::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_malformed() {
        let results = read_all(b"Content-Length: 10\r\n\r\n{\"a\"").await;
        assert!(matches!(results[0], Err(Error::MalformedFrame(_))));

        let results = read_all(b"Content-Length: 10\r\n").await;
        assert!(matches!(results[0], Err(Error::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_back_to_back_frames() {
        let input = b"Content-Length: 1\r\n\r\n1Content-Length: 1\r\n\r\n2";
        let results = read_all(input).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].as_ref().unwrap().as_ref().unwrap().body, b"2");
    }

    #[test]
    fn test_parse_message_kinds() {
        let response = json!({ "jsonrpc": "2.0", "id": 1, "result": null });
        assert!(matches!(parse_message(&response), Some(JsonRpcMessage::Response(_))));

        let notification = json!({ "jsonrpc": "2.0", "method": "window/logMessage" });
        assert!(matches!(
            parse_message(&notification),
            Some(JsonRpcMessage::Notification(_))
        ));

        let request = json!({ "jsonrpc": "2.0", "id": "a", "method": "workspace/configuration" });
        assert!(matches!(parse_message(&request), Some(JsonRpcMessage::Request(_))));
    }
    #[test]
    fn test_request_ids_keep_their_exact_value() {
        let largest = JsonRpcMessage::request(i64::MAX, "shutdown", None);
        let value = serde_json::to_value(&largest).unwrap();
        assert_eq!(value["id"], json!(i64::MAX));

        let response = json!({ "jsonrpc": "2.0", "id": i64::MAX, "result": null });
        match parse_message(&response) {
            Some(JsonRpcMessage::Response(r)) => assert_eq!(r.id, RequestId::Number(i64::MAX)),
            other => panic!("unexpected {other:?}"),
        }

        let beyond = json!({ "jsonrpc": "2.0", "id": u64::MAX, "result": null });
        assert!(parse_message(&beyond).is_none());
    }
}
