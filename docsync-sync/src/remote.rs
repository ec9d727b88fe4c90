//! Remote store client.
//!
//! ## HTTP contract
//!
//! ```text
//! GET {endpoint}/records/{id}
//!   200 {"local_version": n, "event_version": m}
//!   404 record does not exist yet
//!
//! PUT {endpoint}/records/{id}   body {"payload": {...}, "expected_version": n}
//!   200 {"status": "applied", "event_version": m}
//!   200 {"status": "no_change"}
//!   409 (or 412) expected_version does not match the stored version
//! ```
//!
//! Anything else on the write path becomes `SyncOutcome::TransientFailure`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use docsync_core::{Payload, RecordId, RemoteRecord, SyncOutcome, WorkspaceConfig};

use crate::error::RemoteError;

/// Longest slice of a response body carried into an operator-facing cause.
const MAX_BODY_IN_CAUSE: usize = 200;

/// Client-side contract with the versioned document store.
///
/// Methods block; the coordinator runs them on tokio's blocking pool.
pub trait RemoteStore: Send + Sync {
    /// Current versions of `record_id`, or `None` if it does not exist yet.
    fn read_record(&self, record_id: &RecordId) -> Result<Option<RemoteRecord>, RemoteError>;

    /// One optimistic-concurrency write. Never fails: transport and server
    /// errors are mapped to `SyncOutcome::TransientFailure`.
    fn write_record(&self, request: &WriteRequest) -> SyncOutcome;
}

/// A single versioned write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub record_id: RecordId,
    pub payload: Payload,
    pub expected_version: u64,
}

#[derive(Serialize)]
struct WriteBody<'a> {
    payload: &'a Payload,
    expected_version: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WriteStatus {
    Applied,
    NoChange,
    Conflict,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    status: WriteStatus,
    #[serde(default)]
    event_version: Option<u64>,
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`RemoteStore`] over HTTP/JSON using a blocking `ureq` agent.
pub struct HttpRemoteStore {
    endpoint: String,
    agent: ureq::Agent,
    token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, token: Option<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint,
            agent,
            token,
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.request_timeout(),
            config.token(),
        )
    }

    fn record_url(&self, record_id: &RecordId) -> String {
        format!("{}/records/{}", self.endpoint, record_id)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    fn read_record(&self, record_id: &RecordId) -> Result<Option<RemoteRecord>, RemoteError> {
        let url = self.record_url(record_id);
        match self.authorize(self.agent.get(&url)).call() {
            Ok(response) => {
                let record: RemoteRecord = response
                    .into_json()
                    .map_err(|e| RemoteError::Decode(e.to_string()))?;
                Ok(Some(record))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(status, response)) => Err(RemoteError::Status {
                status,
                body: truncate(&response.into_string().unwrap_or_default()),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(RemoteError::Transport(transport.to_string()))
            }
        }
    }

    fn write_record(&self, request: &WriteRequest) -> SyncOutcome {
        let url = self.record_url(&request.record_id);
        let body = WriteBody {
            payload: &request.payload,
            expected_version: request.expected_version,
        };

        tracing::debug!(
            record = %request.record_id,
            expected_version = request.expected_version,
            "sending versioned write",
        );

        match self.authorize(self.agent.put(&url)).send_json(&body) {
            Ok(response) => {
                let status = response.status();
                match response.into_string() {
                    Ok(text) => classify_write_response(status, &text),
                    Err(err) => SyncOutcome::TransientFailure {
                        cause: RemoteError::Decode(err.to_string()).cause(),
                    },
                }
            }
            Err(ureq::Error::Status(status, response)) => {
                classify_write_response(status, &response.into_string().unwrap_or_default())
            }
            Err(ureq::Error::Transport(transport)) => SyncOutcome::TransientFailure {
                cause: RemoteError::Transport(transport.to_string()).cause(),
            },
        }
    }
}

/// Map an HTTP status and body from the write endpoint to an outcome.
pub fn classify_write_response(status: u16, body: &str) -> SyncOutcome {
    match status {
        409 | 412 => SyncOutcome::Conflict,
        200..=299 => match serde_json::from_str::<WriteResponse>(body) {
            Ok(WriteResponse {
                status: WriteStatus::Applied,
                event_version: Some(event_version),
            }) => SyncOutcome::Applied { event_version },
            Ok(WriteResponse {
                status: WriteStatus::Applied,
                event_version: None,
            }) => SyncOutcome::TransientFailure {
                cause: RemoteError::Decode("applied write without event_version".to_string())
                    .cause(),
            },
            Ok(WriteResponse {
                status: WriteStatus::NoChange,
                ..
            }) => SyncOutcome::NoChange,
            Ok(WriteResponse {
                status: WriteStatus::Conflict,
                ..
            }) => SyncOutcome::Conflict,
            Err(err) => SyncOutcome::TransientFailure {
                cause: RemoteError::Decode(err.to_string()).cause(),
            },
        },
        _ => SyncOutcome::TransientFailure {
            cause: RemoteError::Status {
                status,
                body: truncate(body),
            }
            .cause(),
        },
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_IN_CAUSE) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn applied_with_event_version() {
        assert_eq!(
            classify_write_response(200, r#"{"status":"applied","event_version":7}"#),
            SyncOutcome::Applied { event_version: 7 }
        );
    }

    #[test]
    fn no_change_body() {
        assert_eq!(
            classify_write_response(200, r#"{"status":"no_change"}"#),
            SyncOutcome::NoChange
        );
    }

    #[test]
    fn conflict_statuses() {
        assert_eq!(classify_write_response(409, ""), SyncOutcome::Conflict);
        assert_eq!(classify_write_response(412, "stale"), SyncOutcome::Conflict);
        assert_eq!(
            classify_write_response(200, r#"{"status":"conflict"}"#),
            SyncOutcome::Conflict
        );
    }

    #[test]
    fn server_errors_are_transient_with_status_in_cause() {
        match classify_write_response(503, "maintenance") {
            SyncOutcome::TransientFailure { cause } => {
                assert!(cause.contains("503"), "cause: {cause}");
                assert!(cause.contains("maintenance"), "cause: {cause}");
            }
            other => panic!("expected transient failure, got {other:?}"),
        }
    }

    #[test]
    fn garbage_success_body_is_transient() {
        assert!(matches!(
            classify_write_response(200, "<html>"),
            SyncOutcome::TransientFailure { .. }
        ));
        assert!(matches!(
            classify_write_response(200, r#"{"status":"applied"}"#),
            SyncOutcome::TransientFailure { .. }
        ));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        let truncated = truncate(&body);
        assert!(truncated.chars().count() <= MAX_BODY_IN_CAUSE + 1);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let store = HttpRemoteStore::new("http://localhost:1/api/", Duration::from_secs(1), None);
        assert_eq!(
            store.record_url(&RecordId::from("ws")),
            "http://localhost:1/api/records/ws"
        );
    }

    /// Serve exactly one canned HTTP response and hand back the request head.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read line");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
                head.push_str(&line);
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).expect("read body");
            head.push_str(&String::from_utf8_lossy(&request_body));

            let mut stream = stream;
            write!(
                stream,
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .expect("write response");
            head
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn http_read_missing_record_is_none() {
        let (endpoint, server) = serve_once("HTTP/1.1 404 Not Found", "");
        let store = HttpRemoteStore::new(endpoint, Duration::from_secs(5), None);
        let record = store.read_record(&RecordId::from("ws-01")).expect("read");
        assert_eq!(record, None);
        let request = server.join().expect("server");
        assert!(request.starts_with("GET /records/ws-01 "), "request: {request}");
    }

    #[test]
    fn http_read_existing_record() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"local_version":4,"event_version":11}"#,
        );
        let store = HttpRemoteStore::new(endpoint, Duration::from_secs(5), None);
        let record = store.read_record(&RecordId::from("ws-01")).expect("read");
        assert_eq!(
            record,
            Some(RemoteRecord {
                local_version: 4,
                event_version: 11
            })
        );
        server.join().expect("server");
    }

    #[test]
    fn http_write_sends_expected_version_and_token() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"status":"applied","event_version":1}"#,
        );
        let store = HttpRemoteStore::new(endpoint, Duration::from_secs(5), Some("s3cret".into()));
        let payload = Payload::try_from(serde_json::json!({"a": 1})).expect("mapping");
        let outcome = store.write_record(&WriteRequest {
            record_id: RecordId::from("ws-01"),
            payload,
            expected_version: 1,
        });
        assert_eq!(outcome, SyncOutcome::Applied { event_version: 1 });

        let request = server.join().expect("server");
        assert!(request.starts_with("PUT /records/ws-01 "), "request: {request}");
        assert!(request.contains("Bearer s3cret"), "request: {request}");
        assert!(request.contains(r#""expected_version":1"#), "request: {request}");
        assert!(request.contains(r#""payload":{"a":1}"#), "request: {request}");
    }

    #[test]
    fn http_write_conflict_status() {
        let (endpoint, server) = serve_once("HTTP/1.1 409 Conflict", r#"{"error":"stale"}"#);
        let store = HttpRemoteStore::new(endpoint, Duration::from_secs(5), None);
        let outcome = store.write_record(&WriteRequest {
            record_id: RecordId::from("ws-01"),
            payload: Payload::default(),
            expected_version: 3,
        });
        assert_eq!(outcome, SyncOutcome::Conflict);
        server.join().expect("server");
    }

    #[test]
    fn http_write_unreachable_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let store = HttpRemoteStore::new(format!("http://{addr}"), Duration::from_secs(2), None);
        let outcome = store.write_record(&WriteRequest {
            record_id: RecordId::from("ws-01"),
            payload: Payload::default(),
            expected_version: 1,
        });
        assert!(
            matches!(outcome, SyncOutcome::TransientFailure { .. }),
            "got: {outcome:?}"
        );
    }
}
