//! Host-messaging query mode.
//!
//! Invoked as a short-lived child process by the browser's native
//! messaging host. Reads one length-prefixed JSON request from stdin,
//! forwards it to the already-running daemon over the local client
//! socket, and writes exactly one length-prefixed JSON reply to stdout.
//! The caller maps the `Result` here to an exit code and a single
//! output frame so a transport failure and an application-level error
//! both still produce the one reply the protocol promises.

use std::path::Path;

use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::net::UnixStream;

use browserd_protocol::codec::{self};
use browserd_protocol::{ClientRequest, ClientResponse};

/// Runs the query, returning the JSON payload to write on success or a
/// plain error message to wrap in `{"error": ...}` on failure.
pub async fn run(socket_path: &Path) -> Result<Value, String> {
    let mut stdin = tokio::io::stdin();
    let request: Value = codec::read_len_prefixed_frame(&mut stdin)
        .await
        .map_err(|e| format!("reading request from stdin: {e}"))?
        .ok_or_else(|| "no request received on stdin".to_string())?;

    let client_request = match request.get("type").and_then(Value::as_str) {
        Some("register_extension") => ClientRequest::RegisterExtension,
        Some("get_endpoint") | None => ClientRequest::GetEndpoint,
        Some(other) => return Err(format!("unsupported query mode request type: {other}")),
    };

    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| format!("connecting to daemon socket {}: {e}", socket_path.display()))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    codec::write_line_frame(&mut write_half, &client_request)
        .await
        .map_err(|e| format!("sending request to daemon: {e}"))?;

    let response: ClientResponse = codec::read_line_frame(&mut reader)
        .await
        .map_err(|e| format!("reading daemon reply: {e}"))?
        .ok_or_else(|| "daemon closed the connection without replying".to_string())?;

    match response {
        ClientResponse::Endpoint { ip, port } => Ok(json!({"ip": ip, "port": port})),
        ClientResponse::Registration { session_id, ip, port } => {
            Ok(json!({"ip": ip, "port": port, "sessionId": session_id}))
        }
        ClientResponse::Error { message } => Err(message),
        other => Err(format!("unexpected daemon response: {other:?}")),
    }
}
