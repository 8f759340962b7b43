//! Control channel to one external player process.
//!
//! Each call opens a fresh connection to the process's IPC socket, writes a
//! single newline-terminated JSON request, reads one response line, and
//! closes.  No persistent connection exists, so every call independently
//! tolerates "socket not created yet" and "connection refused": those are
//! normal while a freshly spawned player is still starting up, and they all
//! degrade to `None` instead of an error the caller has to unwrap.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

/// Connect and read timeout per request.
const IPC_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to one player process's IPC socket.  Cheap to clone; retains only
/// the socket path, so it stays valid for addressing a retired process after
/// a newer one has taken over the primary slot.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    socket_path: PathBuf,
}

impl ControlChannel {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send one command, e.g. `["get_property", "volume"]`.  Returns the
    /// parsed response, or `None` on any transport failure.
    pub async fn send(&self, command: Value) -> Option<Value> {
        if !self.socket_path.exists() {
            return None;
        }

        let result = timeout(IPC_TIMEOUT, self.send_inner(&command)).await;
        match result {
            Ok(Ok(response)) => Some(response),
            Ok(Err(e)) => {
                debug!("IPC command failed on {:?}: {}", self.socket_path, e);
                None
            }
            Err(_) => {
                debug!("IPC command timed out on {:?}", self.socket_path);
                None
            }
        }
    }

    async fn send_inner(&self, command: &Value) -> anyhow::Result<Value> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (read_half, mut write_half) = stream.into_split();

        let mut msg = serde_json::to_string(&json!({ "command": command }))?;
        msg.push('\n');
        write_half.write_all(msg.as_bytes()).await?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        // The player may push unsolicited event lines before the reply; the
        // reply is the first line carrying an "error" field.
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                anyhow::bail!("connection closed before response");
            }
            let value: Value = serde_json::from_str(line.trim())?;
            if value.get("error").is_some() {
                return Ok(value);
            }
        }
    }

    /// Query a property; `None` when the request failed or the property is
    /// unavailable.
    pub async fn get_property(&self, name: &str) -> Option<Value> {
        let resp = self.send(json!(["get_property", name])).await?;
        if resp.get("error").and_then(Value::as_str) == Some("success") {
            resp.get("data").cloned()
        } else {
            None
        }
    }

    pub async fn set_property(&self, name: &str, value: Value) -> bool {
        matches!(
            self.send(json!(["set_property", name, value])).await,
            Some(ref resp) if resp.get("error").and_then(Value::as_str) == Some("success")
        )
    }

    /// Request a graceful quit.  Best-effort: a dead socket means the process
    /// is already gone, which is fine.
    pub async fn quit(&self) {
        let _ = self.send(json!(["quit"])).await;
    }

    /// Replace the whole audio filter graph without restarting playback.
    /// An empty chain clears all filters.
    pub async fn set_audio_filter(&self, chain: &str) -> bool {
        matches!(
            self.send(json!(["af", "set", chain])).await,
            Some(ref resp) if resp.get("error").and_then(Value::as_str) == Some("success")
        )
    }

    /// Remove the socket file.  Called after the owning process has been
    /// stopped or killed.
    pub fn cleanup_socket(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                debug!("Failed to remove socket {:?}: {}", self.socket_path, e);
            }
        }
    }
}
