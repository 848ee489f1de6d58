//! PM2 event bus client.
//!
//! The PM2 daemon publishes lifecycle notifications on a Unix socket
//! (`$PM2_HOME/pub.sock`). Messages use the axon/amp framing:
//!
//! ```text
//! ┌────────────────────┬──────────────┬───────────┬──────────────┬───────────┐
//! │ version<<4 | argc  │ len (u32 BE) │ arg bytes │ len (u32 BE) │ arg bytes │ ...
//! └────────────────────┴──────────────┴───────────┴──────────────┴───────────┘
//! ```
//!
//! Each argument is prefixed with `s:` (string) or `j:` (JSON). A bus
//! message is `[topic, data]`, e.g. `["s:process:event", "j:{...}"]`.
//! Only `process:event` and `process:exception` are turned into
//! [`ProcessEvent`]s; everything else (log lines, daemon notices) is skipped.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use pm2watch_types::{LifecycleEvent, ProcessEvent};

use crate::AdapterError;

/// Protocol version in the frame header.
const AMP_VERSION: u8 = 1;

/// Frames larger than this are treated as corruption.
const MAX_ARG_LEN: usize = 16 * 1024 * 1024;

/// One decoded bus message.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub data: Value,
}

impl BusMessage {
    /// Convert to a lifecycle event if this message describes one.
    pub fn to_event(&self) -> Option<ProcessEvent> {
        let process = self
            .data
            .pointer("/process/name")
            .and_then(Value::as_str)?
            .to_string();
        let at_ms = self.data.get("at").and_then(Value::as_u64);

        let mut event = match self.topic.as_str() {
            "process:event" => {
                let raw = self.data.get("event").and_then(Value::as_str)?;
                ProcessEvent::new(LifecycleEvent::from_pm2(raw)?, process)
            }
            "process:exception" => {
                let detail = match self.data.get("data") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => other
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    None => None,
                };
                let mut event = ProcessEvent::new(LifecycleEvent::Errored, process);
                event.detail = detail;
                event
            }
            _ => return None,
        };
        event.at_ms = at_ms;
        Some(event)
    }
}

/// A subscription to the PM2 event bus over any async byte stream.
#[derive(Debug)]
pub struct Pm2Bus<R> {
    reader: R,
}

#[cfg(unix)]
impl Pm2Bus<tokio::net::UnixStream> {
    /// Connect to the daemon's publish socket.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
            AdapterError::Connection(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self::from_reader(stream))
    }
}

impl<R> Pm2Bus<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap an already-connected stream.
    pub fn from_reader(reader: R) -> Self {
        Self { reader }
    }

    /// Read the next message. Returns `Ok(None)` when the stream closes.
    pub async fn next_message(&mut self) -> Result<Option<BusMessage>, AdapterError> {
        let header = match self.reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let version = header >> 4;
        if version != AMP_VERSION {
            return Err(AdapterError::Parse(format!(
                "unsupported amp version {}",
                version
            )));
        }

        let argc = (header & 0x0f) as usize;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            let len = self.reader.read_u32().await? as usize;
            if len > MAX_ARG_LEN {
                return Err(AdapterError::Parse(format!("bus frame too large: {}", len)));
            }
            let mut buf = vec![0u8; len];
            self.reader.read_exact(&mut buf).await?;
            args.push(unpack_arg(&buf)?);
        }

        let mut args = args.into_iter();
        let topic = match args.next() {
            Some(Value::String(topic)) => topic,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let data = args.next().unwrap_or(Value::Null);
        Ok(Some(BusMessage { topic, data }))
    }

    /// Read messages until one describes a lifecycle event.
    pub async fn next_event(&mut self) -> Result<Option<ProcessEvent>, AdapterError> {
        while let Some(message) = self.next_message().await? {
            if let Some(event) = message.to_event() {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

fn unpack_arg(buf: &[u8]) -> Result<Value, AdapterError> {
    if let Some(json) = buf.strip_prefix(b"j:") {
        return Ok(serde_json::from_slice(json)?);
    }
    let raw = buf.strip_prefix(b"s:").unwrap_or(buf);
    Ok(Value::String(String::from_utf8_lossy(raw).into_owned()))
}

/// Encode arguments as one amp frame.
pub fn encode_frame(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + args.iter().map(|a| 4 + a.len()).sum::<usize>());
    out.push((AMP_VERSION << 4) | (args.len() as u8 & 0x0f));
    for arg in args {
        out.extend_from_slice(&(arg.len() as u32).to_be_bytes());
        out.extend_from_slice(arg);
    }
    out
}

/// Resolve the publish socket path: explicit home, then `PM2_HOME`, then `~/.pm2`.
pub fn default_socket_path(pm2_home: Option<&Path>) -> Option<PathBuf> {
    let home = match pm2_home {
        Some(home) => home.to_path_buf(),
        None => match std::env::var_os("PM2_HOME") {
            Some(home) => PathBuf::from(home),
            None => PathBuf::from(std::env::var_os("HOME")?).join(".pm2"),
        },
    };
    Some(home.join("pub.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(topic: &str, data: &str) -> Vec<u8> {
        let topic = format!("s:{}", topic);
        let data = format!("j:{}", data);
        encode_frame(&[topic.as_bytes(), data.as_bytes()])
    }

    #[tokio::test]
    async fn test_decode_process_event() {
        let bytes = frame(
            "process:event",
            r#"{"event":"restart","process":{"name":"api","pm_id":0},"at":1700000000000}"#,
        );
        let mut bus = Pm2Bus::from_reader(Cursor::new(bytes));

        let event = bus.next_event().await.unwrap().unwrap();
        assert_eq!(event.event, LifecycleEvent::Restarted);
        assert_eq!(event.process, "api");
        assert_eq!(event.at_ms, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_decode_exception_carries_message() {
        let bytes = frame(
            "process:exception",
            r#"{"process":{"name":"api"},"data":{"message":"ECONNREFUSED","stack":"..."}}"#,
        );
        let mut bus = Pm2Bus::from_reader(Cursor::new(bytes));

        let event = bus.next_event().await.unwrap().unwrap();
        assert_eq!(event.event, LifecycleEvent::Errored);
        assert_eq!(event.detail.as_deref(), Some("ECONNREFUSED"));
    }

    #[tokio::test]
    async fn test_skips_log_messages() {
        let mut bytes = frame("log:out", r#"{"process":{"name":"api"},"data":"hello"}"#);
        bytes.extend(frame(
            "process:event",
            r#"{"event":"stop","process":{"name":"api"}}"#,
        ));
        let mut bus = Pm2Bus::from_reader(Cursor::new(bytes));

        let event = bus.next_event().await.unwrap().unwrap();
        assert_eq!(event.event, LifecycleEvent::Stopped);
        assert!(bus.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skips_events_without_transition() {
        let bytes = frame(
            "process:event",
            r#"{"event":"delete","process":{"name":"api"}}"#,
        );
        let mut bus = Pm2Bus::from_reader(Cursor::new(bytes));
        assert!(bus.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_returns_none() {
        let mut bus = Pm2Bus::from_reader(Cursor::new(Vec::<u8>::new()));
        assert!(bus.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let mut bytes = frame("process:event", "{}");
        bytes[0] = (2 << 4) | 2;
        let mut bus = Pm2Bus::from_reader(Cursor::new(bytes));
        assert!(matches!(
            bus.next_message().await,
            Err(AdapterError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_error() {
        let mut bytes = frame("process:event", r#"{"event":"stop"}"#);
        bytes.truncate(bytes.len() - 3);
        let mut bus = Pm2Bus::from_reader(Cursor::new(bytes));
        assert!(bus.next_message().await.is_err());
    }

    #[test]
    fn test_default_socket_path_prefers_explicit_home() {
        let path = default_socket_path(Some(Path::new("/srv/pm2"))).unwrap();
        assert_eq!(path, PathBuf::from("/srv/pm2/pub.sock"));
    }
}
