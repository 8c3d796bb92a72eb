// src/core/cache/remote.rs

//! A single-connection client for a remote RESP-speaking key/value store,
//! used as the shared cache backend when several replicas must agree on
//! rate windows.

use super::protocol::{Frame, FrameCodec};
use crate::core::errors::AgentError;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
/// Per-call deadline covering write plus all expected replies.
const CALL_TIMEOUT: Duration = Duration::from_millis(500);

struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
}

/// The remote cache backend. One connection, re-established on failure;
/// callers serialize on the internal mutex.
pub struct RemoteCache {
    addr: String,
    password: Option<String>,
    conn: Mutex<Option<Connection>>,
}

impl RemoteCache {
    pub fn new(host: String, port: u16, password: Option<String>) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            password: password.filter(|p| !p.is_empty()),
            conn: Mutex::new(None),
        }
    }

    /// Returns the counter at `key`; absent keys read as 0, not an error.
    pub async fn get_counter(&self, key: &str) -> Result<i64, AgentError> {
        let replies = self.call(&[Frame::command(&["GET", key])], 1).await?;
        match &replies[0] {
            Frame::Null => Ok(0),
            Frame::BulkString(raw) => std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| AgentError::Cache(format!("non-integer counter at '{key}'"))),
            Frame::Integer(v) => Ok(*v),
            other => Err(AgentError::Cache(format!(
                "unexpected GET reply: {other:?}"
            ))),
        }
    }

    pub async fn set_counter(&self, key: &str, value: i64, ttl: Duration) -> Result<(), AgentError> {
        let value = value.to_string();
        let ttl_ms = ttl.as_millis().max(1).to_string();
        let replies = self
            .call(&[Frame::command(&["SET", key, &value, "PX", &ttl_ms])], 1)
            .await?;
        expect_ok(&replies[0])
    }

    /// Increments the counter and refreshes its TTL as one pipelined
    /// write: INCRBY followed by EXPIRE, both replies awaited before the
    /// call returns, so the pair is atomic from the caller's perspective.
    pub async fn increment_by(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64, AgentError> {
        let delta = delta.to_string();
        let ttl_secs = ttl.as_secs().max(1).to_string();
        let replies = self
            .call(
                &[
                    Frame::command(&["INCRBY", key, &delta]),
                    Frame::command(&["EXPIRE", key, &ttl_secs]),
                ],
                2,
            )
            .await?;
        match &replies[0] {
            Frame::Integer(v) => Ok(*v),
            other => Err(AgentError::Cache(format!(
                "unexpected INCRBY reply: {other:?}"
            ))),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), AgentError> {
        self.call(&[Frame::command(&["DEL", key])], 1).await?;
        Ok(())
    }

    /// Sends the given frames in one write and reads `expected` replies,
    /// all under the per-call deadline. The connection is dropped on any
    /// failure so the next call starts fresh.
    async fn call(&self, frames: &[Frame], expected: usize) -> Result<Vec<Frame>, AgentError> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let conn = guard.as_mut().expect("connection just established");

        match tokio::time::timeout(CALL_TIMEOUT, Self::exchange(conn, frames, expected)).await {
            Ok(Ok(replies)) => Ok(replies),
            Ok(Err(e)) => {
                warn!(addr = %self.addr, error = %e, "Remote cache call failed");
                *guard = None;
                Err(e)
            }
            Err(_) => {
                warn!(addr = %self.addr, "Remote cache call timed out");
                *guard = None;
                Err(AgentError::Cache(format!(
                    "call to {} timed out after {CALL_TIMEOUT:?}",
                    self.addr
                )))
            }
        }
    }

    async fn exchange(
        conn: &mut Connection,
        frames: &[Frame],
        expected: usize,
    ) -> Result<Vec<Frame>, AgentError> {
        let mut write_buf = BytesMut::new();
        for frame in frames {
            FrameCodec.encode(frame.clone(), &mut write_buf)?;
        }
        conn.stream.write_all(&write_buf).await?;

        let mut replies = Vec::with_capacity(expected);
        while replies.len() < expected {
            if let Some(reply) = FrameCodec.decode(&mut conn.read_buf)? {
                if let Frame::Error(message) = reply {
                    return Err(AgentError::Cache(message));
                }
                replies.push(reply);
                continue;
            }
            let n = conn.stream.read_buf(&mut conn.read_buf).await?;
            if n == 0 {
                return Err(AgentError::Cache("connection closed by peer".to_string()));
            }
        }
        Ok(replies)
    }

    async fn connect(&self) -> Result<Connection, AgentError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| AgentError::Cache(format!("connect to {} timed out", self.addr)))??;
        let mut conn = Connection {
            stream,
            read_buf: BytesMut::with_capacity(4096),
        };
        debug!(addr = %self.addr, "Connected to remote cache");

        if let Some(password) = &self.password {
            let replies = tokio::time::timeout(
                CALL_TIMEOUT,
                Self::exchange(&mut conn, &[Frame::command(&["AUTH", password])], 1),
            )
            .await
            .map_err(|_| AgentError::Cache("AUTH timed out".to_string()))??;
            expect_ok(&replies[0])?;
        }
        Ok(conn)
    }
}

fn expect_ok(frame: &Frame) -> Result<(), AgentError> {
    match frame {
        Frame::SimpleString(s) if s == "OK" => Ok(()),
        other => Err(AgentError::Cache(format!("unexpected reply: {other:?}"))),
    }
}
