//! Control transport: newline-delimited JSON over TCP
//!
//! Each request line gets exactly one response line. A line that is not a
//! valid request yields a `MalformedRequest` outcome and the connection
//! stays open.

use super::message::{ControlRequest, ControlResponse, UpdateRuleOutcome};
use super::service::RuleControlService;
use crate::error::RuleError;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Longest accepted request line
const MAX_LINE: usize = 64 * 1024;

pub struct ControlServer {
    listener: TcpListener,
    service: Arc<RuleControlService>,
    timeout: Duration,
}

impl ControlServer {
    pub async fn bind(
        addr: SocketAddr,
        service: Arc<RuleControlService>,
        timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            service,
            timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped.
    pub async fn serve(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "Control server listening");
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    continue;
                }
            };
            debug!(%peer, "Control connection opened");
            let service = Arc::clone(&self.service);
            let timeout = self.timeout;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, service, timeout).await {
                    debug!(%peer, "Control connection closed: {}", e);
                }
            });
        }
    }
}

/// Decode one request line; a decoding failure becomes a rejected outcome.
fn decode(line: &str) -> std::result::Result<ControlRequest, ControlResponse> {
    serde_json::from_str(line).map_err(|e| {
        UpdateRuleOutcome::rejected(&RuleError::MalformedRequest(e.to_string())).into()
    })
}

async fn handle_connection(
    stream: TcpStream,
    service: Arc<RuleControlService>,
    timeout: Duration,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = (&mut reader)
            .take(MAX_LINE as u64)
            .read_line(&mut line)
            .await?;
        if n == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        if n >= MAX_LINE && !line.ends_with('\n') {
            // The rest of an over-long line cannot be resynchronised
            let resp: ControlResponse = UpdateRuleOutcome::rejected(&RuleError::MalformedRequest(
                format!("request line exceeds {MAX_LINE} bytes"),
            ))
            .into();
            write_response(&mut writer, &resp).await?;
            return Ok(());
        }

        let response = match decode(line.trim()) {
            Ok(req) => service.submit(req, timeout).await,
            Err(resp) => resp,
        };
        write_response(&mut writer, &response).await?;
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &ControlResponse,
) -> Result<()> {
    let mut out = serde_json::to_vec(response)
        .map_err(|e| crate::Error::Parse(format!("encoding response: {e}")))?;
    out.push(b'\n');
    writer.write_all(&out).await?;
    Ok(())
}
