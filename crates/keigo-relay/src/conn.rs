//! One live connection to the analysis service.
//!
//! The wire is newline-delimited JSON in both directions: one
//! [`ServiceRequest`] per outbound line, one [`ServiceReply`] per inbound
//! line. Framing is `tokio_util`'s `LinesCodec`; serialization is
//! `serde_json` (the shapes guarantee no embedded newlines).

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use keigo_types::{ServiceReply, ServiceRequest};

use crate::constants::MAX_LINE_BYTES;

/// Errors on an individual connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("line framing: {0}")]
    Framing(#[from] LinesCodecError),
    #[error("malformed service message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("service closed the connection")]
    Closed,
}

/// A framed duplex channel to the analysis service.
pub struct ServiceConn {
    framed: Framed<TcpStream, LinesCodec>,
}

impl ServiceConn {
    /// Open a fresh connection.
    pub async fn connect(addr: &str) -> Result<Self, ConnError> {
        let stream = TcpStream::connect(addr).await.map_err(ConnError::Connect)?;
        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES)),
        })
    }

    /// Send one request as a JSON line.
    pub async fn send(&mut self, request: &ServiceRequest) -> Result<(), ConnError> {
        let line = serde_json::to_string(request)?;
        self.framed.send(line).await?;
        Ok(())
    }

    /// Receive the next reply line.
    ///
    /// `Err(Closed)` means the service hung up; the caller should drop the
    /// connection and enter the reconnect cycle.
    pub async fn recv(&mut self) -> Result<ServiceReply, ConnError> {
        let line = self.framed.next().await.ok_or(ConnError::Closed)??;
        Ok(serde_json::from_str(&line)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
