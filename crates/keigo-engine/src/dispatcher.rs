//! Seam between the engine and the transport.
//!
//! The engine never touches a socket directly; it hands requests to an
//! [`AnalysisDispatcher`]. Production wires in [`RelayHandle`], tests wire
//! in a recording mock.

use async_trait::async_trait;

use keigo_relay::{RelayError, RelayHandle};
use keigo_types::ServiceRequest;

/// Fire-and-forget request transport. Resolving `Ok(())` means the
/// request left the process; the reply, if any, arrives out of band.
#[async_trait]
pub trait AnalysisDispatcher: Send + Sync {
    async fn dispatch(&self, request: ServiceRequest) -> Result<(), RelayError>;
}

#[async_trait]
impl AnalysisDispatcher for RelayHandle {
    async fn dispatch(&self, request: ServiceRequest) -> Result<(), RelayError> {
        RelayHandle::dispatch(self, request).await
    }
}
