//! Request id to caller protocol correlation.
//!
//! An entry lives for exactly one request/response round trip. Reading it with
//! [`CorrelationMap::take`] removes it, and the [`CorrelationGuard`] returned
//! by [`CorrelationMap::record`] removes it on drop when the response path is
//! never reached (errors, cancellation).

use dashmap::DashMap;
use gateway_core::{Protocol, RequestId};
use std::sync::Arc;
use tracing::{trace, warn};

/// Bounded map of in-flight requests to their detected protocol
#[derive(Debug)]
pub struct CorrelationMap {
    entries: DashMap<RequestId, Protocol>,
    capacity: usize,
}

impl CorrelationMap {
    /// Create a map holding at most `capacity` in-flight entries
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        })
    }

    /// Record the protocol detected for `request_id`.
    ///
    /// When the map is full the entry is not stored; the response path then
    /// falls back to detecting the protocol from the response shape.
    pub fn record(self: &Arc<Self>, request_id: RequestId, protocol: Protocol) -> CorrelationGuard {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&request_id) {
            warn!(
                request_id = %request_id,
                capacity = self.capacity,
                "Correlation map full, protocol will be re-detected on response"
            );
        } else {
            trace!(request_id = %request_id, protocol = %protocol, "Recorded caller protocol");
            self.entries.insert(request_id.clone(), protocol);
        }
        CorrelationGuard {
            map: Arc::clone(self),
            request_id,
        }
    }

    /// Read and remove the entry for `request_id`
    pub fn take(&self, request_id: &RequestId) -> Option<Protocol> {
        self.entries.remove(request_id).map(|(_, p)| p)
    }

    /// Read without removing
    #[must_use]
    pub fn peek(&self, request_id: &RequestId) -> Option<Protocol> {
        self.entries.get(request_id).map(|p| *p)
    }

    /// Number of in-flight entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no request is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes its correlation entry when dropped
#[derive(Debug)]
pub struct CorrelationGuard {
    map: Arc<CorrelationMap>,
    request_id: RequestId,
}

impl CorrelationGuard {
    /// Request the guard belongs to
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Drop for CorrelationGuard {
    fn drop(&mut self) {
        self.map.take(&self.request_id);
    }
}
