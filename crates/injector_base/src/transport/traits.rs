use std::sync::Arc;

use crate::InjectorResult;

use super::http::{HttpRequest, HttpResponse};

/* 📖 # Why is Transport a trait instead of a struct?

Using a trait enables two key benefits:
1. **Testability**: MockTransport answers requests from canned replies, so page
   loaders and feed consumers are tested without sockets
2. **Flexibility**: Code depends on the abstraction, not on reqwest

An Err from either method means no response was received at all. Any response
that did arrive, including 4xx and 5xx, is returned as Ok so the caller can map
its status.
*/

/// Abstraction over the HTTP client.
pub trait Transport: std::fmt::Debug + Send + Sync + 'static {
    /// Send a request and buffer the complete response body.
    fn execute(&self, request: HttpRequest) -> InjectorResult<HttpResponse>;

    /// Send a request whose response body is consumed incrementally.
    ///
    /// Implementations must not apply a whole-response timeout here, since
    /// event streams stay open indefinitely.
    fn open_stream(&self, request: HttpRequest) -> InjectorResult<HttpResponse> {
        self.execute(request)
    }
}

/// Handle to a Transport implementation, enabling shared ownership.
///
/// Internally wraps `Arc<dyn Transport>` for cheap cloning and thread-safe sharing.
///
/// # Examples
///
/// ```
/// use injector_base::{MockTransport, TransportHandle};
///
/// let transport = TransportHandle::new(MockTransport::new());
/// let transport_clone = transport.clone(); // Cheap clone, shares the same implementation
/// ```
#[derive(Debug, Clone)]
pub struct TransportHandle(Arc<dyn Transport>);

impl TransportHandle {
    /// Create a new TransportHandle from a Transport implementation.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self(Arc::new(transport))
    }
}

impl std::ops::Deref for TransportHandle {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}
