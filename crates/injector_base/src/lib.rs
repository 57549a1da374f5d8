/* 📖 # Why have injector_base as a core library?
injector_base provides the foundational error handling, logging setup and the
transport abstraction used across all crates. Keeping them here ensures
consistent error handling and lets the client crate be tested without a network.
*/

pub mod error;
pub mod tracing;
pub mod transport;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, InjectorError, InjectorResult, ResultExt};
pub use transport::{MockTransport, ReqwestTransport, Transport, TransportHandle};
