/* 📖 # What is the transport layer?

The transport layer is a trait-based abstraction over the HTTP client, in the
spirit of a platform abstraction layer. Client code depends on the Transport
trait; ReqwestTransport talks to a real backend and MockTransport answers from
canned replies in tests.
*/

pub mod http;
pub mod mock;
pub mod real;
mod traits;

pub use http::{HttpBody, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpStatus};
pub use mock::{MockReply, MockTransport};
pub use real::ReqwestTransport;
pub use traits::{Transport, TransportHandle};
