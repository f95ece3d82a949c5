//! Request/response value types.
//!
//! # Data Flow
//! ```text
//! Caller builds Request (service id, method, path, headers, body)
//!     → correlation ID generated once (request.rs)
//!     → Request cloned verbatim for every attempt
//!     → Transport / local handler produces Response (response.rs)
//!     → Response delivered once to the caller
//! ```

pub mod request;
pub mod response;

pub use request::{CorrelationId, Headers, Request, RequestBody, RequestBuilder, ServiceId, X_REQUEST_ID};
pub use response::{Response, ResponseBody};
