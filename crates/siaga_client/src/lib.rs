//! SiagaAI backend client: single-attempt transport, retry policy, typed
//! REST endpoints, and login session handling.

pub mod auth;
pub mod endpoint;
pub mod rest;
pub mod retry;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use auth::{AuthSession, FileTokenStore, MemoryTokenStore, TokenStore};
pub use endpoint::EndpointTemplate;
pub use rest::{parse_payload, SiagaClient};
pub use retry::{send_with_retry, Delivery, Outcome, RetryPolicy};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
