//! Authflow HTTP session client
//!
//! Wraps an HTTP transport with bearer-credential attachment, expiry
//! detection and single-flight token refresh: when many in-flight requests
//! hit a 401 at once, the refresh endpoint is called exactly once and every
//! waiter observes the same outcome. Irrecoverable refresh failures
//! terminate the session through [`authflow_core::SessionLifecycle`].

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod refresh;
pub mod request;
pub mod transport;
pub mod types;

pub use client::{SessionClient, SessionClientBuilder};
pub use config::CredentialMode;
pub use error::{ClientError, TransportError};
pub use pipeline::RequestPipeline;
pub use refresh::{RefreshCoordinator, RefreshError, RefreshOutcome};
pub use request::{HttpResponse, PendingRequest};
pub use transport::{HttpTransport, ReqwestTransport};
