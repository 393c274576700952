//! Transport gateway enforcement.
//!
//! The TLS terminator in front of the backend forwards proto, identity, and
//! certificate headers; everything here validates those headers before any
//! subsystem logic runs.

pub mod error;
pub mod middleware;

pub use error::ApiError;
pub use middleware::{
    enforce_https, request_logging, require_mtls, require_signature_headers,
    require_transport_identity, SignatureHeaders, TransportIdentity,
};
