//! Request signing and canonical payload hashing.

pub mod canonical;
pub mod signing;

pub use canonical::{canonical_encode, canonical_hash};
pub use signing::{sign_payload, verify_signature, SignatureFailure};
