//! Queue backend implementations.
//!
//! This module contains concrete implementations of the
//! [`QueueBackend`](crate::backend::QueueBackend) trait.

pub mod memory;
#[cfg(feature = "oci")]
pub mod oci;
#[cfg(feature = "oci")]
pub mod oci_auth;

pub use memory::InMemoryBackend;
#[cfg(feature = "oci")]
pub use oci::OciQueueBackend;
#[cfg(feature = "oci")]
pub use oci_auth::{ApiKeySigner, OciProfile, RequestSigner, SignedHeaders};
