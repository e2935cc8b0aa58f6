//! # Cloudkit
//!
//! Cloud adapters for the engine's provider contract. The AWS adapter drives
//! the official `aws` CLI (`--output json`) rather than binding an SDK: each
//! operation shells out, parses the JSON answer, and classifies stderr into
//! the engine's provider error taxonomy. Transient failures are retried with
//! exponential backoff; cancellation is honoured between waits.

pub mod aws;
pub mod awscli;
pub mod error;
pub mod retry;

pub use aws::{AwsProvider, SUPPORTED_KINDS};
pub use awscli::AwsCli;
pub use error::{classify, is_not_found};
pub use retry::{with_retry, RetryConfig};
