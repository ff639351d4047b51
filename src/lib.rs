//! ERC-4337 (EntryPoint v0.6) sponsored user operations.
//!
//! A request flows through [`encoding::normalize_request`], [`gas::apply_buffers`],
//! [`paymaster::PaymasterClient::sponsor`], [`hash::user_op_hash`] and
//! [`signer::sign_operation`] before [`bundler::BundlerClient`] submits it.
//! [`pipeline::SponsoredPipeline`] drives the whole sequence.

pub mod account;
pub mod bundler;
pub mod config;
pub mod encoding;
pub mod error;
pub mod gas;
pub mod hash;
pub mod paymaster;
pub mod pipeline;
pub mod rpc;
pub mod signer;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
