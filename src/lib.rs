#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

//! # Description
//!
//! A streaming, bounded-concurrency pipeline for migrating content-addressed
//! "uploads" from a legacy storage service to a capability-based
//! destination service.
//!
//! A source upload is a logical object identified by a root content
//! identifier, composed of one or more content-addressed "parts". Migrating
//! an upload means registering every part with the destination, copying
//! part bytes to a destination-chosen location when the destination says it
//! does not already hold them, and finally binding all parts to the logical
//! upload with one closing invocation.
//!
//! This crate owns exactly that pipeline: [`migrate`] consumes a
//! [`client::Source`] of [`model::Upload`] descriptors, fans each upload's
//! parts out to a bounded pool of concurrent [`client::PartFetcher`] /
//! [`client::DestinationClient`] round trips (see [`config::MigrationConfig`]
//! for the concurrency knob), reassembles per-upload results, binds each
//! completed upload, and emits exactly one [`model::Outcome`] per input
//! upload. Everything around it — argument parsing, interactive prompts,
//! the legacy-service list/pagination client, identity and delegation
//! encoding, on-disk key storage, and the newline-delimited JSON log this
//! crate's [`model::Outcome`] is designed to serialize into — is left to the
//! caller.
//!
//! # Example
//!
//! The fakes below live behind the `test-util` feature (see
//! `src/client/fake.rs`), so this example is illustrative rather than
//! doctested; `tests/pipeline.rs` runs the equivalent against real fakes.
//!
//! ```ignore
//! use std::num::NonZeroUsize;
//! use upload_migrate::cid::{PartCid, SpaceId};
//! use upload_migrate::client::fake::{FakeDestinationClient, FakePartFetcher, FakeSource};
//! use upload_migrate::config::MigrationConfig;
//! use upload_migrate::model::Upload;
//! use upload_migrate::receipt::Authorization;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run() {
//!     let part = PartCid::new("bagP");
//!     let upload = Upload::new("bafyU", vec![part.clone()]);
//!     let source = FakeSource::new(vec![upload]);
//!     let bodies = [(part, bytes::Bytes::from_static(b"hello"))].into_iter().collect();
//!     let fetcher = FakePartFetcher::new(bodies);
//!     let destination = FakeDestinationClient::new();
//!     let config = MigrationConfig::new().with_concurrency(NonZeroUsize::new(4).unwrap());
//!
//!     let _outcomes = upload_migrate::migrate(
//!         source,
//!         fetcher,
//!         destination,
//!         Authorization::default(),
//!         SpaceId::new("did:key:z6Mk"),
//!         config,
//!         CancellationToken::new(),
//!     );
//! }
//! ```
pub mod cid;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
mod pipeline;
pub mod receipt;
mod trace;

#[doc(inline)]
pub use pipeline::migrate;
