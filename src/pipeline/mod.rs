//! Wiring for the streaming migration pipeline (spec §2, §4, §9).
//!
//! Four stages plus an outcome merger, each a small free function over
//! `impl Stream`, composed the way the teacher composes `Stream`-returning
//! free functions in `write/mod.rs`:
//!
//! ```text
//! Source -> fan_out -> part_migrator -> assembler -> binder -> Outcome
//! ```
mod assembler;
mod binder;
mod fan_out;
mod part_migrator;

use crate::cid::SpaceId;
use crate::client::{DestinationClient, PartFetcher, Source};
use crate::config::MigrationConfig;
use crate::model::Outcome;
use crate::receipt::Authorization;

use futures::stream::Stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Migrate every [`crate::model::Upload`] `source` produces, emitting
/// exactly one [`Outcome`] per upload (spec §3 invariant 1).
///
/// `cancel` is the single cooperative cancellation token spec §5 asks the
/// caller to supply; signalling it turns in-flight parts and binds into
/// [`crate::error::ErrorKind::Cancelled`] failures and lets the stream
/// drain and end cleanly, without emitting outcomes for uploads whose
/// parts never finished.
///
/// # Example
///
/// The fakes below live behind the `test-util` feature (see
/// `src/client/fake.rs`), so this example is illustrative rather than
/// doctested; `tests/pipeline.rs` runs the equivalent against real fakes.
///
/// ```ignore
/// use std::num::NonZeroUsize;
/// use futures::StreamExt;
/// use tokio_util::sync::CancellationToken;
/// use upload_migrate::cid::{PartCid, SpaceId};
/// use upload_migrate::client::fake::{FakeDestinationClient, FakePartFetcher, FakeSource};
/// use upload_migrate::config::MigrationConfig;
/// use upload_migrate::model::Upload;
/// use upload_migrate::receipt::Authorization;
///
/// async fn run() {
///     let part = PartCid::new("bagP");
///     let upload = Upload::new("bafyU", vec![part.clone()]);
///     let source = FakeSource::new(vec![upload]);
///     let bodies = [(part.clone(), bytes::Bytes::from_static(b"hello"))]
///         .into_iter()
///         .collect();
///     let fetcher = FakePartFetcher::new(bodies);
///     let destination = FakeDestinationClient::new();
///     let config = MigrationConfig::new().with_concurrency(NonZeroUsize::new(4).unwrap());
///
///     let outcomes = upload_migrate::migrate(
///         source,
///         fetcher,
///         destination,
///         Authorization::default(),
///         SpaceId::new("did:key:z6Mk"),
///         config,
///         CancellationToken::new(),
///     );
///     futures::pin_mut!(outcomes);
///     while let Some(outcome) = outcomes.next().await {
///         assert!(outcome.is_success());
///     }
/// }
/// ```
pub fn migrate<S, F, D>(
    source: S,
    fetcher: F,
    destination: D,
    authorization: Authorization,
    space: SpaceId,
    config: MigrationConfig,
    cancel: CancellationToken,
) -> impl Stream<Item = Outcome> + Send + 'static
where
    S: Source,
    F: PartFetcher + Send + Sync + 'static,
    D: DestinationClient + Send + Sync + 'static,
{
    let fetcher = Arc::new(fetcher);
    let destination = Arc::new(destination);

    let fetchable_parts = fan_out::fan_out(source.into_stream());
    let part_results = part_migrator::migrate_parts(
        fetchable_parts,
        fetcher,
        destination.clone(),
        authorization.clone(),
        space.clone(),
        config,
        cancel.clone(),
    );
    let events = assembler::assemble(part_results);
    binder::bind_and_merge(events, destination, authorization, space, cancel)
}
