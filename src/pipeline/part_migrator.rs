//! PartMigrator: fetch + `register-part` + conditional byte copy, bounded
//! to `k` concurrent parts (spec §4.2).
use crate::cid::SpaceId;
use crate::client::{DestinationClient, PartFetcher};
use crate::config::MigrationConfig;
use crate::error::{Cause, Error};
use crate::model::{FetchablePart, PartFailure, PartOutcome, PartSuccess, Upload};
use crate::receipt::{Authorization, Invocation, ReceiptOut};
use crate::trace::{trace_debug, trace_warn};

use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A part-level result, still tagged with the upload it belongs to so the
/// [`super::assembler`] can group by upload CID.
pub(crate) struct PartResult {
    pub upload: Arc<Upload>,
    pub outcome: PartOutcome,
}

/// Run [`migrate_one`] over `parts` with at most `config.concurrency()`
/// migrations in flight at once.
///
/// `buffer_unordered` is the idiomatic `futures` mapping of spec §4.2's
/// "`k` in flight plus one look-ahead": it keeps pulling `parts` to fill
/// free slots and to prefetch the next item, but never holds more than
/// `k` pending futures, which is the testable bound of spec §8 items 5
/// and 6.
pub(crate) fn migrate_parts<F, D>(
    parts: impl Stream<Item = FetchablePart> + Send + 'static,
    fetcher: Arc<F>,
    destination: Arc<D>,
    authorization: Authorization,
    space: SpaceId,
    config: MigrationConfig,
    cancel: CancellationToken,
) -> impl Stream<Item = PartResult> + Send + 'static
where
    F: PartFetcher + Send + Sync + 'static,
    D: DestinationClient + Send + Sync + 'static,
{
    let concurrency = config.concurrency();
    parts
        .map(move |fetchable| {
            let fetcher = fetcher.clone();
            let destination = destination.clone();
            let authorization = authorization.clone();
            let space = space.clone();
            let config = config.clone();
            let cancel = cancel.clone();
            async move {
                let upload = fetchable.upload.clone();
                let outcome =
                    migrate_one(&fetchable, &fetcher, &destination, &authorization, &space, &config, &cancel)
                        .await;
                match &outcome {
                    PartOutcome::Success(success) => {
                        trace_debug!(part = %success.part, "part migrated")
                    }
                    PartOutcome::Failure(failure) => {
                        trace_warn!(part = %failure.part, cause = %failure.cause.error(), "part migration failed")
                    }
                }
                PartResult { upload, outcome }
            }
        })
        .buffer_unordered(concurrency)
}

async fn migrate_one<F, D>(
    fetchable: &FetchablePart,
    fetcher: &F,
    destination: &D,
    authorization: &Authorization,
    space: &SpaceId,
    config: &MigrationConfig,
    cancel: &CancellationToken,
) -> PartOutcome
where
    F: PartFetcher,
    D: DestinationClient,
{
    let part = fetchable.part.clone();
    trace_debug!(part = %part, "migrating part");

    // Step 1: cancellation is checked before any suspension point that
    // would otherwise start real work for this part.
    if cancel.is_cancelled() {
        trace_warn!(part = %part, "part cancelled before starting");
        return PartOutcome::Failure(PartFailure {
            part,
            cause: Cause::new(Error::cancelled()),
        });
    }

    // Step 2: fetch.
    let fetched = match fetcher.fetch(&part, cancel).await {
        Ok(response) => response,
        Err(e) => return PartOutcome::Failure(PartFailure { part, cause: Cause::new(e) }),
    };
    if fetched.content_length == 0 {
        return PartOutcome::Failure(PartFailure {
            part: part.clone(),
            cause: Cause::new(Error::bad_fetch(part, "content-length must be positive")),
        });
    }

    if cancel.is_cancelled() {
        return PartOutcome::Failure(PartFailure {
            part,
            cause: Cause::new(Error::cancelled()),
        });
    }

    // Step 3: register-part.
    let invocation = Invocation::register_part(part.clone(), fetched.content_length, space.clone());
    let receipt = match destination.register_part(invocation, authorization, cancel).await {
        Ok(receipt) => receipt,
        Err(e) => return PartOutcome::Failure(PartFailure { part, cause: Cause::new(e) }),
    };

    let ok = match &receipt.out {
        ReceiptOut::Ok(ok) => ok.clone(),
        // Step 4: Err receipt.
        ReceiptOut::Err(_) => {
            let json_receipt = receipt.into_json_receipt();
            return PartOutcome::Failure(PartFailure {
                part: part.clone(),
                cause: Cause::with_receipt(
                    Error::register(part, "destination declined register-part"),
                    json_receipt,
                ),
            });
        }
    };

    match ok.status.as_str() {
        // Step 5: already held, no byte transfer.
        "done" => PartOutcome::Success(PartSuccess {
            part,
            register_receipt: receipt,
            copy_response_status: None,
        }),
        // Step 6: byte pass-through.
        "upload" => {
            let Some(url) = ok.url.clone() else {
                return PartOutcome::Failure(PartFailure {
                    part: part.clone(),
                    cause: Cause::new(Error::protocol(part, "status=\"upload\" missing url")),
                });
            };
            let headers = ok.headers.clone().unwrap_or_default();
            if cancel.is_cancelled() {
                return PartOutcome::Failure(PartFailure {
                    part,
                    cause: Cause::new(Error::cancelled()),
                });
            }
            match destination
                .put_part(&url, &headers, fetched.content_length, fetched.body, cancel)
                .await
            {
                Ok(status) if (200..300).contains(&status) => PartOutcome::Success(PartSuccess {
                    part,
                    register_receipt: receipt,
                    copy_response_status: Some(status),
                }),
                Ok(status) => PartOutcome::Failure(PartFailure {
                    part: part.clone(),
                    cause: Cause::new(Error::copy(part, Some(status), format!("unexpected status {status}"))),
                }),
                Err(e) => PartOutcome::Failure(PartFailure { part, cause: Cause::new(e) }),
            }
        }
        // Step 7: unrecognized status, unless the caller widened the
        // accepted set (spec §13's `expected_register_status` hook). A
        // caller-accepted custom status carries no defined byte-transfer
        // semantics, so it is treated like "done".
        other if config.is_expected_register_status(other) => PartOutcome::Success(PartSuccess {
            part,
            register_receipt: receipt,
            copy_response_status: None,
        }),
        other => PartOutcome::Failure(PartFailure {
            part: part.clone(),
            cause: Cause::new(Error::protocol(part, format!("unexpected register-part status {other:?}"))),
        }),
    }
}
