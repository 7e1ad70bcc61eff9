//! Binder + outcome merger: complete a ready upload via `register-upload`,
//! and interleave the result with the Assembler's failure side-channel in
//! arrival order (spec §4.4/§4.5).
use crate::cid::SpaceId;
use crate::client::DestinationClient;
use crate::error::{Cause, Error};
use crate::model::{Outcome, PartOutcome, UploadFailure, UploadPartsReady, UploadSuccess};
use crate::pipeline::assembler::AssemblerEvent;
use crate::receipt::{Authorization, Invocation, ReceiptOut};
use crate::trace::{trace_debug, trace_warn};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bind every [`AssemblerEvent::Ready`] upload and merge the results with
/// passed-through [`AssemblerEvent::Failure`]s.
///
/// A `register-upload` invocation runs concurrently with however many
/// other uploads are still being assembled — binding one upload must
/// never block the Assembler from completing the next, since spec §4.5
/// models these as two independent channels feeding one merger. A
/// [`FuturesUnordered`] of in-flight binds plays that second channel;
/// whichever of "a new assembler event arrives" or "a bind completes"
/// happens first is what gets emitted next, matching spec §4.5's "either
/// may be chosen; no global ordering is promised".
pub(crate) fn bind_and_merge<D>(
    events: impl Stream<Item = AssemblerEvent> + Send + 'static,
    destination: Arc<D>,
    authorization: Authorization,
    space: SpaceId,
    cancel: CancellationToken,
) -> impl Stream<Item = Outcome> + Send + 'static
where
    D: DestinationClient + Send + Sync + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(events);
        let mut pending: FuturesUnordered<BoxFuture<'static, Outcome>> = FuturesUnordered::new();
        let mut events_done = false;

        loop {
            if events_done && pending.is_empty() {
                break;
            }

            if events_done {
                if let Some(outcome) = pending.next().await {
                    yield outcome;
                }
                continue;
            }

            if pending.is_empty() {
                match events.next().await {
                    Some(AssemblerEvent::Failure(failure)) => yield Outcome::Failure(failure),
                    Some(AssemblerEvent::Ready(ready)) => pending.push(Box::pin(bind_one(
                        ready,
                        destination.clone(),
                        authorization.clone(),
                        space.clone(),
                        cancel.clone(),
                    ))),
                    None => events_done = true,
                }
                continue;
            }

            futures::select_biased! {
                event = events.next() => match event {
                    Some(AssemblerEvent::Failure(failure)) => yield Outcome::Failure(failure),
                    Some(AssemblerEvent::Ready(ready)) => pending.push(Box::pin(bind_one(
                        ready,
                        destination.clone(),
                        authorization.clone(),
                        space.clone(),
                        cancel.clone(),
                    ))),
                    None => events_done = true,
                },
                outcome = pending.next() => {
                    if let Some(outcome) = outcome {
                        yield outcome;
                    }
                }
            }
        }
    }
}

async fn bind_one<D>(
    ready: UploadPartsReady,
    destination: Arc<D>,
    authorization: Authorization,
    space: SpaceId,
    cancel: CancellationToken,
) -> Outcome
where
    D: DestinationClient,
{
    if cancel.is_cancelled() {
        return Outcome::Failure(as_failure(ready, Cause::new(Error::cancelled())));
    }

    let root = ready.upload.cid.clone();
    let shards = ready.upload.parts.clone();
    trace_debug!(upload = %root, "binding upload");
    let invocation = Invocation::register_upload(root.clone(), shards, space);

    match destination.register_upload(invocation, &authorization, &cancel).await {
        Ok(receipt) => match &receipt.out {
            ReceiptOut::Ok(_) => {
                trace_debug!(upload = %root, "upload bound");
                Outcome::Success(UploadSuccess {
                    upload: ready.upload,
                    parts: ready.parts,
                    bind_receipt: receipt,
                })
            }
            ReceiptOut::Err(_) => {
                trace_warn!(upload = %root, "register-upload declined");
                let json_receipt = receipt.into_json_receipt();
                Outcome::Failure(as_failure(
                    ready,
                    Cause::with_receipt(
                        Error::bind("destination declined register-upload"),
                        json_receipt,
                    ),
                ))
            }
        },
        Err(e) => {
            trace_warn!(upload = %root, cause = %e, "register-upload transport failure");
            Outcome::Failure(as_failure(ready, Cause::new(e)))
        }
    }
}

fn as_failure(ready: UploadPartsReady, cause: Cause) -> UploadFailure {
    let parts = ready
        .parts
        .into_iter()
        .map(|(cid, success)| (cid, PartOutcome::Success(success)))
        .collect();
    UploadFailure { upload: ready.upload, parts, cause }
}
