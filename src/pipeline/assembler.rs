//! Assembler: group part results by upload CID, emitting exactly one event
//! per upload once every distinct part has arrived (spec §4.3).
use crate::cid::{PartCid, UploadCid};
use crate::error::{Cause, Error};
use crate::model::{PartOutcome, Upload, UploadFailure, UploadPartsReady};
use crate::pipeline::part_migrator::PartResult;

use futures::stream::{Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What the Assembler hands to the [`super::binder`]: either an upload
/// ready to bind, or a failure that bypasses the Binder entirely.
pub(crate) enum AssemblerEvent {
    Ready(UploadPartsReady),
    Failure(UploadFailure),
}

struct Accumulator {
    upload: Arc<Upload>,
    expected: HashSet<PartCid>,
    received: HashMap<PartCid, PartOutcome>,
}

impl Accumulator {
    fn new(upload: Arc<Upload>) -> Self {
        let expected = upload.distinct_parts();
        Self { upload, expected, received: HashMap::new() }
    }

    /// Set equality per spec §3: a repeated part CID in the input list is
    /// satisfied by a single arrival.
    fn is_complete(&self) -> bool {
        self.expected.iter().all(|part| self.received.contains_key(part))
    }

    fn finish(self) -> AssemblerEvent {
        let total = self.expected.len();
        let failed = self.received.values().filter(|outcome| !outcome.is_success()).count();
        if failed == 0 {
            let parts = self
                .received
                .into_iter()
                .map(|(cid, outcome)| match outcome {
                    PartOutcome::Success(success) => (cid, success),
                    PartOutcome::Failure(_) => unreachable!("failed == 0 checked above"),
                })
                .collect();
            AssemblerEvent::Ready(UploadPartsReady { upload: self.upload, parts })
        } else {
            AssemblerEvent::Failure(UploadFailure {
                upload: self.upload,
                parts: self.received,
                cause: Cause::new(Error::some_parts_failed(failed, total)),
            })
        }
    }
}

/// Fold a part-result stream into per-upload completion events.
///
/// Outputs are emitted in upload-*completion* order, not arrival order of
/// the uploads themselves (spec §4.3 "Ordering").
pub(crate) fn assemble(
    parts: impl Stream<Item = PartResult> + Send + 'static,
) -> impl Stream<Item = AssemblerEvent> + Send + 'static {
    async_stream::stream! {
        futures::pin_mut!(parts);
        let mut state: HashMap<UploadCid, Accumulator> = HashMap::new();
        while let Some(PartResult { upload, outcome }) = parts.next().await {
            let cid = upload.cid.clone();
            let part = outcome.part().clone();
            let accumulator = state.entry(cid.clone()).or_insert_with(|| Accumulator::new(upload));
            accumulator.received.insert(part, outcome);
            if accumulator.is_complete() {
                let accumulator = state.remove(&cid).expect("just inserted above");
                yield accumulator.finish();
            }
        }
    }
}
