//! Fan-out: one [`Upload`] becomes one [`FetchablePart`] per part (spec
//! §4.1).
//!
//! `flat_map` is the right combinator here, not an accident of style: it
//! holds exactly one inner stream (one upload's remaining parts) at a
//! time, so the next upload is never polled from `uploads` until the
//! current one's parts have all been pulled downstream. That is what
//! bounds the Assembler's map to `O(inflight-uploads)`.
use crate::error::Result;
use crate::model::{FetchablePart, Upload};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::sync::Arc;

pub(crate) fn fan_out(
    uploads: BoxStream<'static, Result<Upload>>,
) -> impl Stream<Item = FetchablePart> + Send + 'static {
    uploads
        // A source-level read failure is not attributable to any one
        // upload (spec §3); the pipeline stops pulling rather than guess
        // which in-flight upload to blame.
        .take_while(|item| futures::future::ready(item.is_ok()))
        .map(|item| item.expect("take_while kept only Ok items"))
        .flat_map(|upload| {
            let upload = Arc::new(upload);
            let parts = upload.parts.clone();
            stream::iter(parts.into_iter().map(move |part| FetchablePart {
                upload: upload.clone(),
                part,
            }))
        })
}
