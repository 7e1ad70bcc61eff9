//! `Source`, `PartFetcher`, and `DestinationClient`: the external-system
//! seams [`crate::migrate`] is generic over.
use crate::cid::PartCid;
use crate::error::Result;
use crate::model::Upload;
use crate::receipt::{Authorization, Invocation, Receipt, RegisterPartOk, RegisterUploadOk};

use bytes::Bytes;
use futures::future::Future;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::ops::Deref;
use tokio_util::sync::CancellationToken;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod http;
pub use http::HttpClient;

/// Where upload records to migrate come from.
///
/// A `Source` is consumed once: [`crate::migrate`] calls
/// [`Source::into_stream`] exactly once at the start of a run. Spec §2
/// leaves how uploads are discovered (database cursor, file, paginated
/// API) entirely up to the implementor.
pub trait Source: Send + 'static {
    /// Produce the stream of uploads to migrate.
    ///
    /// An `Err` item ends the stream at that point (spec §3: a source-level
    /// read failure is not attributed to any particular upload, so it is
    /// surfaced as the stream's terminal error rather than an `Outcome`).
    fn into_stream(self) -> BoxStream<'static, Result<Upload>>;
}

/// A streamed, content-length-known fetch response.
pub struct FetchResponse {
    /// The exact byte length of `body`, required up front so it can be
    /// forwarded as the `Content-Length` of the destination `PUT` (spec
    /// §4.2, §9 OQ3).
    pub content_length: u64,
    /// The part's bytes, in order, not necessarily all buffered in memory.
    pub body: BoxStream<'static, Result<Bytes>>,
}

/// Fetches the bytes of a part from wherever the source system stores them.
pub trait PartFetcher: Send + Sync {
    /// Begin fetching `part`'s bytes.
    ///
    /// Implementations that cannot report a content length up front (e.g. a
    /// transport that only knows chunk sizes) should buffer enough of the
    /// response to measure it, or fail with
    /// [`crate::error::ErrorKind::BadFetch`] — spec §3 requires a fetch
    /// response to either fully succeed or fail, never produce a partial
    /// upload.
    ///
    /// `cancel` is the same cooperative cancellation token passed to
    /// [`crate::migrate`] (spec §4.6, §5): a real transport should race its
    /// request against `cancel.cancelled()` so a suspended fetch can be
    /// aborted rather than left to run to completion after cancellation.
    fn fetch(
        &self,
        part: &PartCid,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<FetchResponse>> + Send;
}

impl<D, T> PartFetcher for T
where
    D: PartFetcher,
    T: Deref<Target = D> + Send + Sync,
{
    async fn fetch(&self, part: &PartCid, cancel: &CancellationToken) -> Result<FetchResponse> {
        self.deref().fetch(part, cancel).await
    }
}

/// Invokes capabilities against the destination and performs the resulting
/// byte copy.
///
/// Signing, UCAN/CAR encoding, and delegation verification are out of
/// scope (spec §1) — an implementation only needs to get an [`Invocation`]
/// to the destination and hand back the [`Receipt`] it answers with.
pub trait DestinationClient: Send + Sync {
    /// Invoke `register-part`, returning the destination's receipt.
    ///
    /// An `Err` return means the invocation itself could not be completed
    /// (transport failure); a receipt whose `out` is
    /// [`crate::receipt::ReceiptOut::Err`] means the destination answered
    /// but declined the capability. Both become
    /// [`crate::error::ErrorKind::Register`] at the pipeline level, the
    /// difference being whether a receipt is available to attach.
    ///
    /// `cancel` is the same cooperative cancellation token passed to
    /// [`crate::migrate`] (spec §4.6, §5): a real transport should race its
    /// request against `cancel.cancelled()` so an in-flight invocation can
    /// be aborted rather than left to run to completion after cancellation.
    fn register_part(
        &self,
        invocation: Invocation,
        authorization: &Authorization,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Receipt<RegisterPartOk>>> + Send;

    /// Invoke `register-upload`, returning the destination's receipt.
    ///
    /// `cancel` is raced the same way [`DestinationClient::register_part`]
    /// races it.
    fn register_upload(
        &self,
        invocation: Invocation,
        authorization: &Authorization,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Receipt<RegisterUploadOk>>> + Send;

    /// `PUT` a part's bytes to the URL a `register-part` receipt allocated,
    /// returning the response status code.
    ///
    /// Only called when the receipt's `Ok.status` was `"upload"`; spec §4.2
    /// skips this call entirely for `"done"` parts. `cancel` is raced the
    /// same way [`DestinationClient::register_part`] races it.
    fn put_part(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        content_length: u64,
        body: BoxStream<'static, Result<Bytes>>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<u16>> + Send;
}

impl<D, T> DestinationClient for T
where
    D: DestinationClient,
    T: Deref<Target = D> + Send + Sync,
{
    async fn register_part(
        &self,
        invocation: Invocation,
        authorization: &Authorization,
        cancel: &CancellationToken,
    ) -> Result<Receipt<RegisterPartOk>> {
        self.deref()
            .register_part(invocation, authorization, cancel)
            .await
    }

    async fn register_upload(
        &self,
        invocation: Invocation,
        authorization: &Authorization,
        cancel: &CancellationToken,
    ) -> Result<Receipt<RegisterUploadOk>> {
        self.deref()
            .register_upload(invocation, authorization, cancel)
            .await
    }

    async fn put_part(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        content_length: u64,
        body: BoxStream<'static, Result<Bytes>>,
        cancel: &CancellationToken,
    ) -> Result<u16> {
        self.deref()
            .put_part(url, headers, content_length, body, cancel)
            .await
    }
}
