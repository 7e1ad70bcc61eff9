//! A [`crate::client::PartFetcher`] backed by a real `reqwest::Client`.
//!
//! This is a convenience implementation of the fetch half of a migration
//! (spec §15/§16): `DestinationClient` is deliberately left for callers to
//! implement against whatever invocation transport their destination
//! speaks, but fetching bytes from an HTTP(S) URL and `PUT`ting bytes to a
//! presigned one is plain HTTP either way.
use crate::cid::PartCid;
use crate::error::{Error, Result};
use crate::client::FetchResponse;

use bytes::Bytes;
use futures::future::FutureExt;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Resolves a [`PartCid`] to a fetchable URL.
///
/// Spec §2 leaves part storage addressing to the caller; this trait is the
/// seam [`HttpClient`] needs to turn a part identifier into something
/// `reqwest` can `GET`.
pub trait PartUrlResolver: Send + Sync {
    fn resolve(&self, part: &PartCid) -> String;
}

/// A [`PartUrlResolver`] that treats the part's content identifier as
/// already being its own fetch URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityUrlResolver;

impl PartUrlResolver for IdentityUrlResolver {
    fn resolve(&self, part: &PartCid) -> String {
        part.as_str().to_string()
    }
}

/// An HTTP-backed part fetcher and destination byte-uploader.
///
/// Implements [`crate::client::PartFetcher`] directly; exposes
/// [`HttpClient::put_part`] as a free associated function so that a
/// `DestinationClient` implementation backed by HTTP can reuse it without
/// this crate having to know the destination's invocation transport.
#[derive(Clone)]
pub struct HttpClient<R = IdentityUrlResolver> {
    inner: reqwest::Client,
    resolver: R,
}

impl HttpClient<IdentityUrlResolver> {
    /// Build a client that treats each part's content identifier as its
    /// own fetch URL.
    pub fn new(inner: reqwest::Client) -> Self {
        Self {
            inner,
            resolver: IdentityUrlResolver,
        }
    }
}

impl<R: PartUrlResolver> HttpClient<R> {
    /// Build a client that resolves part URLs with a custom `resolver`.
    pub fn with_resolver(inner: reqwest::Client, resolver: R) -> Self {
        Self { inner, resolver }
    }

    /// `PUT` `body` to `url`, sending `content_length` and `headers`,
    /// returning the response status code.
    ///
    /// Races the send against `cancel`, the same way [`HttpClient::fetch`]
    /// races its `GET` (spec §5: streaming bytes to the destination is one
    /// of the four suspension points a cancellation token must abort).
    pub async fn put_part(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        content_length: u64,
        body: BoxStream<'static, Result<Bytes>>,
        cancel: &CancellationToken,
    ) -> Result<u16> {
        let reqwest_body = reqwest::Body::wrap_stream(body.map_err(std::io::Error::other));
        let mut request = self
            .inner
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .body(reqwest_body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let send = request.send();
        futures::pin_mut!(send);
        let response = futures::select_biased! {
            _ = cancel.cancelled().fuse() => return Err(Error::cancelled()),
            result = send.fuse() => {
                result.map_err(|e| Error::copy(PartCid::new(url.to_string()), None, e.to_string()))?
            }
        };
        Ok(response.status().as_u16())
    }
}

impl<R: PartUrlResolver> crate::client::PartFetcher for HttpClient<R> {
    async fn fetch(&self, part: &PartCid, cancel: &CancellationToken) -> Result<FetchResponse> {
        let url = self.resolver.resolve(part);
        let request = self.inner.get(&url).send();
        futures::pin_mut!(request);
        let response = futures::select_biased! {
            _ = cancel.cancelled().fuse() => return Err(Error::cancelled()),
            result = request.fuse() => result.map_err(|e| Error::bad_fetch(part.clone(), e.to_string()))?,
        };

        if !response.status().is_success() {
            return Err(Error::bad_fetch(
                part.clone(),
                format!("unexpected status {}", response.status()),
            ));
        }

        let content_length = response
            .content_length()
            .ok_or_else(|| Error::bad_fetch(part.clone(), "missing content-length"))?;
        if content_length == 0 {
            return Err(Error::bad_fetch(part.clone(), "content-length must be positive"));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::bad_fetch(PartCid::new(String::new()), e.to_string())))
            .boxed();

        Ok(FetchResponse {
            content_length,
            body,
        })
    }
}
