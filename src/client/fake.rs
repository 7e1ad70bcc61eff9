//! In-memory test doubles for [`Source`], [`PartFetcher`], and
//! [`DestinationClient`].
//!
//! Grounded on the teacher's `HashMapClient`/`AsyncTempFileClient`: small,
//! inspectable, in-process implementations of the external client traits
//! that let a test assert exactly which requests were made, without
//! standing up real HTTP servers.
use crate::cid::{PartCid, SpaceId, UploadCid};
use crate::client::{DestinationClient, FetchResponse, PartFetcher, Source};
use crate::error::{Error, Result};
use crate::model::Upload;
use crate::receipt::{Authorization, Capability, Invocation, Receipt, RegisterPartOk, RegisterUploadOk};

use bytes::Bytes;
use futures::future::{pending, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// A [`Source`] over a fixed, in-memory list of uploads.
///
/// Tracks how many uploads have been pulled off the stream so a test can
/// assert the look-ahead bound (spec §8 item 6, scenario S5).
#[derive(Debug, Clone)]
pub struct FakeSource {
    uploads: Vec<Upload>,
    pulled: Arc<AtomicUsize>,
}

impl FakeSource {
    /// Build a source that yields `uploads` in order, then ends.
    pub fn new(uploads: Vec<Upload>) -> Self {
        Self {
            uploads,
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A shared counter of how many uploads this source has yielded so far.
    pub fn pulled_counter(&self) -> Arc<AtomicUsize> {
        self.pulled.clone()
    }
}

impl Source for FakeSource {
    fn into_stream(self) -> BoxStream<'static, Result<Upload>> {
        let pulled = self.pulled;
        stream::iter(self.uploads.into_iter().map(Ok))
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}

/// A [`PartFetcher`] serving canned bodies by part CID.
///
/// Fetching a part with no registered body hangs forever, standing in for
/// the "part fetcher never completes" condition of spec §8 scenario S5.
#[derive(Debug, Clone, Default)]
pub struct FakePartFetcher {
    bodies: Arc<HashMap<PartCid, Bytes>>,
    in_flight: Arc<AtomicUsize>,
}

impl FakePartFetcher {
    /// Build a fetcher that answers `fetch` for each part CID present in
    /// `bodies`, and hangs for any other part.
    pub fn new(bodies: HashMap<PartCid, Bytes>) -> Self {
        Self {
            bodies: Arc::new(bodies),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A shared counter of fetches currently in flight (entered but not yet
    /// resolved).
    pub fn in_flight_counter(&self) -> Arc<AtomicUsize> {
        self.in_flight.clone()
    }
}

impl PartFetcher for FakePartFetcher {
    async fn fetch(&self, part: &PartCid, cancel: &CancellationToken) -> Result<FetchResponse> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let Some(body) = self.bodies.get(part).cloned() else {
            // No canned response: hang until cancelled, simulating a fetch
            // that never returns on its own.
            futures::select_biased! {
                _ = cancel.cancelled().fuse() => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(Error::cancelled());
                }
                _ = pending::<()>().fuse() => unreachable!("pending() never resolves"),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let content_length = body.len() as u64;
        Ok(FetchResponse {
            content_length,
            body: stream::once(async move { Ok(body) }).boxed(),
        })
    }
}

/// What a [`FakeDestinationClient`] answers for one `register-part`
/// invocation.
#[derive(Debug, Clone)]
pub enum FakeRegisterPart {
    /// `Ok.status == "done"`: the destination already holds the part.
    Done,
    /// `Ok.status == "upload"`: the caller must `PUT` bytes to `url`.
    Upload {
        /// The presigned URL the pipeline must `PUT` the part's bytes to.
        url: String,
    },
    /// The invocation's receipt is `Err`.
    Err(serde_json::Value),
    /// Never answers on its own; only resolves when `cancel` fires, as
    /// `PartFailure{cause=Cancelled}`. Stands in for an in-flight
    /// `register-part` call that cancellation must abort (spec §5).
    Hang,
}

/// What a [`FakeDestinationClient`] answers for one `register-upload`
/// invocation.
#[derive(Debug, Clone)]
pub enum FakeRegisterUpload {
    /// The invocation's receipt is `Ok`.
    Ok,
    /// The invocation's receipt is `Err`.
    Err(serde_json::Value),
    /// Never answers on its own; only resolves when `cancel` fires. Stands
    /// in for an in-flight `register-upload` (bind) call that cancellation
    /// must abort (spec §5).
    Hang,
}

/// An in-memory [`DestinationClient`] with per-CID scripted responses and a
/// default for anything unscripted.
#[derive(Debug)]
pub struct FakeDestinationClient {
    register_part: Mutex<HashMap<PartCid, FakeRegisterPart>>,
    default_register_part: FakeRegisterPart,
    register_upload: Mutex<HashMap<UploadCid, FakeRegisterUpload>>,
    default_register_upload: FakeRegisterUpload,
    put_status: Mutex<HashMap<String, u16>>,
    default_put_status: u16,
    hanging_puts: Mutex<HashSet<String>>,
    puts: Mutex<Vec<(String, u64)>>,
}

impl FakeDestinationClient {
    /// A client that answers `"done"` to every `register-part` and `Ok` to
    /// every `register-upload`, unless overridden per-CID.
    pub fn new() -> Self {
        Self {
            register_part: Mutex::new(HashMap::new()),
            default_register_part: FakeRegisterPart::Done,
            register_upload: Mutex::new(HashMap::new()),
            default_register_upload: FakeRegisterUpload::Ok,
            put_status: Mutex::new(HashMap::new()),
            default_put_status: 201,
            hanging_puts: Mutex::new(HashSet::new()),
            puts: Mutex::new(Vec::new()),
        }
    }

    /// Script the `register-part` response for one part CID.
    pub fn with_register_part(self, part: PartCid, response: FakeRegisterPart) -> Self {
        self.register_part.lock().unwrap().insert(part, response);
        self
    }

    /// Script the `register-upload` response for one upload CID.
    pub fn with_register_upload(self, upload: UploadCid, response: FakeRegisterUpload) -> Self {
        self.register_upload.lock().unwrap().insert(upload, response);
        self
    }

    /// Script the status code returned for a `PUT` to `url`.
    pub fn with_put_status(self, url: impl Into<String>, status: u16) -> Self {
        self.put_status.lock().unwrap().insert(url.into(), status);
        self
    }

    /// Make a `PUT` to `url` never answer on its own; it only resolves
    /// when `cancel` fires, as a [`crate::error::ErrorKind::Cancelled`]
    /// failure. Stands in for an in-flight byte copy that cancellation
    /// must abort (spec §5).
    pub fn with_put_hang(self, url: impl Into<String>) -> Self {
        self.hanging_puts.lock().unwrap().insert(url.into());
        self
    }

    /// The `(url, byte count)` of every `PUT` this client has received, in
    /// the order they completed.
    pub fn puts(&self) -> Vec<(String, u64)> {
        self.puts.lock().unwrap().clone()
    }
}

impl Default for FakeDestinationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DestinationClient for FakeDestinationClient {
    async fn register_part(
        &self,
        invocation: Invocation,
        _authorization: &Authorization,
        cancel: &CancellationToken,
    ) -> Result<Receipt<RegisterPartOk>> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        let Capability::RegisterPart { link, .. } = invocation.capability else {
            panic!("FakeDestinationClient::register_part given a register-upload invocation");
        };
        let response = self
            .register_part
            .lock()
            .unwrap()
            .get(&link)
            .cloned()
            .unwrap_or_else(|| self.default_register_part.clone());

        if matches!(response, FakeRegisterPart::Hang) {
            futures::select_biased! {
                _ = cancel.cancelled().fuse() => return Err(Error::cancelled()),
                _ = pending::<()>().fuse() => unreachable!("pending() never resolves"),
            }
        }

        let ran = serde_json::json!({"can": "register-part", "link": link.as_str()});
        Ok(match response {
            FakeRegisterPart::Done => Receipt::ok(
                ran,
                RegisterPartOk {
                    status: "done".into(),
                    url: None,
                    headers: None,
                    allocated: None,
                    link: link.clone(),
                    with: invocation.audience,
                },
            ),
            FakeRegisterPart::Upload { url } => Receipt::ok(
                ran,
                RegisterPartOk {
                    status: "upload".into(),
                    url: Some(url),
                    headers: Some(HashMap::new()),
                    allocated: None,
                    link: link.clone(),
                    with: invocation.audience,
                },
            ),
            FakeRegisterPart::Err(err) => Receipt::err(ran, err),
            FakeRegisterPart::Hang => unreachable!("handled above"),
        })
    }

    async fn register_upload(
        &self,
        invocation: Invocation,
        _authorization: &Authorization,
        cancel: &CancellationToken,
    ) -> Result<Receipt<RegisterUploadOk>> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        let Capability::RegisterUpload { root, .. } = invocation.capability else {
            panic!("FakeDestinationClient::register_upload given a register-part invocation");
        };
        let response = self
            .register_upload
            .lock()
            .unwrap()
            .get(&root)
            .cloned()
            .unwrap_or_else(|| self.default_register_upload.clone());

        if matches!(response, FakeRegisterUpload::Hang) {
            futures::select_biased! {
                _ = cancel.cancelled().fuse() => return Err(Error::cancelled()),
                _ = pending::<()>().fuse() => unreachable!("pending() never resolves"),
            }
        }

        let ran = serde_json::json!({"can": "register-upload", "root": root.as_str()});
        Ok(match response {
            FakeRegisterUpload::Ok => {
                Receipt::ok(ran, RegisterUploadOk { root: root.clone(), with: invocation.audience })
            }
            FakeRegisterUpload::Err(err) => Receipt::err(ran, err),
            FakeRegisterUpload::Hang => unreachable!("handled above"),
        })
    }

    async fn put_part(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        _content_length: u64,
        mut body: BoxStream<'static, Result<Bytes>>,
        cancel: &CancellationToken,
    ) -> Result<u16> {
        if self.hanging_puts.lock().unwrap().contains(url) {
            futures::select_biased! {
                _ = cancel.cancelled().fuse() => return Err(Error::cancelled()),
                _ = pending::<()>().fuse() => unreachable!("pending() never resolves"),
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        let mut total = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::copy(PartCid::new(url.to_string()), None, e.to_string()))?;
            total += chunk.len() as u64;
        }
        self.puts.lock().unwrap().push((url.to_string(), total));
        let status = self
            .put_status
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(self.default_put_status);
        Ok(status)
    }
}
