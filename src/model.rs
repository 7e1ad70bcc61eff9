//! The data model flowing through the pipeline: one input [`Upload`]
//! produces one [`FetchablePart`] per part, each part resolves to a
//! [`PartSuccess`] or [`PartFailure`], the per-upload group of those
//! resolves to an [`UploadPartsReady`] or [`UploadFailure`], and binding a
//! ready upload produces the terminal [`Outcome`].
use crate::cid::{PartCid, UploadCid};
use crate::error::Cause;
use crate::receipt::{Receipt, RegisterPartOk, RegisterUploadOk};

use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A logical content-addressed upload, composed of one or more parts.
///
/// Immutable once created; owned by the [`crate::pipeline`] only between
/// its arrival from a `Source` and the moment every one of its parts has
/// been handed to a part migration task.
#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub cid: UploadCid,
    /// Part content identifiers in input order; may repeat.
    pub parts: Vec<PartCid>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(rename = "dagSize", skip_serializing_if = "Option::is_none")]
    pub dag_size: Option<u64>,
}

impl Upload {
    /// Build an upload from its content identifier and ordered part list.
    ///
    /// Panics if `parts` is empty — spec §3 requires at least one part.
    pub fn new(cid: impl Into<UploadCid>, parts: Vec<PartCid>) -> Self {
        assert!(!parts.is_empty(), "an upload must have at least one part");
        Self {
            cid: cid.into(),
            parts,
            id: None,
            name: None,
            created: None,
            updated: None,
            dag_size: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_created(mut self, created: impl Into<String>) -> Self {
        self.created = Some(created.into());
        self
    }

    pub fn with_updated(mut self, updated: impl Into<String>) -> Self {
        self.updated = Some(updated.into());
        self
    }

    pub fn with_dag_size(mut self, dag_size: u64) -> Self {
        self.dag_size = Some(dag_size);
        self
    }

    /// The set of distinct part identifiers, used for completion checking
    /// (spec §3: "treat as multiset but deduplicate by set membership for
    /// completion check").
    pub(crate) fn distinct_parts(&self) -> HashSet<PartCid> {
        self.parts.iter().cloned().collect()
    }
}

/// One part of an upload, paired with the bound fetch operation, ready to
/// be handed to a part migration task.
#[derive(Debug, Clone)]
pub struct FetchablePart {
    pub upload: Arc<Upload>,
    pub part: PartCid,
}

/// A part that was fetched, registered, and (if needed) copied
/// successfully.
#[derive(Debug, Clone)]
pub struct PartSuccess {
    pub part: PartCid,
    pub register_receipt: Receipt<RegisterPartOk>,
    /// `None` when the destination already held the part (`status == "done"`
    /// — no byte transfer happened).
    pub copy_response_status: Option<u16>,
}

/// A part that failed at some stage of migration.
#[derive(Debug, Clone)]
pub struct PartFailure {
    pub part: PartCid,
    pub cause: Cause,
}

/// The result of migrating one part: either terminal outcome.
#[derive(Debug, Clone)]
pub enum PartOutcome {
    Success(PartSuccess),
    Failure(PartFailure),
}

impl PartOutcome {
    pub fn part(&self) -> &PartCid {
        match self {
            Self::Success(s) => &s.part,
            Self::Failure(f) => &f.part,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Emitted by the Assembler once every distinct part of an upload has
/// succeeded.
#[derive(Debug, Clone)]
pub struct UploadPartsReady {
    pub upload: Arc<Upload>,
    pub parts: HashMap<PartCid, PartSuccess>,
}

/// Emitted by the Assembler when at least one part failed, or by the
/// Binder when the `register-upload` invocation failed.
#[derive(Debug, Clone)]
pub struct UploadFailure {
    pub upload: Arc<Upload>,
    pub parts: HashMap<PartCid, PartOutcome>,
    pub cause: Cause,
}

/// Emitted by the Binder once `register-upload` succeeds. Terminal.
#[derive(Debug, Clone)]
pub struct UploadSuccess {
    pub upload: Arc<Upload>,
    pub parts: HashMap<PartCid, PartSuccess>,
    pub bind_receipt: Receipt<RegisterUploadOk>,
}

/// One outcome record per input [`Upload`] (spec §3 invariant 1).
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(UploadSuccess),
    Failure(UploadFailure),
}

impl Outcome {
    pub fn upload(&self) -> &Arc<Upload> {
        match self {
            Self::Success(s) => &s.upload,
            Self::Failure(f) => &f.upload,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn upload_ref_json(upload: &Upload) -> serde_json::Value {
    serde_json::json!({ "cid": upload.cid.as_str() })
}

fn part_success_json(upload: &Upload, success: &PartSuccess) -> serde_json::Value {
    let copy = success
        .copy_response_status
        .map(|status| serde_json::json!({ "status": status }));
    serde_json::json!({
        "part": success.part.as_str(),
        "add": { "receipt": success.register_receipt },
        "copy": copy,
        "upload": upload_ref_json(upload),
    })
}

fn part_failure_json(upload: &Upload, failure: &PartFailure) -> serde_json::Value {
    let mut cause = serde_json::to_value(failure.cause.error().to_cause_json())
        .unwrap_or(serde_json::Value::Null);
    if let (Some(receipt), Some(obj)) = (&failure.cause.receipt, cause.as_object_mut()) {
        obj.insert(
            "receipt".to_string(),
            serde_json::to_value(receipt).unwrap_or(serde_json::Value::Null),
        );
    }
    serde_json::json!({
        "part": failure.part.as_str(),
        "upload": upload_ref_json(upload),
        "cause": cause,
    })
}

fn part_outcome_json(upload: &Upload, outcome: &PartOutcome) -> serde_json::Value {
    match outcome {
        PartOutcome::Success(s) => part_success_json(upload, s),
        PartOutcome::Failure(f) => part_failure_json(upload, f),
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = match self {
            Self::Success(success) => {
                let parts: serde_json::Map<String, serde_json::Value> = success
                    .parts
                    .iter()
                    .map(|(cid, ps)| (cid.to_string(), part_success_json(&success.upload, ps)))
                    .collect();
                serde_json::json!({
                    "type": "UploadMigrationSuccess",
                    "upload": success.upload,
                    "parts": parts,
                    "add": { "receipt": success.bind_receipt },
                })
            }
            Self::Failure(failure) => {
                let parts: serde_json::Map<String, serde_json::Value> = failure
                    .parts
                    .iter()
                    .map(|(cid, outcome)| {
                        (cid.to_string(), part_outcome_json(&failure.upload, outcome))
                    })
                    .collect();
                serde_json::json!({
                    "type": "UploadMigrationFailure",
                    "upload": failure.upload,
                    "parts": parts,
                    "cause": failure.cause.error().to_cause_json(),
                })
            }
        };
        value.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::receipt::{Receipt, RegisterPartOk, RegisterUploadOk};
    use std::sync::Arc;

    fn upload() -> Arc<Upload> {
        Arc::new(Upload::new("bafyU", vec![PartCid::new("bagP")]))
    }

    #[test]
    fn success_outcome_has_expected_shape() {
        let up = upload();
        let register_ok = RegisterPartOk {
            status: "done".into(),
            url: None,
            headers: None,
            allocated: None,
            link: PartCid::new("bagP"),
            with: crate::cid::SpaceId::new("did:key:z6Mk"),
        };
        let mut parts = HashMap::new();
        parts.insert(
            PartCid::new("bagP"),
            PartSuccess {
                part: PartCid::new("bagP"),
                register_receipt: Receipt::ok(serde_json::json!({}), register_ok),
                copy_response_status: None,
            },
        );
        let bind_ok = RegisterUploadOk {
            root: UploadCid::new("bafyU"),
            with: crate::cid::SpaceId::new("did:key:z6Mk"),
        };
        let outcome = Outcome::Success(UploadSuccess {
            upload: up,
            parts,
            bind_receipt: Receipt::ok(serde_json::json!({}), bind_ok),
        });

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["type"], "UploadMigrationSuccess");
        assert_eq!(value["parts"]["bagP"]["part"], "bagP");
        assert!(value["parts"]["bagP"]["copy"].is_null());
        assert_eq!(value["add"]["receipt"]["out"]["ok"]["status"], "done");
    }

    #[test]
    fn failure_outcome_carries_cause() {
        let up = upload();
        let mut parts = HashMap::new();
        parts.insert(
            PartCid::new("bagP"),
            PartOutcome::Failure(PartFailure {
                part: PartCid::new("bagP"),
                cause: Cause::new(Error::bad_fetch(PartCid::new("bagP"), "no content-length")),
            }),
        );
        let outcome = Outcome::Failure(UploadFailure {
            upload: up,
            parts,
            cause: Cause::new(Error::some_parts_failed(1, 1)),
        });

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["type"], "UploadMigrationFailure");
        assert_eq!(value["cause"]["name"], "some_parts_failed");
        assert_eq!(value["cause"]["failed"], 1);
        assert_eq!(value["parts"]["bagP"]["cause"]["name"], "bad_fetch");
    }
}
