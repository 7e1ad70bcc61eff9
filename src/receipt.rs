//! Capability invocations, receipts, and authorization.
//!
//! Everything here is deliberately thin: the actual capability-invocation
//! transport codec (signing, UCAN/CAR encoding, delegation verification) is
//! out of scope for this crate (spec §1). The pipeline only ever needs to
//! build an [`Invocation`], hand it with an [`Authorization`] to a
//! [`crate::client::DestinationClient`], and look at the `ok`/`err`
//! discriminant and `ok.status` of the [`Receipt`] that comes back.
use crate::cid::{PartCid, SpaceId, UploadCid};

use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// An opaque capability delegation.
///
/// The core never inspects a delegation's bytes; it only carries them from
/// the caller to a [`crate::client::DestinationClient`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation(bytes::Bytes);

impl Delegation {
    /// Wrap an opaque delegation encoding.
    pub fn new(bytes: impl Into<bytes::Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the delegation's raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A bag of delegations proving the caller may invoke `register-part` and
/// `register-upload` scoped to a destination namespace.
#[derive(Debug, Clone, Default)]
pub struct Authorization(Vec<Delegation>);

impl Authorization {
    /// Build an authorization from a list of delegations.
    pub fn new(delegations: Vec<Delegation>) -> Self {
        Self(delegations)
    }

    /// The delegations proving this authorization.
    pub fn delegations(&self) -> &[Delegation] {
        &self.0
    }
}

/// The capability requested by an [`Invocation`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "can")]
pub enum Capability {
    /// Record a part's content identifier and size in the destination
    /// namespace.
    #[serde(rename = "register-part")]
    RegisterPart {
        /// The part's content identifier.
        link: PartCid,
        /// The part's size in bytes, as reported by the part fetcher.
        size: u64,
    },
    /// Bind a list of part content identifiers to an upload content
    /// identifier.
    #[serde(rename = "register-upload")]
    RegisterUpload {
        /// The upload's content identifier.
        root: UploadCid,
        /// The part content identifiers, in input order (may repeat).
        shards: Vec<PartCid>,
    },
}

/// A capability invocation sent to a [`crate::client::DestinationClient`].
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    /// The capability being invoked.
    pub capability: Capability,
    /// The destination namespace this invocation is scoped to.
    pub audience: SpaceId,
}

impl Invocation {
    pub(crate) fn register_part(link: PartCid, size: u64, audience: SpaceId) -> Self {
        Self {
            capability: Capability::RegisterPart { link, size },
            audience,
        }
    }

    pub(crate) fn register_upload(root: UploadCid, shards: Vec<PartCid>, audience: SpaceId) -> Self {
        Self {
            capability: Capability::RegisterUpload { root, shards },
            audience,
        }
    }
}

/// The successful result of a `register-part` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterPartOk {
    /// Either `"done"` (the destination already holds this part) or
    /// `"upload"` (the caller must `PUT` the part's bytes to `url`). Any
    /// other value is a protocol error.
    pub status: String,
    /// Present when `status == "upload"`: where to `PUT` the part's bytes.
    pub url: Option<String>,
    /// Present when `status == "upload"`: headers to send with the `PUT`.
    pub headers: Option<HashMap<String, String>>,
    /// Bytes the destination has allocated for this part, if it reports one.
    pub allocated: Option<u64>,
    /// The part's content identifier, echoed back by the destination.
    pub link: PartCid,
    /// The destination namespace this part was registered in.
    pub with: SpaceId,
}

/// The successful result of a `register-upload` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterUploadOk {
    /// The upload's content identifier, echoed back by the destination.
    pub root: UploadCid,
    /// The destination namespace this upload was bound in.
    pub with: SpaceId,
}

/// The `ok`/`error` discriminant of a [`Receipt`].
#[derive(Debug, Clone)]
pub enum ReceiptOut<T> {
    /// The invocation succeeded.
    Ok(T),
    /// The invocation failed; the payload is whatever the destination
    /// returned to describe why, opaque to this crate.
    Err(serde_json::Value),
}

impl<T> ReceiptOut<T> {
    /// `true` if this is the `Ok` variant.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// The success payload, if this is the `Ok` variant.
    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Err(_) => None,
        }
    }
}

impl<T: Serialize> Serialize for ReceiptOut<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Ok(v) => map.serialize_entry("ok", v)?,
            Self::Err(v) => map.serialize_entry("error", v)?,
        }
        map.end()
    }
}

/// A signed, opaque record returned by the destination attesting to the
/// outcome of an invocation.
///
/// The core only ever reads `out`; `issuer`, `signature`, `fx`, and `meta`
/// are carried through to the outcome's JSON serialization untouched.
#[derive(Debug, Clone)]
pub struct Receipt<T> {
    /// The invocation this receipt answers, echoed back verbatim.
    pub ran: serde_json::Value,
    /// The invocation's result.
    pub out: ReceiptOut<T>,
    pub issuer: Option<String>,
    pub signature: Option<String>,
    pub fx: Option<serde_json::Value>,
    pub meta: Option<serde_json::Value>,
}

impl<T> Receipt<T> {
    /// Build a successful receipt.
    pub fn ok(ran: serde_json::Value, value: T) -> Self {
        Self {
            ran,
            out: ReceiptOut::Ok(value),
            issuer: None,
            signature: None,
            fx: None,
            meta: None,
        }
    }

    /// Build a failed receipt.
    pub fn err(ran: serde_json::Value, error: serde_json::Value) -> Self {
        Self {
            ran,
            out: ReceiptOut::Err(error),
            issuer: None,
            signature: None,
            fx: None,
            meta: None,
        }
    }
}

impl<T: Serialize + Clone> Receipt<T> {
    /// Erase the success payload type to a plain JSON value, for carrying a
    /// receipt across the boundary between differently-typed invocations
    /// (e.g. attaching a `register-part` receipt to a generic [`crate::error::Cause`]).
    pub fn into_json_receipt(self) -> Receipt<serde_json::Value> {
        Receipt {
            ran: self.ran,
            out: match self.out {
                ReceiptOut::Ok(v) => {
                    ReceiptOut::Ok(serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
                }
                ReceiptOut::Err(v) => ReceiptOut::Err(v),
            },
            issuer: self.issuer,
            signature: self.signature,
            fx: self.fx,
            meta: self.meta,
        }
    }
}

impl<T: Serialize> Serialize for Receipt<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Receipt", 7)?;
        s.serialize_field("type", "Receipt")?;
        s.serialize_field("ran", &self.ran)?;
        s.serialize_field("out", &self.out)?;
        s.serialize_field("issuer", &self.issuer)?;
        s.serialize_field("signature", &self.signature)?;
        s.serialize_field("fx", &self.fx)?;
        s.serialize_field("meta", &self.meta)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_receipt_serializes_with_ok_key() {
        let receipt = Receipt::ok(serde_json::json!({"cap": "register-part"}), 42u64);
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["type"], "Receipt");
        assert_eq!(value["out"]["ok"], 42);
        assert!(value["out"].get("error").is_none());
    }

    #[test]
    fn err_receipt_serializes_with_error_key() {
        let receipt: Receipt<u64> =
            Receipt::err(serde_json::json!({}), serde_json::json!("boom"));
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["out"]["error"], "boom");
        assert!(value["out"].get("ok").is_none());
    }
}
