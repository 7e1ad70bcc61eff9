//! Opaque content-identifier and namespace newtypes.
//!
//! The pipeline never parses these — they are compared for equality, used
//! as map keys, and round-tripped to JSON, the same way the teacher's
//! `Bucket`/`Key` never inspect the bytes of an S3 key.
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

macro_rules! cid_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            /// Create a new value from anything convertible to a string.
            pub fn new<T: Into<Cow<'static, str>>>(value: T) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(Cow::Owned(value))
            }
        }
    };
}

cid_newtype!(UploadCid, "The root content identifier of a logical upload.");
cid_newtype!(PartCid, "The content identifier of one archive part.");
cid_newtype!(
    SpaceId,
    "The destination namespace (e.g. a decentralized identifier) a migration targets."
);
