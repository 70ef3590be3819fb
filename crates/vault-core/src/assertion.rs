//! Assertion types
//!
//! An assertion is a typed set of headers that the vault signs on behalf of
//! an authority. Three kinds are produced:
//!
//! - **serial**: binds a device key to a (brand, model, serial) triple. Always
//!   carries the redeemed request-id, so a signing request cannot be replayed.
//! - **model**: describes a device model of a brand.
//! - **system-user**: authorizes a local user account on devices of the listed
//!   models.
//!
//! Pivot flows produce serial and model assertions that carry an extra
//! `store` header naming the sub-store whose policy was applied.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Header names shared by every kind
pub mod headers {
    pub const TYPE: &str = "type";
    pub const AUTHORITY_ID: &str = "authority-id";
    pub const BRAND_ID: &str = "brand-id";
    pub const MODEL: &str = "model";
    pub const MODELS: &str = "models";
    pub const SERIAL: &str = "serial";
    pub const SERIES: &str = "series";
    pub const DEVICE_KEY: &str = "device-key";
    pub const REVISION: &str = "revision";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SIGN_KEY_ID: &str = "sign-key-id";
    pub const REQUEST_ID: &str = "request-id";
    pub const STORE: &str = "store";
    pub const USERNAME: &str = "username";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const SINCE: &str = "since";
    pub const UNTIL: &str = "until";
}

/// Kinds of assertion the vault signs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    Serial,
    Model,
    SystemUser,
}

impl AssertionKind {
    /// Wire name, used as the `type` header
    pub fn as_str(self) -> &'static str {
        match self {
            AssertionKind::Serial => "serial",
            AssertionKind::Model => "model",
            AssertionKind::SystemUser => "system-user",
        }
    }

    /// Whether signing this kind must consume a redeemed request-id
    pub fn requires_nonce(self) -> bool {
        matches!(self, AssertionKind::Serial)
    }

    /// Headers the caller must supply before signing
    pub fn required_headers(self) -> &'static [&'static str] {
        match self {
            AssertionKind::Serial => &[
                headers::BRAND_ID,
                headers::MODEL,
                headers::SERIAL,
                headers::DEVICE_KEY,
            ],
            AssertionKind::Model => &[headers::BRAND_ID, headers::MODEL],
            AssertionKind::SystemUser => &[
                headers::BRAND_ID,
                headers::MODELS,
                headers::USERNAME,
                headers::EMAIL,
            ],
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssertionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "serial" => Ok(AssertionKind::Serial),
            "model" => Ok(AssertionKind::Model),
            "system-user" => Ok(AssertionKind::SystemUser),
            _ => Err(CoreError::UnknownKind(s.to_string())),
        }
    }
}

/// An unsigned assertion: kind plus ordered headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub kind: AssertionKind,
    pub headers: BTreeMap<String, Value>,
}

impl Assertion {
    /// Create a builder for the given kind
    pub fn builder(kind: AssertionKind) -> AssertionBuilder {
        AssertionBuilder::new(kind)
    }

    /// Get a header as a string, if it is one
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.as_str())
    }

    /// Serialize to canonical JSON bytes (headers are key-ordered)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(CoreError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(CoreError::from)
    }
}

/// Builder for assertions
///
/// ```ignore
/// let assertion = Assertion::builder(AssertionKind::Model)
///     .header("brand-id", "acme")
///     .header("model", "rpi3")
///     .build()?;
/// ```
#[derive(Debug)]
pub struct AssertionBuilder {
    kind: AssertionKind,
    headers: BTreeMap<String, Value>,
}

impl AssertionBuilder {
    pub fn new(kind: AssertionKind) -> Self {
        let mut map = BTreeMap::new();
        map.insert(headers::TYPE.to_string(), Value::from(kind.as_str()));
        Self { kind, headers: map }
    }

    /// Set a header; empty strings are treated as absent
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let name = name.into();
        if value.as_str().is_some_and(str::is_empty) {
            self.headers.remove(&name);
        } else {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set a header only when a value is present
    pub fn optional_header(self, name: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.header(name, value),
            None => self,
        }
    }

    /// Merge free-form extra headers without overriding the `type` header
    pub fn extra_headers(mut self, extra: BTreeMap<String, Value>) -> Self {
        for (name, value) in extra {
            if name != headers::TYPE {
                self.headers.insert(name, value);
            }
        }
        self
    }

    /// Build the assertion, checking the headers the kind requires
    pub fn build(self) -> Result<Assertion> {
        for required in self.kind.required_headers() {
            if !self.headers.contains_key(*required) {
                return Err(CoreError::MissingHeader((*required).to_string()));
            }
        }

        Ok(Assertion {
            kind: self.kind,
            headers: self.headers,
        })
    }
}
