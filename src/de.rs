//! serde integration for [`Secret`]
//!
//! Deserializing a `Secret` parses the incoming scalar against
//! [`Registry::current`](crate::Registry::current). It never fails on a bad
//! reference; the failure is kept on the value for [`Secret::parse_error`]
//! or a validation rule to report. Serializing writes the original source
//! back out, never a resolved value.

use crate::secret::Secret;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

struct SecretVisitor;

impl<'de> Visitor<'de> for SecretVisitor {
    type Value = Secret;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a secret reference string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Secret, E> {
        Ok(Secret::parse(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Secret, E> {
        Ok(Secret::parse(&v))
    }

    // Config formats hand unquoted scalars over as numbers or booleans
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Secret, E> {
        Ok(Secret::parse(&v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Secret, E> {
        Ok(Secret::parse(&v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Secret, E> {
        Ok(Secret::parse(&v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Secret, E> {
        Ok(Secret::parse(&v.to_string()))
    }

    // Empty YAML values and JSON null read as an empty source
    fn visit_unit<E: de::Error>(self) -> Result<Secret, E> {
        Ok(Secret::parse(""))
    }

    fn visit_none<E: de::Error>(self) -> Result<Secret, E> {
        Ok(Secret::parse(""))
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Secret, D::Error>
    where
        D: Deserializer<'de>,
    {
        Secret::deserialize(deserializer)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SecretVisitor)
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.source())
    }
}

impl FromStr for Secret {
    type Err = Infallible;

    /// Same as [`Secret::parse`]; errors are kept on the value
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Secret::parse(s))
    }
}
