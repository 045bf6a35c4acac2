//! Canonical, type-tagged cache keys.
//!
//! A caller's raw JSON key is wrapped together with its artifact type as
//! `{"Type": <type>, "Key": <key>}` and serialised with the JSON
//! Canonicalization Scheme (RFC 8785): sorted keys, compact separators and
//! ECMAScript number formatting. Two logically identical keys therefore
//! produce byte-identical canonical keys, and embedding the type keeps
//! different artifact kinds with the same key shape apart.
//!
//! RFC 8785 models every number as an IEEE 754 double. Integers beyond
//! 2^53 are rounded to their nearest double before serialisation, so
//! `9007199254740993` and `9007199254740992` name the same key.

use color_eyre::eyre::{Context, eyre};
use serde::Serialize;
use serde_json::{Number, Value, json};

use super::digest::Sha256Digest;
use crate::error::{CacheError, CacheResult};

/// The canonical text of a type-tagged cache key.
///
/// The only constructors run the full canonicalisation pipeline, so any
/// `CanonicalKey` is safe to hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Canonicalises a raw JSON key for the given artifact type.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidKey`](crate::CacheErrorKind::InvalidKey) error if
    /// `json_key` is not valid JSON or cannot be canonicalised.
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_cache::CanonicalKey;
    ///
    /// let a = CanonicalKey::from_json("download", r#"{ "uri": "x", "b": 1 }"#)?;
    /// let b = CanonicalKey::from_json("download", r#"{"b":1,"uri":"x"}"#)?;
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str(), r#"{"Key":{"b":1,"uri":"x"},"Type":"download"}"#);
    /// # Ok::<(), artifact_cache::CacheError>(())
    /// ```
    pub fn from_json(artifact_type: &str, json_key: &str) -> CacheResult<Self> {
        let key: Value = serde_json::from_str(json_key)
            .with_context(|| format!("artifact key is not valid JSON: {json_key}"))
            .map_err(CacheError::invalid_key)?;
        Self::from_parsed(artifact_type, key)
    }

    /// Canonicalises a serialisable key for the given artifact type.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidKey`](crate::CacheErrorKind::InvalidKey) error if
    /// the key cannot be represented as JSON.
    pub fn from_value(artifact_type: &str, key: &impl Serialize) -> CacheResult<Self> {
        let value = serde_json::to_value(key)
            .context("artifact key cannot be serialised as JSON")
            .map_err(CacheError::invalid_key)?;
        Self::from_parsed(artifact_type, value)
    }

    fn from_parsed(artifact_type: &str, key: Value) -> CacheResult<Self> {
        let tagged = json!({ "Type": artifact_type, "Key": coerce_numbers(key) });
        let canonical = serde_jcs::to_string(&tagged)
            .map_err(|err| CacheError::invalid_key(eyre!("failed to canonicalise key: {err}")))?;
        Ok(Self(canonical))
    }

    /// Returns the canonical key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the canonical key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Computes the digest that addresses this key's entry directory.
    #[must_use]
    pub fn digest(&self) -> Sha256Digest {
        Sha256Digest::of_bytes(self.as_bytes())
    }
}

/// Largest magnitude at which every integer has an exact `f64`.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Rewrites integers that a double cannot hold exactly as their nearest
/// double, recursing through arrays and objects.
fn coerce_numbers(value: Value) -> Value {
    match value {
        Value::Number(number) => Value::Number(round_to_double(number)),
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, member)| (name, coerce_numbers(member)))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::String(_) => value,
    }
}

fn round_to_double(number: Number) -> Number {
    let exact = match (number.as_u64(), number.as_i64()) {
        (Some(unsigned), _) => unsigned <= MAX_EXACT_INTEGER,
        (None, Some(signed)) => signed.unsigned_abs() <= MAX_EXACT_INTEGER,
        (None, None) => true,
    };
    if exact {
        return number;
    }
    number
        .as_f64()
        .and_then(Number::from_f64)
        .unwrap_or(number)
}

impl AsRef<[u8]> for CanonicalKey {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case::whitespace(
        r#"{"uri":"https://example/a.txt"}"#,
        "{ \"uri\" :\n \"https://example/a.txt\" }"
    )]
    #[case::key_order(r#"{"a":1,"b":[true,null]}"#, r#"{"b":[true,null],"a":1}"#)]
    #[case::nested_order(r#"{"o":{"y":2,"x":1}}"#, r#"{"o":{"x":1,"y":2}}"#)]
    #[case::number_format(r#"{"n":1.0}"#, r#"{"n":1}"#)]
    #[case::exponent(r#"{"n":1e2}"#, r#"{"n":100}"#)]
    #[case::beyond_2_pow_53(r#"{"n":9007199254740993}"#, r#"{"n":9007199254740992}"#)]
    #[case::negative_beyond_2_pow_53(r#"[-9007199254740993]"#, r#"[-9007199254740992]"#)]
    fn equivalent_encodings_canonicalise_identically(#[case] left: &str, #[case] right: &str) {
        let a = CanonicalKey::from_json("download", left).expect("left");
        let b = CanonicalKey::from_json("download", right).expect("right");
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn canonical_form_sorts_type_and_key() {
        let key = CanonicalKey::from_json("image", r#"{"name":"core"}"#).expect("canonical");
        assert_eq!(key.as_str(), r#"{"Key":{"name":"core"},"Type":"image"}"#);
    }

    #[rstest]
    #[case::u64_max("18446744073709551615", r#"{"Key":18446744073709552000,"Type":"t"}"#)]
    #[case::nested(
        r#"{"ids":[9007199254740993,1]}"#,
        r#"{"Key":{"ids":[9007199254740992,1]},"Type":"t"}"#
    )]
    #[case::exact_limit("9007199254740992", r#"{"Key":9007199254740992,"Type":"t"}"#)]
    #[case::small("-42", r#"{"Key":-42,"Type":"t"}"#)]
    fn integers_use_double_formatting(#[case] raw: &str, #[case] expected: &str) {
        let key = CanonicalKey::from_json("t", raw).expect("canonical");
        assert_eq!(key.as_str(), expected);
    }

    #[test]
    fn type_is_part_of_the_digest() {
        let a = CanonicalKey::from_json("A", r#"{"name":"x"}"#).expect("a");
        let b = CanonicalKey::from_json("B", r#"{"name":"x"}"#).expect("b");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn semantic_differences_change_the_key() {
        let a = CanonicalKey::from_json("t", r#"{"name":"x"}"#).expect("a");
        let b = CanonicalKey::from_json("t", r#"{"name":"y"}"#).expect("b");
        assert_ne!(a, b);
    }

    #[test]
    fn quotes_in_type_are_escaped() {
        let key = CanonicalKey::from_json(r#"we"ird"#, "1").expect("canonical");
        assert_eq!(key.as_str(), r#"{"Key":1,"Type":"we\"ird"}"#);
    }

    #[rstest]
    #[case::empty("")]
    #[case::truncated("{")]
    #[case::trailing_garbage(r#"{"a":1} x"#)]
    fn malformed_json_is_an_invalid_key(#[case] raw: &str) {
        let err = CanonicalKey::from_json("t", raw).expect_err("malformed key must fail");
        assert_eq!(err.kind(), CacheErrorKind::InvalidKey);
    }

    #[test]
    fn from_value_matches_from_json() {
        #[derive(Serialize)]
        struct Key<'a> {
            uri: &'a str,
        }

        let typed = CanonicalKey::from_value("download", &Key { uri: "u" }).expect("typed");
        let raw = CanonicalKey::from_json("download", r#"{"uri":"u"}"#).expect("raw");
        assert_eq!(typed, raw);
    }
}
