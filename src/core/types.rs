//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ContentRef`] - Content hash identifying an immutable object
//! - [`TagName`] - Validated semantic-version tag
//! - [`ComponentKey`] - Component identity (`scope/name`)
//! - [`LaneRef`] - Lane (branch pointer) identity
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use strata::core::types::{ContentRef, TagName, ComponentKey};
//!
//! // Valid constructions
//! let hash = ContentRef::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let tag = TagName::new("0.0.1").unwrap();
//! let key = ComponentKey::new("my-scope", "ui/button").unwrap();
//!
//! // Invalid constructions fail at creation time
//! assert!(ContentRef::new("not-a-hash").is_err());
//! assert!(TagName::new("1.2").is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The default lane every component history starts on.
pub const DEFAULT_LANE: &str = "main";

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid content ref: {0}")]
    InvalidContentRef(String),

    #[error("invalid tag name: {0}")]
    InvalidTagName(String),

    #[error("invalid component key: {0}")]
    InvalidComponentKey(String),

    #[error("invalid lane ref: {0}")]
    InvalidLaneRef(String),
}

/// A content hash identifying an immutable object in the store.
///
/// Refs are opaque to this crate; they are produced by the external
/// hashing/serialization layer. They are normalized to lowercase hex
/// and compared by value.
///
/// # Example
///
/// ```
/// use strata::core::types::ContentRef;
///
/// let r = ContentRef::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(r.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(r.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentRef(String);

impl ContentRef {
    /// Create a new validated content ref.
    ///
    /// The ref is normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidContentRef` if the string is not a
    /// 40- or 64-character hex hash.
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        let hash = hash.into().to_ascii_lowercase();
        Self::validate(&hash)?;
        Ok(Self(hash))
    }

    /// Derive a ref from raw bytes (SHA-256).
    ///
    /// Used for deterministic addresses (the ancestry-index record) and
    /// for building fixtures in tests. The production snapshot hashing
    /// algorithm lives outside this crate.
    pub fn from_content(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Whether a string looks like a content ref (as opposed to a tag).
    pub fn is_hash(s: &str) -> bool {
        Self::validate(s).is_ok()
    }

    /// Get an abbreviated form of the ref.
    ///
    /// Returns the first `len` characters. If `len` exceeds the ref
    /// length, returns the full ref.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(hash: &str) -> Result<(), TypeError> {
        if hash.len() != 40 && hash.len() != 64 {
            return Err(TypeError::InvalidContentRef(format!(
                "expected 40 or 64 hex characters, got {}",
                hash.len()
            )));
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(TypeError::InvalidContentRef(
                "content ref must be lowercase hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the ref as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentRef {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentRef> for String {
    fn from(r: ContentRef) -> Self {
        r.0
    }
}

impl AsRef<str> for ContentRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated semantic-version tag (`MAJOR.MINOR.PATCH` with an
/// optional `-prerelease` suffix).
///
/// Ordering follows semver precedence: numeric by component, and a
/// pre-release sorts before the release it precedes.
///
/// # Example
///
/// ```
/// use strata::core::types::TagName;
///
/// let a = TagName::new("0.0.1").unwrap();
/// let b = TagName::new("0.1.0").unwrap();
/// assert!(a < b);
///
/// let pre = TagName::new("1.0.0-beta.1").unwrap();
/// let rel = TagName::new("1.0.0").unwrap();
/// assert!(pre < rel);
///
/// assert!(TagName::is_tag("2.3.4"));
/// assert!(!TagName::is_tag("abc123def4567890abc123def4567890abc12345"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// Create a new validated tag name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTagName` if the string is not a
    /// `MAJOR.MINOR.PATCH[-prerelease]` version.
    pub fn new(tag: impl Into<String>) -> Result<Self, TypeError> {
        let tag = tag.into();
        Self::parse_parts(&tag)?;
        Ok(Self(tag))
    }

    /// Whether a string is a valid tag (as opposed to a hash).
    pub fn is_tag(s: &str) -> bool {
        Self::parse_parts(s).is_ok()
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse_parts(tag: &str) -> Result<([u64; 3], Option<&str>), TypeError> {
        let (core, pre) = match tag.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (tag, None),
        };
        let mut nums = [0u64; 3];
        let mut parts = core.split('.');
        for slot in nums.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| TypeError::InvalidTagName(format!("'{tag}': expected MAJOR.MINOR.PATCH")))?;
            *slot = part
                .parse::<u64>()
                .map_err(|_| TypeError::InvalidTagName(format!("'{tag}': non-numeric component '{part}'")))?;
        }
        if parts.next().is_some() {
            return Err(TypeError::InvalidTagName(format!(
                "'{tag}': too many version components"
            )));
        }
        if let Some(pre) = pre {
            if pre.is_empty() {
                return Err(TypeError::InvalidTagName(format!(
                    "'{tag}': empty pre-release suffix"
                )));
            }
            let valid = pre
                .split('.')
                .all(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
            if !valid {
                return Err(TypeError::InvalidTagName(format!(
                    "'{tag}': invalid pre-release suffix '{pre}'"
                )));
            }
        }
        Ok((nums, pre))
    }
}

impl Ord for TagName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        // Both sides were validated at construction.
        let (a_nums, a_pre) = Self::parse_parts(&self.0).unwrap_or(([0; 3], None));
        let (b_nums, b_pre) = Self::parse_parts(&other.0).unwrap_or(([0; 3], None));

        match a_nums.cmp(&b_nums) {
            Ordering::Equal => {}
            other => return other,
        }
        match (a_pre, b_pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                // Identifier-wise: numeric identifiers compare numerically
                // and rank below alphanumeric ones.
                let mut a_ids = a.split('.');
                let mut b_ids = b.split('.');
                loop {
                    match (a_ids.next(), b_ids.next()) {
                        (None, None) => return Ordering::Equal,
                        (None, Some(_)) => return Ordering::Less,
                        (Some(_), None) => return Ordering::Greater,
                        (Some(x), Some(y)) => {
                            let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                                (Ok(xn), Ok(yn)) => xn.cmp(&yn),
                                (Ok(_), Err(_)) => Ordering::Less,
                                (Err(_), Ok(_)) => Ordering::Greater,
                                (Err(_), Err(_)) => x.cmp(y),
                            };
                            if ord != Ordering::Equal {
                                return ord;
                            }
                        }
                    }
                }
            }
        }
    }
}

impl PartialOrd for TagName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for TagName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TagName> for String {
    fn from(tag: TagName) -> Self {
        tag.0
    }
}

impl AsRef<str> for TagName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A component identity within a storage scope.
///
/// Displayed as `scope/name`. The name itself may contain slashes
/// (namespaced components), the scope may not.
///
/// # Example
///
/// ```
/// use strata::core::types::ComponentKey;
///
/// let key = ComponentKey::new("acme", "ui/button").unwrap();
/// assert_eq!(key.to_string(), "acme/ui/button");
/// assert_eq!(key.scope(), "acme");
/// assert_eq!(key.name(), "ui/button");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentKey {
    scope: String,
    name: String,
}

impl ComponentKey {
    /// Create a new validated component key.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidComponentKey` if either part is empty,
    /// contains whitespace, or the scope contains `/`.
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        let scope = scope.into();
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidComponentKey("name cannot be empty".into()));
        }
        if scope.is_empty() {
            return Err(TypeError::InvalidComponentKey(format!(
                "component '{name}' is missing a scope"
            )));
        }
        if scope.contains('/') {
            return Err(TypeError::InvalidComponentKey(format!(
                "scope '{scope}' cannot contain '/'"
            )));
        }
        for part in [&scope, &name] {
            if part.chars().any(|c| c.is_whitespace()) {
                return Err(TypeError::InvalidComponentKey(format!(
                    "'{part}' cannot contain whitespace"
                )));
            }
        }
        Ok(Self { scope, name })
    }

    /// The storage scope this component belongs to.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The component name (may be namespaced with `/`).
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TryFrom<String> for ComponentKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        // The scope may not contain '/', so the first separator splits
        // scope from (possibly namespaced) name.
        let (scope, name) = s
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidComponentKey(format!("'{s}' is missing a scope")))?;
        Self::new(scope, name)
    }
}

impl From<ComponentKey> for String {
    fn from(key: ComponentKey) -> Self {
        key.to_string()
    }
}

impl std::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// Identity of a lane (a named branch pointer), scoped to a storage scope.
///
/// # Example
///
/// ```
/// use strata::core::types::LaneRef;
///
/// let lane = LaneRef::new("acme", "lane-a").unwrap();
/// assert!(!lane.is_default());
///
/// let main = LaneRef::default_lane("acme").unwrap();
/// assert!(main.is_default());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneRef {
    scope: String,
    name: String,
}

impl LaneRef {
    /// Create a new validated lane ref.
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        let scope = scope.into();
        let name = name.into();
        if scope.is_empty() || name.is_empty() {
            return Err(TypeError::InvalidLaneRef(
                "lane scope and name cannot be empty".into(),
            ));
        }
        if name.contains(char::is_whitespace) || scope.contains(char::is_whitespace) {
            return Err(TypeError::InvalidLaneRef(format!(
                "'{scope}/{name}' cannot contain whitespace"
            )));
        }
        Ok(Self { scope, name })
    }

    /// The default lane for a scope.
    pub fn default_lane(scope: impl Into<String>) -> Result<Self, TypeError> {
        Self::new(scope, DEFAULT_LANE)
    }

    /// Whether this is the default lane.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_LANE
    }

    /// The storage scope the lane lives in.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The lane name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for LaneRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// A UTC timestamp in RFC3339 format.
///
/// # Example
///
/// ```
/// use strata::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// println!("Current time: {}", now);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from epoch milliseconds.
    ///
    /// Out-of-range values clamp to the epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    /// Epoch milliseconds, for log ordering.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod content_ref {
        use super::*;

        #[test]
        fn valid_40_char() {
            assert!(ContentRef::new("abc123def4567890abc123def4567890abc12345").is_ok());
        }

        #[test]
        fn valid_64_char() {
            let h = "abc123def4567890abc123def4567890abc123def4567890abc123def456789a";
            assert_eq!(h.len(), 64);
            assert!(ContentRef::new(h).is_ok());
        }

        #[test]
        fn normalizes_to_lowercase() {
            let r = ContentRef::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
            assert_eq!(r.as_str(), "abc123def4567890abc123def4567890abc12345");
        }

        #[test]
        fn invalid_length() {
            assert!(ContentRef::new("").is_err());
            assert!(ContentRef::new("abc123").is_err());
        }

        #[test]
        fn non_hex_rejected() {
            assert!(ContentRef::new("xyz123def4567890abc123def4567890abc12345").is_err());
        }

        #[test]
        fn short_form() {
            let r = ContentRef::new("abc123def4567890abc123def4567890abc12345").unwrap();
            assert_eq!(r.short(7), "abc123d");
            assert_eq!(r.short(100), r.as_str());
        }

        #[test]
        fn from_content_is_deterministic() {
            let a = ContentRef::from_content(b"hello");
            let b = ContentRef::from_content(b"hello");
            let c = ContentRef::from_content(b"world");
            assert_eq!(a, b);
            assert_ne!(a, c);
            assert_eq!(a.as_str().len(), 64);
        }

        #[test]
        fn is_hash_classifier() {
            assert!(ContentRef::is_hash("abc123def4567890abc123def4567890abc12345"));
            assert!(!ContentRef::is_hash("0.0.1"));
            assert!(!ContentRef::is_hash("main"));
        }

        #[test]
        fn serde_roundtrip() {
            let r = ContentRef::new("abc123def4567890abc123def4567890abc12345").unwrap();
            let json = serde_json::to_string(&r).unwrap();
            let parsed: ContentRef = serde_json::from_str(&json).unwrap();
            assert_eq!(r, parsed);
        }
    }

    mod tag_name {
        use super::*;

        #[test]
        fn valid_tags() {
            assert!(TagName::new("0.0.1").is_ok());
            assert!(TagName::new("1.2.3").is_ok());
            assert!(TagName::new("10.20.30").is_ok());
            assert!(TagName::new("1.0.0-beta.1").is_ok());
        }

        #[test]
        fn invalid_tags() {
            assert!(TagName::new("").is_err());
            assert!(TagName::new("1.2").is_err());
            assert!(TagName::new("1.2.3.4").is_err());
            assert!(TagName::new("a.b.c").is_err());
            assert!(TagName::new("1.0.0-").is_err());
        }

        #[test]
        fn ordering_numeric_not_lexical() {
            let small = TagName::new("0.9.0").unwrap();
            let big = TagName::new("0.10.0").unwrap();
            assert!(small < big);
        }

        #[test]
        fn prerelease_sorts_before_release() {
            let pre = TagName::new("1.0.0-rc.1").unwrap();
            let rel = TagName::new("1.0.0").unwrap();
            assert!(pre < rel);
        }

        #[test]
        fn prerelease_identifiers_compared_numerically() {
            let one = TagName::new("1.0.0-beta.2").unwrap();
            let two = TagName::new("1.0.0-beta.11").unwrap();
            assert!(one < two);
        }

        #[test]
        fn tag_and_hash_are_disjoint() {
            assert!(TagName::is_tag("0.0.1"));
            assert!(!TagName::is_tag("abc123def4567890abc123def4567890abc12345"));
        }
    }

    mod component_key {
        use super::*;

        #[test]
        fn valid_keys() {
            assert!(ComponentKey::new("acme", "button").is_ok());
            assert!(ComponentKey::new("acme", "ui/button").is_ok());
        }

        #[test]
        fn empty_parts_rejected() {
            assert!(ComponentKey::new("", "button").is_err());
            assert!(ComponentKey::new("acme", "").is_err());
        }

        #[test]
        fn scope_with_slash_rejected() {
            assert!(ComponentKey::new("acme/team", "button").is_err());
        }

        #[test]
        fn display_joins_with_slash() {
            let key = ComponentKey::new("acme", "ui/button").unwrap();
            assert_eq!(key.to_string(), "acme/ui/button");
        }

        #[test]
        fn serializes_as_a_string() {
            let key = ComponentKey::new("acme", "ui/button").unwrap();
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, "\"acme/ui/button\"");
            let parsed: ComponentKey = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, key);
        }

        #[test]
        fn string_without_scope_rejected() {
            assert!(serde_json::from_str::<ComponentKey>("\"button\"").is_err());
        }
    }

    mod lane_ref {
        use super::*;

        #[test]
        fn default_lane() {
            let lane = LaneRef::default_lane("acme").unwrap();
            assert!(lane.is_default());
            assert_eq!(lane.name(), DEFAULT_LANE);
        }

        #[test]
        fn named_lane_is_not_default() {
            let lane = LaneRef::new("acme", "lane-a").unwrap();
            assert!(!lane.is_default());
        }

        #[test]
        fn empty_rejected() {
            assert!(LaneRef::new("", "lane-a").is_err());
            assert!(LaneRef::new("acme", "").is_err());
        }
    }

    mod utc_timestamp {
        use super::*;

        #[test]
        fn millis_roundtrip() {
            let ts = UtcTimestamp::from_millis(1_700_000_000_000);
            assert_eq!(ts.as_millis(), 1_700_000_000_000);
        }

        #[test]
        fn serde_roundtrip() {
            let ts = UtcTimestamp::now();
            let json = serde_json::to_string(&ts).unwrap();
            let parsed: UtcTimestamp = serde_json::from_str(&json).unwrap();
            assert_eq!(ts, parsed);
        }
    }
}
