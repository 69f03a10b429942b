//! Parsed content types and compatibility matching
//!
//! A [`MimeType`] is a `type/subtype` pair with optional `;key=value`
//! parameters. Besides concrete subtypes (`json`, `avro`) it understands
//! the wildcard forms `*`, `*/*` and the suffixed wildcard `*+avro`, which
//! matches `avro` itself as well as any `<x>+avro` subtype.
//!
//! ```rust,ignore
//! use rivven_bridge::mime::MimeType;
//!
//! let avro: MimeType = "application/avro".parse()?;
//! let pattern: MimeType = "application/*+avro".parse()?;
//! assert!(avro.is_compatible_with(&pattern));
//! assert!(pattern.is_compatible_with(&avro));
//! ```

use crate::error::{BridgeError, BridgeResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const WILDCARD: &str = "*";

/// `application/json`
pub const APPLICATION_JSON: &str = "application/json";

/// `application/*+avro`
pub const APPLICATION_AVRO_WILDCARD: &str = "application/*+avro";

/// A parsed content type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MimeType {
    type_: String,
    subtype: String,
    parameters: BTreeMap<String, String>,
}

impl MimeType {
    /// Build a MIME type from its parts
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> BridgeResult<Self> {
        let type_ = type_.into().trim().to_ascii_lowercase();
        let subtype = subtype.into().trim().to_ascii_lowercase();
        let rendered = format!("{}/{}", type_, subtype);

        check_token(&type_, "type", &rendered)?;
        check_token(&subtype, "subtype", &rendered)?;
        if type_ == WILDCARD && subtype != WILDCARD {
            return Err(BridgeError::malformed(
                rendered,
                "wildcard type is legal only in '*/*'",
            ));
        }

        Ok(Self {
            type_,
            subtype,
            parameters: BTreeMap::new(),
        })
    }

    /// Parse a content-type string.
    ///
    /// Quote characters are stripped first, since producers sometimes
    /// deliver the header as a JSON-quoted string.
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let unquoted = text.replace('"', "");
        let unquoted = unquoted.trim();
        if unquoted.is_empty() {
            return Err(BridgeError::malformed(text, "content type must not be empty"));
        }

        let mut segments = unquoted.split(';');
        let full_type = segments.next().unwrap_or_default().trim();
        let full_type = if full_type == WILDCARD { "*/*" } else { full_type };

        let Some((type_, subtype)) = full_type.split_once('/') else {
            return Err(BridgeError::malformed(text, "does not contain '/'"));
        };

        let mut mime = Self::new(type_, subtype).map_err(|e| match e {
            BridgeError::MalformedContentType { reason, .. } => BridgeError::malformed(text, reason),
            other => other,
        })?;

        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let Some((key, value)) = segment.split_once('=') else {
                return Err(BridgeError::malformed(
                    text,
                    format!("parameter '{}' has no value", segment),
                ));
            };
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(BridgeError::malformed(text, "empty parameter name"));
            }
            mime.parameters.insert(key, value.trim().to_string());
        }

        Ok(mime)
    }

    /// Add a parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// The primary type (`application`)
    pub fn type_(&self) -> &str {
        &self.type_
    }

    /// The subtype (`json`, `*+avro`, ...)
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Look up a parameter
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `*/*`
    pub fn is_wildcard_type(&self) -> bool {
        self.type_ == WILDCARD
    }

    /// `*` or `*+suffix`
    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD || self.subtype.starts_with("*+")
    }

    /// Whether this value names a pattern rather than a concrete type
    pub fn is_concrete(&self) -> bool {
        !self.is_wildcard_type() && !self.is_wildcard_subtype()
    }

    /// The structured-syntax suffix (`avro` for `vnd.order+avro`)
    pub fn subtype_suffix(&self) -> Option<&str> {
        self.subtype
            .rsplit_once('+')
            .map(|(_, suffix)| suffix)
            .filter(|suffix| !suffix.is_empty())
    }

    /// Symmetric compatibility check.
    ///
    /// Types must match unless either side is `*/*`. Subtypes match when
    /// equal, when either is `*`, or when one side is `*+suffix` and the
    /// other side's subtype is `suffix` or ends with `+suffix`. Parameters
    /// are ignored.
    pub fn is_compatible_with(&self, other: &MimeType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        if self.subtype == other.subtype {
            return true;
        }
        if self.subtype == WILDCARD || other.subtype == WILDCARD {
            return true;
        }

        let this_suffix = self.subtype_suffix();
        let other_suffix = other.subtype_suffix();

        if self.is_wildcard_subtype() {
            if let Some(suffix) = this_suffix {
                if other.subtype == suffix || other_suffix == Some(suffix) {
                    return true;
                }
            }
        }
        if other.is_wildcard_subtype() {
            if let Some(suffix) = other_suffix {
                if self.subtype == suffix || this_suffix == Some(suffix) {
                    return true;
                }
            }
        }
        false
    }

    /// `type/subtype` without parameters
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    /// `application/json`
    pub fn application_json() -> Self {
        Self {
            type_: "application".to_string(),
            subtype: "json".to_string(),
            parameters: BTreeMap::new(),
        }
    }

    /// `application/*+avro`
    pub fn application_avro_wildcard() -> Self {
        Self {
            type_: "application".to_string(),
            subtype: "*+avro".to_string(),
            parameters: BTreeMap::new(),
        }
    }
}

fn check_token(token: &str, part: &str, rendered: &str) -> BridgeResult<()> {
    if token.is_empty() {
        return Err(BridgeError::malformed(
            rendered,
            format!("{} must not be empty", part),
        ));
    }
    if let Some(c) = token
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | ';' | ',' | '"'))
    {
        return Err(BridgeError::malformed(
            rendered,
            format!("{} contains illegal character {:?}", part, c),
        ));
    }
    Ok(())
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (key, value) in &self.parameters {
            write!(f, ";{}={}", key, value)?;
        }
        Ok(())
    }
}

impl FromStr for MimeType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mime(s: &str) -> MimeType {
        MimeType::parse(s).unwrap()
    }

    #[test]
    fn test_parse_json() {
        let json = mime("application/json");
        assert_eq!(json, MimeType::application_json());
        assert_eq!(json.type_(), "application");
        assert_eq!(json.subtype(), "json");
    }

    #[test]
    fn test_parse_requires_separator() {
        let err = MimeType::parse("application").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedContentType { .. }));

        assert!(MimeType::parse("").is_err());
        assert!(MimeType::parse("application/").is_err());
        assert!(MimeType::parse("/json").is_err());
        assert!(MimeType::parse("*/json").is_err());
    }

    #[test]
    fn test_new_rejects_slash_in_type() {
        assert!(MimeType::new("application/json", "json").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "application/json",
            "application/avro",
            "application/*+avro",
            "application/vnd.order.v1+avro",
            "text/plain",
            "*/*",
        ] {
            assert_eq!(mime(text).to_string(), text);
        }
    }

    #[test]
    fn test_display_normalizes() {
        assert_eq!(mime(" Application/JSON ").to_string(), "application/json");
        assert_eq!(
            mime("application/json; Charset=utf-8").to_string(),
            "application/json;charset=utf-8"
        );
    }

    #[test]
    fn test_quotes_are_stripped() {
        assert_eq!(mime("\"application/json\""), MimeType::application_json());
    }

    #[test]
    fn test_parameters() {
        let m = mime("application/json;charset=UTF-8");
        assert_eq!(m.parameter("charset"), Some("UTF-8"));
        assert!(m.is_compatible_with(&MimeType::application_json()));
        assert!(MimeType::parse("application/json;charset").is_err());
    }

    #[test]
    fn test_avro_wildcard_is_symmetric() {
        let avro = mime("application/avro");
        let pattern = mime("application/*+avro");
        assert!(avro.is_compatible_with(&pattern));
        assert!(pattern.is_compatible_with(&avro));
    }

    #[test]
    fn test_suffixed_subtype_matches_pattern() {
        let vendor = mime("application/vnd.order.v1+avro");
        let pattern = MimeType::application_avro_wildcard();
        assert!(vendor.is_compatible_with(&pattern));
        assert!(pattern.is_compatible_with(&vendor));
    }

    #[test]
    fn test_json_is_not_avro() {
        let json = MimeType::application_json();
        let pattern = MimeType::application_avro_wildcard();
        assert!(json.is_compatible_with(&json));
        assert!(!json.is_compatible_with(&pattern));
        assert!(!pattern.is_compatible_with(&json));
    }

    #[test]
    fn test_type_mismatch() {
        assert!(!mime("text/avro").is_compatible_with(&MimeType::application_avro_wildcard()));
        assert!(!mime("text/json").is_compatible_with(&MimeType::application_json()));
    }

    #[test]
    fn test_full_wildcards() {
        let any = mime("*/*");
        assert!(any.is_compatible_with(&MimeType::application_json()));
        assert!(MimeType::application_json().is_compatible_with(&any));
        assert!(mime("application/*").is_compatible_with(&mime("application/avro")));
        assert!(mime("*").is_wildcard_type());
    }

    #[test]
    fn test_suffix() {
        assert_eq!(mime("application/vnd.x+avro").subtype_suffix(), Some("avro"));
        assert_eq!(mime("application/avro").subtype_suffix(), None);
        assert!(mime("application/*+avro").is_wildcard_subtype());
        assert!(!mime("application/avro").is_wildcard_subtype());
        assert!(mime("application/avro").is_concrete());
    }
}
