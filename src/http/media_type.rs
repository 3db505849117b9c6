//! Media types (`type/subtype; param=value`) and `Accept` header ordering.
//!
//! Used by route matching (`consumes`/`produces`), body deserialization and
//! return-value content negotiation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a media type string is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid media type: {0:?}")]
pub struct InvalidMediaType(pub String);

/// A parsed media type such as `application/json; charset=utf-8`.
///
/// Type and subtype are stored lowercase; parameter names are lowercase and
/// parameter values keep their original case.
///
/// # Examples
///
/// ```
/// use restline::http::MediaType;
///
/// let json: MediaType = "application/json; charset=UTF-8".parse().unwrap();
/// assert!(MediaType::all().includes(&json));
/// assert!(json.is_compatible_with(&"application/*".parse().unwrap()));
/// assert_eq!(json.param("charset"), Some("UTF-8"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
}

const WILDCARD: &str = "*";

impl MediaType {
    /// Creates a media type without parameters.
    pub fn new(kind: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            kind: kind.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    /// `*/*`
    pub fn all() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// `application/json`
    pub fn application_json() -> Self {
        Self::new("application", "json")
    }

    /// `application/x-protobuf`
    pub fn application_protobuf() -> Self {
        Self::new("application", "x-protobuf")
    }

    /// `application/xml`
    pub fn application_xml() -> Self {
        Self::new("application", "xml")
    }

    /// `application/octet-stream`
    pub fn application_octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// `application/x-www-form-urlencoded`
    pub fn application_form_urlencoded() -> Self {
        Self::new("application", "x-www-form-urlencoded")
    }

    /// `multipart/form-data`
    pub fn multipart_form_data() -> Self {
        Self::new("multipart", "form-data")
    }

    /// `text/plain`
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Maps a short format name (as used by the `format` query override) to a
    /// media type.
    pub fn for_format(format: &str) -> Option<Self> {
        match format.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::application_json()),
            "pb" | "protobuf" | "proto" => Some(Self::application_protobuf()),
            "xml" => Some(Self::application_xml()),
            "text" | "txt" => Some(Self::text_plain()),
            _ => None,
        }
    }

    /// Adds a parameter, returning the updated media type.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// The primary type, e.g. `application`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The subtype, e.g. `json`.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    /// Returns a parameter value by (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `q` parameter, defaulting to `1.0`; malformed values count as `0.0`.
    pub fn quality(&self) -> f32 {
        match self.param("q") {
            Some(q) => q.trim().parse::<f32>().unwrap_or(0.0).clamp(0.0, 1.0),
            None => 1.0,
        }
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.kind == WILDCARD
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD
    }

    /// Returns `true` if `self`, read as a range, contains `other`.
    ///
    /// `*/*` includes everything, `text/*` includes `text/plain`, but
    /// `text/plain` does not include `text/*`.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        self.is_wildcard_subtype() || self.subtype == other.subtype
    }

    /// Symmetric form of [`includes`](Self::includes): either side may be a range.
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        self.includes(other) || other.includes(self)
    }

    /// Parses every element of one or more `Accept` header values and orders
    /// them by preference: higher quality first, then concrete before wildcard.
    /// Elements that fail to parse are skipped; `q=0` entries are dropped.
    pub fn parse_accept<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<MediaType> {
        let mut accepted: Vec<MediaType> = values
            .into_iter()
            .filter_map(|v| v.parse().ok())
            .filter(|m: &MediaType| m.quality() > 0.0)
            .collect();
        accepted.sort_by(|a, b| {
            b.quality()
                .partial_cmp(&a.quality())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.specificity().cmp(&b.specificity()).reverse())
        });
        accepted
    }

    fn specificity(&self) -> u8 {
        match (self.is_wildcard_type(), self.is_wildcard_subtype()) {
            (true, _) => 0,
            (false, true) => 1,
            (false, false) => 2,
        }
    }
}

impl FromStr for MediaType {
    type Err = InvalidMediaType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or("").trim();
        let essence = if essence == WILDCARD { "*/*" } else { essence };

        let (kind, subtype) = essence
            .split_once('/')
            .ok_or_else(|| InvalidMediaType(s.to_owned()))?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() || (kind == WILDCARD && subtype != WILDCARD) {
            return Err(InvalidMediaType(s.to_owned()));
        }

        let mut media = MediaType::new(kind, subtype);
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| InvalidMediaType(s.to_owned()))?;
            media = media.with_param(name.trim(), value.trim().trim_matches('"'));
        }
        Ok(media)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (name, value) in &self.params {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mt(s: &str) -> MediaType {
        s.parse().unwrap()
    }

    #[test]
    fn parse_with_params() {
        let m = mt("Application/JSON; charset=utf-8");
        assert_eq!(m.kind(), "application");
        assert_eq!(m.subtype(), "json");
        assert_eq!(m.param("CHARSET"), Some("utf-8"));
        assert_eq!(m.essence(), "application/json");
    }

    #[test]
    fn bare_wildcard_is_all() {
        assert_eq!(mt("*"), MediaType::all());
    }

    #[test]
    fn rejects_garbage() {
        assert!("json".parse::<MediaType>().is_err());
        assert!("*/json".parse::<MediaType>().is_err());
        assert!("text/plain; charset".parse::<MediaType>().is_err());
    }

    #[test]
    fn includes_is_directional() {
        assert!(mt("text/*").includes(&mt("text/plain")));
        assert!(!mt("text/plain").includes(&mt("text/*")));
        assert!(mt("text/plain").is_compatible_with(&mt("text/*")));
        assert!(!mt("text/plain").is_compatible_with(&mt("application/json")));
    }

    #[test]
    fn accept_ordering() {
        let accepted = MediaType::parse_accept([
            "*/*;q=0.1",
            "text/*",
            "application/json",
            "application/xml;q=0.5",
            "image/png;q=0",
        ]);
        let essences: Vec<_> = accepted.iter().map(MediaType::essence).collect();
        assert_eq!(
            essences,
            vec!["application/json", "text/*", "application/xml", "*/*"]
        );
    }

    #[test]
    fn format_aliases() {
        assert_eq!(MediaType::for_format("JSON"), Some(MediaType::application_json()));
        assert_eq!(MediaType::for_format("pb"), Some(MediaType::application_protobuf()));
        assert_eq!(MediaType::for_format("yaml"), None);
    }

    #[test]
    fn display_round_trips_params() {
        let m = MediaType::text_plain().with_param("charset", "utf-8");
        assert_eq!(m.to_string(), "text/plain;charset=utf-8");
    }
}
