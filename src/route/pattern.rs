//! Path templates.
//!
//! | Template            | Example match              | Captured variables            |
//! |---------------------|----------------------------|-------------------------------|
//! | `/users`            | `/users`                   | *(none)*                      |
//! | `/users/:id`        | `/users/42`                | `id → "42"`                   |
//! | `/users/{id}`       | `/users/42`                | `id → "42"`                   |
//! | `/users/*/posts`    | `/users/anything/posts`    | *(none)*                      |
//! | `/files/*`          | `/files/docs/readme.txt`   | `wildcard → "docs/readme.txt"` |
//!
//! Trailing slashes are normalized on both templates and request paths.

use std::cmp::Reverse;
use std::fmt;

use crate::context::PathVariables;

/// Name under which a trailing `/*` stores the rest of the path.
pub const WILDCARD: &str = "wildcard";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Capture(String),
    // `*` as a whole segment: matches one segment, captures nothing.
    Any,
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    catch_all: bool,
}

/// Sort key for overlapping templates; smaller is more specific.
pub(crate) type Specificity = (u8, Reverse<usize>, usize);

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

impl PathPattern {
    pub fn parse(template: &str) -> Self {
        let normalized = normalize(template);
        let (body, catch_all) = match normalized.strip_suffix("/*") {
            Some(prefix) => (prefix, true),
            None if normalized == "*" => ("", true),
            None => (normalized, false),
        };

        let segments = body
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    Segment::Any
                } else if let Some(name) = s.strip_prefix(':') {
                    Segment::Capture(name.to_owned())
                } else if let Some(name) = s.strip_prefix('{').and_then(|n| n.strip_suffix('}')) {
                    Segment::Capture(name.to_owned())
                } else {
                    Segment::Static(s.to_owned())
                }
            })
            .collect();

        Self {
            raw: normalized.to_owned(),
            segments,
            catch_all,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` when the template has no captures or wildcards.
    pub fn is_exact(&self) -> bool {
        !self.catch_all && self.segments.iter().all(|s| matches!(s, Segment::Static(_)))
    }

    /// Matches `path`, returning the captured variables (percent-decoded).
    pub fn matches(&self, path: &str) -> Option<PathVariables> {
        let path_segments: Vec<&str> = normalize(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let fits = if self.catch_all {
            path_segments.len() >= self.segments.len()
        } else {
            path_segments.len() == self.segments.len()
        };
        if !fits {
            return None;
        }

        let mut variables = PathVariables::new();
        for (segment, actual) in self.segments.iter().zip(&path_segments) {
            match segment {
                Segment::Static(expected) if expected != actual => return None,
                Segment::Static(_) | Segment::Any => {}
                Segment::Capture(name) => {
                    variables.insert(name.as_str(), decode(actual));
                }
            }
        }
        if self.catch_all {
            let rest = path_segments[self.segments.len()..].join("/");
            variables.insert(WILDCARD, decode(&rest));
        }
        Some(variables)
    }

    /// Exact templates first, then parameterized, then catch-alls; within a
    /// kind, more literal segments, then fewer captures.
    pub(crate) fn specificity(&self) -> Specificity {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Static(_)))
            .count();
        let captures = self.segments.len() - literals;
        let kind = if self.catch_all {
            2
        } else if captures > 0 {
            1
        } else {
            0
        };
        (kind, Reverse(literals), captures)
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_owned())
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
