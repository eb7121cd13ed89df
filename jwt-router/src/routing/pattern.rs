//! Path patterns for the white-list and ignore-list.
//!
//! A pattern is a `/`-separated list of segments. Each segment is either a
//! literal or a placeholder written `<name>` or `<converter:name>`:
//!
//! - `string` (default): any single non-empty segment
//! - `int`: ASCII decimal digits
//! - `float`: decimal number with a fractional part, e.g. `1.5`
//! - `path`: one or more remaining segments, last position only
//!
//! Matching a request path yields a [`PatternMatch`]. A path whose literal
//! segments line up with the pattern but whose typed segment fails to coerce
//! is reported as [`PatternMatch::TypeMismatch`] so the caller can tell a
//! malformed resource path apart from an unrelated one.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path pattern '{pattern}': {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

impl PatternError {
    fn new(pattern: &str, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    String,
    Int,
    Float,
    Path,
}

impl Converter {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    fn accepts(self, segment: &str) -> bool {
        match self {
            Self::String | Self::Path => !segment.is_empty(),
            Self::Int => !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()),
            Self::Float => match segment.split_once('.') {
                Some((whole, fraction)) => {
                    !whole.is_empty()
                        && !fraction.is_empty()
                        && whole.bytes().all(|b| b.is_ascii_digit())
                        && fraction.bytes().all(|b| b.is_ascii_digit())
                }
                None => false,
            },
        }
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Path => "path",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, converter: Converter },
}

/// Outcome of matching a request path against a pattern, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatternMatch {
    /// Literal-only pattern equal to the path
    Exact,
    /// Pattern with placeholders, every placeholder accepted its segment
    Dynamic,
    /// Literal skeleton matched but a typed placeholder rejected its segment
    TypeMismatch,
    NoMatch,
}

impl PatternMatch {
    /// True for [`PatternMatch::Exact`] and [`PatternMatch::Dynamic`]
    pub fn is_match(self) -> bool {
        matches!(self, Self::Exact | Self::Dynamic)
    }
}

/// A compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::new(pattern, "must start with '/'"));
        }

        let parts = split_segments(pattern);
        let last = parts.len().saturating_sub(1);
        let mut segments = Vec::with_capacity(parts.len());

        for (index, part) in parts.iter().enumerate() {
            let segment = parse_segment(pattern, part)?;
            if let Segment::Placeholder {
                converter: Converter::Path,
                ..
            } = segment
            {
                if index != last {
                    return Err(PatternError::new(
                        pattern,
                        "a 'path' placeholder must be the last segment",
                    ));
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as it was written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern has no placeholders
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Names of the placeholders in declaration order
    pub fn placeholders(&self) -> impl Iterator<Item = (&str, Converter)> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder { name, converter } => Some((name.as_str(), *converter)),
            Segment::Literal(_) => None,
        })
    }

    pub fn matches(&self, path: &str) -> PatternMatch {
        let parts = split_segments(path);
        let mut mismatch = false;

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => match parts.get(index) {
                    Some(part) if part == literal => {}
                    _ => return PatternMatch::NoMatch,
                },
                Segment::Placeholder {
                    converter: Converter::Path,
                    ..
                } => {
                    let rest = parts.get(index..).unwrap_or_default();
                    if rest.iter().all(|part| part.is_empty()) {
                        return PatternMatch::NoMatch;
                    }
                    return if mismatch {
                        PatternMatch::TypeMismatch
                    } else {
                        PatternMatch::Dynamic
                    };
                }
                Segment::Placeholder { converter, .. } => match parts.get(index) {
                    Some(part) if !part.is_empty() => {
                        if !converter.accepts(part) {
                            mismatch = true;
                        }
                    }
                    _ => return PatternMatch::NoMatch,
                },
            }
        }

        if parts.len() != self.segments.len() {
            PatternMatch::NoMatch
        } else if mismatch {
            PatternMatch::TypeMismatch
        } else if self.is_static() {
            PatternMatch::Exact
        } else {
            PatternMatch::Dynamic
        }
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits a path into segments. The root `/` has no segments, a trailing
/// slash yields a final empty segment.
fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn parse_segment(pattern: &str, part: &str) -> Result<Segment, PatternError> {
    let Some(inner) = part.strip_prefix('<') else {
        if part.contains('<') || part.contains('>') {
            return Err(PatternError::new(
                pattern,
                format!("unbalanced placeholder in segment '{part}'"),
            ));
        }
        return Ok(Segment::Literal(part.to_string()));
    };

    let inner = inner.strip_suffix('>').ok_or_else(|| {
        PatternError::new(pattern, format!("unterminated placeholder '{part}'"))
    })?;

    let (converter, name) = match inner.split_once(':') {
        Some((converter, name)) => {
            let converter = Converter::parse(converter).ok_or_else(|| {
                PatternError::new(pattern, format!("unknown converter '{converter}'"))
            })?;
            (converter, name)
        }
        None => (Converter::String, inner),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PatternError::new(
            pattern,
            format!("invalid placeholder name '{name}'"),
        ));
    }

    Ok(Segment::Placeholder {
        name: name.to_string(),
        converter,
    })
}
