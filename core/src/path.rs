//! Path patterns with `:name` parameter segments.
//!
//! A pattern is an absolute path whose `/`-delimited segments are either
//! literals (`user`) or parameters (`:id`, or `file-:name` with a literal
//! prefix). The parameter name runs from the `:` to the end of the segment.
//!
//! Parsing is pure: the parameter set is derived from the pattern text alone,
//! and duplicate names are rejected with [`ConstructionError::DuplicateParam`].

use crate::error::ConstructionError;
use crate::params::Params;
use smallvec::SmallVec;
use std::fmt;

/// Matching flags, mirroring router options.
///
/// Default is case-insensitive, trailing-slash tolerant matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Literal segments must match case exactly.
    pub case_sensitive: bool,
    /// A trailing slash on the request must match the pattern's.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { prefix: String, name: String },
}

/// A parsed, validated path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
    names: SmallVec<[String; 4]>,
}

/// Result of matching a pattern against the start of a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch {
    /// Parameters bound by the prefix.
    pub params: Params,
    /// The part of the request path the pattern consumed (`""` for `/`).
    pub base: String,
    /// What is left of the request path, always starting with `/`.
    pub rest: String,
}

/// Parameter names declared by `pattern`, in left-to-right order.
///
/// # Errors
///
/// Fails on a duplicate or empty name, or a pattern not starting with `/`.
///
/// # Example
///
/// ```
/// use composable_http_core::path::param_names;
///
/// let names = param_names("/org/:org/repo/:repo").unwrap();
/// assert_eq!(names.as_slice(), ["org", "repo"]);
/// assert!(param_names("/:id/x/:id").is_err());
/// ```
pub fn param_names(pattern: &str) -> Result<SmallVec<[String; 4]>, ConstructionError> {
    PathPattern::parse(pattern).map(|p| p.names)
}

/// Concatenate a mount prefix and a path.
///
/// ```
/// use composable_http_core::path::join;
///
/// assert_eq!(join("/api", "/user"), "/api/user");
/// assert_eq!(join("/api/", "/user/:id"), "/api/user/:id");
/// assert_eq!(join("/", "/health"), "/health");
/// assert_eq!(join("/user", "/"), "/user");
/// ```
#[must_use]
pub fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}

/// Split an absolute path into segments plus a trailing-slash flag.
fn split(path: &str) -> (Vec<&str>, bool) {
    let body = path.strip_prefix('/').unwrap_or(path);
    if body.is_empty() {
        return (Vec::new(), false);
    }
    let trailing = body.ends_with('/');
    let body = body.strip_suffix('/').unwrap_or(body);
    if body.is_empty() {
        return (Vec::new(), trailing);
    }
    (body.split('/').collect(), trailing)
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), std::borrow::Cow::into_owned)
}

fn eq_literal(expected: &str, actual: &str, opts: MatchOptions) -> bool {
    if opts.case_sensitive {
        expected == actual
    } else {
        expected.eq_ignore_ascii_case(actual)
    }
}

impl PathPattern {
    /// Parse and validate a pattern.
    ///
    /// # Errors
    ///
    /// - [`ConstructionError::MissingLeadingSlash`] if the pattern is relative
    /// - [`ConstructionError::EmptyParamName`] for a bare `:`
    /// - [`ConstructionError::DuplicateParam`] if a name repeats
    pub fn parse(pattern: &str) -> Result<Self, ConstructionError> {
        if !pattern.starts_with('/') {
            return Err(ConstructionError::MissingLeadingSlash {
                pattern: pattern.to_string(),
            });
        }

        let (raw_segments, trailing_slash) = split(pattern);
        let mut segments = Vec::with_capacity(raw_segments.len());
        let mut names: SmallVec<[String; 4]> = SmallVec::new();

        for segment in raw_segments {
            let Some((prefix, name)) = segment.split_once(':') else {
                segments.push(Segment::Literal(segment.to_string()));
                continue;
            };
            if name.is_empty() {
                return Err(ConstructionError::EmptyParamName {
                    pattern: pattern.to_string(),
                });
            }
            if names.iter().any(|n| n == name) {
                return Err(ConstructionError::DuplicateParam {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                });
            }
            names.push(name.to_string());
            segments.push(Segment::Param {
                prefix: prefix.to_string(),
                name: name.to_string(),
            });
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            trailing_slash,
            names,
        })
    }

    /// The pattern text as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Declared parameter names, left to right.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    /// Whether the pattern is `/` (matches everything as a prefix).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    fn bind(&self, actual: &[&str], opts: MatchOptions) -> Option<Params> {
        let mut params = Params::new();
        for (segment, value) in self.segments.iter().zip(actual) {
            match segment {
                Segment::Literal(lit) => {
                    if !eq_literal(lit, value, opts) {
                        return None;
                    }
                },
                Segment::Param { prefix, name } => {
                    let head = value.get(..prefix.len())?;
                    if !eq_literal(prefix, head, opts) {
                        return None;
                    }
                    let rest = &value[prefix.len()..];
                    if rest.is_empty() {
                        return None;
                    }
                    params.push(name.clone(), decode(rest));
                },
            }
        }
        Some(params)
    }

    /// Match the whole request path.
    ///
    /// On success the returned map holds every declared name and nothing else.
    #[must_use]
    pub fn match_exact(&self, path: &str, opts: MatchOptions) -> Option<Params> {
        let (actual, trailing) = split(path);
        if actual.len() != self.segments.len() {
            return None;
        }
        if opts.strict && trailing != self.trailing_slash {
            return None;
        }
        self.bind(&actual, opts)
    }

    /// Match the pattern against the leading segments of the request path.
    ///
    /// Used for middleware and mounted routers.
    #[must_use]
    pub fn match_prefix(&self, path: &str, opts: MatchOptions) -> Option<PrefixMatch> {
        let (actual, trailing) = split(path);
        let n = self.segments.len();
        if actual.len() < n {
            return None;
        }
        let params = self.bind(&actual[..n], opts)?;

        let base = if n == 0 {
            String::new()
        } else {
            format!("/{}", actual[..n].join("/"))
        };
        let remaining = &actual[n..];
        let rest = if remaining.is_empty() {
            "/".to_string()
        } else if trailing {
            format!("/{}/", remaining.join("/"))
        } else {
            format!("/{}", remaining.join("/"))
        };

        Some(PrefixMatch { params, base, rest })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
