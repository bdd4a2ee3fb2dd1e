//! Matched path parameters.
//!
//! [`Params`] is the untyped per-request map: for a route matched against
//! pattern `P`, it contains exactly the names declared by `P`, each bound to a
//! (percent-decoded) string. [`PathParams`] is its typed view, usually derived
//! with `#[derive(PathParams)]`.

use crate::error::ContextError;
use smallvec::SmallVec;

/// Parameter name/value pairs in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(SmallVec<[(String, String); 4]>);

impl Params {
    /// Empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub(crate) fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }

    /// Value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value bound to `name`, or [`ContextError::MissingParam`].
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingParam`] when the pattern did not declare `name`.
    pub fn require(&self, name: &str) -> Result<&str, ContextError> {
        self.get(name)
            .ok_or_else(|| ContextError::MissingParam(name.to_string()))
    }

    /// Names in pattern order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    /// `(name, value)` pairs in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the pattern declared no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A typed view over the parameters of one pattern.
///
/// `NAMES` must list exactly the parameter names of the pattern the type is
/// registered with; typed registration checks this when the pipeline is built.
///
/// # Example
///
/// ```
/// use composable_http_core::{ContextError, Params, PathParams};
///
/// struct UserParams {
///     id: String,
/// }
///
/// impl PathParams for UserParams {
///     const NAMES: &'static [&'static str] = &["id"];
///
///     fn from_params(params: &Params) -> Result<Self, ContextError> {
///         Ok(Self { id: params.require("id")?.to_string() })
///     }
/// }
///
/// let params: Params = [("id", "7")].into_iter().collect();
/// assert_eq!(UserParams::from_params(&params).unwrap().id, "7");
/// ```
pub trait PathParams: Sized + Send + 'static {
    /// Parameter names this type expects, in any order.
    const NAMES: &'static [&'static str];

    /// Build the typed view.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingParam`] if a declared name is absent.
    fn from_params(params: &Params) -> Result<Self, ContextError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_order() {
        let params: Params = [("id", "0"), ("tab", "posts")].into_iter().collect();
        assert_eq!(params.get("tab"), Some("posts"));
        assert_eq!(params.get("nope"), None);
        assert_eq!(params.names().collect::<Vec<_>>(), ["id", "tab"]);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_require_reports_missing_name() {
        let params = Params::new();
        assert_eq!(
            params.require("id"),
            Err(ContextError::MissingParam("id".to_string()))
        );
    }
}
