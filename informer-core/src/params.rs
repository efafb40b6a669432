//! Request parameters shared by list and watch calls
use crate::{
    labels::{FieldSelector, Selector},
    Error,
};

/// Common query parameters used in list and watch calls on collections
///
/// The same parameters must be used for a list and the watch that resumes from it,
/// otherwise the watch would report changes for a different set of objects than was listed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ListParams {
    /// Restrict the collection to a single namespace.
    ///
    /// Defaults to all namespaces if `None`.
    pub namespace: Option<String>,

    /// A selector to restrict the list of returned objects by their labels.
    ///
    /// Defaults to everything if `None`.
    pub label_selector: Option<String>,

    /// A selector to restrict the list of returned objects by their fields.
    ///
    /// Defaults to everything if `None`.
    pub field_selector: Option<String>,

    /// Timeout for the list/watch call, in seconds.
    ///
    /// This limits the duration of the call, regardless of any activity or inactivity.
    /// A watch that runs into its timeout ends normally.
    pub timeout: Option<u32>,

    /// Limit the number of results.
    ///
    /// If there are more results, the source will respond with a continue token which can be used to fetch another page
    /// of results.
    pub limit: Option<u32>,

    /// Fetch a second page of results.
    ///
    /// After listing results with a limit, a continue token can be used to fetch another page of results.
    pub continue_token: Option<String>,
}

/// Builder interface to ListParams
///
/// Usage:
/// ```
/// use informer_core::params::ListParams;
/// let lp = ListParams::default()
///     .within("default")
///     .timeout(60)
///     .labels("app=nginx");
/// ```
impl ListParams {
    /// Restrict calls to a namespace
    #[must_use]
    pub fn within(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Configure the timeout for list/watch calls
    ///
    /// This limits the duration of the call, regardless of any activity or inactivity.
    #[must_use]
    pub fn timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    /// Configure the selector to restrict the list of returned objects by their fields.
    ///
    /// Defaults to everything.
    /// Supports `=`, `==`, `!=`, and can be comma separated: `key1=value1,key2=value2`.
    /// Only `metadata.name` and `metadata.namespace` can be selected on.
    #[must_use]
    pub fn fields(mut self, field_selector: &str) -> Self {
        self.field_selector = Some(field_selector.to_string());
        self
    }

    /// Configure the selector to restrict the list of returned objects by their labels.
    ///
    /// Defaults to everything.
    /// Supports `=`, `==`, `!=`, `in`, `notin`, existence checks, and can be comma separated.
    #[must_use]
    pub fn labels(mut self, label_selector: &str) -> Self {
        self.label_selector = Some(label_selector.to_string());
        self
    }

    /// Sets a result limit.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets a continue token.
    #[must_use]
    pub fn continue_token(mut self, token: &str) -> Self {
        self.continue_token = Some(token.to_string());
        self
    }

    /// Parses both selectors, so a source can evaluate them locally
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Validation`] if either selector is malformed, or if a zero limit was requested.
    pub fn selectors(&self) -> Result<(Selector, FieldSelector), Error> {
        if self.limit == Some(0) {
            return Err(Error::Validation("limit must be greater than zero".into()));
        }
        let labels = match &self.label_selector {
            Some(s) => s.parse().map_err(|e| Error::Validation(format!("{e}")))?,
            None => Selector::default(),
        };
        let fields = match &self.field_selector {
            Some(s) => s.parse().map_err(|e| Error::Validation(format!("{e}")))?,
            None => FieldSelector::default(),
        };
        Ok((labels, fields))
    }
}
