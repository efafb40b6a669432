//! Label and field selectors, parsed from their string form and matched locally
use crate::metadata::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    iter::FromIterator,
    str::FromStr,
};
use thiserror::Error;

// local type aliases
type Map = BTreeMap<String, String>;
type Expressions = Vec<Expression>;

/// Failure to parse a selector string
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A comma separated term could not be understood
    #[error("invalid selector term {0:?}")]
    InvalidTerm(String),
    /// Parentheses of a set expression were not balanced
    #[error("unbalanced parentheses in selector {0:?}")]
    Unbalanced(String),
    /// A field selector referenced a field that cannot be selected on
    #[error("field {0:?} is not supported in field selectors")]
    UnsupportedField(String),
}

/// A selector expression with existing operations
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Expression {
    /// Label value is one of the set
    In(String, BTreeSet<String>),
    /// Label is absent, or its value is outside the set
    NotIn(String, BTreeSet<String>),
    /// Label has exactly this value
    Equal(String, String),
    /// Label is absent, or has another value
    NotEqual(String, String),
    /// Label is present
    Exists(String),
    /// Label is absent
    DoesNotExist(String),
}

/// Perform selection on a list of expressions
///
/// All expressions must match for the selector to match; the empty selector matches everything.
///
/// ```
/// use informer_core::labels::Selector;
/// use std::collections::BTreeMap;
///
/// let selector: Selector = "app=web,tier in (frontend, edge),!canary".parse().unwrap();
/// let labels = BTreeMap::from([
///     ("app".to_string(), "web".to_string()),
///     ("tier".to_string(), "edge".to_string()),
/// ]);
/// assert!(selector.matches(&labels));
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
pub struct Selector(Expressions);

impl Selector {
    /// Create a selector from a vector of expressions
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self(exprs)
    }

    /// Create a selector from a map of key=value label matches
    fn from_map(map: Map) -> Self {
        Self(map.into_iter().map(|(k, v)| Expression::Equal(k, v)).collect())
    }

    /// Indicates whether this label selector matches everything
    pub fn selects_all(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the given labels satisfy every expression
    pub fn matches(&self, labels: &Map) -> bool {
        self.0.iter().all(|expr| expr.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selectors: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", selectors.join(","))
    }
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_terms(s)?
            .into_iter()
            .map(parse_label_term)
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

// === Expression ===

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            Expression::In(key, values) => write!(f, "{key} in ({})", join(values)),
            Expression::NotIn(key, values) => write!(f, "{key} notin ({})", join(values)),
            Expression::Equal(key, value) => write!(f, "{key}={value}"),
            Expression::NotEqual(key, value) => write!(f, "{key}!={value}"),
            Expression::Exists(key) => write!(f, "{key}"),
            Expression::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

impl Expression {
    fn matches(&self, labels: &Map) -> bool {
        match self {
            Expression::In(key, values) => match labels.get(key) {
                Some(v) => values.contains(v),
                None => false,
            },
            Expression::NotIn(key, values) => match labels.get(key) {
                Some(v) => !values.contains(v),
                None => true,
            },
            Expression::Exists(key) => labels.contains_key(key),
            Expression::DoesNotExist(key) => !labels.contains_key(key),
            Expression::Equal(key, value) => labels.get(key) == Some(value),
            Expression::NotEqual(key, value) => labels.get(key) != Some(value),
        }
    }
}

// convenience conversions for Selector

impl FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }
}

impl From<Expression> for Selector {
    fn from(value: Expression) -> Self {
        Self(vec![value])
    }
}

// === Field selectors ===

/// Fields of [`ObjectMeta`] that can be selected on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// `metadata.name`
    Name,
    /// `metadata.namespace`
    Namespace,
}

impl Field {
    fn value<'a>(&self, meta: &'a ObjectMeta) -> &'a str {
        let value = match self {
            Field::Name => &meta.name,
            Field::Namespace => &meta.namespace,
        };
        value.as_deref().unwrap_or_default()
    }
}

impl FromStr for Field {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata.name" => Ok(Field::Name),
            "metadata.namespace" => Ok(Field::Namespace),
            other => Err(ParseError::UnsupportedField(other.to_string())),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name => f.write_str("metadata.name"),
            Field::Namespace => f.write_str("metadata.namespace"),
        }
    }
}

/// A single `field=value` or `field!=value` requirement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRequirement {
    /// The selected field
    pub field: Field,
    /// Whether the value must be equal (`true`) or different (`false`)
    pub equal: bool,
    /// The value to compare against
    pub value: String,
}

/// A parsed field selector such as `metadata.name=my-deploy`
///
/// Only the identity fields of [`ObjectMeta`] are selectable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSelector(Vec<FieldRequirement>);

impl FieldSelector {
    /// Whether the object metadata satisfies every requirement
    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        self.0
            .iter()
            .all(|req| (req.field.value(meta) == req.value) == req.equal)
    }

    /// The requirements making up this selector
    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.0
    }
}

impl FromStr for FieldSelector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut reqs = vec![];
        for term in split_terms(s)? {
            let (field, equal, value) = if let Some((f, v)) = term.split_once("!=") {
                (f, false, v)
            } else if let Some((f, v)) = term.split_once("==") {
                (f, true, v)
            } else if let Some((f, v)) = term.split_once('=') {
                (f, true, v)
            } else {
                return Err(ParseError::InvalidTerm(term.to_string()));
            };
            reqs.push(FieldRequirement {
                field: field.trim().parse()?,
                equal,
                value: value.trim().to_string(),
            });
        }
        Ok(Self(reqs))
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .0
            .iter()
            .map(|r| format!("{}{}{}", r.field, if r.equal { "=" } else { "!=" }, r.value))
            .collect();
        write!(f, "{}", terms.join(","))
    }
}

// === parsing helpers ===

/// Splits on commas that are not inside a parenthesised value set
fn split_terms(s: &str) -> Result<Vec<&str>, ParseError> {
    let mut terms = vec![];
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ParseError::Unbalanced(s.to_string()))?;
            }
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced(s.to_string()));
    }
    terms.push(&s[start..]);
    Ok(terms.into_iter().map(str::trim).filter(|t| !t.is_empty()).collect())
}

fn parse_set(term: &str, rest: &str) -> Result<BTreeSet<String>, ParseError> {
    rest.trim()
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .map(|inner| {
            inner
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .collect()
        })
        .ok_or_else(|| ParseError::InvalidTerm(term.to_string()))
}

fn parse_label_term(term: &str) -> Result<Expression, ParseError> {
    let invalid = || ParseError::InvalidTerm(term.to_string());
    if let Some((key, rest)) = term.split_once(" notin ") {
        return Ok(Expression::NotIn(key.trim().into(), parse_set(term, rest)?));
    }
    if let Some((key, rest)) = term.split_once(" in ") {
        return Ok(Expression::In(key.trim().into(), parse_set(term, rest)?));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Expression::NotEqual(key.trim().into(), value.trim().into()));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Expression::Equal(key.trim().into(), value.trim().into()));
    }
    if let Some(key) = term.strip_prefix('!') {
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid());
        }
        return Ok(Expression::DoesNotExist(key.into()));
    }
    if term.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(Expression::Exists(term.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Map {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_every_label_operator() {
        let selector: Selector = "a=1,b==2,c!=3,d in (x, y),e notin (z),f,!g".parse().unwrap();
        assert_eq!(
            selector,
            Selector::from_expressions(vec![
                Expression::Equal("a".into(), "1".into()),
                Expression::Equal("b".into(), "2".into()),
                Expression::NotEqual("c".into(), "3".into()),
                Expression::In("d".into(), ["x".to_string(), "y".to_string()].into()),
                Expression::NotIn("e".into(), ["z".to_string()].into()),
                Expression::Exists("f".into()),
                Expression::DoesNotExist("g".into()),
            ])
        );
        assert_eq!(selector.to_string(), "a=1,b=2,c!=3,d in (x,y),e notin (z),f,!g");
    }

    #[test]
    fn empty_selector_selects_all() {
        let selector: Selector = "".parse().unwrap();
        assert!(selector.selects_all());
        assert!(selector.matches(&labels(&[("any", "thing")])));
    }

    #[test]
    fn set_expressions_match() {
        let selector: Selector = "env in (prod,staging),tier notin (db)".parse().unwrap();
        assert!(selector.matches(&labels(&[("env", "prod")])));
        assert!(selector.matches(&labels(&[("env", "staging"), ("tier", "web")])));
        assert!(!selector.matches(&labels(&[("env", "prod"), ("tier", "db")])));
        assert!(!selector.matches(&labels(&[("tier", "web")])));
    }

    #[test]
    fn existence_expressions_match() {
        let selector: Selector = "app,!canary".parse().unwrap();
        assert!(selector.matches(&labels(&[("app", "x")])));
        assert!(!selector.matches(&labels(&[("app", "x"), ("canary", "true")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn rejects_malformed_selectors() {
        assert!(matches!(
            "a in (x".parse::<Selector>(),
            Err(ParseError::Unbalanced(_))
        ));
        assert!(matches!("a in x".parse::<Selector>(), Err(ParseError::InvalidTerm(_))));
        assert!(matches!("!".parse::<Selector>(), Err(ParseError::InvalidTerm(_))));
    }

    #[test]
    fn selector_from_map_requires_all_pairs() {
        let selector: Selector = [("app", "web"), ("tier", "front")].into_iter().collect();
        assert!(selector.matches(&labels(&[("app", "web"), ("tier", "front"), ("x", "y")])));
        assert!(!selector.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn field_selector_matches_identity() {
        let meta = ObjectMeta {
            name: Some("nginx".into()),
            namespace: Some("default".into()),
            ..ObjectMeta::default()
        };
        let by_name: FieldSelector = "metadata.name=nginx".parse().unwrap();
        assert!(by_name.matches(&meta));
        let other_ns: FieldSelector = "metadata.namespace!=default".parse().unwrap();
        assert!(!other_ns.matches(&meta));
        let both: FieldSelector = "metadata.name==nginx,metadata.namespace=default".parse().unwrap();
        assert!(both.matches(&meta));
        assert_eq!(both.to_string(), "metadata.name=nginx,metadata.namespace=default");
    }

    #[test]
    fn field_selector_rejects_unknown_fields() {
        assert_eq!(
            "status.phase=Running".parse::<FieldSelector>(),
            Err(ParseError::UnsupportedField("status.phase".into()))
        );
        assert!(matches!(
            "metadata.name".parse::<FieldSelector>(),
            Err(ParseError::InvalidTerm(_))
        ));
    }
}
