//! Label and field selectors for List requests
//!
//! Label selectors support equality (`k=v`, `k==v`, `k!=v`), set membership
//! (`k in (a,b)`, `k notin (a,b)`) and existence (`k`, `!k`). Field selectors
//! support equality only. Requirements are comma separated and conjoined.

use crate::models::Labels;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned for a malformed selector string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorParseError {
    #[error("empty requirement in selector")]
    EmptyRequirement,
    #[error("invalid key {0:?}")]
    InvalidKey(String),
    #[error("invalid value {0:?}")]
    InvalidValue(String),
    #[error("unbalanced parentheses in {0:?}")]
    UnbalancedParens(String),
    #[error("unknown set operator {0:?}, expected \"in\" or \"notin\"")]
    UnknownOperator(String),
    #[error("set for key {0:?} must not be empty")]
    EmptySet(String),
    #[error("field requirement {0:?} has no operator")]
    MissingOperator(String),
}

/// A single label requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRequirement {
    Equals { key: String, value: String },
    NotEquals { key: String, value: String },
    In { key: String, values: BTreeSet<String> },
    NotIn { key: String, values: BTreeSet<String> },
    Exists(String),
    DoesNotExist(String),
}

impl LabelRequirement {
    pub fn matches(&self, labels: &Labels) -> bool {
        match self {
            LabelRequirement::Equals { key, value } => labels.get(key) == Some(value),
            // An absent key satisfies `!=`
            LabelRequirement::NotEquals { key, value } => labels.get(key) != Some(value),
            LabelRequirement::In { key, values } => {
                labels.get(key).is_some_and(|v| values.contains(v))
            }
            LabelRequirement::NotIn { key, values } => {
                labels.get(key).map_or(true, |v| !values.contains(v))
            }
            LabelRequirement::Exists(key) => labels.contains_key(key),
            LabelRequirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for LabelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            LabelRequirement::Equals { key, value } => write!(f, "{}={}", key, value),
            LabelRequirement::NotEquals { key, value } => write!(f, "{}!={}", key, value),
            LabelRequirement::In { key, values } => write!(f, "{} in ({})", key, join(values)),
            LabelRequirement::NotIn { key, values } => {
                write!(f, "{} notin ({})", key, join(values))
            }
            LabelRequirement::Exists(key) => write!(f, "{}", key),
            LabelRequirement::DoesNotExist(key) => write!(f, "!{}", key),
        }
    }
}

/// Conjunction of label requirements; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector requiring every `key=value` pair of `set`
    pub fn from_set(set: &Labels) -> Self {
        Self {
            requirements: set
                .iter()
                .map(|(k, v)| LabelRequirement::Equals {
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[LabelRequirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::everything());
        }

        let requirements = split_top_level(s)?
            .into_iter()
            .map(parse_label_requirement)
            .collect::<Result<_, _>>()?;

        Ok(Self { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Identity fields an object exposes to field selectors
#[derive(Debug, Clone, Copy)]
pub struct ObjectFields<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
}

impl<'a> ObjectFields<'a> {
    pub const NAME: &'static str = "metadata.name";
    pub const NAMESPACE: &'static str = "metadata.namespace";

    /// Value of `field`; unknown fields read as the empty string
    pub fn get(&self, field: &str) -> &'a str {
        match field {
            Self::NAME => self.name,
            Self::NAMESPACE => self.namespace,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    pub field: String,
    pub value: String,
    pub negated: bool,
}

impl FieldRequirement {
    pub fn matches(&self, fields: &ObjectFields<'_>) -> bool {
        (fields.get(&self.field) == self.value) != self.negated
    }
}

/// Conjunction of field equality requirements; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector matching exactly one `metadata.name`
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            requirements: vec![FieldRequirement {
                field: ObjectFields::NAME.to_string(),
                value: name.into(),
                negated: false,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, fields: &ObjectFields<'_>) -> bool {
        self.requirements.iter().all(|r| r.matches(fields))
    }
}

impl FromStr for FieldSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::everything());
        }

        let mut requirements = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(SelectorParseError::EmptyRequirement);
            }

            let (field, value, negated) = if let Some((f, v)) = part.split_once("!=") {
                (f, v, true)
            } else if let Some((f, v)) = part.split_once("==") {
                (f, v, false)
            } else if let Some((f, v)) = part.split_once('=') {
                (f, v, false)
            } else {
                return Err(SelectorParseError::MissingOperator(part.to_string()));
            };

            let field = field.trim();
            if field.is_empty() || !field.chars().all(is_key_char) {
                return Err(SelectorParseError::InvalidKey(field.to_string()));
            }

            requirements.push(FieldRequirement {
                field: field.to_string(),
                value: value.trim().to_string(),
                negated,
            });
        }

        Ok(Self { requirements })
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn parse_key(raw: &str) -> Result<String, SelectorParseError> {
    let key = raw.trim();
    let first_ok = key.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_ok || !key.chars().all(is_key_char) {
        return Err(SelectorParseError::InvalidKey(key.to_string()));
    }
    Ok(key.to_string())
}

fn parse_value(raw: &str) -> Result<String, SelectorParseError> {
    let value = raw.trim();
    if !value.chars().all(is_value_char) {
        return Err(SelectorParseError::InvalidValue(value.to_string()));
    }
    Ok(value.to_string())
}

/// Split on commas outside parentheses
fn split_top_level(s: &str) -> Result<Vec<&str>, SelectorParseError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(SelectorParseError::UnbalancedParens(s.to_string()));
                }
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SelectorParseError::UnbalancedParens(s.to_string()));
    }
    parts.push(&s[start..]);

    Ok(parts)
}

fn parse_label_requirement(raw: &str) -> Result<LabelRequirement, SelectorParseError> {
    let req = raw.trim();
    if req.is_empty() {
        return Err(SelectorParseError::EmptyRequirement);
    }

    if let Some((head, rest)) = req.split_once('(') {
        let inner = rest
            .strip_suffix(')')
            .filter(|inner| !inner.contains(')'))
            .ok_or_else(|| SelectorParseError::UnbalancedParens(req.to_string()))?;

        let mut words = head.split_whitespace();
        let key = parse_key(words.next().unwrap_or_default())?;
        let op = words.next().unwrap_or_default();
        if words.next().is_some() {
            return Err(SelectorParseError::InvalidKey(head.trim().to_string()));
        }

        let values = inner
            .split(',')
            .map(parse_value)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if values.iter().all(|v| v.is_empty()) {
            return Err(SelectorParseError::EmptySet(key));
        }

        return match op {
            "in" => Ok(LabelRequirement::In { key, values }),
            "notin" => Ok(LabelRequirement::NotIn { key, values }),
            other => Err(SelectorParseError::UnknownOperator(other.to_string())),
        };
    }

    if let Some((k, v)) = req.split_once("!=") {
        return Ok(LabelRequirement::NotEquals {
            key: parse_key(k)?,
            value: parse_value(v)?,
        });
    }
    if let Some((k, v)) = req.split_once("==").or_else(|| req.split_once('=')) {
        return Ok(LabelRequirement::Equals {
            key: parse_key(k)?,
            value: parse_value(v)?,
        });
    }
    if let Some(k) = req.strip_prefix('!') {
        return Ok(LabelRequirement::DoesNotExist(parse_key(k)?));
    }

    Ok(LabelRequirement::Exists(parse_key(req)?))
}
