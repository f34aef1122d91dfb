//! Hyperparameter values and path-addressed learner options

use crate::error::{KolosalError, Result};
use crate::training::Learner;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Int(v as i64)
    }
}

impl From<usize> for ParameterValue {
    fn from(v: usize) -> Self {
        ParameterValue::Int(v as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::String(v)
    }
}

/// Dotted address of an option inside a (possibly nested) learner,
/// e.g. `learners.0.max_depth`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionPath(Vec<String>);

impl OptionPath {
    /// Build a path from its segments
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path, rejecting empty segments
    pub fn parse(dotted: &str) -> Result<Self> {
        let path = Self::from(dotted);
        path.validate()?;
        Ok(path)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.0.is_empty() || self.0.iter().any(|s| s.is_empty()) {
            return Err(KolosalError::ConfigError(format!(
                "Invalid option path '{}'",
                self
            )));
        }
        Ok(())
    }

    /// Path segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for OptionPath {
    fn from(dotted: &str) -> Self {
        Self(dotted.split('.').map(str::to_string).collect())
    }
}

impl Deref for OptionPath {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for OptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// One node of a [`LearnerOptions`] tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionNode {
    Value(ParameterValue),
    Nested(LearnerOptions),
}

/// Nested option overrides for a learner.
///
/// Leaves are hyperparameter values, inner maps address nested learners.
/// Merging is recursive: an override replaces a leaf, nested maps merge
/// key by key instead of replacing each other wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearnerOptions {
    entries: BTreeMap<String, OptionNode>,
}

impl LearnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a nested JSON mapping, e.g. `{"tree": {"max_depth": 4}}`
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, path: impl Into<OptionPath>, value: impl Into<ParameterValue>) -> Self {
        self.insert(&path.into(), value.into());
        self
    }

    /// Set the value at `path`, creating intermediate maps as needed.
    /// A leaf standing where a map is needed gets replaced.
    pub fn insert(&mut self, path: &[String], value: ParameterValue) {
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.entries.insert(head.clone(), OptionNode::Value(value));
            return;
        }
        let node = self
            .entries
            .entry(head.clone())
            .or_insert_with(|| OptionNode::Nested(LearnerOptions::new()));
        if let OptionNode::Value(_) = node {
            *node = OptionNode::Nested(LearnerOptions::new());
        }
        if let OptionNode::Nested(child) = node {
            child.insert(rest, value);
        }
    }

    /// Value stored at `path`, if it is a leaf
    pub fn get(&self, path: &[String]) -> Option<&ParameterValue> {
        let (head, rest) = path.split_first()?;
        match (self.entries.get(head)?, rest.is_empty()) {
            (OptionNode::Value(v), true) => Some(v),
            (OptionNode::Nested(child), false) => child.get(rest),
            _ => None,
        }
    }

    /// Recursively merge `overrides` into `self`
    pub fn merge(&mut self, overrides: &LearnerOptions) {
        for (key, node) in &overrides.entries {
            if let (Some(OptionNode::Nested(mine)), OptionNode::Nested(theirs)) =
                (self.entries.get_mut(key), node)
            {
                mine.merge(theirs);
                continue;
            }
            self.entries.insert(key.clone(), node.clone());
        }
    }

    /// Copy of `self` with `overrides` merged in
    pub fn merged(&self, overrides: &LearnerOptions) -> Self {
        let mut out = self.clone();
        out.merge(overrides);
        out
    }

    /// Every leaf with its full path, in key order
    pub fn leaves(&self) -> Vec<(OptionPath, ParameterValue)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves(&self, prefix: &mut Vec<String>, out: &mut Vec<(OptionPath, ParameterValue)>) {
        for (key, node) in &self.entries {
            prefix.push(key.clone());
            match node {
                OptionNode::Value(v) => out.push((OptionPath(prefix.clone()), v.clone())),
                OptionNode::Nested(child) => child.collect_leaves(prefix, out),
            }
            prefix.pop();
        }
    }

    /// Apply every leaf to `learner` through [`Learner::set_option`]
    pub fn apply_to(&self, learner: &mut dyn Learner) -> Result<()> {
        for (path, value) in self.leaves() {
            learner.set_option(&path, &value)?;
        }
        Ok(())
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reject `path` unless it is a single segment, for settings that have no
/// nested options below them
pub(crate) fn expect_leaf(path: &[String]) -> Result<()> {
    if path.len() != 1 {
        return Err(KolosalError::InvalidParameter {
            name: path.join("."),
            value: String::new(),
            reason: format!("'{}' has no nested options", path[0]),
        });
    }
    Ok(())
}

/// Error for a value of the wrong kind
pub(crate) fn wrong_kind(path: &[String], value: &ParameterValue, expected: &str) -> KolosalError {
    KolosalError::InvalidParameter {
        name: path.join("."),
        value: value.to_string(),
        reason: format!("expected {}", expected),
    }
}

/// Split `<index>.<rest>` off a path that addresses one element of a list
/// of learners
pub(crate) fn indexed_child<'a>(path: &'a [String], len: usize) -> Result<(usize, &'a [String])> {
    let name = path.join(".");
    let (index, rest) = path.split_first().ok_or_else(|| KolosalError::InvalidParameter {
        name: name.clone(),
        value: String::new(),
        reason: "missing learner index".to_string(),
    })?;
    let index: usize = index.parse().map_err(|_| KolosalError::InvalidParameter {
        name: name.clone(),
        value: index.clone(),
        reason: "learner index must be a non-negative integer".to_string(),
    })?;
    if index >= len {
        return Err(KolosalError::InvalidParameter {
            name,
            value: index.to_string(),
            reason: format!("only {} learners are configured", len),
        });
    }
    if rest.is_empty() {
        return Err(KolosalError::InvalidParameter {
            name,
            value: String::new(),
            reason: "path stops at a learner, an option name is required".to_string(),
        });
    }
    Ok((index, rest))
}
