//! Named assertions evaluated against every response.
use std::{
    collections::HashSet,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{CheckError, ConfigError},
    transport::Response,
};

type Predicate = dyn Fn(&Response) -> Result<bool, CheckError> + Send + Sync;

/// Outcome of one check against one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }
}

struct Check {
    name: String,
    predicate: Box<Predicate>,
}

/// An ordered set of named predicates.
///
/// Every check is evaluated against every response, in registration order. A
/// predicate that returns an error or panics only fails its own check.
///
/// ```rust
/// use volley::{CheckSet, Response, check};
///
/// let checks = CheckSet::new()
///     .check("is status 200", check::status_is(200))
///     .check("is found", check::json_number_gt("count", 0.0));
///
/// let results = checks.evaluate(&Response::new(200).with_body(r#"{"count": 0}"#));
/// assert!(results[0].passed);
/// assert!(!results[1].passed);
/// ```
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl fmt::Debug for CheckSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Response) -> Result<bool, CheckError> + Send + Sync + 'static,
    {
        self.push(name, predicate);
        self
    }

    pub fn push<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Response) -> Result<bool, CheckError> + Send + Sync + 'static,
    {
        self.checks.push(Check {
            name: name.into(),
            predicate: Box::new(predicate),
        });
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Check names key the run counters, so they must be unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for name in self.names() {
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateCheck(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, response: &Response) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|check| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (check.predicate)(response)))
                    .unwrap_or(Err(CheckError::Panicked));
                let passed = match outcome {
                    Ok(passed) => passed,
                    Err(e) => {
                        tracing::debug!("Check `{}` could not be evaluated: {e}", check.name);
                        false
                    }
                };
                CheckResult::new(check.name.clone(), passed)
            })
            .collect()
    }

    /// One failed result per check, for iterations that produced no response.
    pub fn fail_all(&self) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|check| CheckResult::new(check.name.clone(), false))
            .collect()
    }
}

/// Passes when the response status equals `code`.
pub fn status_is(code: u16) -> impl Fn(&Response) -> Result<bool, CheckError> + Send + Sync {
    move |res: &Response| Ok(res.status == code)
}

/// Parses the body as a JSON object and passes when `field` holds a number
/// greater than `threshold`. A body that is not JSON, or a missing or
/// non-numeric field, is an evaluation error.
pub fn json_number_gt(
    field: &str,
    threshold: f64,
) -> impl Fn(&Response) -> Result<bool, CheckError> + Send + Sync + use<> {
    let field = field.to_string();
    move |res: &Response| {
        let body: serde_json::Value = res.json()?;
        let value = body
            .get(&field)
            .ok_or_else(|| CheckError::Failed(format!("missing field `{field}`")))?;
        let number = value
            .as_f64()
            .ok_or_else(|| CheckError::Failed(format!("field `{field}` is not a number")))?;
        Ok(number > threshold)
    }
}

/// Passes when the body contains `needle`.
pub fn body_contains(
    needle: &str,
) -> impl Fn(&Response) -> Result<bool, CheckError> + Send + Sync + use<> {
    let needle = needle.to_string();
    move |res: &Response| Ok(res.text().contains(&needle))
}
