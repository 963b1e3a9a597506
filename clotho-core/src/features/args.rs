//! Keyword arguments for feature functions.
//!
//! Arguments arrive as a JSON object from the feature settings file. Each
//! registered function declares the parameters it accepts; the registry
//! checks the configured object against those declarations before the
//! function is constructed, so a typo fails at startup and not mid-split.

use serde_json::{Map, Value};

use crate::error::{ClothoError, Result};

/// JSON type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Str,
}

impl ParamKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::Int => value.is_i64() || value.is_u64(),
            // Integers are valid floats: `"sr": 44100` for an f64 parameter.
            ParamKind::Float => value.is_number(),
            ParamKind::Bool => value.is_boolean(),
            ParamKind::Str => value.is_string(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ParamKind::Int => "an integer",
            ParamKind::Float => "a number",
            ParamKind::Bool => "a boolean",
            ParamKind::Str => "a string",
        }
    }
}

/// Declaration of one keyword parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// `null` is an accepted value.
    pub nullable: bool,
    /// Value used when the parameter is omitted. `None` makes it required.
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, default: impl Into<Value>) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            default: Some(default.into()),
        }
    }

    /// Optional parameter that accepts `null`, defaulting to `null`.
    pub fn nullable(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            default: Some(Value::Null),
        }
    }

    fn check(&self, value: &Value) -> std::result::Result<(), String> {
        if value.is_null() {
            return if self.nullable {
                Ok(())
            } else {
                Err(format!("parameter `{}` must not be null", self.name))
            };
        }
        if self.kind.accepts(value) {
            Ok(())
        } else {
            Err(format!(
                "parameter `{}` expects {}, got {value}",
                self.name,
                self.kind.name()
            ))
        }
    }
}

/// Validated keyword arguments, with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureArgs(Map<String, Value>);

impl FeatureArgs {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Check `raw` against `params` and fill in defaults.
    ///
    /// Returns the reason on the first violation: an unexpected name, a
    /// missing required parameter, or a value of the wrong type.
    pub(crate) fn validate(
        raw: &Map<String, Value>,
        params: &[ParamSpec],
    ) -> std::result::Result<Self, String> {
        if let Some(unknown) = raw.keys().find(|k| !params.iter().any(|p| p.name == *k)) {
            let mut accepted: Vec<&str> = params.iter().map(|p| p.name).collect();
            accepted.sort_unstable();
            return Err(format!(
                "unexpected parameter `{unknown}` (accepted: {})",
                accepted.join(", ")
            ));
        }

        let mut out = Map::new();
        for param in params {
            let value = match (raw.get(param.name), &param.default) {
                (Some(v), _) => v.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(format!("missing parameter `{}`", param.name)),
            };
            param.check(&value)?;
            out.insert(param.name.to_string(), value);
        }
        Ok(Self(out))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    fn wrong_type(name: &str, expected: &str) -> ClothoError {
        ClothoError::Config(format!("feature parameter `{name}` is not a {expected}"))
    }

    pub fn usize(&self, name: &str) -> Result<usize> {
        self.opt_usize(name)?
            .ok_or_else(|| Self::wrong_type(name, "non-negative integer"))
    }

    pub fn opt_usize(&self, name: &str) -> Result<Option<usize>> {
        self.get(name)
            .map(|v| {
                v.as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| Self::wrong_type(name, "non-negative integer"))
            })
            .transpose()
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.opt_f64(name)?
            .ok_or_else(|| Self::wrong_type(name, "number"))
    }

    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>> {
        self.get(name)
            .map(|v| v.as_f64().ok_or_else(|| Self::wrong_type(name, "number")))
            .transpose()
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| Self::wrong_type(name, "boolean"))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&str>> {
        self.get(name)
            .map(|v| v.as_str().ok_or_else(|| Self::wrong_type(name, "string")))
            .transpose()
    }
}
