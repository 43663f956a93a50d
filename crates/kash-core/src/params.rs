// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed parameter declarations and raw/typed value sets.
//!
//! Actions declare their parameters as [`Param`] records. Callers supply
//! [`RawParamValues`] (string or bool values, e.g. from `--opt=value`
//! flags); parsing against the declared params yields [`TypedParamValues`].
//! Each `Param` can emit a JSON Schema fragment for the RPC tool surface.

use kash_error::{KashError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// ParamType
// ---------------------------------------------------------------------------

/// The type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ParamType {
    Bool,
    Int,
    Float,
    Str,
    Path,
    Enum,
    LlmName,
}

// ---------------------------------------------------------------------------
// Param
// ---------------------------------------------------------------------------

/// A declared action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name (also the `--name` flag).
    pub name: String,
    /// One-line description for help and schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The parameter's type.
    pub param_type: ParamType,
    /// Default value in raw string form, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Allowed string values, for enum-like parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_str_values: Vec<String>,
    /// When true, values outside `valid_str_values` are accepted too.
    #[serde(default)]
    pub is_open_ended: bool,
    /// When true, the caller must supply a value (no usable default).
    #[serde(default)]
    pub is_explicit: bool,
}

impl Param {
    /// Declare a parameter of the given type.
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            description: None,
            param_type,
            default: None,
            valid_str_values: Vec::new(),
            is_open_ended: false,
            is_explicit: false,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the default value (clears `is_explicit`).
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self.is_explicit = false;
        self
    }

    /// Restrict to a closed set of string values.
    #[must_use]
    pub fn with_valid_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.valid_str_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as open-ended (suggested values only).
    #[must_use]
    pub fn open_ended(mut self) -> Self {
        self.is_open_ended = true;
        self
    }

    /// Mark as required.
    #[must_use]
    pub fn explicit(mut self) -> Self {
        self.is_explicit = true;
        self
    }

    /// Validate a raw string value against this declaration.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidInput`] when the value is outside a
    /// closed value set.
    pub fn validate_value(&self, value: &str) -> Result<()> {
        if !self.valid_str_values.is_empty()
            && !self.is_open_ended
            && !self.valid_str_values.iter().any(|v| v == value)
        {
            return Err(KashError::InvalidInput(format!(
                "invalid value for param `{}`: {value:?} (expected one of {:?})",
                self.name, self.valid_str_values
            )));
        }
        Ok(())
    }

    /// JSON Schema fragment for this parameter.
    #[must_use]
    pub fn json_schema(&self) -> serde_json::Value {
        let mut schema = match self.param_type {
            ParamType::Bool => json!({"type": "boolean"}),
            ParamType::Int => json!({"type": "integer"}),
            ParamType::Float => json!({"type": "number"}),
            ParamType::Str | ParamType::LlmName | ParamType::Enum => json!({"type": "string"}),
            ParamType::Path => json!({"type": "string", "format": "path"}),
        };
        if !self.valid_str_values.is_empty() && !self.is_open_ended {
            schema["enum"] = json!(self.valid_str_values);
        }
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }
}

// ---------------------------------------------------------------------------
// Raw values
// ---------------------------------------------------------------------------

/// A raw parameter value: a string, a bare boolean flag, or an explicit none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// A bare flag (`--opt` with no value) or parsed boolean.
    Bool(bool),
    /// A string value (`--opt=value`).
    Str(String),
    /// Explicitly unset.
    None,
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => f.write_str(s),
            Self::None => f.write_str(""),
        }
    }
}

/// Unparsed parameter values keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawParamValues(pub BTreeMap<String, RawValue>);

impl RawParamValues {
    /// An empty value set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), RawValue::Str(value.into()));
    }

    /// Set a boolean flag.
    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.0.insert(name.into(), RawValue::Bool(value));
    }

    /// Look up a raw value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.0.get(name)
    }

    /// Whether a value is present (and not explicitly none).
    #[must_use]
    pub fn has_value(&self, name: &str) -> bool {
        !matches!(self.0.get(name), None | Some(RawValue::None))
    }

    /// Parse one value by name against a param map, falling back to the
    /// declared default.
    ///
    /// # Errors
    ///
    /// Returns an error for unparseable or out-of-set values.
    pub fn get_parsed_value(
        &self,
        name: &str,
        param_info: &BTreeMap<String, Param>,
    ) -> Result<Option<TypedValue>> {
        let Some(param) = param_info.get(name) else {
            return Err(KashError::InvalidInput(format!("unknown param: `{name}`")));
        };
        let raw = match self.0.get(name) {
            Some(RawValue::None) | None => match &param.default {
                Some(default) => RawValue::Str(default.clone()),
                None => return Ok(None),
            },
            Some(v) => v.clone(),
        };
        parse_raw(param, &raw).map(Some)
    }

    /// Parse all values against the declared params. Raw names not present
    /// in the declarations are rejected; missing values fall back to
    /// declared defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names, unparseable values, or values
    /// outside a closed value set.
    pub fn parse_all(&self, declared: &BTreeMap<String, Param>) -> Result<TypedParamValues> {
        for name in self.0.keys() {
            if !declared.contains_key(name) {
                return Err(KashError::InvalidInput(format!("unknown param: `{name}`")));
            }
        }

        // Params without a value or default stay absent; the action
        // validates its explicit params at run time.
        let mut values = BTreeMap::new();
        for name in declared.keys() {
            if let Some(value) = self.get_parsed_value(name, declared)? {
                values.insert(name.clone(), value);
            }
        }
        Ok(TypedParamValues(values))
    }
}

fn parse_raw(param: &Param, raw: &RawValue) -> Result<TypedValue> {
    let type_err = |raw: &dyn fmt::Display| {
        KashError::InvalidInput(format!(
            "invalid {t:?} value for param `{name}`: {raw}",
            t = param.param_type,
            name = param.name
        ))
    };

    match param.param_type {
        ParamType::Bool => match raw {
            RawValue::Bool(b) => Ok(TypedValue::Bool(*b)),
            RawValue::Str(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(TypedValue::Bool(true)),
                "false" | "no" | "0" => Ok(TypedValue::Bool(false)),
                _ => Err(type_err(s)),
            },
            RawValue::None => Err(type_err(&"none")),
        },
        ParamType::Int => match raw {
            RawValue::Str(s) => s
                .parse::<i64>()
                .map(TypedValue::Int)
                .map_err(|_| type_err(s)),
            other => Err(type_err(other)),
        },
        ParamType::Float => match raw {
            RawValue::Str(s) => s
                .parse::<f64>()
                .map(TypedValue::Float)
                .map_err(|_| type_err(s)),
            other => Err(type_err(other)),
        },
        ParamType::Str | ParamType::Enum | ParamType::LlmName => match raw {
            RawValue::Str(s) => {
                param.validate_value(s)?;
                Ok(TypedValue::Str(s.clone()))
            }
            other => Err(type_err(other)),
        },
        ParamType::Path => match raw {
            RawValue::Str(s) => Ok(TypedValue::Path(PathBuf::from(s))),
            other => Err(type_err(other)),
        },
    }
}

// ---------------------------------------------------------------------------
// Typed values
// ---------------------------------------------------------------------------

/// A parsed, typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Filesystem path value.
    Path(PathBuf),
}

impl TypedValue {
    /// String form used in operation fingerprints.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Path(p) => p.display().to_string(),
        }
    }

    /// The boolean value, if this is a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer value, if this is an int.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Parsed parameter values keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedParamValues(pub BTreeMap<String, TypedValue>);

impl TypedParamValues {
    /// Look up a typed value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.0.get(name)
    }

    /// String value for a param, if present and a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(TypedValue::as_str)
    }

    /// Boolean value for a param, if present and a bool.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(TypedValue::as_bool)
    }

    /// Summarize as `name -> value` strings for operation fingerprints.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.summary()))
            .collect()
    }

    /// Merge another value set over this one (the other wins on conflicts).
    pub fn merge_over(&mut self, other: &TypedParamValues) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
