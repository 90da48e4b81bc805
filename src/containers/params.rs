//! `Params`: a string-keyed variant map used for dynamic, per-call
//! configuration (spec §4.3, §6) — index build/search options that don't
//! warrant a dedicated struct field because they vary per algorithm.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// A dynamically-typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// A string→variant map with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, ParamValue>,
}

impl Params {
    /// An empty param bag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Sets `key` to `value`, replacing any prior value.
    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get(&self, key: &str) -> Result<&ParamValue> {
        self.values
            .get(key)
            .ok_or_else(|| Error::NoExist(format!("param '{key}' not set")))
    }

    /// Reads `key` as an integer, usable as a `usize`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if absent, [`Error::InvalidValue`] if the
    /// stored value is not an [`ParamValue::Int`] or does not fit `usize`.
    pub fn get_usize(&self, key: &str) -> Result<usize> {
        match self.get(key)? {
            ParamValue::Int(v) => usize::try_from(*v).map_err(|_| Error::InvalidValue {
                key: key.to_string(),
                message: format!("{v} does not fit in usize"),
            }),
            other => Err(Error::InvalidValue {
                key: key.to_string(),
                message: format!("expected Int, found {other:?}"),
            }),
        }
    }

    /// Reads `key` as an `i64`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if absent, [`Error::InvalidValue`] if the
    /// stored value is not an [`ParamValue::Int`].
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(Error::InvalidValue {
                key: key.to_string(),
                message: format!("expected Int, found {other:?}"),
            }),
        }
    }

    /// Reads `key` as an `f32`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if absent, [`Error::InvalidValue`] if the
    /// stored value is not a [`ParamValue::Float`].
    pub fn get_f32(&self, key: &str) -> Result<f32> {
        match self.get(key)? {
            ParamValue::Float(v) => Ok(*v as f32),
            other => Err(Error::InvalidValue {
                key: key.to_string(),
                message: format!("expected Float, found {other:?}"),
            }),
        }
    }

    /// Reads `key` as a `&str`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if absent, [`Error::InvalidValue`] if the
    /// stored value is not a [`ParamValue::Str`].
    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.get(key)? {
            ParamValue::Str(v) => Ok(v.as_str()),
            other => Err(Error::InvalidValue {
                key: key.to_string(),
                message: format!("expected Str, found {other:?}"),
            }),
        }
    }

    /// Reads `key` as a `bool`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if absent, [`Error::InvalidValue`] if the
    /// stored value is not a [`ParamValue::Bool`].
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(Error::InvalidValue {
                key: key.to_string(),
                message: format!("expected Bool, found {other:?}"),
            }),
        }
    }

    /// Reads `key` as a `usize`, falling back to `default` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if present but not an
    /// [`ParamValue::Int`] or too large for `usize`.
    pub fn get_usize_or(&self, key: &str, default: usize) -> Result<usize> {
        if self.contains(key) {
            self.get_usize(key)
        } else {
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_usize() {
        let mut p = Params::new();
        p.set("ef", ParamValue::Int(64));
        assert_eq!(p.get_usize("ef").unwrap(), 64);
    }

    #[test]
    fn missing_key_is_no_exist() {
        let p = Params::new();
        let err = p.get_usize("ef").unwrap_err();
        assert_eq!(err.code(), "VEC-003");
    }

    #[test]
    fn wrong_type_is_invalid_value() {
        let mut p = Params::new();
        p.set("ef", ParamValue::Str("sixty-four".into()));
        let err = p.get_usize("ef").unwrap_err();
        assert_eq!(err.code(), "VEC-002");
    }

    #[test]
    fn get_usize_or_falls_back_to_default() {
        let p = Params::new();
        assert_eq!(p.get_usize_or("missing", 200).unwrap(), 200);
    }

    #[test]
    fn negative_int_does_not_fit_usize() {
        let mut p = Params::new();
        p.set("x", ParamValue::Int(-1));
        assert!(p.get_usize("x").is_err());
    }
}
