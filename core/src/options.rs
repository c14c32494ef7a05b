//! Interpreter options: thread count and an optional external delegate.

use std::ffi::CString;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TfliteError};

/// External delegate to attach when the interpreter is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateConfig {
    /// Path of the delegate plugin library.
    pub path: String,
    /// Key/value pairs, applied in order.
    #[serde(default)]
    pub options: Vec<(String, String)>,
}

impl DelegateConfig {
    /// Delegate at `path` with no options.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            options: Vec::new(),
        }
    }

    /// Append one `key=value` option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Options as owned C strings.
    pub(crate) fn c_options(&self) -> Result<Vec<(CString, CString)>> {
        self.options
            .iter()
            .map(|(k, v)| -> Result<(CString, CString)> {
                let key = CString::new(k.as_str()).map_err(|_| {
                    TfliteError::invalid_option(format!("option key contains a NUL byte: {:?}", k))
                })?;
                let value = CString::new(v.as_str()).map_err(|_| {
                    let message = format!("option value contains a NUL byte: {:?}", v);
                    TfliteError::invalid_option(message)
                })?;
                Ok((key, value))
            })
            .collect()
    }
}

/// Options applied before the interpreter is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterOptions {
    /// Worker threads. Values `<= 0` leave the engine default.
    #[serde(default)]
    pub threads: Option<i32>,
    /// At most one external delegate.
    #[serde(default)]
    pub delegate: Option<DelegateConfig>,
}

impl InterpreterOptions {
    /// Engine defaults, no delegate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    pub fn with_threads(mut self, threads: i32) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Attach `delegate` when the interpreter is built.
    pub fn with_delegate(mut self, delegate: DelegateConfig) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Thread count to forward to the engine, if any.
    pub fn effective_threads(&self) -> Option<i32> {
        self.threads.filter(|&t| t > 0)
    }

    /// Build options from an untyped object such as a config section.
    ///
    /// `threads` is read when it is a number and ignored otherwise. A present
    /// `delegate` must be an object with a string `path`; its `options` must
    /// be an array of `[key, value]` string pairs.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut options = Self::default();
        let Some(object) = value.as_object() else {
            if value.is_null() {
                return Ok(options);
            }
            return Err(TfliteError::invalid_option(format!(
                "Expected options to be an object but got {}",
                value
            )));
        };

        if let Some(threads) = object.get("threads").and_then(Value::as_f64) {
            options.threads = Some(threads as i32);
        }

        if let Some(delegate) = object.get("delegate") {
            options.delegate = Some(parse_delegate(delegate)?);
        }
        Ok(options)
    }
}

fn parse_delegate(value: &Value) -> Result<DelegateConfig> {
    let path = value
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            TfliteError::invalid_option(format!(
                "Expected delegate path to be a string but got {}",
                value
            ))
        })?;

    let mut delegate = DelegateConfig::new(path);
    match value.get("options") {
        None | Some(Value::Null) => {}
        Some(Value::Array(pairs)) => {
            for pair in pairs {
                let (key, val) = parse_option(pair)?;
                delegate.options.push((key, val));
            }
        }
        Some(other) => {
            return Err(TfliteError::invalid_option(format!(
                "Expected delegate options to be an array but got {}",
                other
            )))
        }
    }
    Ok(delegate)
}

fn parse_option(pair: &Value) -> Result<(String, String)> {
    let Some(items) = pair.as_array() else {
        return Err(TfliteError::invalid_option(format!(
            "Expected option to be an array but got {}",
            pair
        )));
    };
    let key = items
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| {
            TfliteError::invalid_option(format!(
                "Expected option key to be a string but got {}",
                pair
            ))
        })?;
    let value = items
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            TfliteError::invalid_option(format!(
                "Expected option value to be a string but got {}",
                pair
            ))
        })?;
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_threads() {
        let effective = |threads| {
            InterpreterOptions::new()
                .with_threads(threads)
                .effective_threads()
        };
        assert_eq!(InterpreterOptions::new().effective_threads(), None);
        assert_eq!(effective(0), None);
        assert_eq!(effective(-3), None);
        assert_eq!(effective(6), Some(6));
    }

    #[test]
    fn test_from_value() {
        let value = json!({
            "threads": 2,
            "delegate": {
                "path": "libedgetpu.so.1",
                "options": [["device", "usb"], ["k", "v"]]
            }
        });
        let options = InterpreterOptions::from_value(&value).unwrap();
        assert_eq!(options.threads, Some(2));
        let delegate = options.delegate.unwrap();
        assert_eq!(delegate.path, "libedgetpu.so.1");
        assert_eq!(
            delegate.options,
            vec![
                ("device".to_string(), "usb".to_string()),
                ("k".to_string(), "v".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_numeric_threads_ignored() {
        let options = InterpreterOptions::from_value(&json!({"threads": "four"})).unwrap();
        assert_eq!(options.threads, None);
        assert_eq!(
            InterpreterOptions::from_value(&Value::Null).unwrap(),
            InterpreterOptions::default()
        );
    }

    #[test]
    fn test_malformed_delegate_options() {
        let with_options = |options: Value| json!({"delegate": {"path": "d", "options": options}});
        let cases = [
            (json!({"delegate": {"path": 3}}), "Expected delegate path to be a string"),
            (with_options(json!(["k"])), "Expected option to be an array"),
            (with_options(json!([[1, "v"]])), "Expected option key to be a string"),
            (with_options(json!([["k", 2]])), "Expected option value to be a string"),
            (with_options(json!([["k"]])), "Expected option value to be a string"),
            (with_options(json!({})), "Expected delegate options to be an array"),
            (json!([1, 2]), "Expected options to be an object"),
        ];
        for (value, message) in cases {
            let err = InterpreterOptions::from_value(&value).unwrap_err();
            assert!(matches!(err, TfliteError::InvalidOption(_)));
            assert!(err.to_string().contains(message), "{} / {}", err, message);
        }
    }

    #[test]
    fn test_nul_byte_rejected() {
        let delegate = DelegateConfig::new("d").with_option("a\0b", "v");
        assert!(matches!(delegate.c_options(), Err(TfliteError::InvalidOption(_))));
        let delegate = DelegateConfig::new("d").with_option("a", "v");
        assert_eq!(delegate.c_options().unwrap().len(), 1);
    }
}
