use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{SimError, SimResult};

/// Key listing the configuration blocks in declaration order.
pub const BLOCKS_KEY: &str = "configuration.blocks";

/// Flat key/value view over a nested configuration document.
///
/// Nested objects are flattened into dotted keys, so `{"app": {"time": {"time_step": 60}}}`
/// and `{"app.time.time_step": 60}` describe the same parameter. Arrays are kept as list
/// values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Configuration {
    entries: BTreeMap<String, Value>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a JSON document. The root must be an object.
    pub fn from_value(value: Value) -> SimResult<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(SimError::invalid(
                    "<root>",
                    other,
                    "configuration root must be an object",
                ))
            }
        };
        let mut config = Self::new();
        for (key, value) in map {
            config.flatten_into(key, value);
        }
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> SimResult<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    fn flatten_into(&mut self, prefix: String, value: Value) {
        match value {
            Value::Object(map) => {
                for (key, value) in map {
                    self.flatten_into(format!("{prefix}.{key}"), value);
                }
            }
            leaf => {
                self.entries.insert(prefix, leaf);
            }
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True when the key is absent, empty, JSON null or the literal `"null"`.
    pub fn is_null(&self, key: &str) -> bool {
        match self.entries.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => {
                let text = text.trim();
                text.is_empty() || text.eq_ignore_ascii_case("null")
            }
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        }
    }

    fn require(&self, key: &str) -> SimResult<&Value> {
        if self.is_null(key) {
            return Err(SimError::missing(key));
        }
        self.entries.get(key).ok_or_else(|| SimError::missing(key))
    }

    pub fn get_string(&self, key: &str) -> SimResult<String> {
        match self.require(key)? {
            Value::String(text) => Ok(text.trim().to_string()),
            Value::Number(number) => Ok(number.to_string()),
            Value::Bool(flag) => Ok(flag.to_string()),
            other => Err(SimError::invalid(key, other, "expected a scalar value")),
        }
    }

    pub fn get_f64(&self, key: &str) -> SimResult<f64> {
        match self.require(key)? {
            Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| SimError::invalid(key, number, "not representable as f64")),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|err| SimError::invalid(key, text, err.to_string())),
            other => Err(SimError::invalid(key, other, "expected a number")),
        }
    }

    pub fn get_i64(&self, key: &str) -> SimResult<i64> {
        match self.require(key)? {
            Value::Number(number) => number
                .as_i64()
                .ok_or_else(|| SimError::invalid(key, number, "expected an integer")),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|err| SimError::invalid(key, text, err.to_string())),
            other => Err(SimError::invalid(key, other, "expected an integer")),
        }
    }

    pub fn get_bool(&self, key: &str) -> SimResult<bool> {
        match self.require(key)? {
            Value::Bool(flag) => Ok(*flag),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(SimError::invalid(key, text, "expected true or false")),
            },
            other => Err(SimError::invalid(key, other, "expected a boolean")),
        }
    }

    /// List value; a scalar string is split on commas.
    pub fn get_list(&self, key: &str) -> SimResult<Vec<String>> {
        match self.require(key)? {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => Ok(text.trim().to_string()),
                    Value::Number(number) => Ok(number.to_string()),
                    other => Err(SimError::invalid(key, other, "expected a list of scalars")),
                })
                .collect(),
            Value::String(text) => Ok(text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()),
            other => Err(SimError::invalid(key, other, "expected a list")),
        }
    }

    pub fn get_f64_list(&self, key: &str) -> SimResult<Vec<f64>> {
        self.get_list(key)?
            .into_iter()
            .map(|item| {
                item.parse::<f64>()
                    .map_err(|err| SimError::invalid(key, &item, err.to_string()))
            })
            .collect()
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> SimResult<f64> {
        if self.is_null(key) {
            Ok(default)
        } else {
            self.get_f64(key)
        }
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> SimResult<bool> {
        if self.is_null(key) {
            Ok(default)
        } else {
            self.get_bool(key)
        }
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> SimResult<String> {
        if self.is_null(key) {
            Ok(default.to_string())
        } else {
            self.get_string(key)
        }
    }

    /// Keys starting with `prefix` and ending with `suffix`, in key order.
    pub fn find_keys(&self, prefix: &str, suffix: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|key| key.starts_with(prefix) && key.ends_with(suffix))
            .cloned()
            .collect()
    }

    /// Block keys in declaration order.
    pub fn blocks(&self) -> SimResult<Vec<String>> {
        if self.is_null(BLOCKS_KEY) {
            return Ok(Vec::new());
        }
        self.get_list(BLOCKS_KEY)
    }

    /// Enabled blocks whose key starts with `category.`, in declaration order.
    pub fn enabled_blocks(&self, category: &str) -> SimResult<Vec<String>> {
        let prefix = format!("{category}.");
        let mut enabled = Vec::new();
        for block in self.blocks()? {
            if block.starts_with(&prefix) && self.is_block_enabled(&block)? {
                enabled.push(block);
            }
        }
        Ok(enabled)
    }

    pub fn is_block_enabled(&self, block: &str) -> SimResult<bool> {
        self.get_bool_or(&format!("{block}.enabled"), false)
    }

    pub fn block<'a>(&'a self, block: &'a str) -> BlockParameters<'a> {
        BlockParameters {
            config: self,
            block,
        }
    }
}

/// Parameters scoped to one configuration block (`<block>.<param>`).
#[derive(Clone, Copy, Debug)]
pub struct BlockParameters<'a> {
    config: &'a Configuration,
    block: &'a str,
}

impl<'a> BlockParameters<'a> {
    pub fn key(&self) -> &'a str {
        self.block
    }

    pub fn full_key(&self, param: &str) -> String {
        format!("{}.{}", self.block, param)
    }

    pub fn is_null(&self, param: &str) -> bool {
        self.config.is_null(&self.full_key(param))
    }

    pub fn get_string(&self, param: &str) -> SimResult<String> {
        self.config.get_string(&self.full_key(param))
    }

    pub fn get_string_or(&self, param: &str, default: &str) -> SimResult<String> {
        self.config.get_string_or(&self.full_key(param), default)
    }

    pub fn get_f64(&self, param: &str) -> SimResult<f64> {
        self.config.get_f64(&self.full_key(param))
    }

    pub fn get_f64_or(&self, param: &str, default: f64) -> SimResult<f64> {
        self.config.get_f64_or(&self.full_key(param), default)
    }

    pub fn get_i64(&self, param: &str) -> SimResult<i64> {
        self.config.get_i64(&self.full_key(param))
    }

    pub fn get_bool_or(&self, param: &str, default: bool) -> SimResult<bool> {
        self.config.get_bool_or(&self.full_key(param), default)
    }

    pub fn get_f64_list(&self, param: &str) -> SimResult<Vec<f64>> {
        self.config.get_f64_list(&self.full_key(param))
    }
}
