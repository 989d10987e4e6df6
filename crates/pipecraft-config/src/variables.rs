//! Variable interpolation for pipeline templates.
//!
//! Supports variables like:
//! - `${args.region}` - A template argument
//! - `${args.image.tag}` - A nested field of an object argument
//! - `${env.VAR_NAME}` - Environment variable
//!
//! A string made of exactly one variable is replaced by the variable's JSON
//! value, so `"${args.replicas}"` can render as the number `3`.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Top-level name under which caller-supplied arguments are visible.
pub const ARGS_NAMESPACE: &str = "args";

/// Variables available while rendering a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Caller-supplied arguments
    pub args: Map<String, Value>,
    /// Environment variables
    pub env: HashMap<String, String>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_-]+)*)\}").unwrap()
});

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<Value> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            [ARGS_NAMESPACE, path @ ..] if !path.is_empty() => {
                let (first, rest) = path.split_first()?;
                let mut value = self.args.get(*first)?;
                for key in rest {
                    value = match value {
                        Value::Object(fields) => fields.get(*key)?,
                        Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(value.clone())
            }
            ["env", name] => self.env.get(*name).cloned().map(Value::String),
            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are left as written.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                match self.resolve(var_name) {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => format!("${{{}}}", var_name),
                }
            })
            .to_string()
    }

    /// Substitute a template string into a JSON value.
    pub fn substitute(&self, input: &str) -> Value {
        if let Some(caps) = VAR_REGEX.captures(input) {
            if caps[0].len() == input.len() {
                if let Some(value) = self.resolve(&caps[1]) {
                    return value;
                }
            }
        }
        Value::String(self.interpolate(input))
    }
}

/// Builder for creating TemplateContext.
pub struct TemplateContextBuilder {
    ctx: TemplateContext,
}

impl TemplateContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: TemplateContext::new(),
        }
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.ctx.args.extend(args);
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ctx.args.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, env: HashMap<String, String>) -> Self {
        self.ctx.env.extend(env);
        self
    }

    pub fn build(self) -> TemplateContext {
        self.ctx
    }
}

impl Default for TemplateContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
