//! `$eval` argument templates.
//!
//! Trigger arguments and targets are JSON documents whose leaves may be
//! `{"$eval": "<expression>"}`. They are parsed once into a tagged tree and
//! resolved against a fixed context. An expression that resolves to nothing
//! voids the whole template: partial materialization is never returned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const EVAL_KEY: &str = "$eval";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ArgumentTemplate {
    Literal(Value),
    Eval(String),
    Object(Vec<(String, ArgumentTemplate)>),
    Array(Vec<ArgumentTemplate>),
}

impl ArgumentTemplate {
    /// Resolves every `$eval` leaf with `eval`. Returns `None` as soon as
    /// one expression is undefined.
    pub fn resolve<F>(&self, eval: &F) -> Option<Value>
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            ArgumentTemplate::Literal(value) => Some(value.clone()),
            ArgumentTemplate::Eval(expression) => eval(expression),
            ArgumentTemplate::Object(fields) => {
                let mut resolved = Map::with_capacity(fields.len());
                for (key, template) in fields {
                    resolved.insert(key.clone(), template.resolve(eval)?);
                }
                Some(Value::Object(resolved))
            }
            ArgumentTemplate::Array(items) => items
                .iter()
                .map(|item| item.resolve(eval))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

impl Default for ArgumentTemplate {
    fn default() -> Self {
        ArgumentTemplate::Object(Vec::new())
    }
}

impl From<Value> for ArgumentTemplate {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(expression)) = map.get(EVAL_KEY) {
                        return ArgumentTemplate::Eval(expression.clone());
                    }
                }
                ArgumentTemplate::Object(
                    map.into_iter()
                        .map(|(key, value)| (key, ArgumentTemplate::from(value)))
                        .collect(),
                )
            }
            Value::Array(items) => {
                ArgumentTemplate::Array(items.into_iter().map(ArgumentTemplate::from).collect())
            }
            scalar => ArgumentTemplate::Literal(scalar),
        }
    }
}

impl From<ArgumentTemplate> for Value {
    fn from(template: ArgumentTemplate) -> Self {
        match template {
            ArgumentTemplate::Literal(value) => value,
            ArgumentTemplate::Eval(expression) => {
                let mut map = Map::new();
                map.insert(EVAL_KEY.to_string(), Value::String(expression));
                Value::Object(map)
            }
            ArgumentTemplate::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, template)| (key, Value::from(template)))
                    .collect(),
            ),
            ArgumentTemplate::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
        }
    }
}
