//! Projection of wallet and mirror node responses
//!
//! Raw responses are large; the model only needs a few fields. A projection
//! maps output keys to dotted paths into the response, to nested projections,
//! or to a function of the whole response. Missing paths are left out.

use serde_json::{Map, Value};

pub enum Field {
    Path(&'static str),
    Nested(&'static [(&'static str, Field)]),
    Compute(fn(&Value) -> Value),
}

pub type Projection = [(&'static str, Field)];

/// Follow a dotted path, `None` when any segment is missing
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |acc, part| match acc {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn project(value: &Value, projection: &Projection) -> Value {
    let mut out = Map::new();
    for (key, field) in projection {
        let projected = match field {
            Field::Path(path) => lookup(value, path).cloned(),
            Field::Nested(inner) => Some(project(value, inner)),
            Field::Compute(f) => Some(f(value)),
        };
        if let Some(projected) = projected {
            out.insert((*key).to_string(), projected);
        }
    }
    Value::Object(out)
}

/// Render JSON for the model inside a fenced block
pub fn fenced_json(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{pretty}\n```")
}

/// Project then fence
pub fn render(value: &Value, projection: &Projection) -> String {
    fenced_json(&project(value, projection))
}
