//! Parameter schemas: declaration generation and validation

use jsonschema::{Draft, JSONSchema};
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde_json::Value;

use super::ToolDeclaration;
use crate::error::ToolError;

/// Build the provider declaration for a tool taking parameters `P`.
///
/// Subschemas are inlined so the declaration is self-contained, and the
/// `$schema` / `title` keys some providers reject are removed.
pub fn declaration_for<P: JsonSchema>(name: &str, description: &str) -> ToolDeclaration {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.option_add_null_type = true;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<P>();
    let mut parameters = serde_json::to_value(root).unwrap_or_else(|_| Value::Object(Default::default()));

    if let Some(obj) = parameters.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        if obj
            .get("definitions")
            .and_then(Value::as_object)
            .is_some_and(|defs| defs.is_empty())
        {
            obj.remove("definitions");
        }
        // Parameterless tools still need an object schema
        obj.entry("type").or_insert_with(|| Value::String("object".into()));
        if obj.get("type").and_then(Value::as_str) == Some("object") {
            obj.entry("properties").or_insert_with(|| Value::Object(Default::default()));
        }
    }

    ToolDeclaration::function(name, description, parameters)
}

/// JSON Schema validator compiled once per tool
pub struct ParamsValidator {
    tool: String,
    compiled: JSONSchema,
}

impl ParamsValidator {
    pub fn compile(tool: &str, schema: &Value) -> Result<Self, ToolError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| ToolError::Definition {
                tool: tool.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            tool: tool.to_string(),
            compiled,
        })
    }

    /// Check `params` against the schema, listing every violation
    pub fn validate(&self, params: &Value) -> Result<(), ToolError> {
        if let Err(errors) = self.compiled.validate(params) {
            let message = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ToolError::InvalidParams {
                tool: self.tool.clone(),
                message,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ParamsValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamsValidator").field("tool", &self.tool).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Inner {
        amount: u64,
    }

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    #[allow(dead_code)]
    struct Params {
        /// Receiving account
        to_account: String,
        inner: Inner,
        memo: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Empty {}

    #[test]
    fn test_declaration_is_inlined_and_stripped() {
        let decl = declaration_for::<Params>("send", "Send funds");
        let params = &decl.function.parameters;
        assert!(params.get("$schema").is_none());
        assert!(params.get("title").is_none());
        assert!(params.get("definitions").is_none());
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["inner"]["type"], "object");
        assert_eq!(params["properties"]["toAccount"]["description"], "Receiving account");

        let required: Vec<&str> = params["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"toAccount"));
        assert!(!required.contains(&"memo"));
    }

    #[test]
    fn test_empty_params_still_object() {
        let decl = declaration_for::<Empty>("noop", "Nothing");
        assert_eq!(decl.function.parameters["type"], "object");
        assert!(decl.function.parameters["properties"].is_object());
    }

    #[test]
    fn test_validator_reports_path() {
        let decl = declaration_for::<Params>("send", "Send funds");
        let validator = ParamsValidator::compile("send", &decl.function.parameters).unwrap();

        assert!(validator
            .validate(&json!({"toAccount": "0.0.2", "inner": {"amount": 5}}))
            .is_ok());

        let err = validator
            .validate(&json!({"toAccount": "0.0.2", "inner": {"amount": "five"}}))
            .unwrap_err();
        match err {
            ToolError::InvalidParams { tool, message } => {
                assert_eq!(tool, "send");
                assert!(message.contains("/inner/amount"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
