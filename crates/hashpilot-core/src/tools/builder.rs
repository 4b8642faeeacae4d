//! Structured tools built from typed async functions
//!
//! An invocation runs these steps in order:
//! 1. validate the raw params against the compiled schema, then deserialize
//! 2. `before` hook, whose failure skips the function
//! 3. the tool function
//! 4. `after` hook, whose failure is logged and attached as a warning
//!
//! With `add_errors_in_output` (the default) failures in steps 1-3 become
//! ordinary result content so the model can react to them.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::schema::{ParamsValidator, declaration_for};
use super::{BoxFuture, Tool, ToolDeclaration, ToolResult, ToolWarning};
use crate::error::ToolError;

type ToolFn<P, C> =
    Arc<dyn Fn(P, Arc<C>) -> BoxFuture<'static, anyhow::Result<ToolResult>> + Send + Sync>;
type BeforeFn<P, C> =
    Arc<dyn Fn(P, Arc<C>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type AfterFn<P, C> =
    Arc<dyn Fn(ToolResult, P, Arc<C>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Builder for [`StructuredTool`]
pub struct ToolBuilder<P, C> {
    name: String,
    description: String,
    func: Option<ToolFn<P, C>>,
    before: Option<BeforeFn<P, C>>,
    after: Option<AfterFn<P, C>>,
    add_errors_in_output: bool,
}

impl<P, C> ToolBuilder<P, C>
where
    P: DeserializeOwned + JsonSchema + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            func: None,
            before: None,
            after: None,
            add_errors_in_output: true,
        }
    }

    /// The tool body. Any `R: Into<ToolResult>` works, so a bare `String`
    /// return becomes `{content}`.
    pub fn func<F, Fut, R>(mut self, f: F) -> Self
    where
        F: Fn(P, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<ToolResult>,
    {
        let func: ToolFn<P, C> = Arc::new(
            move |params: P, ctx: Arc<C>| -> BoxFuture<'static, anyhow::Result<ToolResult>> {
                let fut = f(params, ctx);
                Box::pin(async move { fut.await.map(Into::into) })
            },
        );
        self.func = Some(func);
        self
    }

    /// Hook run after validation and before the body
    pub fn before<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(P, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let before: BeforeFn<P, C> = Arc::new(
            move |params: P, ctx: Arc<C>| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(f(params, ctx))
            },
        );
        self.before = Some(before);
        self
    }

    /// Hook run with the finished result
    pub fn after<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ToolResult, P, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let after: AfterFn<P, C> = Arc::new(
            move |result: ToolResult,
                  params: P,
                  ctx: Arc<C>|
                  -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(f(result, params, ctx))
            },
        );
        self.after = Some(after);
        self
    }

    /// Report failures as result content (default) or propagate them
    pub fn add_errors_in_output(mut self, enabled: bool) -> Self {
        self.add_errors_in_output = enabled;
        self
    }

    pub fn build(self) -> Result<StructuredTool<P, C>, ToolError> {
        let func = self.func.ok_or_else(|| ToolError::Definition {
            tool: self.name.clone(),
            message: "no tool function given".to_string(),
        })?;
        let declaration = declaration_for::<P>(&self.name, &self.description);
        let validator = ParamsValidator::compile(&self.name, &declaration.function.parameters)?;

        Ok(StructuredTool {
            name: self.name,
            description: self.description,
            declaration,
            validator,
            func,
            before: self.before,
            after: self.after,
            add_errors_in_output: self.add_errors_in_output,
            _params: PhantomData,
        })
    }
}

/// Tool with typed, schema-validated parameters
pub struct StructuredTool<P, C> {
    name: String,
    description: String,
    declaration: ToolDeclaration,
    validator: ParamsValidator,
    func: ToolFn<P, C>,
    before: Option<BeforeFn<P, C>>,
    after: Option<AfterFn<P, C>>,
    add_errors_in_output: bool,
    _params: PhantomData<fn() -> P>,
}

impl<P, C> StructuredTool<P, C>
where
    P: DeserializeOwned + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn parse(&self, params: Value) -> Result<P, ToolError> {
        self.validator.validate(&params)?;
        serde_json::from_value(params).map_err(|e| ToolError::InvalidParams {
            tool: self.name.clone(),
            message: e.to_string(),
        })
    }

    fn failed(&self, err: anyhow::Error) -> ToolError {
        ToolError::Failed {
            tool: self.name.clone(),
            message: format!("{err:#}"),
        }
    }

    fn report(&self, err: ToolError) -> Result<ToolResult, ToolError> {
        debug!(tool = %self.name, error = %err, "Tool failed");
        if self.add_errors_in_output {
            Ok(ToolResult::from_error(&err))
        } else {
            Err(err)
        }
    }

    async fn run(&self, params: Value, ctx: Arc<C>) -> Result<ToolResult, ToolError> {
        let parsed = match self.parse(params) {
            Ok(parsed) => parsed,
            Err(err) => return self.report(err),
        };

        if let Some(before) = &self.before {
            if let Err(err) = before(parsed.clone(), Arc::clone(&ctx)).await {
                return self.report(self.failed(err));
            }
        }

        let mut result = match (self.func)(parsed.clone(), Arc::clone(&ctx)).await {
            Ok(result) => result,
            Err(err) => return self.report(self.failed(err)),
        };

        if let Some(after) = &self.after {
            if let Err(err) = after(result.clone(), parsed, ctx).await {
                let message = format!("{err:#}");
                warn!(tool = %self.name, error = %message, "after_callback failed");
                result.warnings.push(ToolWarning {
                    tool: self.name.clone(),
                    message,
                });
            }
        }

        Ok(result)
    }
}

impl<P, C> Tool<C> for StructuredTool<P, C>
where
    P: DeserializeOwned + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn declaration(&self) -> &ToolDeclaration {
        &self.declaration
    }

    fn invoke(&self, params: Value, ctx: Arc<C>) -> BoxFuture<'_, Result<ToolResult, ToolError>> {
        Box::pin(self.run(params, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Deserialize, JsonSchema)]
    struct AddParams {
        a: i64,
        b: i64,
    }

    fn adder() -> ToolBuilder<AddParams, ()> {
        ToolBuilder::new("adder", "Adds two integers")
            .func(|p: AddParams, _ctx| async move { Ok(format!("{}", p.a + p.b)) })
    }

    #[tokio::test]
    async fn test_string_return_normalizes() {
        let tool = adder().build().unwrap();
        let result = tool.invoke(json!({"a": 2, "b": 3}), Arc::new(())).await.unwrap();
        assert_eq!(result.content, "5");
        assert!(result.artifact.is_none());
    }

    #[tokio::test]
    async fn test_invalid_params_become_content() {
        let tool = adder().build().unwrap();
        let result = tool.invoke(json!({"a": 2}), Arc::new(())).await.unwrap();
        assert!(result.content.starts_with("Error in tool \"adder\": "));
        assert!(result.artifact.unwrap().get("error").is_some());
    }

    #[tokio::test]
    async fn test_invalid_params_propagate_when_disabled() {
        let tool = adder().add_errors_in_output(false).build().unwrap();
        let err = tool.invoke(json!({"a": "x", "b": 1}), Arc::new(())).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn test_missing_func_is_definition_error() {
        let err = ToolBuilder::<AddParams, ()>::new("adder", "Adds").build().err().unwrap();
        assert!(matches!(err, ToolError::Definition { .. }));
    }

    #[tokio::test]
    async fn test_after_failure_keeps_result() {
        let tool = adder()
            .after(|_result, _p, _ctx| async { Err::<(), _>(anyhow::anyhow!("disk full")) })
            .build()
            .unwrap();
        let result = tool.invoke(json!({"a": 1, "b": 1}), Arc::new(())).await.unwrap();
        assert_eq!(result.content, "2");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].message, "disk full");
    }
}
