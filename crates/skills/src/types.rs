//! Skill definitions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::SkillContext;
use llamar_domain::envelope::ToolResult;

/// JSON Schema type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        };
        write!(f, "{name}")
    }
}

/// One declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ParamSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            enum_values: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            enum_values: None,
        }
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// The async body of a skill.
#[async_trait]
pub trait SkillHandler: Send + Sync {
    async fn call(&self, ctx: Arc<SkillContext>, args: Value) -> ToolResult;
}

/// Optional dry-run hint: extra preview lines derived from the arguments.
pub type PreviewFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// A named, schema-described callable mounted in the registry.
pub struct Skill {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub handler: Arc<dyn SkillHandler>,
    pub preview: Option<PreviewFn>,
}

impl Skill {
    pub fn new(
        name: &str,
        description: &str,
        params: Vec<ParamSpec>,
        handler: Arc<dyn SkillHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            handler,
            preview: None,
        }
    }

    pub fn with_preview(
        mut self,
        preview: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.preview = Some(Box::new(preview));
        self
    }
}

impl fmt::Debug for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Skill")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish()
    }
}

/// Adapter turning an async closure into a [`SkillHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> SkillHandler for FnHandler<F>
where
    F: Fn(Arc<SkillContext>, Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ToolResult> + Send + 'static,
{
    async fn call(&self, ctx: Arc<SkillContext>, args: Value) -> ToolResult {
        (self.0)(ctx, args).await
    }
}

/// Convenience constructor for closure-backed handlers.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn SkillHandler>
where
    F: Fn(Arc<SkillContext>, Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ToolResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
