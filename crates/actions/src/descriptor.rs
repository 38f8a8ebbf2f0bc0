//! Action descriptors: the static description of one callable action.
//!
//! A descriptor carries everything the framework needs before running an
//! action: its name and short command, the ordered parameter list (from
//! which the JSON schema sent to the model is derived), the permission flags
//! and the handler implementing the behavior.

use async_trait::async_trait;
use parley_core::error::ActionError;
use parley_core::provider::ToolDefinition;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::ActionContext;

/// Permission flags declared by an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Run without asking the user for confirmation
    pub auto_execute: bool,
    /// Ask the loop for another completion round after this call
    pub auto_continue: bool,
    /// Caller must be a group admin (private-chat callers always qualify)
    pub require_admin: bool,
    /// Caller must be one of the configured master identities
    pub require_master: bool,
    /// Inject storage private to this action in this chat
    pub use_chat_db: bool,
    /// Inject the process-wide store
    pub use_root_db: bool,
    /// Inject a completion-service callback
    pub use_llm: bool,
    /// Keep the result out of the visible transcript and durable history
    pub silent: bool,
}

impl Permissions {
    /// Flags of an action that runs without confirmation.
    pub fn auto() -> Self {
        Self {
            auto_execute: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Convert a command-line token to a JSON value of this type.
    pub fn parse_token(&self, token: &str) -> Option<serde_json::Value> {
        match self {
            Self::String => Some(serde_json::Value::String(token.to_string())),
            Self::Integer => token.parse::<i64>().ok().map(serde_json::Value::from),
            Self::Number => token.parse::<f64>().ok().map(serde_json::Value::from),
            Self::Boolean => match token.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Some(serde_json::Value::Bool(true)),
                "false" | "off" | "no" | "0" => Some(serde_json::Value::Bool(false)),
                _ => None,
            },
        }
    }

    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ParamSpec {
    pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }
}

/// What a handler hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// A result governed by the descriptor's static flags
    Plain(String),
    /// A result that overrides `auto_continue` for this call only
    Override { result: String, auto_continue: bool },
}

impl ActionOutput {
    pub fn result(&self) -> &str {
        match self {
            Self::Plain(result) | Self::Override { result, .. } => result,
        }
    }
}

impl From<String> for ActionOutput {
    fn from(result: String) -> Self {
        Self::Plain(result)
    }
}

impl From<&str> for ActionOutput {
    fn from(result: &str) -> Self {
        Self::Plain(result.to_string())
    }
}

/// The behavior behind an action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(
        &self,
        ctx: &ActionContext,
        params: &serde_json::Value,
    ) -> Result<ActionOutput, ActionError>;
}

/// A registered action.
#[derive(Clone)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    /// Short command usable as `!<command>` in chat
    pub command: Option<String>,
    pub params: Vec<ParamSpec>,
    pub permissions: Permissions,
    pub handler: Arc<dyn ActionHandler>,
}

impl ActionDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            command: None,
            params: Vec::new(),
            permissions: Permissions::auto(),
            handler,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// JSON Schema describing this action's parameters.
    pub fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for param in &self.params {
            let mut prop = serde_json::json!({
                "type": param.kind.as_str(),
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            properties.insert(param.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Convert into a tool spec for the completion service.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }

    /// Check arguments against the declared parameters and fill in defaults.
    pub fn resolve_params(&self, params: serde_json::Value) -> Result<serde_json::Value, ActionError> {
        let mut map = match params {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(ActionError::InvalidArguments(format!(
                    "{}: expected an object of arguments, got {other}",
                    self.name
                )));
            }
        };

        for param in &self.params {
            match map.get(&param.name) {
                Some(value) if !value.is_null() => {
                    if !param.kind.matches(value) {
                        return Err(ActionError::InvalidArguments(format!(
                            "{}: '{}' must be of type {}",
                            self.name,
                            param.name,
                            param.kind.as_str()
                        )));
                    }
                }
                _ => {
                    if let Some(default) = &param.default {
                        map.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return Err(ActionError::InvalidArguments(format!(
                            "{}: missing required argument '{}'",
                            self.name, param.name
                        )));
                    }
                }
            }
        }
        Ok(serde_json::Value::Object(map))
    }

    /// Map command tokens positionally onto the declared parameters.
    ///
    /// The last string parameter absorbs any remaining tokens, so free text
    /// can follow the fixed arguments.
    pub fn bind_tokens(&self, tokens: &[&str]) -> Result<serde_json::Value, ActionError> {
        let mut map = serde_json::Map::new();
        let mut rest = tokens;

        for (index, param) in self.params.iter().enumerate() {
            let Some((first, tail)) = rest.split_first() else {
                break;
            };
            let is_last = index + 1 == self.params.len();

            let value = if is_last && param.kind == ParamType::String {
                let joined = rest.join(" ");
                rest = &[];
                serde_json::Value::String(joined)
            } else {
                rest = tail;
                param.kind.parse_token(first).ok_or_else(|| {
                    ActionError::InvalidArguments(format!(
                        "{}: '{first}' is not a valid {} for '{}'",
                        self.name,
                        param.kind.as_str(),
                        param.name
                    ))
                })?
            };
            map.insert(param.name.clone(), value);
        }

        if !rest.is_empty() {
            return Err(ActionError::InvalidArguments(format!(
                "{}: too many arguments",
                self.name
            )));
        }

        self.resolve_params(serde_json::Value::Object(map))
    }
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("params", &self.params)
            .field("permissions", &self.permissions)
            .finish()
    }
}
