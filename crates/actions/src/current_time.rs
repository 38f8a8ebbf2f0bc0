//! Current date and time.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use parley_core::error::ActionError;
use std::sync::Arc;

use crate::context::ActionContext;
use crate::descriptor::{ActionDescriptor, ActionHandler, ActionOutput, ParamSpec, ParamType, Permissions};

pub struct CurrentTime;

impl CurrentTime {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(
            "current_time",
            "Get the current date and time, optionally shifted to a UTC offset in hours.",
            Arc::new(Self),
        )
        .with_command("time")
        .with_param(
            ParamSpec::optional("utc_offset_hours", ParamType::Integer, "Offset from UTC, e.g. 2 or -5")
                .with_default(serde_json::json!(0)),
        )
        .with_permissions(Permissions {
            auto_continue: true,
            ..Permissions::auto()
        })
    }
}

#[async_trait]
impl ActionHandler for CurrentTime {
    async fn run(&self, _ctx: &ActionContext, params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let hours = params["utc_offset_hours"].as_i64().unwrap_or(0);
        let offset = i32::try_from(hours)
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ActionError::InvalidArguments(format!("invalid UTC offset: {hours}")))?;

        let now = Utc::now().with_timezone(&offset);
        Ok(now.format("%Y-%m-%d %H:%M:%S %:z (%A)").to_string().into())
    }
}
