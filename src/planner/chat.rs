use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{extract_actions, CaptureSummary, Planner};
use crate::action::ActionDescriptor;
use crate::config::PlannerConfig;
use crate::error::EngineError;

const SYSTEM_PROMPT: &str = "You are an Android UI automation expert. \
Given a task and a JSON summary of the current screen, reply with ONLY a \
JSON list of actions. Each action is an object with an \"action\" field \
(OPEN, CLICK, INPUT, SWIPE, CHECK, WAIT, BACK or HOME), an optional \
\"target\" element query, and optional parameters (\"text\" for INPUT, \
\"direction\" for SWIPE, \"timeout\" seconds for WAIT). Reply with an \
empty list [] when the task is already complete.";

/// Planner backed by an OpenAI-compatible chat completion endpoint.
pub struct ChatPlanner {
    http: reqwest::Client,
    config: PlannerConfig,
}

impl ChatPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::fatal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

fn classify_request_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() || e.is_connect() {
        EngineError::transient(format!("planner request failed: {}", e))
    } else {
        EngineError::fatal(format!("planner request failed: {}", e))
    }
}

#[async_trait]
impl Planner for ChatPlanner {
    async fn plan(
        &self,
        task: &str,
        context: &CaptureSummary,
    ) -> Result<Vec<ActionDescriptor>, EngineError> {
        let screen_json = serde_json::to_string_pretty(context)
            .map_err(|e| EngineError::fatal(format!("failed to serialize screen summary: {}", e)))?;
        let user = format!(
            "Task: {}\n\nCurrent screen:\n```json\n{}\n```",
            task, screen_json
        );

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::transient("planner rate limited (429)"));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::fatal(format!(
                "planner returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::fatal(format!("planner reply is not JSON: {}", e)))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngineError::fatal("planner reply has no message content"))?;

        log::debug!("planner reply: {}", content);
        extract_actions(content)
    }
}
