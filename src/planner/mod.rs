//! Planning collaborator boundary.
//!
//! The planner converts a natural-language task plus a screen summary into
//! a structured action list. It emits data only; nothing it returns is ever
//! executed as code.

pub mod chat;

use async_trait::async_trait;
use serde::Serialize;

use crate::action::ActionDescriptor;
use crate::device::AppInfo;
use crate::error::EngineError;
use crate::hierarchy::Index;

pub use chat::ChatPlanner;

/// Digest of one interactive element, compact enough to ship to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ElementDigest {
    pub path: String,
    pub kind: String,
    pub text: String,
    pub accessibility_label: String,
    pub resource_key: String,
    pub center_x: i32,
    pub center_y: i32,
}

/// Snapshot context handed to the planner with every request.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub screen_width: u32,
    pub screen_height: u32,
    pub package: String,
    pub activity: String,
    pub elements: Vec<ElementDigest>,
}

impl CaptureSummary {
    pub fn new(index: &Index, app: &AppInfo, screen: (u32, u32)) -> Self {
        let elements = index
            .interactive_nodes()
            .map(|node| {
                let (center_x, center_y) = node.bounds.center();
                ElementDigest {
                    path: node.path.clone(),
                    kind: node.short_kind().to_string(),
                    text: node.text.clone(),
                    accessibility_label: node.accessibility_label.clone(),
                    resource_key: node.resource_key.clone(),
                    center_x,
                    center_y,
                }
            })
            .collect();

        CaptureSummary {
            screen_width: screen.0,
            screen_height: screen.1,
            package: app.package.clone(),
            activity: app.activity.clone(),
            elements,
        }
    }
}

/// External planning collaborator: possibly slow, possibly rate limited,
/// always wrapped in the resilient call wrapper by callers.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        task: &str,
        context: &CaptureSummary,
    ) -> Result<Vec<ActionDescriptor>, EngineError>;
}

/// Pull an action list out of a model reply.
///
/// Models wrap JSON in prose and code fences more often than not: try the
/// raw text, then fenced blocks, then the outermost bracket slice. A reply
/// with no extractable JSON is fatal, not transient; retrying it would just
/// burn the attempt budget.
pub fn extract_actions(reply: &str) -> Result<Vec<ActionDescriptor>, EngineError> {
    for candidate in json_candidates(reply) {
        if let Ok(actions) = serde_json::from_str::<Vec<ActionDescriptor>>(&candidate) {
            return Ok(actions);
        }
        if let Ok(action) = serde_json::from_str::<ActionDescriptor>(&candidate) {
            return Ok(vec![action]);
        }
    }
    Err(EngineError::fatal(format!(
        "planner reply contains no parseable action JSON: {}",
        reply.chars().take(200).collect::<String>()
    )))
}

fn json_candidates(reply: &str) -> Vec<String> {
    let mut candidates = vec![reply.trim().to_string()];

    // fenced block, with or without a language tag (any case)
    if let Some(start) = reply.find("```") {
        let after = &reply[start + 3..];
        let after = match after.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &after[4..],
            _ => after,
        };
        if let Some(end) = after.find("```") {
            candidates.push(after[..end].trim().to_string());
        }
    }

    // outermost bracket slice, list first
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (reply.find(open), reply.rfind(close)) {
            if end > start {
                candidates.push(reply[start..=end].to_string());
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;

    #[test]
    fn test_extract_bare_list() {
        let actions = extract_actions(
            r#"[{"action": "OPEN", "target": "settings"}, {"action": "CLICK", "target": "WLAN"}]"#,
        )
        .unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::Open);
    }

    #[test]
    fn test_extract_fenced_block() {
        let reply = "Here is the plan:\n```json\n{\"action\": \"CLICK\", \"target\": \"WLAN\"}\n```\nGood luck!";
        let actions = extract_actions(reply).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target.as_deref(), Some("WLAN"));
    }

    #[test]
    fn test_extract_fenced_block_with_uppercase_tag() {
        // the prose bracket breaks the outermost-slice candidates, so only
        // the fence path can produce this two-action list
        let reply = "Plan [revised]:\n```JSON\n[{\"action\": \"CLICK\", \"target\": \"WLAN\"}, {\"action\": \"BACK\"}]\n```";
        let actions = extract_actions(reply).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::Click);
        assert_eq!(actions[1].kind, ActionKind::Back);
    }

    #[test]
    fn test_extract_sliced_object() {
        let reply = r#"I would suggest {"action": "BACK"} here."#;
        let actions = extract_actions(reply).unwrap();
        assert_eq!(actions[0].kind, ActionKind::Back);
    }

    #[test]
    fn test_garbage_reply_is_fatal() {
        let err = extract_actions("no structured response, sorry").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_summary_lists_interactive_elements() {
        let xml = r#"<hierarchy><node class="a.L" bounds="[0,0][100,100]">
            <node class="a.TextView" text="Label" bounds="[0,0][50,50]"/>
            <node class="a.Button" text="Go" bounds="[0,50][50,100]" clickable="true"/>
        </node></hierarchy>"#;
        let root = crate::hierarchy::parse(xml).unwrap();
        let index = Index::build(&root);
        let summary = CaptureSummary::new(&index, &AppInfo::default(), (100, 100));

        assert_eq!(summary.elements.len(), 1);
        assert_eq!(summary.elements[0].text, "Go");
        assert_eq!(summary.elements[0].center_y, 75);
    }
}
