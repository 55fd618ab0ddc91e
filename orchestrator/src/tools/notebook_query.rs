use anyhow::Result;
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, object, require_str};
use crate::core::types::{Action, Payload};
use crate::io::cache::KnowledgeCache;

/// Knowledge cache lookup by topic.
pub struct NotebookQueryTool {
    cache: KnowledgeCache,
}

impl NotebookQueryTool {
    pub fn new(cache: KnowledgeCache) -> Self {
        Self { cache }
    }
}

impl Tool for NotebookQueryTool {
    fn action(&self) -> Action {
        Action::NotebookQuery
    }

    fn run(&self, input: &Payload) -> Result<Payload> {
        let topic = require_str(input, "topic", Action::NotebookQuery)?;
        let data = self.cache.load(topic);
        debug!(topic, found = data.is_some(), "notebook lookup");
        Ok(object(json!({
            "found": data.is_some(),
            "topic": topic,
            "data": data.unwrap_or(Value::Null),
        })))
    }
}
