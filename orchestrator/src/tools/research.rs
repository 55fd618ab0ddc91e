use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::{Tool, object, require_str};
use crate::core::types::{Action, Payload};
use crate::io::cache::KnowledgeCache;
use crate::io::process::{ProcessRequest, run_captured};

/// Runs the configured search command and caches what it finds.
///
/// When the command fails the last cached answer for the same query is
/// returned with `"cached": true`.
pub struct ResearchTool {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    cache: KnowledgeCache,
}

impl ResearchTool {
    pub fn new(
        command: Vec<String>,
        timeout: Duration,
        output_limit_bytes: usize,
        cache: KnowledgeCache,
    ) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
            cache,
        }
    }

    pub fn topic(query: &str) -> String {
        format!("research:{query}")
    }

    fn search(&self, query: &str) -> Result<Value> {
        let mut argv = self.command.clone();
        argv.push(query.to_string());
        let output = run_captured(&ProcessRequest::new(
            &argv,
            self.timeout,
            self.output_limit_bytes,
        ))?;
        if output.timed_out {
            return Err(anyhow!("search timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "search exited with {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        let stdout = output.stdout_text();
        Ok(match serde_json::from_str::<Value>(&stdout) {
            Ok(Value::Array(items)) => Value::Array(items),
            Ok(other) => Value::Array(vec![other]),
            Err(_) => json!([{"text": stdout.trim()}]),
        })
    }
}

impl Tool for ResearchTool {
    fn action(&self) -> Action {
        Action::Research
    }

    #[instrument(skip_all)]
    fn run(&self, input: &Payload) -> Result<Payload> {
        let query = require_str(input, "query", Action::Research)?;
        let topic = Self::topic(query);

        match self.search(query) {
            Ok(results) => {
                let count = results.as_array().map_or(0, Vec::len);
                let data = json!({"query": query, "results": results, "count": count});
                self.cache.store(&topic, data.clone())?;
                info!(query, count, "research complete");
                let mut result = object(data);
                result.insert("cached".to_string(), json!(false));
                Ok(result)
            }
            Err(err) => {
                let Some(data) = self.cache.load(&topic) else {
                    return Err(err.context(format!("research '{query}' failed with no cached answer")));
                };
                warn!(query, err = %err, "search failed, serving cached answer");
                let mut result = object(data);
                result.insert("cached".to_string(), json!(true));
                result.insert("warning".to_string(), json!(format!("{err:#}")));
                Ok(result)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn tool(script: &str, cache: &KnowledgeCache) -> ResearchTool {
        ResearchTool::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(5),
            4096,
            cache.clone(),
        )
    }

    fn input(query: &str) -> Payload {
        object(json!({"query": query, "conversation_id": "c", "context": {}}))
    }

    #[test]
    fn results_are_returned_and_cached() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = KnowledgeCache::open(temp.path()).expect("cache");
        // `sh -c script arg` binds the appended query to $0.
        let search = tool(r#"printf '[{"title":"%s"}]' "$0""#, &cache);

        let result = search.run(&input("rust traits")).expect("run");
        assert_eq!(result["results"], json!([{"title": "rust traits"}]));
        assert_eq!(result["count"], json!(1));
        assert_eq!(result["cached"], json!(false));
        assert_eq!(
            cache.load("research:rust traits").expect("cached")["count"],
            json!(1)
        );
    }

    #[test]
    fn non_json_output_is_kept_as_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = KnowledgeCache::open(temp.path()).expect("cache");
        let result = tool("echo plain words", &cache)
            .run(&input("q"))
            .expect("run");
        assert_eq!(result["results"], json!([{"text": "plain words"}]));
    }

    #[test]
    fn failure_falls_back_to_cache() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = KnowledgeCache::open(temp.path()).expect("cache");
        cache
            .store(
                "research:offline",
                json!({"query": "offline", "results": [], "count": 0}),
            )
            .expect("store");

        let result = tool("exit 1", &cache).run(&input("offline")).expect("run");
        assert_eq!(result["cached"], json!(true));
        assert!(result.contains_key("warning"));
    }

    #[test]
    fn failure_without_cache_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = KnowledgeCache::open(temp.path()).expect("cache");
        let err = tool("exit 1", &cache).run(&input("nothing")).unwrap_err();
        assert!(err.to_string().contains("no cached answer"));
    }

    #[test]
    fn missing_query_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = KnowledgeCache::open(temp.path()).expect("cache");
        let err = tool("true", &cache).run(&Payload::new()).unwrap_err();
        assert_eq!(err.to_string(), "research requires a non-empty 'query'");
    }
}
