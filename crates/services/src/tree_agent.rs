//! Model-driven tree restructuring.
//!
//! The chat panel sends the current tree and a plain-language instruction to
//! a language model and expects the complete replacement tree back as JSON.
//! Replies are pulled out of prose or fenced blocks, validated against the
//! tree shape, and only then swapped in. A failed request leaves the tree
//! alone and lands in the transcript as an error entry.

use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use shared::agent_api::{ChatBackend, ChatMessage};
use shared::tree::Tree;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::storage::KeyValueStore;
use crate::workspace::Workspace;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json\s*([\s\S]*?)```").expect("valid regex"));

const SYSTEM_PROMPT: &str = "You restructure a virtual project folder. \
The folder is a JSON array of nodes. A file is {\"name\": string, \"type\": \"file\", \"content\": string}. \
A folder is {\"name\": string, \"type\": \"folder\", \"children\": [nodes]}. \
Names must be unique among siblings. \
Apply the user's instruction and reply with the complete updated JSON array only, \
optionally inside a ```json code block. Keep every file you were not asked to change exactly as it was.";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model request failed: {0}")]
    Network(#[source] anyhow::Error),

    #[error("model reply is not a usable file tree: {0}")]
    MalformedResponse(String),

    #[error("could not encode the current tree for the model: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("could not save the new tree: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Conversation sent for one change request
pub fn build_messages(tree: &Tree, instruction: &str) -> Result<Vec<ChatMessage>, AgentError> {
    let tree_json = serde_json::to_string_pretty(tree).map_err(AgentError::Encoding)?;
    Ok(vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Current folder structure:\n```json\n{}\n```\n\nInstruction: {}",
            tree_json, instruction
        )),
    ])
}

/// Pulls a JSON value out of a model reply.
///
/// Tries, in order: the whole reply, the first ```json fenced block, and the
/// span from the first `[` to the last `]`.
pub fn extract_tree_json(response: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(response.trim()) {
        return Some(value);
    }

    if let Some(caps) = FENCED_JSON.captures(response) {
        if let Ok(value) = serde_json::from_str::<Value>(caps[1].trim()) {
            return Some(value);
        }
    }

    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if start >= end {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}

fn malformed(msg: impl Into<String>) -> AgentError {
    AgentError::MalformedResponse(msg.into())
}

fn validate_nodes(items: &[Value], parent: &str) -> Result<(), AgentError> {
    for (i, item) in items.iter().enumerate() {
        let at = if parent.is_empty() {
            format!("item {}", i)
        } else {
            format!("item {} of '{}'", i, parent)
        };
        let obj = item
            .as_object()
            .ok_or_else(|| malformed(format!("{} is not an object", at)))?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(format!("{} has no string 'name'", at)))?;
        let path = if parent.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent, name)
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("file") => {
                if !obj.get("content").is_some_and(Value::is_string) {
                    return Err(malformed(format!("file '{}' has no string 'content'", path)));
                }
            }
            Some("folder") => match obj.get("children") {
                None => {}
                Some(Value::Array(children)) => validate_nodes(children, &path)?,
                Some(_) => {
                    return Err(malformed(format!("folder '{}' has non-array 'children'", path)))
                }
            },
            _ => {
                return Err(malformed(format!(
                    "'{}' has a 'type' other than \"file\" or \"folder\"",
                    path
                )))
            }
        }
    }
    Ok(())
}

/// Checks a parsed reply against the tree shape and converts it.
pub fn validate_tree_value(value: Value) -> Result<Tree, AgentError> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed("expected a JSON array at the top level"))?;
    validate_nodes(items, "")?;

    let tree: Tree = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
    if let Some(dup) = tree.sibling_conflicts().first() {
        return Err(malformed(format!("duplicate name at '{}'", dup)));
    }
    Ok(tree)
}

/// Asks a model for a replacement tree.
pub struct TreeAgent<B> {
    backend: B,
}

impl<B: ChatBackend> TreeAgent<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Request, extract and validate. Touches nothing.
    pub async fn propose(&self, tree: &Tree, instruction: &str) -> Result<Tree, AgentError> {
        let messages = build_messages(tree, instruction)?;
        let reply = self
            .backend
            .generate(messages)
            .await
            .map_err(AgentError::Network)?;
        let value = extract_tree_json(&reply)
            .ok_or_else(|| malformed("no JSON found in the reply"))?;
        validate_tree_value(value)
    }

    /// Runs one change request against a shared workspace.
    ///
    /// The lock is held only to snapshot and to apply, never across the model
    /// call. Overlapping requests each replace the whole tree, so whichever
    /// finishes last wins.
    pub async fn request_change<S: KeyValueStore>(
        &self,
        workspace: &Mutex<Workspace<S>>,
        instruction: &str,
    ) -> Result<(), AgentError> {
        let snapshot = {
            let mut ws = workspace.lock();
            ws.transcript_mut().push(ChatMessage::user(instruction));
            ws.tree().clone()
        };

        let outcome = self.propose(&snapshot, instruction).await;

        let mut ws = workspace.lock();
        match outcome {
            Ok(tree) => {
                let files = tree.file_paths().len();
                match ws.replace_tree(tree) {
                    Ok(()) => {
                        info!(files, "model proposal applied");
                        ws.transcript_mut().push(ChatMessage::assistant(format!(
                            "Updated the folder structure ({} files).",
                            files
                        )));
                        Ok(())
                    }
                    Err(e) => {
                        let err = AgentError::Storage(e.into());
                        ws.transcript_mut().push_error(&err);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "model proposal rejected");
                ws.transcript_mut().push_error(&err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use shared::tree::Node;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Hands out canned replies in order
    struct Scripted {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn generate(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String> {
            self.seen.lock().push(messages);
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted reply")))
        }
    }

    fn workspace_with(tree: Tree) -> Mutex<Workspace<MemoryStore>> {
        let mut ws = Workspace::load(MemoryStore::new());
        ws.replace_tree(tree).unwrap();
        Mutex::new(ws)
    }

    fn sample() -> Tree {
        Tree::new(vec![Node::folder("a", vec![Node::file("b.txt", "hi")])])
    }

    #[test]
    fn test_extract_direct() {
        let value = extract_tree_json(r#" [{"name":"x","type":"file","content":"y"}] "#).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn test_extract_fenced() {
        let reply = "Here you go:\n```json\n[{\"name\":\"x\",\"type\":\"file\",\"content\":\"y\"}]\n```\nEnjoy.";
        assert_eq!(
            extract_tree_json(reply).unwrap(),
            json!([{"name": "x", "type": "file", "content": "y"}])
        );
    }

    #[test]
    fn test_extract_bracket_span() {
        let reply = r#"Sure! [{"name":"x","type":"folder","children":[]}] That's it."#;
        assert_eq!(
            extract_tree_json(reply).unwrap(),
            json!([{"name": "x", "type": "folder", "children": []}])
        );
    }

    #[test]
    fn test_extract_nothing() {
        assert!(extract_tree_json("not json at all").is_none());
        assert!(extract_tree_json("] backwards [").is_none());
        assert!(extract_tree_json("[broken").is_none());
    }

    #[test]
    fn test_validate_accepts_tree() {
        let tree = validate_tree_value(json!([
            {"name": "src", "type": "folder", "children": [
                {"name": "main.rs", "type": "file", "content": "fn main() {}"}
            ]},
            {"name": "empty", "type": "folder"}
        ]))
        .unwrap();
        assert_eq!(tree.resolve_content("src/main.rs").unwrap(), "fn main() {}");
        assert_eq!(tree.nodes()[1], Node::folder("empty", vec![]));
    }

    #[test]
    fn test_validate_rejections() {
        let cases = [
            json!({"name": "x", "type": "file", "content": ""}),
            json!(["x"]),
            json!([{"type": "file", "content": ""}]),
            json!([{"name": 3, "type": "file", "content": ""}]),
            json!([{"name": "x", "type": "dir", "children": []}]),
            json!([{"name": "x", "type": "file"}]),
            json!([{"name": "x", "type": "file", "content": null}]),
            json!([{"name": "x", "type": "folder", "children": {}}]),
            json!([{"name": "x", "type": "folder", "children": [{"name": "y", "type": "file"}]}]),
            json!([
                {"name": "x", "type": "file", "content": ""},
                {"name": "x", "type": "folder", "children": []}
            ]),
        ];
        for case in cases {
            assert!(
                matches!(validate_tree_value(case.clone()), Err(AgentError::MalformedResponse(_))),
                "{}",
                case
            );
        }
    }

    #[test]
    fn test_messages_carry_tree_and_instruction() {
        let messages = build_messages(&sample(), "rename b.txt").unwrap();
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("\"b.txt\""));
        assert!(messages[1].content.ends_with("Instruction: rename b.txt"));
    }

    #[tokio::test]
    async fn test_malformed_reply_keeps_tree() {
        let ws = workspace_with(sample());
        let agent = TreeAgent::new(Scripted::new(vec![Ok("not json at all".into())]));

        let err = agent.request_change(&ws, "do something").await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));

        let ws = ws.lock();
        assert_eq!(ws.tree(), &sample());
        let last = ws.transcript().entries().last().unwrap();
        assert!(last.is_error);
        assert_eq!(ws.transcript().entries()[0].message.content, "do something");
    }

    #[tokio::test]
    async fn test_fenced_reply_replaces_tree() {
        let ws = workspace_with(sample());
        let agent = TreeAgent::new(Scripted::new(vec![Ok(
            "```json\n[{\"name\":\"x\",\"type\":\"file\",\"content\":\"y\"}]\n```".into(),
        )]));

        agent.request_change(&ws, "replace everything").await.unwrap();
        let seen = agent.backend.seen.lock();
        assert!(seen[0][1].content.contains("\"b.txt\""));
        assert!(seen[0][1].content.ends_with("Instruction: replace everything"));

        let ws = ws.lock();
        assert_eq!(ws.tree(), &Tree::new(vec![Node::file("x", "y")]));
        let last = ws.transcript().entries().last().unwrap();
        assert!(!last.is_error);
        assert_eq!(last.message.role, "assistant");
    }

    #[tokio::test]
    async fn test_network_failure_keeps_tree() {
        let ws = workspace_with(sample());
        let agent = TreeAgent::new(Scripted::new(vec![Err(anyhow!("connection refused"))]));

        let err = agent.request_change(&ws, "anything").await.unwrap_err();
        assert!(matches!(err, AgentError::Network(_)));
        assert_eq!(ws.lock().tree(), &sample());
        assert!(ws.lock().transcript().entries().last().unwrap().is_error);
    }

    /// Answers every request with one file after a fixed delay
    struct Delayed {
        delay: Duration,
        name: &'static str,
    }

    #[async_trait]
    impl ChatBackend for Delayed {
        async fn generate(&self, _messages: Vec<ChatMessage>) -> anyhow::Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(format!(
                r#"[{{"name":"{}","type":"file","content":""}}]"#,
                self.name
            ))
        }
    }

    #[tokio::test]
    async fn test_overlapping_requests_last_finished_wins() {
        let ws = workspace_with(sample());
        let slow = TreeAgent::new(Delayed {
            delay: Duration::from_millis(200),
            name: "slow",
        });
        let fast = TreeAgent::new(Delayed {
            delay: Duration::from_millis(20),
            name: "fast",
        });

        let (first, second) = tokio::join!(
            slow.request_change(&ws, "started first"),
            fast.request_change(&ws, "started second"),
        );
        first.unwrap();
        second.unwrap();

        let ws = ws.lock();
        assert_eq!(ws.tree().file_paths(), vec!["slow"]);
        // Both instructions went in before either reply came back
        let roles: Vec<&str> = ws
            .transcript()
            .entries()
            .iter()
            .map(|e| e.message.role.as_str())
            .collect();
        assert_eq!(roles, vec!["user", "user", "assistant", "assistant"]);
    }

    #[test]
    fn test_encoding_error_message() {
        let source = serde_json::from_str::<Value>("{").unwrap_err();
        let message = AgentError::Encoding(source).to_string();
        assert!(message.starts_with("could not encode the current tree"));
        assert!(!message.contains("save"));
    }
}
