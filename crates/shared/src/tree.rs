//! Virtual file tree.
//!
//! A [`Tree`] is an ordered forest of named files and folders addressed by
//! slash-delimited paths (`src/main.rs`). Lookups descend one level per
//! segment with exact, case-sensitive name matching; there is no `.` or `..`.
//!
//! The serialized form is the plain JSON array used for persistence and for
//! model-proposed replacements:
//!
//! ```json
//! [{"name": "a", "type": "folder", "children": [
//!     {"name": "b.txt", "type": "file", "content": "hi"}
//! ]}]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A file or folder in the forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    File {
        name: String,
        #[serde(default)]
        content: String,
    },
    Folder {
        name: String,
        #[serde(default)]
        children: Vec<Node>,
    },
}

impl Node {
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Node::File {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn folder(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Folder {
            name: name.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::File { name, .. } | Node::Folder { name, .. } => name,
        }
    }
}

/// Why a path failed to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    EmptyPath,
    /// No sibling carries this name at the current level
    NoSuchEntry { segment: String },
    /// A file was matched while segments remained
    DescendsIntoFile { segment: String },
    /// The full path names a folder, not a file
    EndsAtFolder,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::EmptyPath => write!(f, "empty path"),
            MissReason::NoSuchEntry { segment } => write!(f, "no entry named '{}'", segment),
            MissReason::DescendsIntoFile { segment } => {
                write!(f, "'{}' is a file and has no children", segment)
            }
            MissReason::EndsAtFolder => write!(f, "path names a folder"),
        }
    }
}

/// Path resolution failure. Callers treat every variant the same way; the
/// reason is carried for messages and logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("path not found: {path} ({reason})")]
pub struct PathNotFound {
    pub path: String,
    pub reason: MissReason,
}

impl PathNotFound {
    fn new(path: &str, reason: MissReason) -> Self {
        Self {
            path: path.to_string(),
            reason,
        }
    }
}

/// Ordered forest of root-level nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    nodes: Vec<Node>,
}

fn split_path(path: &str) -> Result<Vec<&str>, PathNotFound> {
    if path.is_empty() {
        return Err(PathNotFound::new(path, MissReason::EmptyPath));
    }
    Ok(path.split('/').collect())
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn lookup(&self, path: &str) -> Result<&Node, PathNotFound> {
        let segments = split_path(path)?;
        let mut level: &[Node] = &self.nodes;
        let last = segments.len() - 1;

        for (i, segment) in segments.iter().enumerate() {
            let node = level.iter().find(|n| n.name() == *segment).ok_or_else(|| {
                PathNotFound::new(
                    path,
                    MissReason::NoSuchEntry {
                        segment: segment.to_string(),
                    },
                )
            })?;
            if i == last {
                return Ok(node);
            }
            level = match node {
                Node::Folder { children, .. } => children.as_slice(),
                Node::File { .. } => {
                    return Err(PathNotFound::new(
                        path,
                        MissReason::DescendsIntoFile {
                            segment: segment.to_string(),
                        },
                    ))
                }
            };
        }
        Err(PathNotFound::new(path, MissReason::EmptyPath))
    }

    fn lookup_mut(&mut self, path: &str) -> Result<&mut Node, PathNotFound> {
        let segments = split_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(PathNotFound::new(path, MissReason::EmptyPath));
        };

        let mut level: &mut Vec<Node> = &mut self.nodes;
        for segment in parents {
            let node = level
                .iter_mut()
                .find(|n| n.name() == *segment)
                .ok_or_else(|| {
                    PathNotFound::new(
                        path,
                        MissReason::NoSuchEntry {
                            segment: segment.to_string(),
                        },
                    )
                })?;
            level = match node {
                Node::Folder { children, .. } => children,
                Node::File { .. } => {
                    return Err(PathNotFound::new(
                        path,
                        MissReason::DescendsIntoFile {
                            segment: segment.to_string(),
                        },
                    ))
                }
            };
        }

        level.iter_mut().find(|n| n.name() == *last).ok_or_else(|| {
            PathNotFound::new(
                path,
                MissReason::NoSuchEntry {
                    segment: last.to_string(),
                },
            )
        })
    }

    /// Content of the file at `path`.
    pub fn resolve_content(&self, path: &str) -> Result<&str, PathNotFound> {
        match self.lookup(path)? {
            Node::File { content, .. } => Ok(content),
            Node::Folder { .. } => Err(PathNotFound::new(path, MissReason::EndsAtFolder)),
        }
    }

    /// Returns a copy of the tree with the file at `path` holding `content`.
    /// `self` is never modified; on failure nothing is produced.
    pub fn write_content(&self, path: &str, content: &str) -> Result<Tree, PathNotFound> {
        // Resolve against the original first so a miss costs no clone.
        self.resolve_content(path)?;

        let mut updated = self.clone();
        if let Node::File { content: slot, .. } = updated.lookup_mut(path)? {
            *slot = content.to_string();
        }
        debug!(path, bytes = content.len(), "file content written");
        Ok(updated)
    }

    /// Every file's full path, in display order.
    pub fn file_paths(&self) -> Vec<String> {
        fn walk(nodes: &[Node], prefix: &str, out: &mut Vec<String>) {
            for node in nodes {
                let full = join(prefix, node.name());
                match node {
                    Node::File { .. } => out.push(full),
                    Node::Folder { children, .. } => walk(children, &full, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, "", &mut out);
        out
    }

    /// Paths at which two or more siblings share a name.
    pub fn sibling_conflicts(&self) -> Vec<String> {
        fn walk(nodes: &[Node], prefix: &str, out: &mut Vec<String>) {
            let mut seen: Vec<&str> = Vec::with_capacity(nodes.len());
            for node in nodes {
                let full = join(prefix, node.name());
                if seen.contains(&node.name()) {
                    if !out.contains(&full) {
                        out.push(full.clone());
                    }
                } else {
                    seen.push(node.name());
                }
                if let Node::Folder { children, .. } = node {
                    walk(children, &full, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, "", &mut out);
        out
    }

    /// Indented explorer listing. Folders carry a trailing `/`.
    pub fn render(&self) -> String {
        fn walk(nodes: &[Node], depth: usize, out: &mut String) {
            for node in nodes {
                out.push_str(&"  ".repeat(depth));
                out.push_str(node.name());
                match node {
                    Node::File { .. } => out.push('\n'),
                    Node::Folder { children, .. } => {
                        out.push_str("/\n");
                        walk(children, depth + 1, out);
                    }
                }
            }
        }
        let mut out = String::new();
        walk(&self.nodes, 0, &mut out);
        out
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Holder of the current tree value.
///
/// Single-file edits go through [`TreeStore::write`]; everything else is a
/// whole-value [`TreeStore::replace`]. Neither ever leaves a half-applied tree.
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    current: Tree,
}

impl TreeStore {
    pub fn new(tree: Tree) -> Self {
        Self { current: tree }
    }

    pub fn tree(&self) -> &Tree {
        &self.current
    }

    pub fn resolve(&self, path: &str) -> Result<&str, PathNotFound> {
        self.current.resolve_content(path)
    }

    pub fn write(&mut self, path: &str, content: &str) -> Result<(), PathNotFound> {
        self.current = self.current.write_content(path, content)?;
        Ok(())
    }

    /// Swaps in `tree` wholesale and hands back the previous value.
    pub fn replace(&mut self, tree: Tree) -> Tree {
        std::mem::replace(&mut self.current, tree)
    }

    pub fn snapshot(&self) -> Tree {
        self.current.clone()
    }
}
