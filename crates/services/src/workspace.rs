//! Editor workspace: open tabs, the read-only toggle, the console panel and
//! the chat transcript, all wired to one persistent file tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use shared::tree::{PathNotFound, Tree};
use std::fmt::Display;
use tracing::{debug, warn};

use crate::language::language_for;
use crate::storage::{KeyValueStore, PersistentTree, StoreError};

/// Key the editor session is stored under
pub const SESSION_KEY: &str = "editorSession";

const WELCOME: &str = "Console: welcome to the editor";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("the editor is read-only")]
    ReadOnly,

    #[error("no file is open")]
    NoActiveFile,

    #[error(transparent)]
    PathNotFound(#[from] PathNotFound),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<StoreError> for WorkspaceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PathNotFound(p) => WorkspaceError::PathNotFound(p),
            StoreError::Storage(e) => WorkspaceError::Storage(e),
        }
    }
}

/// Tab strip state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSession {
    pub open_files: Vec<String>,
    pub active_file: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

impl EditorSession {
    /// Opens `path` as a tab if needed and focuses it.
    pub fn open_file(&mut self, path: &str) {
        if !self.open_files.iter().any(|f| f == path) {
            self.open_files.push(path.to_string());
        }
        self.active_file = Some(path.to_string());
    }

    /// Closes the tab. Closing the focused tab moves focus to the first
    /// remaining one.
    pub fn close_file(&mut self, path: &str) {
        self.open_files.retain(|f| f != path);
        if self.active_file.as_deref() == Some(path) {
            self.active_file = self.open_files.first().cloned();
        }
    }

    /// Focuses an already open tab; returns false if it is not open.
    pub fn activate(&mut self, path: &str) -> bool {
        if self.open_files.iter().any(|f| f == path) {
            self.active_file = Some(path.to_string());
            true
        } else {
            false
        }
    }
}

/// Console panel lines
#[derive(Debug, Clone)]
pub struct Console {
    lines: Vec<String>,
}

impl Default for Console {
    fn default() -> Self {
        Self {
            lines: vec![WELCOME.to_string()],
        }
    }
}

impl Console {
    pub fn log(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub message: ChatMessage,
    pub is_error: bool,
    pub at: DateTime<Utc>,
}

/// Chat panel history
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn push(&mut self, message: ChatMessage) {
        self.entries.push(TranscriptEntry {
            message,
            is_error: false,
            at: Utc::now(),
        });
    }

    /// Records a failure as an assistant-visible line
    pub fn push_error(&mut self, err: &impl Display) {
        self.entries.push(TranscriptEntry {
            message: ChatMessage::assistant(format!("Error: {}", err)),
            is_error: true,
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }
}

pub struct Workspace<S> {
    tree: PersistentTree<S>,
    session: EditorSession,
    console: Console,
    transcript: Transcript,
}

impl<S: KeyValueStore> Workspace<S> {
    /// Loads tree and session from `backend`, defaulting whatever is missing.
    pub fn load(backend: S) -> Self {
        let tree = PersistentTree::load(backend);
        let session = tree
            .backend()
            .get(SESSION_KEY)
            .and_then(|text| match serde_json::from_str::<EditorSession>(&text) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(error = %e, "stored editor session is invalid, starting fresh");
                    None
                }
            })
            .unwrap_or_default();
        Self {
            tree,
            session,
            console: Console::default(),
            transcript: Transcript::default(),
        }
    }

    pub fn tree(&self) -> &Tree {
        self.tree.tree()
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub fn read_file(&self, path: &str) -> Result<&str, PathNotFound> {
        self.tree.resolve(path)
    }

    pub fn write_file(&mut self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        self.tree.write(path, content)?;
        Ok(())
    }

    /// Whole-tree swap. Tabs pointing at files that no longer exist stay
    /// open and simply show empty content.
    pub fn replace_tree(&mut self, tree: Tree) -> Result<(), StoreError> {
        self.tree.replace(tree)?;
        Ok(())
    }

    pub fn open_file(&mut self, path: &str) -> Result<(), WorkspaceError> {
        let mut next = self.session.clone();
        next.open_file(path);
        self.commit_session(next)?;
        self.console.log(format!("Opened {}", path));
        Ok(())
    }

    pub fn close_file(&mut self, path: &str) -> Result<(), WorkspaceError> {
        let mut next = self.session.clone();
        next.close_file(path);
        self.commit_session(next)?;
        self.console.log(format!("Closed {}", path));
        Ok(())
    }

    pub fn activate(&mut self, path: &str) -> Result<bool, WorkspaceError> {
        let mut next = self.session.clone();
        if !next.activate(path) {
            return Ok(false);
        }
        self.commit_session(next)?;
        Ok(true)
    }

    pub fn set_read_only(&mut self, read_only: bool) -> Result<(), WorkspaceError> {
        self.commit_session(EditorSession {
            read_only,
            ..self.session.clone()
        })
    }

    /// Content shown for the focused tab; unresolvable paths show as empty.
    pub fn active_content(&self) -> Option<&str> {
        let path = self.session.active_file.as_deref()?;
        Some(self.tree.resolve(path).unwrap_or(""))
    }

    /// Editor language for the focused tab
    pub fn active_language(&self) -> Option<&'static str> {
        let path = self.session.active_file.as_deref()?;
        let name = path.rsplit('/').next().unwrap_or(path);
        Some(language_for(name))
    }

    /// Saves an edit of the focused tab into the tree.
    pub fn edit_active(&mut self, content: &str) -> Result<(), WorkspaceError> {
        if self.session.read_only {
            return Err(WorkspaceError::ReadOnly);
        }
        let path = self
            .session
            .active_file
            .clone()
            .ok_or(WorkspaceError::NoActiveFile)?;
        self.tree.write(&path, content)?;
        debug!(path = path.as_str(), "active file saved");
        Ok(())
    }

    /// Drops the tree and all tabs. Either both are cleared in memory and
    /// storage, or nothing changes.
    pub fn reset(&mut self) -> Result<(), WorkspaceError> {
        let cleared = EditorSession {
            read_only: self.session.read_only,
            ..EditorSession::default()
        };
        store_session(self.tree.backend_mut(), &cleared)?;
        if let Err(e) = self.tree.replace(Tree::default()) {
            if let Err(restore) = store_session(self.tree.backend_mut(), &self.session) {
                warn!(error = %restore, "could not restore the stored editor session");
            }
            return Err(e.into());
        }
        self.session = cleared;
        self.console.log("Workspace cleared");
        Ok(())
    }

    /// Stores `next`, then makes it the live session.
    fn commit_session(&mut self, next: EditorSession) -> Result<(), WorkspaceError> {
        store_session(self.tree.backend_mut(), &next)?;
        self.session = next;
        Ok(())
    }
}

fn store_session<S: KeyValueStore>(
    backend: &mut S,
    session: &EditorSession,
) -> Result<(), WorkspaceError> {
    let json = serde_json::to_string(session).map_err(anyhow::Error::from)?;
    backend.set(SESSION_KEY, &json)?;
    Ok(())
}
