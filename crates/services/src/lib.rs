//! Services behind the editor shell: persistence, model-driven tree
//! changes, repository import and the editor workspace.

pub mod github_import;
pub mod language;
pub mod storage;
pub mod tree_agent;
pub mod workspace;

pub use github_import::{parse_github_url, GitHubImporter, ImportError, RepoRef};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, PersistentTree, StoreError};
pub use tree_agent::{AgentError, TreeAgent};
pub use workspace::{EditorSession, Workspace, WorkspaceError};
