//! Import a GitHub repository snapshot as a file tree.
//!
//! The recursive git tree listing gives the folder layout; each blob is then
//! fetched through the contents API and decoded. One unreadable blob becomes
//! an empty file rather than failing the whole import.

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::{self, StreamExt};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use shared::settings::ImportSettings;
use shared::tree::{Node, Tree};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::storage::{KeyValueStore, StoreError};
use crate::workspace::Workspace;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Invalid GitHub URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch repository tree: {0}")]
    Network(#[source] anyhow::Error),

    #[error("Invalid tree data received from GitHub.")]
    MalformedTree,

    #[error("could not save the imported tree: {0}")]
    Storage(#[source] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Accepts `http(s)://github.com/<owner>/<repo>[.git][/anything]`.
pub fn parse_github_url(input: &str) -> Option<RepoRef> {
    let url = Url::parse(input.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str() != Some("github.com") {
        return None;
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo).to_string();
    if repo.is_empty() {
        return None;
    }
    Some(RepoRef { owner, repo })
}

/// One row of the recursive tree listing
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    tree: Option<Vec<TreeEntry>>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// Decodes a contents API payload. Base64 bodies arrive wrapped at 60
/// columns; the line breaks are not part of the data.
pub fn decode_blob(content: &str, encoding: Option<&str>) -> anyhow::Result<String> {
    match encoding {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD.decode(compact)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Ok(content.to_string()),
    }
}

#[derive(Debug, Default)]
struct DraftFolder {
    name: String,
    folders: Vec<DraftFolder>,
    files: Vec<Node>,
}

impl DraftFolder {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Walks down `segments`, creating missing folders on the way.
    fn folder_mut(&mut self, segments: &[&str]) -> &mut DraftFolder {
        let Some((first, rest)) = segments.split_first() else {
            return self;
        };
        let idx = match self.folders.iter().position(|f| f.name == *first) {
            Some(idx) => idx,
            None => {
                self.folders.push(DraftFolder::named(first));
                self.folders.len() - 1
            }
        };
        self.folders[idx].folder_mut(rest)
    }

    /// Subfolders first, then files, each in listing order.
    fn into_children(self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .folders
            .into_iter()
            .map(|f| {
                let name = f.name.clone();
                Node::folder(name, f.into_children())
            })
            .collect();
        nodes.extend(self.files);
        nodes
    }
}

/// Assembles the forest under the repository root from a tree listing and
/// the fetched file contents. Blobs without fetched content come out empty.
pub fn build_forest(entries: &[TreeEntry], contents: &HashMap<String, String>) -> Tree {
    let mut root = DraftFolder::default();
    for entry in entries {
        let segments: Vec<&str> = entry.path.split('/').collect();
        match entry.kind.as_str() {
            "tree" => {
                root.folder_mut(&segments);
            }
            "blob" => {
                let Some((name, parents)) = segments.split_last() else {
                    continue;
                };
                let content = contents.get(&entry.path).cloned().unwrap_or_default();
                root.folder_mut(parents).files.push(Node::file(*name, content));
            }
            // Submodule commits and anything else have no content to show
            other => debug!(path = entry.path.as_str(), kind = other, "skipping entry"),
        }
    }
    Tree::new(root.into_children())
}

pub struct GitHubImporter {
    http: Client,
    api_base: Url,
    max_concurrent: usize,
    token: Option<String>,
}

impl GitHubImporter {
    pub fn new(settings: &ImportSettings) -> Result<Self, ImportError> {
        let api_base = Url::parse(&settings.api_base)
            .map_err(|e| ImportError::InvalidUrl(format!("{}: {}", settings.api_base, e)))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ImportError::Network(e.into()))?;
        Ok(Self {
            http,
            api_base,
            max_concurrent: settings.max_concurrent_fetches.max(1),
            token: settings.token.clone(),
        })
    }

    fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, ImportError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ImportError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let req = self
            .http
            .get(url)
            .header(USER_AGENT, "codeshell")
            .header(ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn fetch_listing(&self, repo: &RepoRef, branch: &str) -> Result<Vec<TreeEntry>, ImportError> {
        let mut url = self.endpoint([
            "repos",
            repo.owner.as_str(),
            repo.repo.as_str(),
            "git",
            "trees",
            branch,
        ])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let resp = self
            .get(url)
            .send()
            .await
            .map_err(|e| ImportError::Network(e.into()))?;
        if !resp.status().is_success() {
            return Err(ImportError::Network(anyhow!("{}", resp.status())));
        }
        let listing: TreeListing = resp
            .json()
            .await
            .map_err(|_| ImportError::MalformedTree)?;
        if listing.truncated {
            warn!(
                owner = repo.owner.as_str(),
                repo = repo.repo.as_str(),
                "tree listing was truncated by GitHub, import is partial"
            );
        }
        listing.tree.ok_or(ImportError::MalformedTree)
    }

    async fn fetch_blob(&self, repo: &RepoRef, branch: &str, path: &str) -> anyhow::Result<String> {
        let mut url = self
            .endpoint(
                ["repos", repo.owner.as_str(), repo.repo.as_str(), "contents"]
                    .into_iter()
                    .chain(path.split('/')),
            )
            .map_err(anyhow::Error::from)?;
        url.query_pairs_mut().append_pair("ref", branch);

        let resp = self.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("{}", resp.status()));
        }
        let body: ContentsResponse = resp.json().await?;
        decode_blob(&body.content.unwrap_or_default(), body.encoding.as_deref())
    }

    /// Fetches `repo` at `branch` and returns its top-level entries as a tree.
    pub async fn import(&self, repo: &RepoRef, branch: &str) -> Result<Tree, ImportError> {
        let entries = self.fetch_listing(repo, branch).await?;
        let blobs: Vec<&str> = entries
            .iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path.as_str())
            .collect();
        info!(
            owner = repo.owner.as_str(),
            repo = repo.repo.as_str(),
            branch,
            files = blobs.len(),
            "importing repository"
        );

        let contents: HashMap<String, String> = stream::iter(blobs)
            .map(|path| async move {
                let content = match self.fetch_blob(repo, branch, path).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(path, error = %e, "failed to fetch file content");
                        String::new()
                    }
                };
                (path.to_string(), content)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        Ok(build_forest(&entries, &contents))
    }

    /// Imports `repo` and swaps it in as the workspace tree, returning the
    /// file count. On any failure the workspace keeps its current tree.
    pub async fn import_into<S: KeyValueStore>(
        &self,
        ws: &mut Workspace<S>,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<usize, ImportError> {
        let tree = self.import(repo, branch).await?;
        let files = tree.file_paths().len();
        ws.replace_tree(tree).map_err(ImportError::Storage)?;
        ws.console_mut().log(format!(
            "Imported {}/{}@{} ({} files)",
            repo.owner, repo.repo, branch, files
        ));
        Ok(files)
    }
}
