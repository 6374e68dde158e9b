//! Command-line front end for the editor shell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use providers::ProviderRouter;
use services::workspace::TranscriptEntry;
use services::{
    parse_github_url, GitHubImporter, ImportError, JsonFileStore, KeyValueStore, TreeAgent,
    Workspace,
};
use shared::settings::AppSettings;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::settings::{config_path, load_settings_or_default};

/// Code Shell - file tree editor with model-driven restructuring
#[derive(Parser)]
#[command(name = "codeshell", version, about)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the file tree.
    Tree,

    /// Print one file's content.
    Cat { path: String },

    /// Replace one file's content (reads stdin without --content).
    Write {
        path: String,
        #[arg(long)]
        content: Option<String>,
    },

    /// Open a file in a tab and focus it.
    Open { path: String },

    /// Close a tab.
    Close { path: String },

    /// Focus a tab that is already open.
    Focus { path: String },

    /// List open tabs.
    Tabs,

    /// Print the focused tab.
    Show,

    /// Replace the focused tab's content (reads stdin without --content).
    Edit {
        #[arg(long)]
        content: Option<String>,
    },

    /// Toggle read-only mode for the editor.
    ReadOnly { mode: Toggle },

    /// Ask the model to restructure the tree.
    Chat { instruction: String },

    /// Replace the tree with a GitHub repository snapshot.
    Import {
        url: String,
        #[arg(long)]
        branch: Option<String>,
    },

    /// Drop the tree and every tab.
    Reset,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings_path = self.config.or_else(config_path);
        let settings = load_settings_or_default(settings_path.as_deref());

        let data_file = settings
            .storage
            .data_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(JsonFileStore::default_path);
        let mut ws = Workspace::load(JsonFileStore::open(data_file));

        match self.command {
            Commands::Tree => print!("{}", tree_listing(&ws)),
            Commands::Cat { path } => println!("{}", ws.read_file(&path)?),
            Commands::Write { path, content } => {
                let content = content_or_stdin(content).await?;
                ws.write_file(&path, &content)?;
            }
            Commands::Open { path } => ws.open_file(&path)?,
            Commands::Close { path } => ws.close_file(&path)?,
            Commands::Focus { path } => {
                if !ws.activate(&path)? {
                    println!("{} is not open", path);
                }
            }
            Commands::Tabs => print!("{}", tab_listing(&ws)),
            Commands::Show => match (ws.session().active_file.as_deref(), ws.active_content()) {
                (Some(path), Some(content)) => {
                    let language = ws.active_language().unwrap_or("plaintext");
                    println!("── {} [{}]", path, language);
                    println!("{}", content);
                }
                _ => println!("No file selected"),
            },
            Commands::Edit { content } => {
                let content = content_or_stdin(content).await?;
                ws.edit_active(&content)?;
            }
            Commands::ReadOnly { mode } => ws.set_read_only(matches!(mode, Toggle::On))?,
            Commands::Chat { instruction } => chat(ws, &settings, &instruction).await?,
            Commands::Import { url, branch } => {
                import(&mut ws, &settings, &url, branch.as_deref()).await?
            }
            Commands::Reset => ws.reset()?,
        }
        Ok(())
    }
}

async fn content_or_stdin(content: Option<String>) -> Result<String> {
    match content {
        Some(content) => Ok(content),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading content from stdin")?;
            Ok(buf)
        }
    }
}

fn tree_listing<S: KeyValueStore>(ws: &Workspace<S>) -> String {
    if ws.tree().is_empty() {
        "(empty)\n".to_string()
    } else {
        ws.tree().render()
    }
}

fn tab_listing<S: KeyValueStore>(ws: &Workspace<S>) -> String {
    let session = ws.session();
    let mut out = String::new();
    for file in &session.open_files {
        let marker = if session.active_file.as_deref() == Some(file.as_str()) {
            '*'
        } else {
            ' '
        };
        out.push_str(&format!("{} {}\n", marker, file));
    }
    if session.read_only {
        out.push_str("(read-only)\n");
    }
    out
}

fn format_entry(entry: &TranscriptEntry) -> String {
    format!(
        "[{}] {}: {}",
        entry.at.format("%H:%M"),
        entry.message.role,
        entry.message.content
    )
}

async fn chat<S: KeyValueStore>(
    ws: Workspace<S>,
    settings: &AppSettings,
    instruction: &str,
) -> Result<()> {
    let ws = Mutex::new(ws);
    let router = ProviderRouter::new(settings.model.clone());
    info!(
        provider = router.active_provider().unwrap_or("none"),
        "sending change request"
    );
    let agent = TreeAgent::new(router);
    let outcome = agent.request_change(&ws, instruction).await;

    let ws = ws.into_inner();
    for entry in ws.transcript().entries() {
        println!("{}", format_entry(entry));
    }
    if outcome.is_ok() {
        print!("{}", tree_listing(&ws));
    }
    outcome.map_err(anyhow::Error::from)
}

async fn import<S: KeyValueStore>(
    ws: &mut Workspace<S>,
    settings: &AppSettings,
    url: &str,
    branch: Option<&str>,
) -> Result<()> {
    let repo = parse_github_url(url).ok_or_else(|| ImportError::InvalidUrl(url.to_string()))?;
    let branch = branch.unwrap_or(&settings.import.default_branch);

    let importer = GitHubImporter::new(&settings.import)?;
    importer.import_into(ws, &repo, branch).await?;
    for line in ws.console().lines() {
        println!("{}", line);
    }
    Ok(())
}
