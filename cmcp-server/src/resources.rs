//! Disk-backed resource and prompt registries.
//!
//! Content is scanned from a directory at startup into an immutable
//! snapshot. A periodic rescan builds a fresh snapshot and swaps it in
//! under the writer lock; readers clone the current `Arc` once and serve
//! the whole request from it, so a swap never produces a partial read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use cmcp_proto::mcp::{
    GetPromptResult, PromptArgument, PromptContent, PromptDescriptor, PromptMessage,
    ResourceContents, ResourceDescriptor,
};
use serde_json::Value;

/// URI prefix for served resources.
const RESOURCE_URI_PREFIX: &str = "canton://docs/";

/// One loaded resource file.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Serving URI.
    pub uri: String,
    /// Display name (the file stem).
    pub name: String,
    /// First line of the content, as a description.
    pub description: Option<String>,
    /// MIME type inferred from the extension.
    pub mime_type: String,
    /// Full text content.
    pub text: String,
}

#[derive(Debug, Default)]
struct ResourceSnapshot {
    entries: Vec<Arc<ResourceEntry>>,
    by_uri: HashMap<String, Arc<ResourceEntry>>,
}

/// Read-only resource registry with atomic snapshot swap.
#[derive(Debug)]
pub struct ResourceStore {
    dir: PathBuf,
    snapshot: RwLock<Arc<ResourceSnapshot>>,
}

impl ResourceStore {
    /// Scans `dir` and builds the initial snapshot.
    ///
    /// A missing directory yields an empty store; content may appear on a
    /// later rescan.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let store = Self {
            dir: dir.to_owned(),
            snapshot: RwLock::new(Arc::new(ResourceSnapshot::default())),
        };
        store.reload();
        store
    }

    /// An empty store with no backing directory.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            dir: PathBuf::new(),
            snapshot: RwLock::new(Arc::new(ResourceSnapshot::default())),
        }
    }

    /// Rescans the directory and swaps the snapshot.
    pub fn reload(&self) {
        if self.dir.as_os_str().is_empty() {
            return;
        }

        let mut entries = Vec::new();
        for path in sorted_files(&self.dir) {
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push(Arc::new(ResourceEntry {
                uri: format!("{RESOURCE_URI_PREFIX}{name}"),
                description: first_line(&text),
                mime_type: mime_for(&path),
                name,
                text,
            }));
        }

        let by_uri = entries
            .iter()
            .map(|entry| (entry.uri.clone(), Arc::clone(entry)))
            .collect();

        let fresh = Arc::new(ResourceSnapshot { entries, by_uri });
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = fresh;
        }
    }

    /// Spawns the periodic rescan task.
    pub fn spawn_reload(self: Arc<Self>, interval: Duration) {
        let store = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.reload();
            }
        });
    }

    /// Lists all resources in name order.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceDescriptor> {
        self.current()
            .entries
            .iter()
            .map(|entry| ResourceDescriptor {
                uri: entry.uri.clone(),
                name: entry.name.clone(),
                description: entry.description.clone(),
                mime_type: Some(entry.mime_type.clone()),
            })
            .collect()
    }

    /// Reads one resource by URI.
    #[must_use]
    pub fn read(&self, uri: &str) -> Option<ResourceContents> {
        self.current().by_uri.get(uri).map(|entry| ResourceContents {
            uri: entry.uri.clone(),
            mime_type: Some(entry.mime_type.clone()),
            text: entry.text.clone(),
        })
    }

    /// Number of loaded resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    /// Returns `true` when no resources are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current(&self) -> Arc<ResourceSnapshot> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }
}

/// One loaded prompt template.
#[derive(Debug, Clone)]
pub struct PromptEntry {
    /// Prompt name (the file stem).
    pub name: String,
    /// First line of the template.
    pub description: Option<String>,
    /// Placeholder names appearing as `{{name}}` in the template.
    pub arguments: Vec<String>,
    /// Raw template text.
    pub template: String,
}

#[derive(Debug, Default)]
struct PromptSnapshot {
    entries: Vec<Arc<PromptEntry>>,
    by_name: HashMap<String, Arc<PromptEntry>>,
}

/// Read-only prompt registry with atomic snapshot swap.
#[derive(Debug)]
pub struct PromptStore {
    dir: PathBuf,
    snapshot: RwLock<Arc<PromptSnapshot>>,
}

impl PromptStore {
    /// Scans `dir` and builds the initial snapshot.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let store = Self {
            dir: dir.to_owned(),
            snapshot: RwLock::new(Arc::new(PromptSnapshot::default())),
        };
        store.reload();
        store
    }

    /// An empty store with no backing directory.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            dir: PathBuf::new(),
            snapshot: RwLock::new(Arc::new(PromptSnapshot::default())),
        }
    }

    /// Rescans the directory and swaps the snapshot.
    pub fn reload(&self) {
        if self.dir.as_os_str().is_empty() {
            return;
        }

        let mut entries = Vec::new();
        for path in sorted_files(&self.dir) {
            let Ok(template) = std::fs::read_to_string(&path) else {
                continue;
            };
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push(Arc::new(PromptEntry {
                description: first_line(&template),
                arguments: placeholders(&template),
                name,
                template,
            }));
        }

        let by_name = entries
            .iter()
            .map(|entry| (entry.name.clone(), Arc::clone(entry)))
            .collect();

        let fresh = Arc::new(PromptSnapshot { entries, by_name });
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = fresh;
        }
    }

    /// Spawns the periodic rescan task.
    pub fn spawn_reload(self: Arc<Self>, interval: Duration) {
        let store = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.reload();
            }
        });
    }

    /// Lists all prompts in name order.
    #[must_use]
    pub fn list(&self) -> Vec<PromptDescriptor> {
        self.current()
            .entries
            .iter()
            .map(|entry| PromptDescriptor {
                name: entry.name.clone(),
                description: entry.description.clone(),
                arguments: entry
                    .arguments
                    .iter()
                    .map(|arg| PromptArgument {
                        name: arg.clone(),
                        description: None,
                        required: false,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Renders one prompt, substituting `{{name}}` placeholders from
    /// string-valued arguments.
    #[must_use]
    pub fn get(&self, name: &str, arguments: &Value) -> Option<GetPromptResult> {
        let entry = self.current().by_name.get(name).cloned()?;

        let mut text = entry.template.clone();
        if let Some(map) = arguments.as_object() {
            for (key, value) in map {
                if let Some(replacement) = value.as_str() {
                    text = text.replace(&format!("{{{{{key}}}}}"), replacement);
                }
            }
        }

        Some(GetPromptResult {
            description: entry.description.clone(),
            messages: vec![PromptMessage {
                role: "user".to_owned(),
                content: PromptContent::Text { text },
            }],
        })
    }

    fn current(&self) -> Arc<PromptSnapshot> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }
}

/// Regular files in `dir`, sorted by name for deterministic listings.
fn sorted_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "content directory unavailable");
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(|line| line.trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(120).collect())
}

fn mime_for(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("daml") => "text/x-daml",
        _ => "text/plain",
    }
    .to_owned()
}

/// Collects `{{placeholder}}` names from a template, in order of first
/// appearance.
fn placeholders(template: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        let name = after[..close].trim();
        if !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !found.iter().any(|existing| existing == name)
        {
            found.push(name.to_owned());
        }
        rest = &after[close + 2..];
    }
    found
}
