//! Shared data model for the sandbox mirror.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a mirrored file holds text or raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Binary,
}

/// Content of a mirrored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Empty content of the given kind.
    pub fn empty(kind: FileKind) -> Self {
        match kind {
            FileKind::Text => Self::Text(String::new()),
            FileKind::Binary => Self::Binary(Vec::new()),
        }
    }

    pub fn kind(&self) -> FileKind {
        match self {
            Self::Text(_) => FileKind::Text,
            Self::Binary(_) => FileKind::Binary,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A file in the sandbox, keyed by its normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxFile {
    /// Forward-slash path relative to the sandbox root
    pub path: String,
    pub content: FileContent,
}

impl SandboxFile {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Text(content.into()),
        }
    }

    pub fn binary(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Binary(content),
        }
    }

    /// Placeholder standing in for content that has not been transferred.
    pub fn placeholder(path: impl Into<String>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            content: FileContent::empty(kind),
        }
    }

    pub fn kind(&self) -> FileKind {
        self.content.kind()
    }

    pub fn is_binary(&self) -> bool {
        self.kind() == FileKind::Binary
    }
}

/// Kind of a published change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Change,
    Remove,
}

/// Change notification published to in-process subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub paths: Vec<String>,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
}

impl ChangeEvent {
    /// A single-path event stamped with the current time.
    pub fn now(change_type: ChangeType, path: impl Into<String>) -> Self {
        Self {
            change_type,
            paths: vec![path.into()],
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Web routing convention detected in the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterType {
    /// `app/` directory router; root layout is `layout.*`
    App,
    /// `pages/` directory router; root layout is `_app.*`
    Pages,
}

impl RouterType {
    /// File stem of the root layout for this convention.
    pub fn layout_file_name(&self) -> &'static str {
        match self {
            Self::App => "layout",
            Self::Pages => "_app",
        }
    }
}

impl fmt::Display for RouterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::Pages => write!(f, "pages"),
        }
    }
}

/// Routing convention plus the directory it is rooted at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(rename = "type")]
    pub router_type: RouterType,
    pub base_path: String,
}

impl RouterConfig {
    pub fn new(router_type: RouterType, base_path: impl Into<String>) -> Self {
        Self {
            router_type,
            base_path: base_path.into(),
        }
    }
}

/// Zero-based line/column position (column counted in bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Source span of an opening or closing tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRange {
    pub start: Position,
    pub end: Position,
}

/// Location of an identified syntax construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateNode {
    pub oid: String,
    pub path: String,
    pub start_tag: TagRange,
    /// Absent for self-closing elements
    pub end_tag: Option<TagRange>,
    /// Name of the component declaration enclosing the element
    pub component: Option<String>,
}

impl TemplateNode {
    /// End of the whole element.
    pub fn end(&self) -> Position {
        self.end_tag.map(|tag| tag.end).unwrap_or(self.start_tag.end)
    }
}

/// Concrete instance resolved among repeated children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInstance {
    pub instance_id: String,
    pub component: String,
}
