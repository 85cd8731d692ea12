//! Tree-sitter parser for TSX/TypeScript sources.

use sandsync_core::{Result, SyncError};
use tree_sitter::{Language, Parser, Tree};

/// Grammar used for a given source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDialect {
    /// JSX-capable grammar, used for `.tsx`, `.jsx` and `.js`
    Tsx,
    /// Plain TypeScript; `<T>expr` casts would not parse as TSX
    TypeScript,
}

impl SourceDialect {
    pub fn for_path(path: &str) -> Self {
        match sandsync_core::paths::extension_of(path) {
            Some(ext) if ext.eq_ignore_ascii_case("ts") => Self::TypeScript,
            _ => Self::Tsx,
        }
    }

    fn language(&self) -> Language {
        match self {
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
    }
}

/// Wrapper around a tree-sitter parser holding both grammars.
pub struct TreeSitterWrapper {
    tsx: Parser,
    typescript: Parser,
}

impl TreeSitterWrapper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tsx: Self::parser_for(SourceDialect::Tsx)?,
            typescript: Self::parser_for(SourceDialect::TypeScript)?,
        })
    }

    fn parser_for(dialect: SourceDialect) -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&dialect.language())
            .map_err(|e| SyncError::internal(format!("Failed to set parser language: {}", e)))?;
        Ok(parser)
    }

    /// Parse source code and return the syntax tree, even if it contains errors.
    pub fn parse(&mut self, source: &str, dialect: SourceDialect) -> Result<Tree> {
        let parser = match dialect {
            SourceDialect::Tsx => &mut self.tsx,
            SourceDialect::TypeScript => &mut self.typescript,
        };
        parser
            .parse(source, None)
            .ok_or_else(|| SyncError::parse("Failed to parse source code"))
    }

    /// Parse source code, rejecting trees with syntax errors.
    pub fn parse_strict(&mut self, source: &str, dialect: SourceDialect) -> Result<Tree> {
        let tree = self.parse(source, dialect)?;
        let root = tree.root_node();
        if root.has_error() {
            let position = first_error_position(root)
                .map(|p| format!(" near line {}, column {}", p.row + 1, p.column + 1))
                .unwrap_or_default();
            return Err(SyncError::parse(format!("Source has syntax errors{}", position)));
        }
        Ok(tree)
    }
}

fn first_error_position(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Point> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(point) = first_error_position(child) {
                return Some(point);
            }
        }
    }
    None
}
