//! Identifier injection and the identifier table.
//!
//! The mapper assigns every JSX element a stable identifier attribute, records
//! where each identified element lives, and resolves identifiers back to code.
//! It never touches the file cache; callers persist the rewritten content.

use std::collections::{HashMap, HashSet};

use parking_lot::{Mutex, RwLock};
use sandsync_core::config::{DEFAULT_INSTRUMENTED_EXTENSIONS, DEFAULT_PRELOAD_SCRIPT_SRC};
use sandsync_core::paths::{is_instrumented_path, is_root_layout_file, normalize_path};
use sandsync_core::{ChildInstance, Result, RouterType, SyncConfig, SyncError, TemplateNode};
use tracing::{debug, trace, warn};
use tree_sitter::Node;

use crate::edits::{apply_edits, slice_between, tag_range, SourceEdit};
use crate::jsx::{collect_elements, enclosing_component, JsxElement};
use crate::oid::OidGenerator;
use crate::tree_sitter_wrapper::{SourceDialect, TreeSitterWrapper};

/// Mapper settings.
#[derive(Debug, Clone)]
pub struct MapperOptions {
    pub oid_attribute: String,
    pub oid_length: usize,
    pub inject_preload_script: bool,
    pub preload_script_src: String,
    pub instrumented_extensions: Vec<String>,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            oid_attribute: "data-oid".to_string(),
            oid_length: 7,
            inject_preload_script: true,
            preload_script_src: DEFAULT_PRELOAD_SCRIPT_SRC.to_string(),
            instrumented_extensions: DEFAULT_INSTRUMENTED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl MapperOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            oid_attribute: config.mapper().oid_attribute.clone(),
            oid_length: config.mapper().oid_length,
            inject_preload_script: config.mapper().inject_preload_script,
            preload_script_src: config.sync().preload_script_src.clone(),
            instrumented_extensions: config.sync().instrumented_extensions.clone(),
        }
    }
}

/// Outcome of running the mapper over one file.
#[derive(Debug)]
pub struct MappingResult {
    pub modified: bool,
    pub new_content: String,
    /// Identified elements of `new_content`, not yet recorded in the table
    pub nodes: Vec<TemplateNode>,
    /// Set when the file was left unchanged because it could not be processed
    pub error: Option<SyncError>,
}

impl MappingResult {
    fn failed(content: &str, error: SyncError) -> Self {
        Self {
            modified: false,
            new_content: content.to_string(),
            nodes: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Identifier table: oid -> node, plus the oids each path owns.
#[derive(Debug, Default)]
struct NodeTable {
    nodes: HashMap<String, TemplateNode>,
    by_path: HashMap<String, HashSet<String>>,
}

impl NodeTable {
    fn owner(&self, oid: &str) -> Option<&str> {
        self.nodes.get(oid).map(|node| node.path.as_str())
    }

    fn remove_path(&mut self, path: &str) -> usize {
        let Some(oids) = self.by_path.remove(path) else {
            return 0;
        };
        let mut removed = 0;
        for oid in oids {
            // Only drop entries this path still owns
            if self.owner(&oid) == Some(path) {
                self.nodes.remove(&oid);
                removed += 1;
            }
        }
        removed
    }

    fn replace_path(&mut self, path: &str, nodes: Vec<TemplateNode>) {
        self.remove_path(path);

        let mut owned = HashSet::with_capacity(nodes.len());
        for node in nodes {
            if let Some(previous) = self.nodes.get(&node.oid) {
                if previous.path != path {
                    if let Some(oids) = self.by_path.get_mut(&previous.path) {
                        oids.remove(&node.oid);
                    }
                }
            }
            owned.insert(node.oid.clone());
            self.nodes.insert(node.oid.clone(), node);
        }
        if !owned.is_empty() {
            self.by_path.insert(path.to_string(), owned);
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.by_path.clear();
    }
}

/// Assigns and tracks element identifiers across the sandbox's source files.
pub struct TemplateNodeMapper {
    options: MapperOptions,
    generator: OidGenerator,
    parser: Mutex<TreeSitterWrapper>,
    table: RwLock<NodeTable>,
}

impl TemplateNodeMapper {
    pub fn new(options: MapperOptions) -> Result<Self> {
        Ok(Self {
            generator: OidGenerator::new(options.oid_length),
            parser: Mutex::new(TreeSitterWrapper::new()?),
            table: RwLock::new(NodeTable::default()),
            options,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(MapperOptions::from_config(config))
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// Ensure every element in `content` carries a unique identifier and
    /// record the resulting elements.
    ///
    /// Root layout files additionally receive the preload script element.
    /// Unsupported or unparsable input is returned unchanged with `error` set.
    pub fn process_file_for_mapping(
        &self,
        path: &str,
        content: &str,
        router_type: Option<RouterType>,
    ) -> MappingResult {
        let mut result = self.map_file(path, content, router_type);
        if result.is_ok() {
            self.commit_nodes(path, std::mem::take(&mut result.nodes));
        }
        result
    }

    /// Plan the rewrite of `content` without touching the identifier table.
    ///
    /// Callers that persist the rewrite first pass `nodes` to
    /// [`commit_nodes`](Self::commit_nodes) once the write has landed.
    pub fn map_file(&self, path: &str, content: &str, router_type: Option<RouterType>) -> MappingResult {
        let path = normalize_path(path);

        if !is_instrumented_path(&path, &self.options.instrumented_extensions) {
            return MappingResult::failed(
                content,
                SyncError::unsupported(format!("{} is not an instrumented source type", path)),
            );
        }

        match self.map_source(&path, content, router_type) {
            Ok((new_content, nodes)) => {
                let modified = new_content != content;
                debug!(
                    "Mapped {} ({} nodes, modified: {})",
                    path,
                    nodes.len(),
                    modified
                );
                MappingResult {
                    modified,
                    new_content,
                    nodes,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Skipping identifier mapping for {}: {}", path, e);
                MappingResult::failed(content, e)
            }
        }
    }

    /// Replace everything recorded for `path` with `nodes`.
    pub fn commit_nodes(&self, path: &str, nodes: Vec<TemplateNode>) {
        self.table.write().replace_path(&normalize_path(path), nodes);
    }

    fn map_source(
        &self,
        path: &str,
        content: &str,
        router_type: Option<RouterType>,
    ) -> Result<(String, Vec<TemplateNode>)> {
        let dialect = SourceDialect::for_path(path);
        let mut parser = self.parser.lock();

        let tree = parser.parse_strict(content, dialect)?;
        let elements = collect_elements(tree.root_node());

        let (mut edits, assigned) = self.plan_identifier_edits(path, content, &elements);
        if self.options.inject_preload_script
            && is_root_layout_file(path, router_type, &self.options.instrumented_extensions)
        {
            if let Some(edit) = self.plan_preload_injection(path, content, &elements, &assigned) {
                edits.push(edit);
            }
        }

        if edits.is_empty() {
            let nodes = self.collect_nodes(path, content, tree.root_node());
            return Ok((content.to_string(), nodes));
        }

        trace!("Applying {} edits to {}", edits.len(), path);
        let new_content = apply_edits(content, &edits)?;
        let new_tree = parser
            .parse_strict(&new_content, dialect)
            .map_err(|e| SyncError::mapping(format!("Rewritten source no longer parses: {}", e)))?;
        let nodes = self.collect_nodes(path, &new_content, new_tree.root_node());

        Ok((new_content, nodes))
    }

    /// Insertions for missing identifiers and replacements for duplicated ones.
    ///
    /// Also returns every identifier the file will carry once edits are applied.
    fn plan_identifier_edits(
        &self,
        path: &str,
        content: &str,
        elements: &[JsxElement<'_>],
    ) -> (Vec<SourceEdit>, HashSet<String>) {
        let attribute = self.options.oid_attribute.as_str();
        let table = self.table.read();
        let owned_elsewhere = |oid: &str| matches!(table.owner(oid), Some(owner) if owner != path);

        let present: HashSet<String> = elements
            .iter()
            .filter_map(|el| el.attribute(attribute, content))
            .filter_map(|attr| attr.value)
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut edits = Vec::new();

        for element in elements.iter().filter(|el| !el.is_fragment(content)) {
            let Some(anchor) = element.insert_anchor() else {
                continue;
            };
            let existing = element.attribute(attribute, content);

            if let Some(value) = existing.as_ref().and_then(|attr| attr.value.as_deref()) {
                if !value.is_empty() && !seen.contains(value) && !owned_elsewhere(value) {
                    seen.insert(value.to_string());
                    continue;
                }
            }

            let oid = self.generator.generate(path, anchor, |candidate| {
                seen.contains(candidate) || present.contains(candidate) || owned_elsewhere(candidate)
            });
            let attr_text = format!("{}=\"{}\"", attribute, oid);

            let edit = match existing {
                Some(attr) => SourceEdit::replace(attr.node.start_byte(), attr.node.end_byte(), attr_text),
                None => SourceEdit::insert(anchor, format!(" {}", attr_text)),
            };
            seen.insert(oid);
            edits.push(edit);
        }

        seen.extend(present);
        (edits, seen)
    }

    /// Script element appended to `<body>` when no element loads the preload script yet.
    fn plan_preload_injection(
        &self,
        path: &str,
        content: &str,
        elements: &[JsxElement<'_>],
        assigned: &HashSet<String>,
    ) -> Option<SourceEdit> {
        let src = self.options.preload_script_src.as_str();

        let already_loaded = elements.iter().any(|el| {
            el.attribute("src", content)
                .and_then(|attr| attr.value)
                .map(|value| value.contains(src))
                .unwrap_or(false)
        });
        if already_loaded {
            return None;
        }

        let Some(body) = elements
            .iter()
            .find(|el| el.name(content) == Some("body") && el.close.is_some())
        else {
            debug!("No <body> element in root layout {}, preload script not injected", path);
            return None;
        };
        let close = body.close?;

        let table = self.table.read();
        let oid = self.generator.generate(path, close.start_byte(), |candidate| {
            assigned.contains(candidate) || matches!(table.owner(candidate), Some(owner) if owner != path)
        });

        debug!("Injecting preload script into {}", path);
        Some(SourceEdit::insert(
            close.start_byte(),
            format!(
                "<script src=\"{}\" type=\"module\" {}=\"{}\" />",
                src, self.options.oid_attribute, oid
            ),
        ))
    }

    fn collect_nodes(&self, path: &str, content: &str, root: Node<'_>) -> Vec<TemplateNode> {
        let attribute = self.options.oid_attribute.as_str();

        collect_elements(root)
            .into_iter()
            .filter(|el| !el.is_fragment(content))
            .filter_map(|el| {
                let oid = el.attribute(attribute, content)?.value?;
                Some(TemplateNode {
                    oid,
                    path: path.to_string(),
                    start_tag: tag_range(&el.open),
                    end_tag: el.close.as_ref().map(tag_range),
                    component: enclosing_component(el.node, content),
                })
            })
            .collect()
    }

    pub fn get_template_node(&self, oid: &str) -> Option<TemplateNode> {
        self.table.read().nodes.get(oid).cloned()
    }

    /// Resolve the `index`-th element named `child.component` inside a code block.
    ///
    /// Returns `None` when the block does not parse, the child has no
    /// component name, the index is out of range or the match has no identifier.
    pub fn get_template_node_child(
        &self,
        code_block: &str,
        child: &TemplateNode,
        index: Option<usize>,
    ) -> Option<ChildInstance> {
        let component = child.component.as_deref()?;
        let tree = match self.parser.lock().parse_strict(code_block, SourceDialect::Tsx) {
            Ok(tree) => tree,
            Err(e) => {
                debug!("Code block for child lookup does not parse: {}", e);
                return None;
            }
        };

        let instance = collect_elements(tree.root_node())
            .into_iter()
            .filter(|el| el.name(code_block) == Some(component))
            .nth(index.unwrap_or(0))?;

        let instance_id = instance
            .attribute(&self.options.oid_attribute, code_block)?
            .value?;

        Some(ChildInstance {
            instance_id,
            component: component.to_string(),
        })
    }

    /// Source text of an element, from its opening tag to its closing tag.
    pub fn get_code_block(&self, node: &TemplateNode, content: &str) -> Option<String> {
        slice_between(content, node.start_tag.start, node.end()).map(str::to_string)
    }

    pub fn nodes_for_path(&self, path: &str) -> Vec<TemplateNode> {
        let path = normalize_path(path);
        let table = self.table.read();
        let mut nodes: Vec<TemplateNode> = table
            .by_path
            .get(&path)
            .map(|oids| oids.iter().filter_map(|oid| table.nodes.get(oid).cloned()).collect())
            .unwrap_or_default();
        nodes.sort_by_key(|node| node.start_tag.start);
        nodes
    }

    /// Forget every identifier recorded for `path`; returns how many were dropped.
    pub fn remove_path(&self, path: &str) -> usize {
        self.table.write().remove_path(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.table.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.table.write().clear();
    }
}

impl std::fmt::Debug for TemplateNodeMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateNodeMapper")
            .field("options", &self.options)
            .field("nodes", &self.len())
            .finish()
    }
}
