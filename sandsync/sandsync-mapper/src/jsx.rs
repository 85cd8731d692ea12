//! JSX element extraction from TSX syntax trees.

use tree_sitter::Node;

const FRAGMENT_NAMES: &[&str] = &["Fragment", "React.Fragment"];

/// A JSX element: either `<a>...</a>` or `<a />`.
#[derive(Debug, Clone, Copy)]
pub struct JsxElement<'t> {
    /// Whole element node
    pub node: Node<'t>,
    /// Opening tag, or the element itself when self-closing
    pub open: Node<'t>,
    pub close: Option<Node<'t>>,
}

/// An attribute on an opening tag.
#[derive(Debug, Clone)]
pub struct JsxAttribute<'t> {
    pub node: Node<'t>,
    /// Literal value when the attribute is a plain string
    pub value: Option<String>,
}

impl<'t> JsxElement<'t> {
    fn from_node(node: Node<'t>) -> Option<Self> {
        match node.kind() {
            "jsx_element" => Some(Self {
                node,
                open: node.child_by_field_name("open_tag")?,
                close: node.child_by_field_name("close_tag"),
            }),
            "jsx_self_closing_element" => Some(Self {
                node,
                open: node,
                close: None,
            }),
            _ => None,
        }
    }

    fn name_node(&self) -> Option<Node<'t>> {
        self.open.child_by_field_name("name")
    }

    /// Tag name as written, e.g. `div` or `motion.div`; `None` for `<>`.
    pub fn name<'s>(&self, source: &'s str) -> Option<&'s str> {
        self.name_node().and_then(|n| source.get(n.byte_range()))
    }

    pub fn is_fragment(&self, source: &str) -> bool {
        match self.name(source) {
            None => true,
            Some(name) => FRAGMENT_NAMES.contains(&name),
        }
    }

    /// Byte offset right after the tag name (and type arguments, if any).
    pub fn insert_anchor(&self) -> Option<usize> {
        let name_end = self.name_node()?.end_byte();
        let type_args_end = self
            .open
            .child_by_field_name("type_arguments")
            .map(|n| n.end_byte())
            .unwrap_or(0);
        Some(name_end.max(type_args_end))
    }

    pub fn attributes(&self, source: &str) -> Vec<(String, JsxAttribute<'t>)> {
        let mut cursor = self.open.walk();
        self.open
            .named_children(&mut cursor)
            .filter(|child| child.kind() == "jsx_attribute")
            .filter_map(|attr| {
                let name_node = attr.named_child(0)?;
                let name = source.get(name_node.byte_range())?.to_string();
                let value = attr
                    .named_child(1)
                    .filter(|v| v.kind() == "string")
                    .and_then(|v| source.get(v.byte_range()))
                    .map(strip_quotes);
                Some((name, JsxAttribute { node: attr, value }))
            })
            .collect()
    }

    pub fn attribute(&self, name: &str, source: &str) -> Option<JsxAttribute<'t>> {
        self.attributes(source)
            .into_iter()
            .find(|(attr_name, _)| attr_name == name)
            .map(|(_, attr)| attr)
    }
}

fn strip_quotes(raw: &str) -> String {
    let trimmed = raw
        .strip_prefix(['"', '\''])
        .and_then(|s| s.strip_suffix(['"', '\'']))
        .unwrap_or(raw);
    trimmed.to_string()
}

/// All JSX elements under `root`, in document order.
pub fn collect_elements<'t>(root: Node<'t>) -> Vec<JsxElement<'t>> {
    let mut elements = Vec::new();
    collect_recursive(root, &mut elements);
    elements
}

fn collect_recursive<'t>(node: Node<'t>, elements: &mut Vec<JsxElement<'t>>) {
    if let Some(element) = JsxElement::from_node(node) {
        elements.push(element);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_recursive(child, elements);
    }
}

/// Name of the component declaration that encloses `node`.
///
/// Function and class declarations are matched by name, as are variables
/// bound to a function or a wrapped function such as `memo(() => ...)`.
pub fn enclosing_component(node: Node<'_>, source: &str) -> Option<String> {
    let mut current = node.parent();

    while let Some(candidate) = current {
        match candidate.kind() {
            "function_declaration" | "generator_function_declaration" | "class_declaration" => {
                return candidate
                    .child_by_field_name("name")
                    .and_then(|n| source.get(n.byte_range()))
                    .map(str::to_string);
            }
            "variable_declarator" => {
                let binds_function = candidate
                    .child_by_field_name("value")
                    .map(|value| {
                        matches!(
                            value.kind(),
                            "arrow_function" | "function_expression" | "function" | "call_expression"
                        )
                    })
                    .unwrap_or(false);
                if binds_function {
                    return candidate
                        .child_by_field_name("name")
                        .filter(|n| n.kind() == "identifier")
                        .and_then(|n| source.get(n.byte_range()))
                        .map(str::to_string);
                }
            }
            _ => {}
        }
        current = candidate.parent();
    }

    None
}
