//! Rendering of command results.
//!
//! Every result type has a `render_*` function producing the human-readable
//! text and a printing function that picks between that text and JSON.

use std::fmt::{Display, Write as _};

use anyhow::Result;
use console::style;
use sandsync_core::{ChangeEvent, ChangeType, Position, RouterConfig, TemplateNode};
use sandsync_vfs::IndexReport;
use serde::Serialize;
use serde_json::json;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output for scripting
    Json,
}

pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Errors go to stderr.
pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

pub fn info(msg: impl Display) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-based `line:column`.
fn position(pos: Position) -> String {
    format!("{}:{}", pos.line + 1, pos.column + 1)
}

fn field(out: &mut String, key: &str, value: impl Display) {
    let _ = writeln!(out, "  {}: {}", style(key).cyan(), value);
}

// ============================================================================
// Index Report
// ============================================================================

pub fn render_report(report: &IndexReport, router: Option<&RouterConfig>) -> String {
    let mut out = format!(
        "{} Indexed in {}ms\n",
        style("✓").green().bold(),
        report.duration_ms
    );
    field(&mut out, "Files", report.files_discovered);
    field(&mut out, "Directories", report.directories_discovered);
    field(&mut out, "Cached", report.files_cached);
    field(&mut out, "Binary placeholders", report.binary_placeholders);
    field(&mut out, "Rewritten", report.files_rewritten);
    match router {
        Some(router) => field(
            &mut out,
            "Router",
            format!("{} ({})", router.router_type, router.base_path),
        ),
        None => field(&mut out, "Router", "not detected"),
    }

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\n{}", style("Errors").bold().underlined());
        for error in &report.errors {
            let _ = writeln!(out, "{} {}", style("⚠").yellow().bold(), error);
        }
    }
    out
}

pub fn report(report: &IndexReport, router: Option<&RouterConfig>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&json!({ "report": report, "router": router })),
        OutputFormat::Human => {
            print!("{}", render_report(report, router));
            Ok(())
        }
    }
}

// ============================================================================
// Identified Elements
// ============================================================================

/// Location of one element, followed by its source when known.
pub fn render_node(node: &TemplateNode, code: Option<&str>) -> String {
    let mut out = format!("\n{}\n", style(&node.oid).bold().underlined());
    field(&mut out, "File", &node.path);
    field(&mut out, "Start", position(node.start_tag.start));
    if let Some(end_tag) = node.end_tag {
        field(&mut out, "End", position(end_tag.end));
    }
    field(&mut out, "Component", node.component.as_deref().unwrap_or("-"));
    if let Some(code) = code {
        let _ = writeln!(out, "\n{}", code);
    }
    out
}

pub fn node(node: &TemplateNode, code: Option<&str>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&json!({ "node": node, "code": code })),
        OutputFormat::Human => {
            print!("{}", render_node(node, code));
            Ok(())
        }
    }
}

/// One row per element: identifier, position and enclosing component.
pub fn render_node_list(path: &str, nodes: &[TemplateNode]) -> String {
    if nodes.is_empty() {
        return format!(
            "{} No identified elements in {}\n",
            style("⚠").yellow().bold(),
            path
        );
    }

    let mut out = String::new();
    for node in nodes {
        let _ = writeln!(
            out,
            "{}  {:<8}  {}",
            style(&node.oid).cyan(),
            position(node.start_tag.start),
            node.component.as_deref().unwrap_or("-")
        );
    }
    out
}

pub fn node_list(path: &str, nodes: &[TemplateNode], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(nodes),
        OutputFormat::Human => {
            print!("{}", render_node_list(path, nodes));
            Ok(())
        }
    }
}

// ============================================================================
// Change Events And Listings
// ============================================================================

pub fn render_change(event: &ChangeEvent) -> String {
    let verb = match event.change_type {
        ChangeType::Change => style("changed").green(),
        ChangeType::Remove => style("removed").red(),
    };
    event
        .paths
        .iter()
        .map(|path| format!("{} {}\n", path, verb))
        .collect()
}

pub fn change(event: &ChangeEvent, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Human => {
            print!("{}", render_change(event));
            Ok(())
        }
    }
}

pub fn file_list(files: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(files),
        OutputFormat::Human => {
            for file in files {
                println!("{}", file);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandsync_core::{RouterType, TagRange};

    fn node(oid: &str, line: usize, component: Option<&str>) -> TemplateNode {
        let tag = TagRange {
            start: Position::new(line, 4),
            end: Position::new(line, 10),
        };
        TemplateNode {
            oid: oid.to_string(),
            path: "app/page.tsx".to_string(),
            start_tag: tag,
            end_tag: None,
            component: component.map(str::to_string),
        }
    }

    #[test]
    fn test_render_report() {
        let report = IndexReport {
            files_discovered: 4,
            files_rewritten: 2,
            errors: vec!["app/x.tsx: unreadable".to_string()],
            duration_ms: 12,
            ..Default::default()
        };
        let router = RouterConfig::new(RouterType::App, "src/app");

        let text = render_report(&report, Some(&router));
        assert!(text.contains("Indexed in 12ms"));
        assert!(text.contains("src/app"));
        assert!(text.contains("app/x.tsx: unreadable"));

        let text = render_report(&IndexReport::default(), None);
        assert!(text.contains("not detected"));
        assert!(!text.contains("Errors"));
    }

    #[test]
    fn test_render_node_is_one_based() {
        let text = render_node(&node("abc1234", 0, Some("Home")), Some("<main />"));
        assert!(text.contains("abc1234"));
        assert!(text.contains("1:5"));
        assert!(text.contains("Home"));
        assert!(text.ends_with("<main />\n"));
        assert!(!text.contains("End"));
    }

    #[test]
    fn test_render_node_list() {
        let nodes = vec![node("first01", 2, Some("Home")), node("second2", 5, None)];
        let text = render_node_list("app/page.tsx", &nodes);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("first01") && lines[0].contains("3:5"));
        assert!(lines[1].contains("second2") && lines[1].ends_with('-'));

        assert!(render_node_list("app/empty.tsx", &[]).contains("No identified elements in app/empty.tsx"));
    }

    #[test]
    fn test_render_change_lists_every_path() {
        let event = ChangeEvent {
            change_type: ChangeType::Remove,
            paths: vec!["app".to_string(), "app/page.tsx".to_string()],
            timestamp: 0,
        };
        let text = render_change(&event);
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|line| line.contains("removed")));
    }
}
