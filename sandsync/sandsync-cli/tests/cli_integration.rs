//! End-to-end runs of the mirror against a directory on disk.

use std::path::Path;
use std::time::Duration;

use sandsync_cli::commands;
use sandsync_core::{ConfigProfile, RouterType, SyncConfig};
use tempfile::TempDir;

const LAYOUT: &str = r#"export default function RootLayout({ children }) {
  return (
    <html>
      <body>{children}</body>
    </html>
  );
}
"#;

const PAGE: &str = r#"export default function Home() {
  return (
    <main className="p-4">
      <h1>Welcome</h1>
    </main>
  );
}
"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let write = |path: &str, content: &[u8]| {
        let target = dir.path().join(path);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(target, content).unwrap();
    };
    write("app/layout.tsx", LAYOUT.as_bytes());
    write("app/page.tsx", PAGE.as_bytes());
    write("public/logo.png", &[0x89, 0x50, 0x4e, 0x47]);
    write("node_modules/dep/index.js", b"export default () => <div />;");
    write("package.json", b"{}");
    dir
}

fn read(root: &Path, path: &str) -> String {
    std::fs::read_to_string(root.join(path)).unwrap()
}

fn test_config() -> SyncConfig {
    SyncConfig::with_profile(ConfigProfile::Test)
}

#[tokio::test]
async fn test_index_instruments_project_in_place() {
    let dir = project();
    let (orchestrator, report) = commands::open(dir.path(), test_config()).await.unwrap();

    assert_eq!(report.files_discovered, 4);
    assert_eq!(report.binary_placeholders, 1);
    assert_eq!(report.files_rewritten, 2);
    assert!(report.errors.is_empty());
    assert_eq!(
        orchestrator.router_config().map(|config| config.router_type),
        Some(RouterType::App)
    );

    let page = read(dir.path(), "app/page.tsx");
    assert!(page.contains("<main data-oid=\""));
    assert!(page.contains("<h1 data-oid=\""));
    assert!(read(dir.path(), "app/layout.tsx").contains("sandbox-preload-script.js"));
    // Excluded and binary files are untouched
    assert_eq!(
        read(dir.path(), "node_modules/dep/index.js"),
        "export default () => <div />;"
    );
    assert_eq!(std::fs::read(dir.path().join("public/logo.png")).unwrap().len(), 4);

    orchestrator.clear().await;
}

#[tokio::test]
async fn test_reindex_is_stable() {
    let dir = project();
    let (orchestrator, _) = commands::open(dir.path(), test_config()).await.unwrap();
    orchestrator.clear().await;
    let first = read(dir.path(), "app/page.tsx");

    let (orchestrator, report) = commands::open(dir.path(), test_config()).await.unwrap();
    assert_eq!(report.files_rewritten, 0);
    assert_eq!(read(dir.path(), "app/page.tsx"), first);
    orchestrator.clear().await;
}

#[tokio::test]
async fn test_node_lookup() {
    let dir = project();
    let (orchestrator, _) = commands::open(dir.path(), test_config()).await.unwrap();

    let nodes = orchestrator.mapper().nodes_for_path("app/page.tsx");
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].component.as_deref(), Some("Home"));

    let block = orchestrator.get_code_block(&nodes[1].oid).await.unwrap();
    assert!(block.starts_with("<h1 data-oid="));
    assert!(block.ends_with("Welcome</h1>"));
    orchestrator.clear().await;
}

#[tokio::test]
async fn test_writes_reach_disk() {
    let dir = project();
    let (orchestrator, _) = commands::open(dir.path(), test_config()).await.unwrap();

    assert!(
        orchestrator
            .write_file("app/about/page.tsx", "export default () => <section>About</section>;")
            .await
    );
    let about = read(dir.path(), "app/about/page.tsx");
    assert!(about.contains("<section data-oid=\""));
    orchestrator.clear().await;
}

#[tokio::test]
async fn test_external_edit_is_instrumented() {
    let dir = project();
    let (orchestrator, _) = commands::open(dir.path(), test_config()).await.unwrap();
    assert!(orchestrator.is_watching().await);

    std::fs::write(
        dir.path().join("app/page.tsx"),
        "export default function Home() { return <footer>Bye</footer>; }",
    )
    .unwrap();

    let mut instrumented = false;
    for _ in 0..200 {
        if read(dir.path(), "app/page.tsx").contains("<footer data-oid=\"") {
            instrumented = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(instrumented, "watch pipeline did not instrument the edit");
    orchestrator.clear().await;
}

#[tokio::test]
async fn test_list_files_skips_excluded() {
    let dir = project();
    let config = test_config();
    let ignore = config.sync().excluded_directories.clone();
    let orchestrator = commands::build_orchestrator(config).unwrap();
    orchestrator
        .connect(std::sync::Arc::new(
            sandsync_cli::LocalDirRemote::new(dir.path()).unwrap(),
        ))
        .await;

    let files = orchestrator.list_files_recursively("", &ignore, &[]).await;
    assert_eq!(
        files,
        vec![
            "app/layout.tsx".to_string(),
            "app/page.tsx".to_string(),
            "package.json".to_string(),
            "public/logo.png".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sandsync.toml");

    commands::init_config(&path, ConfigProfile::Prod).await.unwrap();
    assert!(commands::init_config(&path, ConfigProfile::Prod).await.is_err());

    let config = commands::load_config(Some(&path), Some(ConfigProfile::Test))
        .await
        .unwrap();
    assert_eq!(config.profile(), ConfigProfile::Test);
    assert_eq!(config.mapper().oid_attribute, "data-oid");
}

#[tokio::test]
async fn test_missing_root_is_an_error() {
    let result = commands::open(Path::new("/no/such/sandbox"), test_config()).await;
    assert!(result.is_err());
}
