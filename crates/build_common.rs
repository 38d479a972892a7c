// README-to-rustdoc transformation shared by every crate's build.rs.
// Include with: include!("../build_common.rs");
//
// Required imports in the including file:
//   use std::env;
//   use std::fs;
//   use std::path::Path;

/// Write `OUT_DIR/README_GENERATED.md` from the crate's README.md.
///
/// Links are rewritten so they resolve from rustdoc:
/// 1. `](src/x/y.rs)` becomes `](x/y)`, a module link
/// 2. `](../other-crate/...)` points at the sibling crate in the repository
/// 3. `](../../README.md)` points at the repository root
fn process_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");
    println!("cargo:rerun-if-changed=../../Cargo.toml");

    let readme_path = Path::new(crate_dir).join("README.md");
    let Ok(content) = fs::read_to_string(&readme_path) else {
        return;
    };

    let repo_url = get_workspace_repo_url(crate_dir);
    let mut rustdoc_content = String::with_capacity(content.len());
    for line in content.lines() {
        rustdoc_content.push_str(&rewrite_links(line, repo_url.as_deref()));
        rustdoc_content.push('\n');
    }

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("README_GENERATED.md");
    fs::write(dest_path, rustdoc_content).unwrap();
}

fn rewrite_links(line: &str, repo_url: Option<&str>) -> String {
    let mut out = line.to_string();
    if let Some(url) = repo_url {
        out = out.replace("](../../README.md", &format!("]({url}"));
        out = out.replace("](../", &format!("]({url}/tree/main/crates/"));
    }
    // Repository links keep their file paths; local ones become module paths.
    if out.contains("](src/") {
        out = out.replace("](src/", "](").replace(".rs)", ")");
    }
    out
}

/// `repository = "..."` from the workspace Cargo.toml.
fn get_workspace_repo_url(crate_dir: &str) -> Option<String> {
    let workspace_toml = Path::new(crate_dir)
        .parent()? // crates/
        .parent()? // workspace root
        .join("Cargo.toml");

    let content = fs::read_to_string(workspace_toml).ok()?;
    content.lines().map(str::trim).find_map(|line| {
        let value = line.strip_prefix("repository")?.trim_start().strip_prefix('=')?;
        let value = value.trim().strip_prefix('"')?;
        let end = value.find('"')?;
        Some(value[..end].trim_end_matches('/').to_string())
    })
}
