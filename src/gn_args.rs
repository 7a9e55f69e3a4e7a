//! GN args files.
//!
//! A solution's manifest may ask for a `.gni` file exposing some of its
//! variables to the build. With `gclient_gn_args_from` the solution defers
//! to one of its direct dependencies, whose manifest then supplies both the
//! file name and the variable list.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::GsyncError;
use crate::tree::{DependencyTree, NodeId};
use crate::utils::{atomic_write, ensure_dir};

/// A rendered GN args file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnArgsFile {
    /// Path relative to the checkout root
    pub path: String,
    pub contents: String,
}

/// Render the GN args file of every solution that declares one.
pub fn render_all(tree: &DependencyTree) -> Result<Vec<GnArgsFile>, GsyncError> {
    let mut files = Vec::new();
    for &solution in tree.solutions() {
        if let Some(file) = render_for_solution(tree, solution)? {
            files.push(file);
        }
    }
    Ok(files)
}

/// Node whose GN args settings apply to `solution`: the solution itself, or
/// the direct dependency named by its `gclient_gn_args_from`.
pub fn settings_source(tree: &DependencyTree, solution: NodeId) -> Result<NodeId, GsyncError> {
    let node = tree.node(solution);
    match &node.gn_args.from {
        Some(from) => node
            .children
            .iter()
            .copied()
            .find(|&child| tree.node(child).name == *from)
            .ok_or_else(|| {
                GsyncError::semantic(
                    &node.name,
                    format!("gclient_gn_args_from names '{from}', which is not a direct dependency"),
                )
            }),
        None => Ok(solution),
    }
}

fn render_for_solution(
    tree: &DependencyTree,
    solution: NodeId,
) -> Result<Option<GnArgsFile>, GsyncError> {
    let source = settings_source(tree, solution)?;
    let source_node = tree.node(source);
    let Some(path) = &source_node.gn_args.file else {
        return Ok(None);
    };

    let mut contents = format!(
        "# Generated from '{}/{}' by gsync. Do not edit.\n\n",
        source_node.name, source_node.deps_file
    );
    for name in &source_node.gn_args.args {
        let value = source_node.vars.get(name).ok_or_else(|| {
            GsyncError::semantic(
                &source_node.name,
                format!("gclient_gn_args lists '{name}', which is not a variable"),
            )
        })?;
        contents.push_str(&format!("{name} = {}\n", value.to_gn_literal()));
    }
    debug!("Rendered GN args for {} from {}", tree.node(solution).name, source_node.name);

    Ok(Some(GnArgsFile {
        path: path.clone(),
        contents,
    }))
}

/// Write rendered files under `root`.
pub fn write_all(root: &Path, files: &[GnArgsFile]) -> Result<()> {
    for file in files {
        let target = root.join(&file.path);
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        atomic_write(&target, file.contents.as_bytes())
            .with_context(|| format!("Failed to write GN args file {}", file.path))?;
        info!("Wrote {}", file.path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, SolutionSpec};
    use crate::manifest::ManifestParser;
    use tempfile::TempDir;

    fn tree_with(manifests: &[(&str, &str)]) -> DependencyTree {
        let mut tree = DependencyTree::with_solutions(
            &GlobalConfig::for_root("/checkout"),
            &[SolutionSpec::new("src", "https://example/src.git")],
        )
        .unwrap();
        for (name, text) in manifests {
            let id = tree.find(name).unwrap();
            let ctx = tree.parse_context(id);
            let parsed = ManifestParser::parse(&ctx, text).unwrap();
            tree.apply_parse(id, parsed).unwrap();
        }
        tree
    }

    #[test]
    fn test_render_from_solution() {
        let tree = tree_with(&[(
            "src",
            r#"
gclient_gn_args_file = "src/build/config/gclient_args.gni"
gclient_gn_args = ["build_with_chromium", "checkout_nacl", "mode"]

[vars]
build_with_chromium = true
checkout_nacl = false
mode = "release"
"#,
        )]);
        let files = render_all(&tree).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "src/build/config/gclient_args.gni");
        assert!(files[0].contents.starts_with("# Generated from 'src/DEPS'"));
        assert!(files[0].contents.contains("build_with_chromium = true\n"));
        assert!(files[0].contents.contains("checkout_nacl = false\n"));
        assert!(files[0].contents.contains("mode = \"release\"\n"));
    }

    #[test]
    fn test_render_from_dependency() {
        let tree = tree_with(&[
            (
                "src",
                "gclient_gn_args_from = \"src/v8\"\n[deps]\n\"src/v8\" = \"https://example/v8.git\"\n",
            ),
            (
                "src/v8",
                "gclient_gn_args_file = \"args.gni\"\ngclient_gn_args = [\"n\"]\n[vars]\nn = 3\n",
            ),
        ]);
        let files = render_all(&tree).unwrap();
        assert_eq!(files[0].path, "args.gni");
        assert!(files[0].contents.contains("n = 3\n"));
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let tree = tree_with(&[(
            "src",
            "gclient_gn_args_file = \"a.gni\"\ngclient_gn_args = [\"nope\"]\n",
        )]);
        assert!(matches!(render_all(&tree), Err(GsyncError::ManifestSemantic { .. })));
    }

    #[test]
    fn test_write_all() {
        let temp = TempDir::new().unwrap();
        let files = vec![GnArgsFile {
            path: "src/build/args.gni".to_string(),
            contents: "x = 1\n".to_string(),
        }];
        write_all(temp.path(), &files).unwrap();
        assert_eq!(
            std::fs::read_to_string(temp.path().join("src/build/args.gni")).unwrap(),
            "x = 1\n"
        );
    }
}
