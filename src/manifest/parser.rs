//! Turns a node's manifest into child specifications.
//!
//! The parser is pure: the caller supplies everything it needs about the
//! node in a [`ParseContext`] and receives a [`ParseResult`] to apply to the
//! tree. Nothing here touches the file system or the tree lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::condition::{combine, evaluate};
use crate::core::GsyncError;
use crate::hooks::HookSpec;
use crate::manifest::{DepType, DepsManifest, RecurseDep};
use crate::tree::node::NodeKind;
use crate::utils::paths;
use crate::vars::{VarMap, VariableResolver, substitute};

/// What the parser needs to know about the node being parsed.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    /// Node name
    pub name: String,
    /// Manifest file name used for this node
    pub deps_file: String,
    /// The node is a top-level solution
    pub is_solution: bool,
    /// The parent manifest used relative paths
    pub relative: bool,
    /// The node's stored (combined) condition
    pub condition: Option<String>,
    /// Target OS set inherited from the parent
    pub target_os: BTreeSet<String>,
    /// Target CPU set inherited from the parent
    pub target_cpu: BTreeSet<String>,
    /// Variables declared above this node, with the parent's values
    pub inherited: VarMap,
    /// The node's `custom_vars`
    pub custom_vars: VarMap,
    /// `custom_deps` of the owning solution
    pub custom_deps: BTreeMap<String, String>,
    /// `custom_hooks` of the node (solutions only)
    pub custom_hooks: Vec<HookSpec>,
}

/// A child dependency discovered in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    /// Checkout path relative to the root
    pub name: String,
    /// Url template before substitution
    pub raw_url: Option<String>,
    /// Expanded url; `None` when disabled
    pub url: Option<String>,
    /// Git or CIPD
    pub kind: NodeKind,
    /// Manifest file name to read inside the child
    pub deps_file: String,
    /// `deps_file` came from an explicit `recursedeps` entry
    pub explicit_deps_file: bool,
    /// Condition combined with the parent's
    pub condition: Option<String>,
    /// Whether the child is checked out at all
    pub should_process: bool,
    /// The declaring manifest used relative paths
    pub relative: bool,
}

/// GN args declarations of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GnArgsSettings {
    /// Output file relative to the root
    pub file: Option<String>,
    /// Variables to write
    pub args: Vec<String>,
    /// Dependency whose settings should be used instead
    pub from: Option<String>,
}

/// Everything a manifest contributes to its node.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Children sorted by name
    pub children: Vec<ChildSpec>,
    /// Post-sync hooks after `custom_hooks` were applied
    pub hooks: Vec<HookSpec>,
    /// Hooks run before the children are synced
    pub pre_deps_hooks: Vec<HookSpec>,
    /// Allowed hosts; empty means unrestricted
    pub allowed_hosts: BTreeSet<String>,
    /// The node's resolved variables
    pub vars: Arc<VarMap>,
    /// Variables declared by the manifest itself
    pub manifest_vars: VarMap,
    /// Names declared at or above this node
    pub declared_vars: BTreeSet<String>,
    /// `recursedeps` with rebased names; value is an explicit manifest file
    pub recursedeps: Option<BTreeMap<String, Option<String>>>,
    /// Explicit recursion limit
    pub recursion: Option<usize>,
    /// Effective target OS set
    pub target_os: BTreeSet<String>,
    /// Effective target CPU set
    pub target_cpu: BTreeSet<String>,
    /// The manifest declared `use_relative_paths`
    pub use_relative_paths: bool,
    /// GN args settings
    pub gn_args: GnArgsSettings,
}

/// Manifest parser.
pub struct ManifestParser;

impl ManifestParser {
    /// Parse raw manifest text for the node described by `ctx`.
    pub fn parse(ctx: &ParseContext, text: &str) -> Result<ParseResult, GsyncError> {
        let manifest = DepsManifest::from_toml(&ctx.name, &ctx.deps_file, text)?;
        Self::parse_manifest(ctx, manifest)
    }

    /// Interpret an already deserialized manifest.
    pub fn parse_manifest(
        ctx: &ParseContext,
        manifest: DepsManifest,
    ) -> Result<ParseResult, GsyncError> {
        if manifest.gclient_gn_args_file.is_some() && manifest.gclient_gn_args_from.is_some() {
            return Err(GsyncError::semantic(
                &ctx.name,
                "gclient_gn_args_from and gclient_gn_args_file are mutually exclusive",
            ));
        }

        let allowed_hosts = match &manifest.allowed_hosts {
            Some(hosts) if hosts.is_empty() => {
                return Err(GsyncError::semantic(&ctx.name, "allowed_hosts must not be empty"));
            }
            Some(hosts) => hosts.iter().cloned().collect(),
            None => BTreeSet::new(),
        };

        let prefix = if manifest.use_relative_paths {
            Some(ctx.name.clone())
        } else if ctx.relative {
            paths::dirname(&ctx.name)
        } else {
            None
        };
        let rebase = |name: &str| match &prefix {
            Some(p) => paths::join(p, name),
            None => paths::normalize(name),
        };

        let mut target_os = ctx.target_os.clone();
        target_os.extend(manifest.target_os.iter().cloned());
        let mut target_cpu = ctx.target_cpu.clone();
        target_cpu.extend(manifest.target_cpu.iter().cloned());

        let vars = VariableResolver {
            target_os: &target_os,
            target_cpu: &target_cpu,
            manifest_vars: &manifest.vars,
            inherited: &ctx.inherited,
            custom_vars: &ctx.custom_vars,
        }
        .resolve();

        let mut declared_vars: BTreeSet<String> = ctx.inherited.keys().cloned().collect();
        declared_vars.extend(manifest.vars.keys().cloned());
        declared_vars.extend(ctx.custom_vars.keys().cloned());

        let mut recursedeps = match &manifest.recursedeps {
            Some(entries) => {
                let mut map = BTreeMap::new();
                for entry in entries {
                    match entry {
                        RecurseDep::Name(name) => {
                            map.insert(rebase(name), None);
                        }
                        RecurseDep::Detailed { name, deps_file } => {
                            if deps_file.trim().is_empty() {
                                return Err(GsyncError::semantic(
                                    &ctx.name,
                                    format!("recursedeps entry '{name}' has an empty deps_file"),
                                ));
                            }
                            map.insert(rebase(name), Some(deps_file.clone()));
                        }
                    }
                }
                Some(map)
            }
            None => None,
        };

        let mut children = Vec::new();
        let mut declared_names = BTreeSet::new();
        for (raw_name, entry) in manifest.deps {
            let name = rebase(&raw_name);
            declared_names.insert(name.clone());
            let detail = entry.into_detail();

            let condition = combine(ctx.condition.as_deref(), detail.condition.as_deref());
            let enabled = match &condition {
                Some(expression) => evaluate(expression, &vars)?,
                None => true,
            };
            let (deps_file, explicit_deps_file) =
                match recursedeps.as_ref().and_then(|r| r.get(&name)) {
                    Some(Some(file)) => (file.clone(), true),
                    _ => (ctx.deps_file.clone(), false),
                };
            let disabled_by_custom = ctx.custom_deps.get(&name).is_some_and(String::is_empty);

            match detail.dep_type {
                DepType::Git => {
                    let raw_url = match ctx.custom_deps.get(&name) {
                        Some(url) if url.is_empty() => None,
                        Some(url) => Some(url.clone()),
                        None => detail.url,
                    };
                    let url = raw_url.as_deref().map(|u| substitute(u, &vars)).transpose()?;
                    let should_process = url.is_some() && enabled;
                    children.push(ChildSpec {
                        name,
                        raw_url,
                        url,
                        kind: NodeKind::Git,
                        deps_file,
                        explicit_deps_file,
                        condition,
                        should_process,
                        relative: manifest.use_relative_paths,
                    });
                }
                DepType::Cipd => {
                    if detail.packages.is_empty() {
                        return Err(GsyncError::semantic(
                            &ctx.name,
                            format!("cipd dependency '{name}' declares no packages"),
                        ));
                    }
                    for package in &detail.packages {
                        let package_name = substitute(&package.package, &vars)?;
                        let version = substitute(&package.version, &vars)?;
                        let url = format!("{package_name}@{version}");
                        children.push(ChildSpec {
                            name: format!("{name}:{package_name}"),
                            raw_url: Some(format!("{}@{}", package.package, package.version)),
                            url: (!disabled_by_custom).then(|| url.clone()),
                            kind: NodeKind::Cipd {
                                package: package_name,
                                version,
                                root: name.clone(),
                            },
                            deps_file: ctx.deps_file.clone(),
                            explicit_deps_file: false,
                            condition: condition.clone(),
                            should_process: enabled && !disabled_by_custom,
                            relative: manifest.use_relative_paths,
                        });
                    }
                }
            }
        }

        if ctx.is_solution {
            for (name, url) in &ctx.custom_deps {
                if url.is_empty() || declared_names.contains(name) {
                    continue;
                }
                debug!("Adding custom dependency {name} -> {url} to {}", ctx.name);
                let expanded = substitute(url, &vars)?;
                children.push(ChildSpec {
                    name: paths::normalize(name),
                    raw_url: Some(url.clone()),
                    url: Some(expanded),
                    kind: NodeKind::Git,
                    deps_file: ctx.deps_file.clone(),
                    explicit_deps_file: false,
                    condition: ctx.condition.clone(),
                    should_process: true,
                    relative: manifest.use_relative_paths,
                });
            }
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(map) = recursedeps.as_mut() {
            map.retain(|name, _| {
                let known = declared_names.contains(name);
                if !known {
                    warn!("{}: recursedeps entry '{name}' is not a dependency, ignoring", ctx.name);
                }
                known
            });
        }

        let mut hooks = validate_hooks(&ctx.name, manifest.hooks)?;
        let pre_deps_hooks = validate_hooks(&ctx.name, manifest.pre_deps_hooks)?;

        if ctx.is_solution && !ctx.custom_hooks.is_empty() {
            let suppressed: BTreeSet<&str> =
                ctx.custom_hooks.iter().filter_map(|h| h.name.as_deref()).collect();
            hooks.retain(|h| h.name.as_deref().is_none_or(|n| !suppressed.contains(n)));

            let additions: Vec<HookSpec> =
                ctx.custom_hooks.iter().filter(|h| !h.action.is_empty()).cloned().collect();
            hooks.extend(validate_hooks(&ctx.name, additions)?);
        }

        let gn_args = GnArgsSettings {
            file: manifest.gclient_gn_args_file.as_deref().map(rebase),
            args: manifest.gclient_gn_args,
            from: manifest.gclient_gn_args_from,
        };

        Ok(ParseResult {
            children,
            hooks,
            pre_deps_hooks,
            allowed_hosts,
            vars: Arc::new(vars),
            manifest_vars: manifest.vars,
            declared_vars,
            recursedeps,
            recursion: manifest.recursion,
            target_os,
            target_cpu,
            use_relative_paths: manifest.use_relative_paths,
            gn_args,
        })
    }
}

fn validate_hooks(node: &str, hooks: Vec<HookSpec>) -> Result<Vec<HookSpec>, GsyncError> {
    for hook in &hooks {
        if hook.action.is_empty() {
            return Err(GsyncError::semantic(
                node,
                format!("hook '{}' has an empty action", hook.display_name()),
            ));
        }
        if let Some(pattern) = &hook.pattern {
            Regex::new(pattern).map_err(|e| {
                GsyncError::semantic(
                    node,
                    format!("hook '{}' has an invalid pattern: {e}", hook.display_name()),
                )
            })?;
        }
    }
    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::Value;

    fn ctx(name: &str) -> ParseContext {
        ParseContext {
            name: name.to_string(),
            deps_file: "DEPS".to_string(),
            is_solution: true,
            target_os: ["linux".to_string()].into(),
            ..ParseContext::default()
        }
    }

    fn names(result: &ParseResult) -> Vec<&str> {
        result.children.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_url_templating_and_sorting() {
        let text = r#"
[vars]
rev = "deadbeef"

[deps]
"src/z" = "https://example.com/z.git"
"src/a" = "https://example.com/a.git@{rev}"
"#;
        let result = ManifestParser::parse(&ctx("src"), text).unwrap();
        assert_eq!(names(&result), ["src/a", "src/z"]);
        assert_eq!(result.children[0].url.as_deref(), Some("https://example.com/a.git@deadbeef"));
        assert_eq!(result.children[0].raw_url.as_deref(), Some("https://example.com/a.git@{rev}"));
        assert!(result.children[0].should_process);
    }

    #[test]
    fn test_use_relative_paths_prefixes_children_and_recursedeps() {
        let text = r#"
use_relative_paths = true
recursedeps = ["third_party/a"]
gclient_gn_args_file = "build/args.gni"

[deps]
"third_party/a" = "https://example.com/a.git"
"#;
        let result = ManifestParser::parse(&ctx("src/v8"), text).unwrap();
        assert_eq!(names(&result), ["src/v8/third_party/a"]);
        assert!(result.children[0].relative);
        assert!(result.recursedeps.unwrap().contains_key("src/v8/third_party/a"));
        assert_eq!(result.gn_args.file.as_deref(), Some("src/v8/build/args.gni"));
    }

    #[test]
    fn test_inherited_relative_uses_dirname() {
        let mut context = ctx("src/v8/third_party/a");
        context.relative = true;
        let text = r#"
[deps]
"b" = "https://example.com/b.git"
"#;
        let result = ManifestParser::parse(&context, text).unwrap();
        assert_eq!(names(&result), ["src/v8/third_party/b"]);
        assert!(!result.children[0].relative);
    }

    #[test]
    fn test_condition_is_combined_and_evaluated() {
        let mut context = ctx("src");
        context.condition = Some("checkout_linux".to_string());
        let text = r#"
[deps]
"src/a" = { url = "https://example.com/a.git", condition = "checkout_win" }
"src/b" = { url = "https://example.com/b.git" }
"#;
        let result = ManifestParser::parse(&context, text).unwrap();
        let a = &result.children[0];
        assert_eq!(a.condition.as_deref(), Some("(checkout_linux) and (checkout_win)"));
        assert!(!a.should_process);
        let b = &result.children[1];
        assert_eq!(b.condition.as_deref(), Some("checkout_linux"));
        assert!(b.should_process);
    }

    #[test]
    fn test_undefined_variable_in_condition_is_fatal() {
        let text = r#"
[deps]
"src/a" = { url = "https://example.com/a.git", condition = "checkout_typo" }
"#;
        let err = ManifestParser::parse(&ctx("src"), text).unwrap_err();
        assert!(matches!(err, GsyncError::Evaluation { .. }));
    }

    #[test]
    fn test_missing_url_creates_unprocessed_child() {
        let text = r#"
[deps]
"src/a" = { condition = "checkout_linux" }
"#;
        let result = ManifestParser::parse(&ctx("src"), text).unwrap();
        assert_eq!(result.children.len(), 1);
        assert!(result.children[0].url.is_none());
        assert!(!result.children[0].should_process);
    }

    #[test]
    fn test_cipd_expands_one_child_per_package() {
        let text = r#"
[vars]
tool_version = "v1"

[deps]
"src/tools" = { dep_type = "cipd", packages = [
    { package = "infra/a", version = "{tool_version}" },
    { package = "infra/b", version = "latest" },
] }
"#;
        let result = ManifestParser::parse(&ctx("src"), text).unwrap();
        assert_eq!(names(&result), ["src/tools:infra/a", "src/tools:infra/b"]);
        assert_eq!(result.children[0].url.as_deref(), Some("infra/a@v1"));
        assert_eq!(
            result.children[0].kind,
            NodeKind::Cipd {
                package: "infra/a".to_string(),
                version: "v1".to_string(),
                root: "src/tools".to_string(),
            }
        );
    }

    #[test]
    fn test_custom_deps_override_disable_and_add() {
        let mut context = ctx("src");
        context.custom_deps = [
            ("src/a".to_string(), "https://mirror/a.git".to_string()),
            ("src/b".to_string(), String::new()),
            ("src/extra".to_string(), "https://example.com/extra.git".to_string()),
        ]
        .into();
        let text = r#"
[deps]
"src/a" = "https://example.com/a.git"
"src/b" = "https://example.com/b.git"
"#;
        let result = ManifestParser::parse(&context, text).unwrap();
        assert_eq!(names(&result), ["src/a", "src/b", "src/extra"]);
        assert_eq!(result.children[0].url.as_deref(), Some("https://mirror/a.git"));
        assert!(result.children[1].url.is_none());
        assert!(!result.children[1].should_process);
        assert!(result.children[2].should_process);
    }

    #[test]
    fn test_custom_hooks_replace_and_suppress() {
        let mut context = ctx("src");
        context.custom_hooks = vec![
            HookSpec {
                name: Some("lint".to_string()),
                action: vec!["echo".to_string(), "custom".to_string()],
                ..HookSpec::default()
            },
            HookSpec {
                name: Some("gen".to_string()),
                ..HookSpec::default()
            },
        ];
        let text = r#"
[[hooks]]
name = "lint"
action = ["echo", "declared"]

[[hooks]]
name = "gen"
action = ["echo", "gen"]

[[hooks]]
action = ["echo", "unnamed"]
"#;
        let result = ManifestParser::parse(&context, text).unwrap();
        let lint: Vec<_> =
            result.hooks.iter().filter(|h| h.name.as_deref() == Some("lint")).collect();
        assert_eq!(lint.len(), 1);
        assert_eq!(lint[0].action, ["echo", "custom"]);
        assert!(result.hooks.iter().all(|h| h.name.as_deref() != Some("gen")));
        assert_eq!(result.hooks.len(), 2);
    }

    #[test]
    fn test_semantic_errors() {
        let both = r#"
gclient_gn_args_file = "a.gni"
gclient_gn_args_from = "src/a"
"#;
        assert!(matches!(
            ManifestParser::parse(&ctx("src"), both),
            Err(GsyncError::ManifestSemantic { .. })
        ));

        let empty_hosts = "allowed_hosts = []";
        assert!(matches!(
            ManifestParser::parse(&ctx("src"), empty_hosts),
            Err(GsyncError::ManifestSemantic { .. })
        ));

        let empty_file = r#"recursedeps = [{ name = "a", deps_file = "" }]"#;
        assert!(matches!(
            ManifestParser::parse(&ctx("src"), empty_file),
            Err(GsyncError::ManifestSemantic { .. })
        ));

        let bad_pattern = r#"
[[hooks]]
pattern = "("
action = ["true"]
"#;
        assert!(matches!(
            ManifestParser::parse(&ctx("src"), bad_pattern),
            Err(GsyncError::ManifestSemantic { .. })
        ));
    }

    #[test]
    fn test_recursedeps_explicit_file_and_unknown_names() {
        let text = r#"
recursedeps = [{ name = "src/a", deps_file = "DEPS.alt" }, "src/missing"]

[deps]
"src/a" = "https://example.com/a.git"
"#;
        let result = ManifestParser::parse(&ctx("src"), text).unwrap();
        let recursedeps = result.recursedeps.unwrap();
        assert_eq!(recursedeps.len(), 1);
        assert_eq!(result.children[0].deps_file, "DEPS.alt");
        assert!(result.children[0].explicit_deps_file);
    }

    #[test]
    fn test_vars_precedence_and_declared_names() {
        let mut context = ctx("src/a");
        context.inherited = [("v".to_string(), Value::Int(2))].into();
        context.custom_vars = [("w".to_string(), Value::Int(9))].into();
        let text = r#"
target_os = ["android"]

[vars]
v = 1
own = "x"
"#;
        let result = ManifestParser::parse(&context, text).unwrap();
        assert_eq!(result.vars["v"], Value::Int(2));
        assert_eq!(result.vars["own"], Value::from("x"));
        assert_eq!(result.vars["w"], Value::Int(9));
        assert_eq!(result.vars["checkout_android"], Value::Bool(true));
        assert!(result.declared_vars.contains("own"));
        assert!(result.declared_vars.contains("v"));
        assert!(result.declared_vars.contains("w"));
        assert!(!result.declared_vars.contains("checkout_android"));
    }
}
