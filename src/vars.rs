//! Variable values, resolution and templating.
//!
//! Every node in the dependency tree resolves a variable map that conditions,
//! urls and hook arguments are evaluated against. The map is built from four
//! layers, later layers overriding earlier ones on key collision:
//!
//! 1. built-in flags derived from the node's target OS/CPU sets plus
//!    `host_os` and `host_cpu`
//! 2. the `[vars]` table of the node's own manifest
//! 3. the variables the parent declared (directly, by inheritance or through
//!    `custom_vars`), with the parent's resolved values
//! 4. the node's `custom_vars`
//!
//! Built-ins are recomputed per node rather than inherited, so a manifest that
//! widens `target_os` sees its own `checkout_<os>` flags flip on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::GsyncError;

/// Operating systems with a `checkout_<os>` built-in.
pub const KNOWN_OSES: &[&str] = &["android", "chromeos", "fuchsia", "ios", "linux", "mac", "win"];

/// CPU architectures with a `checkout_<cpu>` built-in.
pub const KNOWN_CPUS: &[&str] =
    &["arm", "arm64", "loong64", "mips", "mips64", "ppc", "riscv64", "s390", "x64", "x86"];

/// A variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// String
    Str(String),
}

impl Value {
    /// Name of the value's type for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
        }
    }

    /// Render as a GN literal: bools lowercase, strings quoted.
    #[must_use]
    pub fn to_gn_literal(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Ordered variable map.
pub type VarMap = BTreeMap<String, Value>;

/// The host operating system in gsync's naming (`linux`, `mac`, `win`, ...).
#[must_use]
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "mac",
        "windows" => "win",
        other => other,
    }
}

/// The host CPU architecture in gsync's naming (`x64`, `arm64`, ...).
#[must_use]
pub fn host_cpu() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "loongarch64" => "loong64",
        "powerpc" | "powerpc64" => "ppc",
        "s390x" => "s390",
        other => other,
    }
}

/// Whether `name` is one of the built-in variables.
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    name == "host_os"
        || name == "host_cpu"
        || name.strip_prefix("checkout_").is_some_and(|rest| {
            KNOWN_OSES.contains(&rest) || KNOWN_CPUS.contains(&rest)
        })
}

/// Built-in variables for the given target sets.
#[must_use]
pub fn builtin_vars(target_os: &BTreeSet<String>, target_cpu: &BTreeSet<String>) -> VarMap {
    let mut vars = VarMap::new();
    for os in KNOWN_OSES.iter().copied().chain(target_os.iter().map(String::as_str)) {
        vars.insert(format!("checkout_{os}"), Value::Bool(target_os.contains(os)));
    }
    for cpu in KNOWN_CPUS.iter().copied().chain(target_cpu.iter().map(String::as_str)) {
        vars.insert(format!("checkout_{cpu}"), Value::Bool(target_cpu.contains(cpu)));
    }
    vars.insert("host_os".to_string(), Value::from(host_os()));
    vars.insert("host_cpu".to_string(), Value::from(host_cpu()));
    vars
}

/// Inputs for resolving one node's variables.
#[derive(Debug)]
pub struct VariableResolver<'a> {
    /// Effective target OS set of the node
    pub target_os: &'a BTreeSet<String>,
    /// Effective target CPU set of the node
    pub target_cpu: &'a BTreeSet<String>,
    /// `[vars]` of the node's own manifest (empty when not parsed)
    pub manifest_vars: &'a VarMap,
    /// Variables declared above this node with their resolved values
    pub inherited: &'a VarMap,
    /// The node's `custom_vars`
    pub custom_vars: &'a VarMap,
}

impl VariableResolver<'_> {
    /// Merge the layers in precedence order.
    #[must_use]
    pub fn resolve(&self) -> VarMap {
        let mut vars = builtin_vars(self.target_os, self.target_cpu);
        vars.extend(self.manifest_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(self.inherited.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(self.custom_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Replace `{name}` placeholders with variable values.
///
/// Braces that do not enclose an identifier are left alone. An undefined
/// variable is an error.
pub fn substitute(template: &str, vars: &VarMap) -> Result<String, GsyncError> {
    let mut result = String::with_capacity(template.len());
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = vars.get(name.as_str()).ok_or_else(|| {
            GsyncError::evaluation(template, format!("undefined variable '{}'", name.as_str()))
        })?;
        result.push_str(&template[last..whole.start()]);
        result.push_str(&value.to_string());
        last = whole.end();
    }
    result.push_str(&template[last..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_builtins_follow_target_sets() {
        let vars = builtin_vars(&set(&["android", "linux"]), &set(&["arm64"]));
        assert_eq!(vars["checkout_android"], Value::Bool(true));
        assert_eq!(vars["checkout_linux"], Value::Bool(true));
        assert_eq!(vars["checkout_win"], Value::Bool(false));
        assert_eq!(vars["checkout_arm64"], Value::Bool(true));
        assert_eq!(vars["checkout_x86"], Value::Bool(false));
        assert!(vars.contains_key("host_os"));
        assert!(vars.contains_key("host_cpu"));
    }

    #[test]
    fn test_unknown_target_os_gets_flag() {
        let vars = builtin_vars(&set(&["plan9"]), &BTreeSet::new());
        assert_eq!(vars["checkout_plan9"], Value::Bool(true));
    }

    #[test]
    fn test_precedence_custom_over_parent_over_manifest() {
        let manifest: VarMap = [("v".to_string(), Value::Int(1))].into();
        let inherited: VarMap = [("v".to_string(), Value::Int(2))].into();
        let custom: VarMap = [("v".to_string(), Value::Int(3))].into();
        let empty = BTreeSet::new();

        let resolver = VariableResolver {
            target_os: &empty,
            target_cpu: &empty,
            manifest_vars: &manifest,
            inherited: &inherited,
            custom_vars: &custom,
        };
        assert_eq!(resolver.resolve()["v"], Value::Int(3));

        let no_custom = VarMap::new();
        let resolver = VariableResolver {
            custom_vars: &no_custom,
            ..resolver
        };
        assert_eq!(resolver.resolve()["v"], Value::Int(2));
    }

    #[test]
    fn test_manifest_overrides_builtin() {
        let manifest: VarMap = [("checkout_linux".to_string(), Value::Bool(false))].into();
        let empty = VarMap::new();
        let os = set(&["linux"]);
        let cpu = BTreeSet::new();
        let resolver = VariableResolver {
            target_os: &os,
            target_cpu: &cpu,
            manifest_vars: &manifest,
            inherited: &empty,
            custom_vars: &empty,
        };
        assert_eq!(resolver.resolve()["checkout_linux"], Value::Bool(false));
    }

    #[test]
    fn test_substitute() {
        let vars: VarMap = [
            ("rev".to_string(), Value::from("deadbeef")),
            ("n".to_string(), Value::Int(4)),
        ]
        .into();
        assert_eq!(
            substitute("https://example/a.git@{rev}", &vars).unwrap(),
            "https://example/a.git@deadbeef"
        );
        assert_eq!(substitute("x{n}y{n}", &vars).unwrap(), "x4y4");
        assert_eq!(substitute("{not an id}", &vars).unwrap(), "{not an id}");
        assert!(matches!(
            substitute("{missing}", &vars),
            Err(GsyncError::Evaluation { .. })
        ));
    }

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("checkout_linux"));
        assert!(is_builtin("checkout_arm64"));
        assert!(is_builtin("host_os"));
        assert!(!is_builtin("checkout_foo"));
        assert!(!is_builtin("a_revision"));
    }

    #[test]
    fn test_gn_literal() {
        assert_eq!(Value::Bool(true).to_gn_literal(), "true");
        assert_eq!(Value::Int(3).to_gn_literal(), "3");
        assert_eq!(Value::from("a\"b").to_gn_literal(), "\"a\\\"b\"");
    }
}
