//! POSIX-style relative path helpers.
//!
//! Dependency names are forward-slash relative paths on every host. These
//! helpers manipulate them as strings so behaviour does not depend on the
//! platform's separator.

/// Normalize a relative posix path: drop empty and `.` components, resolve
/// `..` where possible, convert backslashes. The empty path becomes `"."`.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Join two posix paths and normalize the result.
#[must_use]
pub fn join(base: &str, path: &str) -> String {
    normalize(&format!("{base}/{path}"))
}

/// Directory component of a posix path, `None` for a single component.
#[must_use]
pub fn dirname(path: &str) -> Option<String> {
    let normalized = normalize(path);
    normalized.rsplit_once('/').map(|(dir, _)| dir.to_string())
}

/// Whether `ancestor` is a proper path prefix of `path`.
#[must_use]
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("src//a/./b"), "src/a/b");
        assert_eq!(normalize("src/a/../b"), "src/b");
        assert_eq!(normalize("src\\win\\path"), "src/win/path");
        assert_eq!(normalize(""), ".");
        assert_eq!(normalize("./"), ".");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("src", "third_party/a"), "src/third_party/a");
        assert_eq!(join(".", "src"), "src");
        assert_eq!(join(".", "."), ".");
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("src/a/b").as_deref(), Some("src/a"));
        assert_eq!(dirname("src"), None);
    }

    #[test]
    fn test_is_ancestor() {
        assert!(is_ancestor("src", "src/a"));
        assert!(is_ancestor("src/a", "src/a/b"));
        assert!(!is_ancestor("src", "src"));
        assert!(!is_ancestor("src", "srcfoo/a"));
    }
}
