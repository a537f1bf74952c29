//! Path normalization and allow/deny validation.
//!
//! `normalize` is purely lexical: it expands a leading tilde, resolves the
//! path against a base directory, and collapses `.`/`..` components without
//! touching the filesystem. The target is not required to exist.

use std::path::{Component, Path, PathBuf};

use llamar_domain::config::Config;

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Collapse `.` and `..` components lexically.
fn collapse(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root.
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Normalize a path: tilde expansion, absolutization against `cwd`, and
/// lexical collapse of `.`/`..`. Does not require the path to exist.
pub fn normalize(path: &str, cwd: &Path) -> PathBuf {
    let expanded = expand_tilde(path.trim());
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    collapse(&absolute)
}

/// Whether `p` equals `base` or lies strictly under it.
pub fn under(p: &Path, base: &Path) -> bool {
    p == base || p.starts_with(base)
}

/// Apply the configured filesystem rules to a path, in order:
///
/// 1. empty path → rejected;
/// 2. any denied prefix matches → rejected, citing the rule;
/// 3. a non-empty allow list with no matching entry → rejected;
/// 4. otherwise accepted; the normalized path is returned.
pub fn validate_path(path: &str, cfg: &Config, cwd: &Path, op: &str) -> Result<PathBuf, String> {
    if path.trim().is_empty() {
        return Err("Path is empty".to_string());
    }

    let normalized = normalize(path, cwd);

    for rule in &cfg.denied_paths {
        let denied = normalize(rule, cwd);
        if under(&normalized, &denied) {
            return Err(format!(
                "Access denied: cannot {op} '{}': restricted area ({rule})",
                normalized.display()
            ));
        }
    }

    if !cfg.allowed_paths.is_empty() {
        let permitted = cfg
            .allowed_paths
            .iter()
            .any(|rule| under(&normalized, &normalize(rule, cwd)));
        if !permitted {
            return Err(format!(
                "Access denied: cannot {op} '{}': outside allowed paths",
                normalized.display()
            ));
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamar_domain::config::Config;

    fn cwd() -> PathBuf {
        PathBuf::from("/work/project")
    }

    #[test]
    fn normalize_collapses_dotdot() {
        assert_eq!(
            normalize("/a/b/../c/./d", &cwd()),
            PathBuf::from("/a/c/d")
        );
    }

    #[test]
    fn normalize_never_pops_past_root() {
        assert_eq!(normalize("/../../etc", &cwd()), PathBuf::from("/etc"));
    }

    #[test]
    fn normalize_resolves_relative_against_cwd() {
        assert_eq!(
            normalize("src/main.rs", &cwd()),
            PathBuf::from("/work/project/src/main.rs")
        );
        assert_eq!(
            normalize("../other", &cwd()),
            PathBuf::from("/work/other")
        );
    }

    #[test]
    fn normalize_expands_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(normalize("~/notes.md", &cwd()), home.join("notes.md"));
    }

    #[test]
    fn under_matches_self_and_children() {
        let base = Path::new("/data");
        assert!(under(Path::new("/data"), base));
        assert!(under(Path::new("/data/sub/file"), base));
        assert!(!under(Path::new("/database"), base));
    }

    #[test]
    fn empty_path_rejected() {
        let err = validate_path("  ", &Config::default(), &cwd(), "read").unwrap_err();
        assert_eq!(err, "Path is empty");
    }

    #[test]
    fn denied_prefix_rejected() {
        let mut cfg = Config::default();
        cfg.denied_paths = vec!["/etc".into()];
        let err = validate_path("/etc/passwd", &cfg, &cwd(), "read").unwrap_err();
        assert!(err.contains("restricted"));
        assert!(err.contains("/etc"));
    }

    #[test]
    fn denied_wins_over_allowed() {
        let mut cfg = Config::default();
        cfg.allowed_paths = vec!["/etc".into()];
        cfg.denied_paths = vec!["/etc/shadow".into()];
        assert!(validate_path("/etc/hosts", &cfg, &cwd(), "read").is_ok());
        assert!(validate_path("/etc/shadow", &cfg, &cwd(), "read").is_err());
    }

    #[test]
    fn allow_list_constrains_access() {
        let mut cfg = Config::default();
        cfg.allowed_paths = vec!["/work".into()];
        assert!(validate_path("/work/project/a.txt", &cfg, &cwd(), "write").is_ok());
        let err = validate_path("/tmp/out.txt", &cfg, &cwd(), "write").unwrap_err();
        assert!(err.contains("outside allowed paths"));
    }

    #[test]
    fn empty_allow_list_permits_everything_not_denied() {
        let cfg = Config::default();
        assert!(validate_path("/anywhere/at/all", &cfg, &cwd(), "read").is_ok());
    }

    #[test]
    fn validation_is_idempotent_over_normalize() {
        let mut cfg = Config::default();
        cfg.denied_paths = vec!["/etc".into()];
        let raw = "/etc/../etc/passwd";
        let normalized = normalize(raw, &cwd());
        let direct = validate_path(raw, &cfg, &cwd(), "read");
        let renormalized =
            validate_path(normalized.to_str().unwrap(), &cfg, &cwd(), "read");
        assert_eq!(direct.is_ok(), renormalized.is_ok());
    }

    #[test]
    fn dotdot_cannot_escape_deny_rule() {
        let mut cfg = Config::default();
        cfg.allowed_paths = vec!["/work".into()];
        let err = validate_path("/work/../etc/passwd", &cfg, &cwd(), "read").unwrap_err();
        assert!(err.contains("outside allowed paths"));
    }
}
