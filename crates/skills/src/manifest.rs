//! SKILL.md manifests.
//!
//! A skill document may open with YAML front matter delimited by `---`
//! lines:
//!
//! ```yaml
//! ---
//! name: release-notes
//! description: Draft release notes from the git log
//! metadata: {"version": 2}
//! ---
//! ```
//!
//! Front matter is optional; files without it are accepted and the name
//! falls back to the enclosing directory or file stem. The body may use
//! `{baseDir}` tokens, substituted with the skill directory at load time.

use serde::{Deserialize, Serialize};

/// Parsed front matter from a SKILL.md file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form metadata, JSON on the same line in the source file.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Split a SKILL.md into `(front matter, body)`. Files without front
/// matter come back as `(None, whole file)`.
pub fn parse_frontmatter(content: &str) -> (Option<SkillManifest>, String) {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return (None, content.to_string());
    }

    let after_open = &trimmed[3..];
    let Some(close_idx) = after_open.find("\n---") else {
        return (None, content.to_string());
    };
    let yaml_str = &after_open[..close_idx];
    let body = after_open[close_idx + 4..]
        .trim_start_matches('\n')
        .to_string();

    match serde_yaml::from_str::<SkillManifest>(yaml_str) {
        Ok(manifest) => (Some(manifest), body),
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse SKILL.md front matter");
            (None, content.to_string())
        }
    }
}

/// Substitute `{baseDir}` tokens in a skill body.
pub fn substitute_base_dir(body: &str, base_dir: &std::path::Path) -> String {
    body.replace("{baseDir}", &base_dir.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn full_frontmatter_parses() {
        let md = "---\nname: git-helper\ndescription: Helps with git\nmetadata: {\"tier\": 1}\n---\n# Git Helper\n\nBody text.\n";
        let (manifest, body) = parse_frontmatter(md);
        let m = manifest.unwrap();
        assert_eq!(m.name.as_deref(), Some("git-helper"));
        assert_eq!(m.description.as_deref(), Some("Helps with git"));
        assert_eq!(m.metadata.unwrap()["tier"], 1);
        assert!(body.starts_with("# Git Helper"));
    }

    #[test]
    fn no_frontmatter_is_accepted() {
        let md = "# Just a document\n\nNo front matter here.\n";
        let (manifest, body) = parse_frontmatter(md);
        assert!(manifest.is_none());
        assert_eq!(body, md);
    }

    #[test]
    fn unterminated_frontmatter_falls_back() {
        let md = "---\nname: broken\nno closing delimiter\n";
        let (manifest, body) = parse_frontmatter(md);
        assert!(manifest.is_none());
        assert_eq!(body, md);
    }

    #[test]
    fn malformed_yaml_falls_back() {
        let md = "---\nname: [unclosed\n---\nbody\n";
        let (manifest, body) = parse_frontmatter(md);
        assert!(manifest.is_none());
        assert_eq!(body, md);
    }

    #[test]
    fn base_dir_substitution() {
        let body = "Run {baseDir}/scripts/setup.sh then read {baseDir}/data.csv";
        let out = substitute_base_dir(body, Path::new("/home/u/.llamar/skills/demo"));
        assert_eq!(
            out,
            "Run /home/u/.llamar/skills/demo/scripts/setup.sh then read /home/u/.llamar/skills/demo/data.csv"
        );
    }
}
