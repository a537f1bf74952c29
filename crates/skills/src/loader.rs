//! User skill document loader.
//!
//! Scans `<skills_root>/<name>/SKILL.md` directories (plus bare
//! `<skills_root>/<name>.md` files) and produces doc-skills: invoking one
//! returns its substituted body so the model can follow the playbook.

use std::path::Path;
use std::sync::Arc;

use crate::manifest::{parse_frontmatter, substitute_base_dir};
use crate::types::{handler_fn, Skill};
use llamar_domain::envelope::ToolResult;
use llamar_domain::Result;

/// A loaded skill document, ready to mount in the registry.
#[derive(Debug, Clone)]
pub struct SkillDoc {
    pub name: String,
    pub description: String,
    pub body: String,
}

impl SkillDoc {
    /// Turn the document into a registry skill whose handler returns the
    /// body text.
    pub fn into_skill(self) -> Skill {
        let body = Arc::new(self.body);
        Skill::new(
            &self.name,
            &self.description,
            vec![],
            handler_fn(move |_, _| {
                let body = body.clone();
                async move { ToolResult::ok(body.as_str()) }
            }),
        )
    }
}

fn load_doc(md_path: &Path, base_dir: &Path, fallback_name: &str) -> Result<SkillDoc> {
    let content = std::fs::read_to_string(md_path)?;
    let (manifest, body) = parse_frontmatter(&content);
    let manifest = manifest.unwrap_or_default();
    let name = manifest
        .name
        .unwrap_or_else(|| fallback_name.to_string());
    let description = manifest
        .description
        .unwrap_or_else(|| format!("User skill '{name}'"));
    Ok(SkillDoc {
        name,
        description,
        body: substitute_base_dir(&body, base_dir),
    })
}

/// Scan the skills root for skill documents. A missing root is an empty
/// result, not an error.
pub fn scan_skills(skills_root: &Path) -> Result<Vec<SkillDoc>> {
    let mut docs = Vec::new();
    if !skills_root.exists() {
        return Ok(docs);
    }

    for entry in std::fs::read_dir(skills_root)? {
        let entry = entry?;
        let path = entry.path();

        let (md_path, base_dir, fallback) = if path.is_dir() {
            let md = path.join("SKILL.md");
            if !md.exists() {
                continue;
            }
            let fallback = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (md, path.clone(), fallback)
        } else if path.extension().is_some_and(|e| e == "md") {
            let fallback = path
                .file_stem()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (path.clone(), skills_root.to_path_buf(), fallback)
        } else {
            continue;
        };

        match load_doc(&md_path, &base_dir, &fallback) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                tracing::warn!(
                    path = %md_path.display(),
                    error = %e,
                    "skipping unreadable skill document"
                );
            }
        }
    }

    docs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_directories_and_bare_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        let dir = root.join("deploy");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            "---\nname: deploy\ndescription: Ship it\n---\nRun {baseDir}/ship.sh\n",
        )
        .unwrap();

        std::fs::write(root.join("notes.md"), "# Notes\n\nPlain doc.\n").unwrap();
        std::fs::write(root.join("ignored.txt"), "not a skill").unwrap();

        let docs = scan_skills(root).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "deploy");
        assert_eq!(docs[0].description, "Ship it");
        assert!(docs[0].body.contains(&format!("{}/ship.sh", dir.display())));
        assert_eq!(docs[1].name, "notes");
    }

    #[test]
    fn missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = scan_skills(&tmp.path().join("nope")).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn name_falls_back_to_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("unnamed-skill");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), "Just a body.\n").unwrap();

        let docs = scan_skills(tmp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "unnamed-skill");
    }

    #[tokio::test]
    async fn doc_skill_returns_body() {
        let doc = SkillDoc {
            name: "demo".into(),
            description: "Demo".into(),
            body: "the playbook".into(),
        };
        let skill = doc.into_skill();
        let ctx = Arc::new(crate::context::SkillContext::detached(
            Arc::new(llamar_domain::config::Config::default()),
            std::path::PathBuf::from("/tmp"),
        ));
        let result = skill.handler.call(ctx, serde_json::json!({})).await;
        assert_eq!(result.text(), "the playbook");
    }
}
