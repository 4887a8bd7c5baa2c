//! Caption validation - checks the sidecar captions of a curated dataset
//! against the loaded ontology before handoff to training.

use anyhow::Result;
use log::info;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::models::ontology::Ontology;
use crate::utils::list_image_files;

static CAPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[style:([^\]]*)\](.*)$").unwrap());

/// Validate every image-caption pair in `dir`. Returns the full list of
/// violations; an empty list means the dataset is well formed.
pub fn validate_captions(dir: &Path, ontology: &Ontology) -> Result<Vec<String>> {
    let valid_tokens = ontology.all_tokens();
    let images = list_image_files(dir)?;
    info!("validating {} image-caption pair(s) in {:?}", images.len(), dir);

    let mut violations = Vec::new();
    for image in images {
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let caption_path = image.with_extension("txt");

        if !caption_path.exists() {
            violations.push(format!("missing caption for {}", name));
            continue;
        }

        let caption = fs::read_to_string(&caption_path)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();

        let Some(captures) = CAPTION_RE.captures(&caption) else {
            violations.push(format!("invalid caption format in {}", name));
            continue;
        };

        let tokens: BTreeSet<&str> = captures[1].split(',').map(str::trim).collect();
        let unknown: Vec<&str> = tokens
            .iter()
            .filter(|token| !valid_tokens.contains(*token))
            .copied()
            .collect();
        if !unknown.is_empty() {
            violations.push(format!(
                "unknown token(s) {:?} in caption for {}",
                unknown, name
            ));
        }

        if captures[2].trim().is_empty() {
            violations.push(format!("missing description in caption for {}", name));
        }
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ontology::{Bucket, TokenEntry};
    use std::collections::BTreeMap;

    fn ontology() -> Ontology {
        let mut buckets = BTreeMap::new();
        buckets.insert(
            "lighting".to_string(),
            Bucket {
                description: String::new(),
                tokens: vec![
                    TokenEntry {
                        token: "golden_hour".into(),
                        description: String::new(),
                    },
                    TokenEntry {
                        token: "overcast".into(),
                        description: String::new(),
                    },
                ],
            },
        );
        Ontology {
            version: "1".into(),
            buckets,
        }
    }

    fn put_pair(dir: &Path, stem: &str, caption: Option<&str>) {
        std::fs::write(dir.join(format!("{stem}.png")), b"p").unwrap();
        if let Some(text) = caption {
            std::fs::write(dir.join(format!("{stem}.txt")), text).unwrap();
        }
    }

    #[test]
    fn well_formed_captions_pass() {
        let dir = tempfile::tempdir().unwrap();
        put_pair(
            dir.path(),
            "a",
            Some("[style:golden_hour,overcast] a coastline at dusk"),
        );

        let violations = validate_captions(dir.path(), &ontology()).unwrap();
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn each_violation_kind_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        put_pair(dir.path(), "missing", None);
        put_pair(dir.path(), "badformat", Some("no style prefix here"));
        put_pair(dir.path(), "unknown", Some("[style:neon_noir] a street"));
        put_pair(dir.path(), "nodesc", Some("[style:overcast]   "));

        let violations = validate_captions(dir.path(), &ontology()).unwrap();
        assert_eq!(violations.len(), 4);
        assert!(violations.iter().any(|v| v.contains("missing caption")));
        assert!(violations.iter().any(|v| v.contains("invalid caption format")));
        assert!(violations.iter().any(|v| v.contains("unknown token")));
        assert!(violations.iter().any(|v| v.contains("missing description")));
    }
}
