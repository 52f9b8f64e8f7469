use std::collections::HashMap;

use serde_yaml::Value;
use tracing::warn;

use crate::image::Artifact;
use crate::manifest::visitor::FieldVisitor;

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Name without tag or digest, including any registry/repository path.
    pub base_name: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
    /// True when the reference pins a tag or digest explicitly.
    pub fully_qualified: bool,
}

/// Parse `image` according to the reference grammar
/// `[registry/]repository[:tag][@digest]`.
pub fn parse_reference(image: &str) -> Result<ImageReference, String> {
    if image.is_empty() {
        return Err("empty image reference".to_string());
    }
    if image.chars().any(|c| c.is_whitespace()) {
        return Err(format!("image reference `{image}` contains whitespace"));
    }

    let (name_part, digest) = match image.split_once('@') {
        Some((name, digest)) => {
            if digest.is_empty() || digest.contains('@') {
                return Err(format!("malformed digest in `{image}`"));
            }
            (name, Some(digest.to_string()))
        }
        None => (image, None),
    };

    // A `:` after the last `/` separates the tag; before it, it is a
    // registry port.
    let slash = name_part.rfind('/').map_or(0, |i| i + 1);
    let (base_name, tag) = match name_part[slash..].rfind(':') {
        Some(i) => {
            let split = slash + i;
            let tag = &name_part[split + 1..];
            if tag.is_empty()
                || !tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            {
                return Err(format!("malformed tag in `{image}`"));
            }
            (&name_part[..split], Some(tag.to_string()))
        }
        None => (name_part, None),
    };

    if base_name.is_empty() {
        return Err(format!("missing name in `{image}`"));
    }

    Ok(ImageReference {
        base_name: base_name.to_string(),
        fully_qualified: tag.is_some() || digest.is_some(),
        tag,
        digest,
    })
}

struct Replacement {
    tag: String,
    matched: bool,
}

/// Rewrites `image:` fields to the tags of built artifacts.
///
/// Lookup is by base name; a configured default-repo prefix is stripped
/// before the lookup and re-applied to the replacement. Digest references
/// are left alone, malformed references are warned about and skipped.
pub struct ImageReplacer {
    replacements: HashMap<String, Replacement>,
    default_repo: Option<String>,
}

impl ImageReplacer {
    pub fn new(artifacts: &[Artifact], default_repo: Option<String>) -> Self {
        let mut replacements = HashMap::new();
        for artifact in artifacts {
            let base = match parse_reference(&artifact.image) {
                Ok(parsed) => parsed.base_name,
                Err(reason) => {
                    warn!(image = %artifact.image, %reason, "ignoring unparseable build artifact name");
                    continue;
                }
            };
            replacements.insert(
                base,
                Replacement {
                    tag: artifact.tag.clone(),
                    matched: false,
                },
            );
        }
        Self {
            replacements,
            default_repo,
        }
    }

    fn replace(&mut self, image: &str) -> Option<String> {
        let parsed = match parse_reference(image) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(%image, %reason, "skipping malformed image reference");
                return None;
            }
        };
        if parsed.digest.is_some() {
            return None;
        }
        if let Some(replacement) = self.replacements.get_mut(&parsed.base_name) {
            replacement.matched = true;
            return Some(replacement.tag.clone());
        }
        if let Some(repo) = &self.default_repo {
            if let Some(stripped) = parsed.base_name.strip_prefix(&format!("{repo}/")) {
                if let Some(replacement) = self.replacements.get_mut(stripped) {
                    replacement.matched = true;
                    return Some(format!("{repo}/{}", replacement.tag));
                }
            }
        }
        None
    }

    /// Base names of built artifacts that never matched a manifest reference.
    pub fn unused(&self) -> Vec<String> {
        let mut unused: Vec<String> = self
            .replacements
            .iter()
            .filter(|(_, r)| !r.matched)
            .map(|(name, _)| name.clone())
            .collect();
        unused.sort();
        unused
    }

    /// Emit one warning per built-but-unreferenced artifact.
    pub fn warn_unused(&self) {
        for name in self.unused() {
            warn!(image = %name, "image was built but is not used by any manifest");
        }
    }
}

impl FieldVisitor for ImageReplacer {
    fn visit(&mut self, key: &Value, value: &mut Value) -> bool {
        if key.as_str() != Some("image") {
            return true;
        }
        let Some(image) = value.as_str() else {
            return true;
        };
        if let Some(replacement) = self.replace(image) {
            *value = Value::from(replacement);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{visitor, ManifestList};

    #[test]
    fn parse_plain_name() {
        let r = parse_reference("example").unwrap();
        assert_eq!(r.base_name, "example");
        assert_eq!(r.tag, None);
        assert_eq!(r.digest, None);
        assert!(!r.fully_qualified);
    }

    #[test]
    fn parse_name_with_tag() {
        let r = parse_reference("example:v1").unwrap();
        assert_eq!(r.base_name, "example");
        assert_eq!(r.tag.as_deref(), Some("v1"));
        assert!(r.fully_qualified);
    }

    #[test]
    fn parse_registry_port_is_not_a_tag() {
        let r = parse_reference("localhost:5000/example").unwrap();
        assert_eq!(r.base_name, "localhost:5000/example");
        assert_eq!(r.tag, None);
    }

    #[test]
    fn parse_digest_reference() {
        let r = parse_reference("example@sha256:abc123").unwrap();
        assert_eq!(r.base_name, "example");
        assert_eq!(r.digest.as_deref(), Some("sha256:abc123"));
        assert!(r.fully_qualified);
    }

    #[test]
    fn parse_tag_and_digest() {
        let r = parse_reference("gcr.io/proj/example:v1@sha256:abc").unwrap();
        assert_eq!(r.base_name, "gcr.io/proj/example");
        assert_eq!(r.tag.as_deref(), Some("v1"));
        assert_eq!(r.digest.as_deref(), Some("sha256:abc"));
    }

    #[test]
    fn parse_rejects_whitespace_and_empty() {
        assert!(parse_reference("").is_err());
        assert!(parse_reference("bad image").is_err());
        assert!(parse_reference("example:").is_err());
    }

    fn artifacts() -> Vec<Artifact> {
        vec![
            Artifact::new("example", "example:TAG"),
            Artifact::new("other", "other:OTHER_TAG"),
            Artifact::new("unused", "unused:TAG"),
        ]
    }

    fn replace_all(yaml: &str, default_repo: Option<&str>) -> (String, Vec<String>) {
        let mut list = ManifestList::new();
        list.append(yaml.as_bytes());
        let mut replacer =
            ImageReplacer::new(&artifacts(), default_repo.map(str::to_string));
        let out = visitor::visit(&list, &mut replacer);
        (out.to_string(), replacer.unused())
    }

    const POD_TEMPLATE: &str = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\nspec:\n  containers:\n  - name: a\n    image: IMAGE\n";

    #[test]
    fn untagged_reference_replaced() {
        let (out, _) = replace_all(&POD_TEMPLATE.replace("IMAGE", "example"), None);
        assert!(out.contains("image: example:TAG"));
    }

    #[test]
    fn tagged_reference_overwritten() {
        let (out, _) = replace_all(&POD_TEMPLATE.replace("IMAGE", "example:latest"), None);
        assert!(out.contains("image: example:TAG"));
        let (out, _) = replace_all(&POD_TEMPLATE.replace("IMAGE", "example:v1"), None);
        assert!(out.contains("image: example:TAG"));
    }

    #[test]
    fn default_repo_prefix_substituted() {
        let (out, _) =
            replace_all(&POD_TEMPLATE.replace("IMAGE", "skaffold/other"), Some("skaffold"));
        assert!(out.contains("image: skaffold/other:OTHER_TAG"));
    }

    #[test]
    fn unknown_fully_qualified_reference_preserved() {
        let (out, _) = replace_all(
            &POD_TEMPLATE.replace("IMAGE", "skaffold/usedwrongfqn:OTHER"),
            Some("skaffold"),
        );
        assert!(out.contains("image: skaffold/usedwrongfqn:OTHER"));
    }

    #[test]
    fn digest_reference_preserved() {
        let (out, _) = replace_all(
            &POD_TEMPLATE.replace("IMAGE", "example@sha256:abcdef"),
            None,
        );
        assert!(out.contains("image: example@sha256:abcdef"));
    }

    #[test]
    fn unused_artifacts_reported() {
        let (_, unused) = replace_all(&POD_TEMPLATE.replace("IMAGE", "example"), None);
        assert_eq!(unused, vec!["other".to_string(), "unused".to_string()]);
    }

    #[test]
    fn malformed_reference_skipped() {
        let yaml = POD_TEMPLATE.replace("IMAGE", "'bad image'");
        let (out, _) = replace_all(&yaml, None);
        assert!(out.contains("bad image"));
    }
}
