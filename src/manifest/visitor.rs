use serde_yaml::{Mapping, Value};
use tracing::warn;

use crate::manifest::ManifestList;

/// Workload kinds whose whole document tree is eligible for transformation.
///
/// Everything else (CustomResourceDefinitions in particular, whose embedded
/// OpenAPI schemas must never be stamped) is visited at the top-level mapping
/// only.
const TRANSFORMABLE_KINDS: &[(&str, &str)] = &[
    ("", "Pod"),
    ("apps", "DaemonSet"),
    ("apps", "Deployment"),
    ("apps", "ReplicaSet"),
    ("apps", "StatefulSet"),
    ("batch", "CronJob"),
    ("batch", "Job"),
    ("serving.knative.dev", "Service"),
    ("agones.dev", "Fleet"),
    ("agones.dev", "GameServer"),
    // deprecated pre-apps/v1 aliases
    ("extensions", "DaemonSet"),
    ("extensions", "Deployment"),
    ("extensions", "ReplicaSet"),
];

/// Field callback used by [`visit`]. Returning `true` recurses into `value`;
/// returning `false` marks the key as handled.
pub trait FieldVisitor {
    fn visit(&mut self, key: &Value, value: &mut Value) -> bool;
}

/// Extract `(group, kind)` from a parsed document. The group is the part of
/// `apiVersion` before the `/`, or empty for the core group.
pub fn group_kind(doc: &Mapping) -> Option<(String, String)> {
    let api_version = doc.get("apiVersion")?.as_str()?;
    let kind = doc.get("kind")?.as_str()?;
    let group = match api_version.split_once('/') {
        Some((group, _version)) => group,
        None => "",
    };
    Some((group.to_string(), kind.to_string()))
}

/// Whether `group`/`kind` is in the fixed transformable allow-list.
pub fn transformable(group: &str, kind: &str) -> bool {
    TRANSFORMABLE_KINDS.iter().any(|&(g, k)| g == group && k == kind)
}

/// Walk every document of `list` with `visitor` and return the rewritten
/// list.
///
/// Allow-listed kinds are visited recursively through the whole tree; other
/// kinds see a single pass over their top-level mapping. Documents the
/// visitor leaves untouched keep their original bytes; unparseable documents
/// pass through unchanged with a warning.
pub fn visit(list: &ManifestList, visitor: &mut dyn FieldVisitor) -> ManifestList {
    let mut out = ManifestList::new();
    for doc in list.iter() {
        match serde_yaml::from_slice::<Value>(doc) {
            Ok(mut parsed) => {
                let original = parsed.clone();
                visit_document(&mut parsed, visitor);
                if parsed == original {
                    out.push(doc.to_vec());
                } else {
                    match serde_yaml::to_string(&parsed) {
                        Ok(s) => out.push(s.into_bytes()),
                        Err(err) => {
                            warn!(error = %err, "re-serialising manifest failed, keeping original");
                            out.push(doc.to_vec());
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "skipping unparseable manifest document");
                out.push(doc.to_vec());
            }
        }
    }
    out
}

fn visit_document(doc: &mut Value, visitor: &mut dyn FieldVisitor) {
    let recursive = doc
        .as_mapping()
        .and_then(group_kind)
        .is_some_and(|(group, kind)| transformable(&group, &kind));

    if recursive {
        visit_fields(doc, visitor);
    } else if let Value::Mapping(m) = doc {
        for (key, value) in m.iter_mut() {
            visitor.visit(key, value);
        }
    }
}

fn visit_fields(value: &mut Value, visitor: &mut dyn FieldVisitor) {
    match value {
        Value::Mapping(m) => {
            for (key, val) in m.iter_mut() {
                if visitor.visit(key, val) {
                    visit_fields(val, visitor);
                }
            }
        }
        Value::Sequence(seq) => {
            for item in seq.iter_mut() {
                visit_fields(item, visitor);
            }
        }
        Value::Tagged(tagged) => visit_fields(&mut tagged.value, visitor),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Vec<String>,
    }

    impl FieldVisitor for Recorder {
        fn visit(&mut self, key: &Value, _value: &mut Value) -> bool {
            if let Some(k) = key.as_str() {
                self.seen.push(k.to_string());
            }
            true
        }
    }

    struct RenameImages;

    impl FieldVisitor for RenameImages {
        fn visit(&mut self, key: &Value, value: &mut Value) -> bool {
            if key.as_str() == Some("image") && value.as_str().is_some() {
                *value = Value::from("replaced");
                return false;
            }
            true
        }
    }

    fn list(yaml: &str) -> ManifestList {
        let mut l = ManifestList::new();
        l.append(yaml.as_bytes());
        l
    }

    #[test]
    fn group_kind_core_and_grouped() {
        let pod: Mapping = serde_yaml::from_str("apiVersion: v1\nkind: Pod").unwrap();
        assert_eq!(group_kind(&pod), Some((String::new(), "Pod".to_string())));

        let deploy: Mapping = serde_yaml::from_str("apiVersion: apps/v1\nkind: Deployment").unwrap();
        assert_eq!(
            group_kind(&deploy),
            Some(("apps".to_string(), "Deployment".to_string()))
        );
    }

    #[test]
    fn allow_list_membership() {
        assert!(transformable("", "Pod"));
        assert!(transformable("batch", "CronJob"));
        assert!(transformable("serving.knative.dev", "Service"));
        assert!(transformable("extensions", "Deployment"));
        assert!(!transformable("", "Service"));
        assert!(!transformable("apiextensions.k8s.io", "CustomResourceDefinition"));
    }

    #[test]
    fn recursive_visit_reaches_nested_fields() {
        let l = list(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\nspec:\n  containers:\n  - name: web\n    image: nginx\n",
        );
        let mut v = RenameImages;
        let out = visit(&l, &mut v);
        assert!(out.to_string().contains("image: replaced"));
    }

    #[test]
    fn non_allow_listed_kind_gets_top_level_pass_only() {
        let l = list(
            "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: crd\nspec:\n  schema:\n    image: nginx\n",
        );
        let mut v = RenameImages;
        let out = visit(&l, &mut v);
        // The embedded `image` key is below the top level and must not be touched.
        assert!(out.to_string().contains("image: nginx"));
    }

    #[test]
    fn top_level_keys_still_visited_for_unknown_kinds() {
        let l = list("apiVersion: example.dev/v1\nkind: Widget\nmetadata:\n  name: w\n");
        let mut v = Recorder { seen: vec![] };
        visit(&l, &mut v);
        assert_eq!(v.seen, vec!["apiVersion", "kind", "metadata"]);
    }

    #[test]
    fn untouched_documents_keep_original_bytes() {
        let raw = "apiVersion: v1\nkind: Pod\nmetadata:\n  # a comment that yaml round-trips would drop\n  name: p";
        let l = list(raw);
        let mut v = Recorder { seen: vec![] };
        let out = visit(&l, &mut v);
        assert_eq!(out.to_string(), raw);
    }

    #[test]
    fn unparseable_document_passes_through() {
        let mut l = ManifestList::new();
        l.push(b"apiVersion: v1\nkind: Pod\n\tbad indent".to_vec());
        let mut v = Recorder { seen: vec![] };
        let out = visit(&l, &mut v);
        assert_eq!(out.len(), 1);
    }
}
