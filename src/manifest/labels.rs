use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::manifest::visitor::FieldVisitor;

/// Annotation stamped on every deployed resource when a run identifier is
/// configured; unlike user labels it is overwritten on every deploy.
pub const RUN_ID_ANNOTATION: &str = "skiff.dev/run-id";

fn ensure_mapping<'a>(metadata: &'a mut Mapping, field: &str) -> &'a mut Mapping {
    let key = Value::from(field);
    if !matches!(metadata.get(&key), Some(Value::Mapping(_))) {
        metadata.insert(key.clone(), Value::Mapping(Mapping::new()));
    }
    metadata
        .get_mut(&key)
        .and_then(Value::as_mapping_mut)
        .expect("mapping was just ensured")
}

fn set_missing(map: &mut Mapping, entries: &BTreeMap<String, String>) {
    for (k, v) in entries {
        let key = Value::from(k.as_str());
        if !map.contains_key(&key) {
            map.insert(key, Value::from(v.as_str()));
        }
    }
}

/// Adds labels to each `metadata` mapping, never overwriting existing keys.
pub struct LabelSetter {
    labels: BTreeMap<String, String>,
}

impl LabelSetter {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }
}

impl FieldVisitor for LabelSetter {
    fn visit(&mut self, key: &Value, value: &mut Value) -> bool {
        if key.as_str() != Some("metadata") {
            return true;
        }
        if let Value::Mapping(metadata) = value {
            if !self.labels.is_empty() {
                set_missing(ensure_mapping(metadata, "labels"), &self.labels);
            }
        }
        false
    }
}

/// Adds annotations to each `metadata` mapping. User annotations never
/// overwrite; the run-id annotation always does.
pub struct AnnotationSetter {
    annotations: BTreeMap<String, String>,
    run_id: Option<String>,
}

impl AnnotationSetter {
    pub fn new(annotations: BTreeMap<String, String>, run_id: Option<String>) -> Self {
        Self {
            annotations,
            run_id,
        }
    }
}

impl FieldVisitor for AnnotationSetter {
    fn visit(&mut self, key: &Value, value: &mut Value) -> bool {
        if key.as_str() != Some("metadata") {
            return true;
        }
        if let Value::Mapping(metadata) = value {
            if !self.annotations.is_empty() || self.run_id.is_some() {
                let annotations = ensure_mapping(metadata, "annotations");
                set_missing(annotations, &self.annotations);
                if let Some(run_id) = &self.run_id {
                    annotations.insert(
                        Value::from(RUN_ID_ANNOTATION),
                        Value::from(run_id.as_str()),
                    );
                }
            }
        }
        false
    }
}
