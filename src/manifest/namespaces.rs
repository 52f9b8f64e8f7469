use std::collections::BTreeSet;

use serde_yaml::Value;

use crate::manifest::visitor::FieldVisitor;

/// Collects `metadata.namespace` values across a manifest walk. Used to
/// bound status checks and port-forwarding to the namespaces actually
/// deployed to.
#[derive(Default)]
pub struct NamespaceCollector {
    namespaces: BTreeSet<String>,
}

impl NamespaceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted unique non-empty namespace names seen so far.
    pub fn into_namespaces(self) -> Vec<String> {
        self.namespaces.into_iter().collect()
    }
}

impl FieldVisitor for NamespaceCollector {
    fn visit(&mut self, key: &Value, value: &mut Value) -> bool {
        if key.as_str() != Some("metadata") {
            return true;
        }
        if let Some(namespace) = value
            .as_mapping()
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
        {
            if !namespace.is_empty() {
                self.namespaces.insert(namespace.to_string());
            }
        }
        false
    }
}
