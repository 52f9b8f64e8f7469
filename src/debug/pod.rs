//! Minimal typed view of the pod spec fields the debug engine rewrites.
//!
//! Unknown fields survive the round-trip through the `#[serde(flatten)]`
//! catch-alls, so manifests are never stripped of content the engine does
//! not understand.

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvVar {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub rest: Mapping,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            rest: Mapping::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerPort {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub container_port: u32,
    #[serde(flatten)]
    pub rest: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(flatten)]
    pub rest: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volume {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<Mapping>,
    #[serde(flatten)]
    pub rest: Mapping,
}

impl Volume {
    pub fn empty_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            empty_dir: Some(Mapping::new()),
            rest: Mapping::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<ContainerPort>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,
    #[serde(flatten)]
    pub rest: Mapping,
}

impl Container {
    /// Current value of an environment variable, when set with a literal
    /// value.
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .flatten()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    /// Set or replace an environment variable.
    pub fn set_env(&mut self, name: &str, value: String) {
        let env = self.env.get_or_insert_with(Vec::new);
        if let Some(existing) = env.iter_mut().find(|e| e.name == name) {
            existing.value = Some(value);
        } else {
            env.push(EnvVar::new(name, value));
        }
    }

    /// Expose a named container port, replacing any declaration with the
    /// same name or port number.
    pub fn expose_port(&mut self, name: &str, port: u32) {
        let ports = self.ports.get_or_insert_with(Vec::new);
        ports.retain(|p| p.name.as_deref() != Some(name) && p.container_port != port);
        ports.push(ContainerPort {
            name: Some(name.to_string()),
            container_port: port,
            rest: Mapping::new(),
        });
    }

    /// Mount `volume` at `path` unless an equivalent mount already exists.
    pub fn ensure_volume_mount(&mut self, volume: &str, path: &str) {
        let mounts = self.volume_mounts.get_or_insert_with(Vec::new);
        if mounts.iter().any(|m| m.name == volume) {
            return;
        }
        mounts.push(VolumeMount {
            name: volume.to_string(),
            mount_path: path.to_string(),
            rest: Mapping::new(),
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_containers: Option<Vec<Container>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(flatten)]
    pub rest: Mapping,
}
