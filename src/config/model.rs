use serde::Deserialize;

/// Default registry for the language debug-support images.
pub const DEFAULT_HELPERS_REGISTRY: &str = "gcr.io/k8s-skaffold/skaffold-debug-support";

#[derive(Debug, Default, Deserialize)]
pub struct SkiffConfig {
    #[serde(default)]
    pub project: Option<ProjectConfig>,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeployConfig {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub default_repo: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_validate")]
    pub validate: bool,
    #[serde(default)]
    pub manifests: Vec<String>,
    #[serde(default)]
    pub remote_manifests: Vec<String>,
    #[serde(default)]
    pub wait: WaitSection,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            context: None,
            namespace: None,
            default_repo: None,
            force: false,
            validate: default_validate(),
            manifests: Vec::new(),
            remote_manifests: Vec::new(),
            wait: WaitSection::default(),
        }
    }
}

fn default_validate() -> bool {
    true
}

fn default_wait_delay() -> String {
    "2s".to_string()
}

fn default_wait_max() -> String {
    "60s".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WaitSection {
    #[serde(default = "default_wait_delay")]
    pub delay: String,
    #[serde(default = "default_wait_max")]
    pub max: String,
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            delay: default_wait_delay(),
            max: default_wait_max(),
        }
    }
}

fn default_helpers_registry() -> String {
    DEFAULT_HELPERS_REGISTRY.to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DebugConfig {
    #[serde(default = "default_helpers_registry")]
    pub helpers_registry: String,
    #[serde(default)]
    pub protocols: Vec<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            helpers_registry: default_helpers_registry(),
            protocols: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArtifactConfig {
    pub image: String,
    pub tag: String,
    #[serde(default)]
    pub runtime: Option<String>,
}
