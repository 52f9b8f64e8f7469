use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::process::Command;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::manifest::image::parse_reference;

/// A built container image: the logical name the user declared and the
/// concrete tag the build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub image: String,
    pub tag: String,
    /// User-declared runtime override for debug instrumentation.
    pub runtime: Option<RuntimeType>,
}

impl Artifact {
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
            runtime: None,
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeType) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

/// Language runtime of a container image, as declared by the user or
/// detected from the image configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Jvm,
    Nodejs,
    Go,
    Python,
    Netcore,
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeType::Jvm => "jvm",
            RuntimeType::Nodejs => "nodejs",
            RuntimeType::Go => "go",
            RuntimeType::Python => "python",
            RuntimeType::Netcore => "netcore",
        })
    }
}

impl FromStr for RuntimeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jvm" | "java" => Ok(RuntimeType::Jvm),
            "nodejs" | "node" => Ok(RuntimeType::Nodejs),
            "go" | "golang" => Ok(RuntimeType::Go),
            "python" => Ok(RuntimeType::Python),
            "netcore" | "dotnet" => Ok(RuntimeType::Netcore),
            other => Err(format!("unknown runtime `{other}`")),
        }
    }
}

/// The OCI image config view the debug engine consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageConfiguration {
    /// Logical artifact name, when the image maps to a declared build.
    pub artifact: Option<String>,
    pub author: String,
    pub runtime: Option<RuntimeType>,
    pub env: BTreeMap<String, String>,
    pub entrypoint: Vec<String>,
    pub arguments: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub working_dir: String,
}

/// Split `NAME=value` pairs on the first `=`; the value may itself contain
/// `=`.
pub fn env_as_map(env: &[String]) -> BTreeMap<String, String> {
    env.iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Produces the [`ImageConfiguration`] for an image reference.
pub trait ImageConfigLoader {
    fn load(&mut self, image: &str) -> Result<ImageConfiguration>;
}

/// Memoises loads per image. Returned configurations are fresh clones, so
/// transformers can mutate their copy without poisoning the cache.
pub struct CachingLoader<L> {
    inner: L,
    cache: HashMap<String, ImageConfiguration>,
}

impl<L: ImageConfigLoader> CachingLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }
}

impl<L: ImageConfigLoader> ImageConfigLoader for CachingLoader<L> {
    fn load(&mut self, image: &str) -> Result<ImageConfiguration> {
        if let Some(config) = self.cache.get(image) {
            return Ok(config.clone());
        }
        let config = self.inner.load(image)?;
        self.cache.insert(image.to_string(), config.clone());
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct DockerInspect {
    #[serde(rename = "Author", default)]
    author: String,
    #[serde(rename = "Config", default)]
    config: DockerImageConfig,
}

#[derive(Debug, Default, Deserialize)]
struct DockerImageConfig {
    #[serde(rename = "Env", default)]
    env: Vec<String>,
    #[serde(rename = "Entrypoint", default)]
    entrypoint: Option<Vec<String>>,
    #[serde(rename = "Cmd", default)]
    cmd: Option<Vec<String>>,
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(rename = "WorkingDir", default)]
    working_dir: String,
}

/// Reads image configuration through `docker image inspect`.
///
/// Requires the image to be present in the local daemon, which holds for
/// every image this tool just built. Declared artifacts are matched by tag
/// or base name to attach the logical name and any runtime override.
pub struct DockerCliLoader {
    artifacts: Vec<Artifact>,
}

impl DockerCliLoader {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts }
    }

    fn find_artifact(&self, image: &str) -> Option<&Artifact> {
        if let Some(artifact) = self.artifacts.iter().find(|a| a.tag == image) {
            return Some(artifact);
        }
        let base = parse_reference(image).ok()?.base_name;
        self.artifacts.iter().find(|a| {
            a.image == base
                || parse_reference(&a.tag)
                    .map(|r| r.base_name == base)
                    .unwrap_or(false)
        })
    }
}

impl ImageConfigLoader for DockerCliLoader {
    fn load(&mut self, image: &str) -> Result<ImageConfiguration> {
        debug!(%image, "inspecting image configuration");
        let output = Command::new("docker")
            .args(["image", "inspect", image])
            .output()
            .map_err(|e| Error::ImageConfigFetch {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::ImageConfigFetch {
                image: image.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let mut inspected: Vec<DockerInspect> =
            serde_json::from_slice(&output.stdout).map_err(|e| Error::ImageConfigFetch {
                image: image.to_string(),
                reason: format!("unparseable inspect output: {e}"),
            })?;
        let inspect = if inspected.is_empty() {
            return Err(Error::ImageConfigFetch {
                image: image.to_string(),
                reason: "inspect returned no image".to_string(),
            });
        } else {
            inspected.remove(0)
        };

        let artifact = self.find_artifact(image);
        Ok(ImageConfiguration {
            artifact: artifact.map(|a| a.image.clone()),
            author: inspect.author,
            runtime: artifact.and_then(|a| a.runtime),
            env: env_as_map(&inspect.config.env),
            entrypoint: inspect.config.entrypoint.unwrap_or_default(),
            arguments: inspect.config.cmd.unwrap_or_default(),
            labels: inspect.config.labels.unwrap_or_default(),
            working_dir: inspect.config.working_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_as_map_splits_on_first_equals() {
        let env = vec![
            "PATH=/usr/bin".to_string(),
            "JAVA_TOOL_OPTIONS=-Dx=y -De=f".to_string(),
        ];
        let map = env_as_map(&env);
        assert_eq!(map["PATH"], "/usr/bin");
        assert_eq!(map["JAVA_TOOL_OPTIONS"], "-Dx=y -De=f");
    }

    #[test]
    fn env_as_map_ignores_entries_without_equals() {
        let env = vec!["MALFORMED".to_string()];
        assert!(env_as_map(&env).is_empty());
    }

    #[test]
    fn runtime_round_trip() {
        for runtime in [
            RuntimeType::Jvm,
            RuntimeType::Nodejs,
            RuntimeType::Go,
            RuntimeType::Python,
            RuntimeType::Netcore,
        ] {
            assert_eq!(runtime.to_string().parse::<RuntimeType>(), Ok(runtime));
        }
        assert!("ruby".parse::<RuntimeType>().is_err());
    }

    struct CountingLoader {
        calls: usize,
    }

    impl ImageConfigLoader for CountingLoader {
        fn load(&mut self, image: &str) -> Result<ImageConfiguration> {
            self.calls += 1;
            Ok(ImageConfiguration {
                artifact: Some(image.to_string()),
                ..Default::default()
            })
        }
    }

    #[test]
    fn caching_loader_loads_once_per_image() {
        let mut loader = CachingLoader::new(CountingLoader { calls: 0 });
        loader.load("a:1").unwrap();
        loader.load("a:1").unwrap();
        loader.load("b:1").unwrap();
        assert_eq!(loader.inner.calls, 2);
    }

    #[test]
    fn cached_copies_are_independent() {
        let mut loader = CachingLoader::new(CountingLoader { calls: 0 });
        let mut first = loader.load("a:1").unwrap();
        first.env.insert("MUTATED".to_string(), "yes".to_string());
        let second = loader.load("a:1").unwrap();
        assert!(second.env.is_empty());
    }
}
