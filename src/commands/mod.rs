pub mod debug;
pub mod delete;
pub mod deploy;
pub mod doctor;
pub mod init;
pub mod render;
pub mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::cli::{DebugOpts, DeployFlags, GlobalOpts};
use crate::config::model::{SkiffConfig, DEFAULT_HELPERS_REGISTRY};
use crate::config::{load_config, resolve::resolve_config};
use crate::debug::DebugEngine;
use crate::deploy::{DeployOptions, KubectlDeployer, WaitConfig};
use crate::image::Artifact;
use crate::kubectl::Kubectl;

/// Flags merged over the optional skiff.toml into one effective view.
pub(crate) struct Settings {
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub paths: Vec<PathBuf>,
    pub remotes: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub options: DeployOptions,
    pub helpers_registry: String,
    pub protocols: Vec<String>,
}

impl Settings {
    pub fn resolve(
        global: &GlobalOpts,
        flags: Option<&DeployFlags>,
        debug_opts: Option<&DebugOpts>,
    ) -> anyhow::Result<Self> {
        let (config, config_dir) = match resolve_config(global.config_file.as_deref())? {
            Some(path) => {
                let config = load_config(&path)?;
                if let Err(errors) = crate::config::validate::validate(&config) {
                    for error in errors {
                        eprintln!("{:?}", miette::Report::new(error));
                    }
                    anyhow::bail!("invalid configuration in {}", path.display());
                }
                let dir = path.parent().map(Path::to_path_buf);
                (config, dir)
            }
            None => (SkiffConfig::default(), None),
        };

        let mut paths: Vec<PathBuf> = config
            .deploy
            .manifests
            .iter()
            .map(|m| match &config_dir {
                Some(dir) => dir.join(m),
                None => PathBuf::from(m),
            })
            .collect();
        paths.extend(global.filenames.iter().cloned());

        let mut remotes = config.deploy.remote_manifests.clone();
        remotes.extend(global.remotes.iter().cloned());

        let mut artifacts = Vec::new();
        for artifact in &config.artifacts {
            let mut parsed = Artifact::new(&artifact.image, &artifact.tag);
            if let Some(runtime) = &artifact.runtime {
                parsed.runtime = Some(
                    runtime
                        .parse()
                        .map_err(|e: String| anyhow::anyhow!(e))
                        .with_context(|| format!("artifact `{}`", artifact.image))?,
                );
            }
            artifacts.push(parsed);
        }
        for entry in &global.images {
            artifacts.push(parse_artifact(entry)?);
        }

        let wait = WaitConfig {
            delay: match flags.and_then(|f| f.wait_delay) {
                Some(delay) => delay,
                None => humantime::parse_duration(&config.deploy.wait.delay)
                    .context("[deploy.wait] delay")?,
            },
            max: match flags.and_then(|f| f.wait_timeout) {
                Some(max) => max,
                None => humantime::parse_duration(&config.deploy.wait.max)
                    .context("[deploy.wait] max")?,
            },
        };

        let options = DeployOptions {
            force: config.deploy.force || flags.is_some_and(|f| f.force),
            validate: config.deploy.validate && !flags.is_some_and(|f| f.no_validate),
            default_repo: global
                .default_repo
                .clone()
                .or_else(|| config.deploy.default_repo.clone()),
            labels: parse_key_values(&global.labels, "label")?,
            annotations: parse_key_values(&global.annotations, "annotation")?,
            run_id: global.run_id.clone(),
            wait,
        };

        let helpers_registry = debug_opts
            .and_then(|d| d.helpers_registry.clone())
            .unwrap_or_else(|| {
                if config.debug.helpers_registry.is_empty() {
                    DEFAULT_HELPERS_REGISTRY.to_string()
                } else {
                    config.debug.helpers_registry.clone()
                }
            });
        let protocols = match debug_opts {
            Some(d) if !d.protocols.is_empty() => d.protocols.clone(),
            _ => config.debug.protocols.clone(),
        };

        Ok(Self {
            context: global
                .kube_context
                .clone()
                .or_else(|| config.deploy.context.clone()),
            namespace: global
                .namespace
                .clone()
                .or_else(|| config.deploy.namespace.clone()),
            paths,
            remotes,
            artifacts,
            options,
            helpers_registry,
            protocols,
        })
    }

    pub fn deployer(&self) -> anyhow::Result<KubectlDeployer> {
        let kubectl = Kubectl::new(self.context.clone(), self.namespace.clone())?;
        Ok(KubectlDeployer::new(
            kubectl,
            self.artifacts.clone(),
            self.options.clone(),
        ))
    }

    pub fn engine(&self) -> DebugEngine {
        DebugEngine::with_defaults(&self.helpers_registry)
            .with_protocols(self.protocols.clone())
    }

    pub fn require_manifests(&self) -> anyhow::Result<()> {
        if self.paths.is_empty() && self.remotes.is_empty() {
            anyhow::bail!(
                "no manifests given; pass -f/--filename or set [deploy] manifests in skiff.toml"
            );
        }
        Ok(())
    }
}

/// `NAME=TAG` build artifact flag.
pub(crate) fn parse_artifact(entry: &str) -> anyhow::Result<Artifact> {
    match entry.split_once('=') {
        Some((image, tag)) if !image.is_empty() && !tag.is_empty() => {
            Ok(Artifact::new(image, tag))
        }
        _ => anyhow::bail!("invalid --image `{entry}`, expected NAME=TAG"),
    }
}

pub(crate) fn parse_key_values(
    entries: &[String],
    what: &str,
) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                map.insert(key.to_string(), value.to_string());
            }
            _ => anyhow::bail!("invalid --{what} `{entry}`, expected KEY=VALUE"),
        }
    }
    Ok(map)
}

/// Token cancelled on ctrl-c, handed to every subprocess and wait loop.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    token
}
