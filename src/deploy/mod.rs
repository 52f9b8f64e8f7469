use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::image::Artifact;
use crate::kubectl::{ApplyFlags, Kubectl, Resource};
use crate::manifest::image::ImageReplacer;
use crate::manifest::labels::{AnnotationSetter, LabelSetter};
use crate::manifest::namespaces::NamespaceCollector;
use crate::manifest::{visitor, ManifestList};

/// Polling parameters for the wait-for-deletions loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub delay: Duration,
    pub max: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            max: Duration::from_secs(60),
        }
    }
}

/// Everything configurable about a deploy besides the kube context.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub force: bool,
    pub validate: bool,
    pub default_repo: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub run_id: Option<String>,
    pub wait: WaitConfig,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            force: false,
            validate: true,
            default_repo: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            run_id: None,
            wait: WaitConfig::default(),
        }
    }
}

/// Result of an apply cycle.
#[derive(Debug, Default)]
pub struct DeployOutcome {
    pub resources: Vec<Resource>,
    /// Namespaces referenced by the rendered manifests, for downstream
    /// status checks.
    pub namespaces: Vec<String>,
}

/// Deploys manifest streams through the kubectl driver, diffing against the
/// previous apply so unchanged documents are not re-sent.
///
/// Not intended for concurrent use from multiple callers: the previous-apply
/// state is per instance.
pub struct KubectlDeployer {
    kubectl: Kubectl,
    artifacts: Vec<Artifact>,
    options: DeployOptions,
    previous: ManifestList,
}

impl KubectlDeployer {
    pub fn new(kubectl: Kubectl, artifacts: Vec<Artifact>, options: DeployOptions) -> Self {
        Self {
            kubectl,
            artifacts,
            options,
            previous: ManifestList::new(),
        }
    }

    pub fn kubectl(&self) -> &Kubectl {
        &self.kubectl
    }

    /// Read local manifests (normalised through `kubectl create --dry-run`)
    /// and fetch any remote manifests, preserving input order.
    pub async fn read_manifests(
        &self,
        cancel: &CancellationToken,
        paths: &[PathBuf],
        remotes: &[String],
    ) -> Result<ManifestList> {
        let mut list = self.kubectl.read_manifests(cancel, paths).await?;
        for name in remotes {
            let manifest = self.kubectl.read_remote_manifest(cancel, name).await?;
            list.append(&manifest);
        }
        Ok(list)
    }

    /// Rewrite image references to built tags and stamp labels/annotations.
    /// Returns the rendered list and the namespaces it references.
    pub fn render(&self, list: &ManifestList) -> (ManifestList, Vec<String>) {
        let mut replacer =
            ImageReplacer::new(&self.artifacts, self.options.default_repo.clone());
        let mut rendered = visitor::visit(list, &mut replacer);
        replacer.warn_unused();

        if !self.options.labels.is_empty() {
            let mut setter = LabelSetter::new(self.options.labels.clone());
            rendered = visitor::visit(&rendered, &mut setter);
        }
        if !self.options.annotations.is_empty() || self.options.run_id.is_some() {
            let mut setter = AnnotationSetter::new(
                self.options.annotations.clone(),
                self.options.run_id.clone(),
            );
            rendered = visitor::visit(&rendered, &mut setter);
        }

        let mut collector = NamespaceCollector::new();
        visitor::visit(&rendered, &mut collector);
        (rendered, collector.into_namespaces())
    }

    /// Apply the documents of `list` that differ from the previous apply,
    /// after waiting out in-flight deletions. Empty diff means no kubectl
    /// invocation at all.
    pub async fn deploy(
        &mut self,
        cancel: &CancellationToken,
        list: &ManifestList,
        namespaces: Vec<String>,
    ) -> Result<DeployOutcome> {
        if let Err(err) = self.kubectl.check_version(cancel).await {
            warn!(error = %err, "kubectl version check failed");
        }

        let updated = list.diff(&self.previous);
        if updated.is_empty() {
            debug!("no manifest changes, skipping apply");
            return Ok(DeployOutcome {
                resources: Vec::new(),
                namespaces,
            });
        }

        self.kubectl
            .wait_for_deletions(cancel, &updated, self.options.wait.delay, self.options.wait.max)
            .await?;

        let flags = ApplyFlags {
            force: self.options.force,
            validate: self.options.validate,
        };
        let resources = self.kubectl.apply(cancel, &updated, &flags).await?;
        info!(applied = updated.len(), "manifests applied");
        self.previous = list.clone();

        Ok(DeployOutcome {
            resources,
            namespaces,
        })
    }

    /// Delete everything in `list`. Clears the diff state so the next
    /// deploy re-applies from scratch.
    pub async fn cleanup(
        &mut self,
        cancel: &CancellationToken,
        list: &ManifestList,
        dry_run: bool,
    ) -> Result<()> {
        self.kubectl.delete(cancel, list, dry_run).await?;
        if !dry_run {
            self.previous = ManifestList::new();
        }
        Ok(())
    }
}
