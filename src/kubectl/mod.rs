pub mod version;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::manifest::ManifestList;
use version::ClientVersion;

/// Minimum kubectl client minor version known to work.
const RECOMMENDED_MINOR: u32 = 12;
/// First minor version that requires `--dry-run=client` instead of the bare
/// deprecated flag.
const DRY_RUN_CLIENT_MINOR: u32 = 18;

/// Subprocess seam for the kubectl driver. Tests supply a scripted fake so
/// no OS process is involved.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run and capture stdout. A non-zero exit is an error carrying stderr.
    async fn run_out(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;

    /// Run with `stdin` piped in, discarding output.
    async fn run_in(
        &self,
        program: &str,
        args: &[String],
        stdin: &[u8],
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Run with `stdin` piped in and stdout captured.
    async fn run_pipe(
        &self,
        program: &str,
        args: &[String],
        stdin: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;
}

/// Runs commands as real OS subprocesses, racing them against the
/// cancellation token so a cancelled deploy kills its in-flight kubectl.
pub struct SystemRunner;

impl SystemRunner {
    async fn run(
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        debug!(%program, args = %args.join(" "), "running command");
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::CommandFailed {
            program: program.to_string(),
            status: -1,
            stderr: e.to_string(),
        })?;

        if let Some(bytes) = stdin {
            let mut handle = child.stdin.take().expect("stdin was piped");
            handle
                .write_all(bytes)
                .await
                .map_err(|e| Error::CommandFailed {
                    program: program.to_string(),
                    status: -1,
                    stderr: format!("writing stdin: {e}"),
                })?;
            drop(handle);
        }

        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| Error::CommandFailed {
                program: program.to_string(),
                status: -1,
                stderr: e.to_string(),
            })?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        if !output.status.success() {
            return Err(Error::CommandFailed {
                program: program.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run_out(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        Self::run(program, args, None, cancel).await
    }

    async fn run_in(
        &self,
        program: &str,
        args: &[String],
        stdin: &[u8],
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::run(program, args, Some(stdin), cancel).await.map(|_| ())
    }

    async fn run_pipe(
        &self,
        program: &str,
        args: &[String],
        stdin: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        Self::run(program, args, Some(stdin), cancel).await
    }
}

/// A resource as reported by `kubectl ... -ojson`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    pub metadata: ResourceMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMeta {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub deletion_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    items: Vec<Resource>,
}

/// Parse kubectl JSON output that is either a `{items: [...]}` list or a
/// single resource object.
pub fn parse_resources(output: &[u8]) -> Result<Vec<Resource>> {
    let trimmed: &[u8] = {
        let s = output;
        let start = s.iter().position(|b| !b.is_ascii_whitespace());
        match start {
            Some(i) => &s[i..],
            None => return Ok(Vec::new()),
        }
    };
    if let Ok(list) = serde_json::from_slice::<ResourceList>(trimmed) {
        return Ok(list.items);
    }
    let single: Resource =
        serde_json::from_slice(trimmed).map_err(|e| Error::CommandFailed {
            program: "kubectl".to_string(),
            status: 0,
            stderr: format!("unparseable resource output: {e}"),
        })?;
    Ok(vec![single])
}

/// Flags affecting `kubectl apply`.
#[derive(Debug, Clone, Default)]
pub struct ApplyFlags {
    /// Pass `--force --grace-period=0`.
    pub force: bool,
    /// When false, pass `--validate=false`.
    pub validate: bool,
}

/// Drives the `kubectl` CLI over stdin/stdout.
pub struct Kubectl {
    runner: Box<dyn CommandRunner>,
    context: Option<String>,
    namespace: Option<String>,
    version: OnceCell<ClientVersion>,
}

impl Kubectl {
    /// Create a driver backed by the real kubectl binary. Fails fast when
    /// the binary is not on PATH.
    pub fn new(context: Option<String>, namespace: Option<String>) -> Result<Self> {
        which::which("kubectl").map_err(Error::ToolMissing)?;
        Ok(Self::with_runner(Box::new(SystemRunner), context, namespace))
    }

    pub fn with_runner(
        runner: Box<dyn CommandRunner>,
        context: Option<String>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            runner,
            context,
            namespace,
            version: OnceCell::new(),
        }
    }

    fn args(&self, command: &[&str]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            args.push("--namespace".to_string());
            args.push(namespace.clone());
        }
        args.extend(command.iter().map(|s| s.to_string()));
        args
    }

    /// Client version, probed once per process and memoised. Probe or parse
    /// failures yield `unknown` rather than an error.
    pub async fn version(&self, cancel: &CancellationToken) -> ClientVersion {
        self.version
            .get_or_init(|| async {
                let args = self.args(&["version", "--client", "-ojson"]);
                match self.runner.run_out("kubectl", &args, cancel).await {
                    Ok(output) => version::parse_version(&output),
                    Err(err) => {
                        debug!(error = %err, "kubectl version probe failed");
                        ClientVersion::unknown()
                    }
                }
            })
            .await
            .clone()
    }

    /// Warn about old clients; error when the version cannot be determined.
    pub async fn check_version(&self, cancel: &CancellationToken) -> Result<()> {
        let version = self.version(cancel).await;
        match version.minor_number() {
            None => Err(Error::ToolVersion {
                reason: format!("unparseable client version {version}"),
            }),
            Some(minor) if minor < RECOMMENDED_MINOR => {
                warn!(%version, "kubectl client version is below the recommended minimum 1.12");
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Normalise local manifest files into a single YAML stream with
    /// `kubectl create --dry-run`.
    pub async fn read_manifests(
        &self,
        cancel: &CancellationToken,
        paths: &[PathBuf],
    ) -> Result<ManifestList> {
        let dry_run = if self
            .version(cancel)
            .await
            .minor_number()
            .is_some_and(|minor| minor >= DRY_RUN_CLIENT_MINOR)
        {
            "--dry-run=client"
        } else {
            "--dry-run"
        };

        let mut list = ManifestList::new();
        for path in paths {
            let mut args = self.args(&["create", dry_run, "-oyaml", "-f"]);
            args.push(path.display().to_string());
            let output = self
                .runner
                .run_out("kubectl", &args, cancel)
                .await
                .map_err(|e| read_manifest_error(path, e))?;
            list.append(&output);
        }
        Ok(list)
    }

    /// Fetch a resource already present in the cluster, e.g. `deployment/app`.
    pub async fn read_remote_manifest(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Vec<u8>> {
        let args = self.args(&["get", name, "-o", "yaml"]);
        self.runner
            .run_out("kubectl", &args, cancel)
            .await
            .map_err(|e| Error::RemoteManifestRead {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// `kubectl apply` the given manifests, returning the applied resources.
    /// No-op on an empty list.
    pub async fn apply(
        &self,
        cancel: &CancellationToken,
        manifests: &ManifestList,
        flags: &ApplyFlags,
    ) -> Result<Vec<Resource>> {
        if manifests.is_empty() {
            return Ok(Vec::new());
        }
        let mut command = vec!["apply"];
        if flags.force {
            command.push("--force");
            command.push("--grace-period=0");
        }
        if !flags.validate {
            command.push("--validate=false");
        }
        command.extend(["-f", "-", "-ojson"]);
        let args = self.args(&command);
        let output = self
            .runner
            .run_pipe("kubectl", &args, manifests.to_string().as_bytes(), cancel)
            .await
            .map_err(|e| match e {
                Error::CommandFailed { stderr, .. } => Error::ApplyFailed { stderr },
                other => other,
            })?;
        parse_resources(&output)
    }

    /// `kubectl delete` the given manifests. No-op on an empty list.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        manifests: &ManifestList,
        dry_run: bool,
    ) -> Result<()> {
        if manifests.is_empty() {
            return Ok(());
        }
        let mut command = vec!["delete", "--ignore-not-found=true", "--wait=false"];
        if dry_run {
            command.push("--dry-run");
        }
        command.extend(["-f", "-"]);
        let args = self.args(&command);
        self.runner
            .run_in("kubectl", &args, manifests.to_string().as_bytes(), cancel)
            .await
    }

    /// Poll `kubectl get` until no resource in `manifests` is still pending
    /// deletion, or until `max` elapses.
    pub async fn wait_for_deletions(
        &self,
        cancel: &CancellationToken,
        manifests: &ManifestList,
        delay: Duration,
        max: Duration,
    ) -> Result<()> {
        if manifests.is_empty() {
            return Ok(());
        }
        let args = self.args(&["get", "-f", "-", "--ignore-not-found", "-ojson"]);
        let stdin = manifests.to_string().into_bytes();
        let start = tokio::time::Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let output = self.runner.run_pipe("kubectl", &args, &stdin, cancel).await?;
            let pending: Vec<String> = parse_resources(&output)
                .unwrap_or_default()
                .into_iter()
                .filter(|r| {
                    r.metadata
                        .deletion_timestamp
                        .as_deref()
                        .is_some_and(|ts| !ts.is_empty())
                })
                .map(|r| r.metadata.name)
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            if start.elapsed() + delay >= max {
                return Err(Error::DeleteTimeout {
                    resources: pending,
                    timeout: max,
                });
            }
            debug!(pending = %pending.join(", "), "waiting for deletions to drain");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }
}

fn read_manifest_error(path: &Path, err: Error) -> Error {
    Error::ReadManifest {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
