use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure kinds surfaced by the render/deploy pipeline and the debug engine.
///
/// Per-container kinds (`DebugUnsupported`, the `Cnb*` family,
/// `ImageConfigFetch`, `EmptyCommand`) degrade to a warning and leave the
/// container untouched; the rest abort the enclosing operation.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("kubectl was not found on PATH")]
    #[diagnostic(
        code(skiff::kubectl_missing),
        help("install kubectl: https://kubernetes.io/docs/tasks/tools/")
    )]
    ToolMissing(#[source] which::Error),

    #[error("could not determine kubectl client version: {reason}")]
    #[diagnostic(code(skiff::kubectl_version))]
    ToolVersion { reason: String },

    #[error("reading manifest {}: {reason}", path.display())]
    #[diagnostic(code(skiff::read_manifest))]
    ReadManifest { path: PathBuf, reason: String },

    #[error("fetching remote manifest `{name}`: {reason}")]
    #[diagnostic(
        code(skiff::remote_manifest),
        help("remote manifests are read with `kubectl get <name> -o yaml`; check the resource name and your kube context")
    )]
    RemoteManifestRead { name: String, reason: String },

    #[error("kubectl apply failed: {stderr}")]
    #[diagnostic(code(skiff::apply_failed))]
    ApplyFailed { stderr: String },

    #[error("{} still pending deletion after {:?}", resources.join(", "), timeout)]
    #[diagnostic(
        code(skiff::delete_timeout),
        help("the previous deployment is still being torn down; increase [deploy.wait] max or delete the resources manually")
    )]
    DeleteTimeout {
        resources: Vec<String>,
        timeout: std::time::Duration,
    },

    #[error("`{program}` exited with status {status}: {stderr}")]
    #[diagnostic(code(skiff::command_failed))]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("operation cancelled")]
    #[diagnostic(code(skiff::cancelled))]
    Cancelled,

    // Per-container debug failures. The engine logs these and moves on.
    #[error("unable to determine runtime for container `{container}` (image {image})")]
    #[diagnostic(code(skiff::debug_unsupported))]
    DebugUnsupported { container: String, image: String },

    #[error("container `{container}` has no command to debug")]
    #[diagnostic(code(skiff::empty_command))]
    EmptyCommand { container: String },

    #[error("image {image} has no buildpacks metadata")]
    #[diagnostic(code(skiff::cnb_metadata_missing))]
    CnbMetadataMissing { image: String },

    #[error("image {image} has unparseable buildpacks metadata")]
    #[diagnostic(code(skiff::cnb_metadata_invalid))]
    CnbMetadataInvalid {
        image: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("buildpacks metadata for {image} declares no processes")]
    #[diagnostic(code(skiff::cnb_no_processes))]
    CnbNoProcesses { image: String },

    #[error("process type `{process}` not found in buildpacks metadata for {image}")]
    #[diagnostic(code(skiff::cnb_process_unresolved))]
    CnbProcessUnresolved { image: String, process: String },

    #[error("could not inspect image {image}: {reason}")]
    #[diagnostic(code(skiff::image_config_fetch))]
    ImageConfigFetch { image: String, reason: String },
}

impl Error {
    /// True for kinds that degrade a single container instead of aborting
    /// the walk.
    pub fn is_container_scoped(&self) -> bool {
        matches!(
            self,
            Error::DebugUnsupported { .. }
                | Error::EmptyCommand { .. }
                | Error::CnbMetadataMissing { .. }
                | Error::CnbMetadataInvalid { .. }
                | Error::CnbNoProcesses { .. }
                | Error::CnbProcessUnresolved { .. }
                | Error::ImageConfigFetch { .. }
        )
    }
}
