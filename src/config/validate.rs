use std::collections::HashSet;

use miette::Diagnostic;
use thiserror::Error;

use crate::config::model::SkiffConfig;
use crate::image::RuntimeType;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigDiagnostic {
    #[error("artifact image `{image}` is declared more than once")]
    #[diagnostic(code(skiff::duplicate_artifact))]
    DuplicateArtifact { image: String },

    #[error("artifact `{image}` has an empty tag")]
    #[diagnostic(
        code(skiff::empty_tag),
        help("set tag to the image reference your build produced")
    )]
    EmptyTag { image: String },

    #[error("invalid runtime `{runtime}` for artifact `{image}`")]
    #[diagnostic(
        code(skiff::invalid_runtime),
        help("valid runtimes are: jvm, nodejs, go, python, netcore")
    )]
    InvalidRuntime { image: String, runtime: String },

    #[error("invalid duration `{value}` for [deploy.wait] {field}")]
    #[diagnostic(
        code(skiff::invalid_duration),
        help("use humantime syntax, e.g. \"500ms\", \"2s\", \"1m\"")
    )]
    InvalidDuration { field: &'static str, value: String },

    #[error("unknown debug protocol `{protocol}`")]
    #[diagnostic(
        code(skiff::unknown_protocol),
        help("supported protocols: debugpy, pydevd, ptvsd")
    )]
    UnknownProtocol { protocol: String },
}

/// Validate the parsed config, collecting every problem instead of stopping
/// at the first.
pub fn validate(config: &SkiffConfig) -> Result<(), Vec<ConfigDiagnostic>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for artifact in &config.artifacts {
        if !seen.insert(artifact.image.as_str()) {
            errors.push(ConfigDiagnostic::DuplicateArtifact {
                image: artifact.image.clone(),
            });
        }
        if artifact.tag.is_empty() {
            errors.push(ConfigDiagnostic::EmptyTag {
                image: artifact.image.clone(),
            });
        }
        if let Some(runtime) = &artifact.runtime {
            if runtime.parse::<RuntimeType>().is_err() {
                errors.push(ConfigDiagnostic::InvalidRuntime {
                    image: artifact.image.clone(),
                    runtime: runtime.clone(),
                });
            }
        }
    }

    for (field, value) in [
        ("delay", &config.deploy.wait.delay),
        ("max", &config.deploy.wait.max),
    ] {
        if humantime::parse_duration(value).is_err() {
            errors.push(ConfigDiagnostic::InvalidDuration {
                field,
                value: value.clone(),
            });
        }
    }

    for protocol in &config.debug.protocols {
        if !matches!(protocol.as_str(), "debugpy" | "pydevd" | "ptvsd") {
            errors.push(ConfigDiagnostic::UnknownProtocol {
                protocol: protocol.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
