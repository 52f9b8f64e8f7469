use std::collections::BTreeMap;

use crate::debug::pod::Container;
use crate::debug::ports::PortAllocator;
use crate::debug::{invokes, ContainerDebugConfiguration, TransformContext, Transformation, Transformer};
use crate::errors::{Error, Result};
use crate::image::{ImageConfiguration, RuntimeType};

const DEFAULT_DLV_PORT: u32 = 56268;
const DLV_PATH: &str = "/dbg/go/bin/dlv";

/// Instruments Go containers by wrapping the binary in a headless Delve
/// session. Go has no env-var hook, so the command line must be rewritten;
/// the `dlv` binary comes from the `go` support image.
pub struct DelveTransformer;

impl Transformer for DelveTransformer {
    fn runtime(&self) -> RuntimeType {
        RuntimeType::Go
    }

    fn is_applicable(&self, config: &ImageConfiguration, _ctx: &TransformContext) -> bool {
        if config.runtime == Some(RuntimeType::Go) {
            return true;
        }
        if ["GOMAXPROCS", "GOGC", "GODEBUG", "GOTRACEBACK", "KO_DATA_PATH"]
            .iter()
            .any(|v| config.env.contains_key(*v))
        {
            return true;
        }
        // ko-built images identify themselves through the author field.
        if config.author.contains("github.com/google/ko") {
            return true;
        }
        config
            .entrypoint
            .iter()
            .chain(config.arguments.iter())
            .any(|token| invokes(token, "dlv"))
    }

    fn apply(
        &self,
        container: &mut Container,
        config: &ImageConfiguration,
        allocator: &mut PortAllocator,
        ctx: &TransformContext,
    ) -> Result<Transformation> {
        let port = if let Some(spec) =
            extract_dlv_spec(&config.entrypoint).or_else(|| extract_dlv_spec(&config.arguments))
        {
            allocator.reserve(spec.port);
            spec.port
        } else {
            let port = allocator.allocate(DEFAULT_DLV_PORT);
            let use_entrypoint = config
                .entrypoint
                .first()
                .is_some_and(|first| !ctx.is_launcher(first));
            let original = if use_entrypoint {
                &config.entrypoint
            } else {
                &config.arguments
            };
            if original.is_empty() {
                return Err(Error::EmptyCommand {
                    container: container.name.clone(),
                });
            }
            let rewritten = dlv_command_line(original, port);
            if use_entrypoint {
                container.command = Some(rewritten);
            } else {
                container.args = Some(rewritten);
            }
            port
        };
        container.expose_port("dlv", port);

        Ok(Transformation {
            configuration: ContainerDebugConfiguration {
                artifact: config.artifact.clone(),
                runtime: RuntimeType::Go,
                working_dir: None,
                ports: BTreeMap::from([("dlv".to_string(), port)]),
            },
            support_image: Some("go"),
        })
    }
}

fn dlv_command_line(original: &[String], port: u32) -> Vec<String> {
    let mut command = vec![
        DLV_PATH.to_string(),
        "exec".to_string(),
        "--headless".to_string(),
        "--continue".to_string(),
        "--accept-multiclient".to_string(),
        format!("--listen=:{port}"),
        "--api-version=2".to_string(),
        original[0].clone(),
    ];
    if original.len() > 1 {
        command.push("--".to_string());
        command.extend(original[1..].iter().cloned());
    }
    command
}

/// An existing `dlv` invocation found on a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DlvSpec {
    pub host: Option<String>,
    pub port: u32,
    pub api_version: u32,
}

/// Parse a command line into a [`DlvSpec`]. Returns `None` unless the first
/// token is `dlv`.
pub(crate) fn extract_dlv_spec(command_line: &[String]) -> Option<DlvSpec> {
    let first = command_line.first()?;
    if !invokes(first, "dlv") {
        return None;
    }
    let mut spec = DlvSpec {
        host: None,
        port: DEFAULT_DLV_PORT,
        api_version: 2,
    };
    for token in &command_line[1..] {
        if let Some(address) = token.strip_prefix("--listen=") {
            match address.rsplit_once(':') {
                Some((host, port)) => {
                    if !host.is_empty() {
                        spec.host = Some(host.to_string());
                    }
                    if let Ok(port) = port.parse() {
                        spec.port = port;
                    }
                }
                None => {
                    if let Ok(port) = address.parse() {
                        spec.port = port;
                    }
                }
            }
        } else if let Some(version) = token.strip_prefix("--api-version=") {
            if let Ok(version) = version.parse() {
                spec.api_version = version;
            }
        }
    }
    Some(spec)
}
