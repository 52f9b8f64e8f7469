use std::collections::BTreeMap;

use crate::debug::pod::Container;
use crate::debug::ports::PortAllocator;
use crate::debug::{invokes, ContainerDebugConfiguration, TransformContext, Transformation, Transformer};
use crate::errors::{Error, Result};
use crate::image::{ImageConfiguration, RuntimeType};

const DEFAULT_PYTHON_PORT: u32 = 5678;
const LAUNCHER_PATH: &str = "/dbg/python/launcher";

/// The debug wire protocols the Python launcher can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PythonDebugMode {
    Debugpy,
    Pydevd,
    Ptvsd,
}

impl PythonDebugMode {
    fn from_protocol(protocol: &str) -> Option<Self> {
        match protocol {
            "debugpy" => Some(PythonDebugMode::Debugpy),
            "pydevd" => Some(PythonDebugMode::Pydevd),
            "ptvsd" => Some(PythonDebugMode::Ptvsd),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PythonDebugMode::Debugpy => "debugpy",
            PythonDebugMode::Pydevd => "pydevd",
            PythonDebugMode::Ptvsd => "ptvsd",
        }
    }

    /// Container port name: debugpy and ptvsd speak DAP, pydevd has its own
    /// protocol.
    fn port_name(&self) -> &'static str {
        match self {
            PythonDebugMode::Debugpy | PythonDebugMode::Ptvsd => "dap",
            PythonDebugMode::Pydevd => "pydevd",
        }
    }
}

fn python_like(token: &str) -> bool {
    ["python", "python2", "python3"]
        .iter()
        .any(|p| invokes(token, p))
}

/// Instruments Python containers through a `launcher` shim from the
/// `python` support image, which starts the chosen debugger around the
/// original command.
pub struct PythonTransformer;

impl Transformer for PythonTransformer {
    fn runtime(&self) -> RuntimeType {
        RuntimeType::Python
    }

    fn is_applicable(&self, config: &ImageConfiguration, ctx: &TransformContext) -> bool {
        if config.runtime == Some(RuntimeType::Python) {
            return true;
        }
        if config.env.contains_key("PYTHON_VERSION") {
            return true;
        }
        if let Some(first) = config.entrypoint.first() {
            if !ctx.is_launcher(first) {
                return python_like(first);
            }
        }
        config.arguments.first().is_some_and(|arg| python_like(arg))
    }

    fn apply(
        &self,
        container: &mut Container,
        config: &ImageConfiguration,
        allocator: &mut PortAllocator,
        ctx: &TransformContext,
    ) -> Result<Transformation> {
        let (mode, port) = if let Some((mode, port)) = detect_existing(&config.entrypoint)
            .or_else(|| detect_existing(&config.arguments))
        {
            allocator.reserve(port);
            (mode, port)
        } else {
            let mode = select_mode(ctx.protocols).ok_or_else(|| Error::DebugUnsupported {
                container: container.name.clone(),
                image: config.artifact.clone().unwrap_or_default(),
            })?;
            let port = allocator.allocate(DEFAULT_PYTHON_PORT);
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
            let rewritten = launcher_command_line(original, mode, port);
            if use_entrypoint {
                container.command = Some(rewritten);
            } else {
                container.args = Some(rewritten);
            }
            (mode, port)
        };
        container.expose_port(mode.port_name(), port);

        Ok(Transformation {
            configuration: ContainerDebugConfiguration {
                artifact: config.artifact.clone(),
                runtime: RuntimeType::Python,
                working_dir: None,
                ports: BTreeMap::from([(mode.port_name().to_string(), port)]),
            },
            support_image: Some("python"),
        })
    }
}

/// First supported debugger from the caller's preference list, defaulting
/// to `[debugpy, pydevd]`.
fn select_mode(protocols: &[String]) -> Option<PythonDebugMode> {
    if protocols.is_empty() {
        return Some(PythonDebugMode::Debugpy);
    }
    protocols
        .iter()
        .find_map(|p| PythonDebugMode::from_protocol(p))
}

fn launcher_command_line(
    original: &[String],
    mode: PythonDebugMode,
    port: u32,
) -> Vec<String> {
    let mut command = vec![
        LAUNCHER_PATH.to_string(),
        "--mode".to_string(),
        mode.as_str().to_string(),
        "--port".to_string(),
        port.to_string(),
        "--".to_string(),
    ];
    command.extend(original.iter().cloned());
    command
}

/// Detect an already-debuggable command: `python -m ptvsd --port N` or
/// `python -m debugpy --listen [host:]port` (debugpy must be in server
/// mode, i.e. carry `--listen` or `--connect`).
fn detect_existing(command_line: &[String]) -> Option<(PythonDebugMode, u32)> {
    let module = command_line
        .windows(2)
        .find(|pair| pair[0] == "-m")
        .map(|pair| pair[1].as_str())?;
    match module {
        "ptvsd" => {
            let port = flag_value(command_line, "--port")?.parse().ok()?;
            Some((PythonDebugMode::Ptvsd, port))
        }
        "debugpy" => {
            if !command_line.iter().any(|t| t == "--listen" || t == "--connect") {
                return None;
            }
            let address = flag_value(command_line, "--listen")?;
            let port = match address.rsplit_once(':') {
                Some((_host, port)) => port.parse().ok()?,
                None => address.parse().ok()?,
            };
            Some((PythonDebugMode::Debugpy, port))
        }
        _ => None,
    }
}

fn flag_value<'a>(command_line: &'a [String], flag: &str) -> Option<&'a str> {
    command_line
        .windows(2)
        .find(|pair| pair[0] == flag)
        .map(|pair| pair[1].as_str())
}
