use std::collections::BTreeMap;
use std::fmt;

use crate::debug::pod::Container;
use crate::debug::ports::PortAllocator;
use crate::debug::{invokes, ContainerDebugConfiguration, TransformContext, Transformation, Transformer};
use crate::errors::Result;
use crate::image::{ImageConfiguration, RuntimeType};

const DEFAULT_JDWP_PORT: u32 = 5005;
const JAVA_TOOL_OPTIONS: &str = "JAVA_TOOL_OPTIONS";

/// Instruments JVM containers through a JDWP agent in `JAVA_TOOL_OPTIONS`.
/// The JVM picks the variable up without any command-line rewrite, so no
/// support image is needed.
pub struct JdwpTransformer;

impl Transformer for JdwpTransformer {
    fn runtime(&self) -> RuntimeType {
        RuntimeType::Jvm
    }

    fn is_applicable(&self, config: &ImageConfiguration, ctx: &TransformContext) -> bool {
        if config.runtime == Some(RuntimeType::Jvm) {
            return true;
        }
        if config.env.contains_key(JAVA_TOOL_OPTIONS) || config.env.contains_key("JAVA_VERSION") {
            return true;
        }
        if let Some(first) = config.entrypoint.first() {
            if !ctx.is_launcher(first) {
                return invokes(first, "java");
            }
        }
        config
            .arguments
            .first()
            .is_some_and(|arg| invokes(arg, "java"))
    }

    fn apply(
        &self,
        container: &mut Container,
        config: &ImageConfiguration,
        allocator: &mut PortAllocator,
        _ctx: &TransformContext,
    ) -> Result<Transformation> {
        let port = match retrieve_jdwp_spec(config) {
            Some(spec) => {
                allocator.reserve(spec.port);
                spec.port
            }
            None => {
                let port = allocator.allocate(DEFAULT_JDWP_PORT);
                let agent = format!(
                    "-agentlib:jdwp=transport=dt_socket,server=y,address={port},suspend=n,quiet=y"
                );
                let value = match config.env.get(JAVA_TOOL_OPTIONS) {
                    Some(existing) => format!("{existing} {agent}"),
                    None => agent,
                };
                container.set_env(JAVA_TOOL_OPTIONS, value);
                port
            }
        };
        container.expose_port("jdwp", port);

        Ok(Transformation {
            configuration: ContainerDebugConfiguration {
                artifact: config.artifact.clone(),
                runtime: RuntimeType::Jvm,
                working_dir: None,
                ports: BTreeMap::from([("jdwp".to_string(), port)]),
            },
            support_image: None,
        })
    }
}

/// A parsed `-agentlib:jdwp=` / `-Xrunjdwp:` option string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JdwpSpec {
    pub transport: String,
    pub quiet: bool,
    pub suspend: bool,
    pub server: bool,
    pub host: Option<String>,
    pub port: u32,
}

impl Default for JdwpSpec {
    fn default() -> Self {
        Self {
            transport: "dt_socket".to_string(),
            quiet: false,
            suspend: true,
            server: false,
            host: None,
            port: 0,
        }
    }
}

/// Parse the comma-separated `k=v` options of a jdwp agent spec.
pub(crate) fn parse_jdwp_spec(options: &str) -> JdwpSpec {
    let mut spec = JdwpSpec::default();
    for option in options.split(',') {
        let (key, value) = match option.split_once('=') {
            Some((k, v)) => (k, v),
            None => continue,
        };
        match key {
            "transport" => spec.transport = value.to_string(),
            "quiet" => spec.quiet = value == "y",
            "suspend" => spec.suspend = value == "y",
            "server" => spec.server = value == "y",
            "address" => match value.rsplit_once(':') {
                Some((host, port)) => {
                    spec.host = Some(host.to_string());
                    spec.port = port.parse().unwrap_or(0);
                }
                None => spec.port = value.parse().unwrap_or(0),
            },
            _ => {}
        }
    }
    spec
}

/// Extract a jdwp spec from a command-line token, when it is one.
pub(crate) fn extract_jdwp_arg(token: &str) -> Option<JdwpSpec> {
    token
        .strip_prefix("-agentlib:jdwp=")
        .or_else(|| token.strip_prefix("-Xrunjdwp:"))
        .map(parse_jdwp_spec)
}

/// Find an existing jdwp spec in the entrypoint, arguments or
/// `JAVA_TOOL_OPTIONS`.
fn retrieve_jdwp_spec(config: &ImageConfiguration) -> Option<JdwpSpec> {
    for token in config.entrypoint.iter().chain(config.arguments.iter()) {
        if let Some(spec) = extract_jdwp_arg(token) {
            return Some(spec);
        }
    }
    config
        .env
        .get(JAVA_TOOL_OPTIONS)?
        .split_whitespace()
        .find_map(extract_jdwp_arg)
}

impl fmt::Display for JdwpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport={}", self.transport)?;
        if self.quiet {
            write!(f, ",quiet=y")?;
        }
        if self.server {
            write!(f, ",server=y")?;
        }
        if !self.suspend {
            write!(f, ",suspend=n")?;
        }
        if self.port > 0 {
            match &self.host {
                Some(host) if !host.is_empty() => write!(f, ",address={host}:{}", self.port)?,
                _ => write!(f, ",address={}", self.port)?,
            }
        }
        Ok(())
    }
}
