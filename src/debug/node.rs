use std::collections::BTreeMap;

use crate::debug::pod::Container;
use crate::debug::ports::PortAllocator;
use crate::debug::{invokes, ContainerDebugConfiguration, TransformContext, Transformation, Transformer};
use crate::errors::Result;
use crate::image::{ImageConfiguration, RuntimeType};

const DEFAULT_DEVTOOLS_PORT: u32 = 9229;
const NODE_OPTIONS: &str = "NODE_OPTIONS";
const INSPECT_HOST: &str = "0.0.0.0";

/// Instruments Node.js containers with the V8 inspector. Ships a `node`
/// binary wrapper through the `nodejs` support image and prepends it to
/// `PATH` so child processes inherit the inspector too.
pub struct NodeTransformer;

fn node_like(token: &str) -> bool {
    invokes(token, "node") || invokes(token, "nodemon") || invokes(token, "npm")
}

impl Transformer for NodeTransformer {
    fn runtime(&self) -> RuntimeType {
        RuntimeType::Nodejs
    }

    fn is_applicable(&self, config: &ImageConfiguration, ctx: &TransformContext) -> bool {
        if config.runtime == Some(RuntimeType::Nodejs) {
            return true;
        }
        if ["NODE_VERSION", "NODEJS_VERSION", "NODE_ENV"]
            .iter()
            .any(|v| config.env.contains_key(*v))
        {
            return true;
        }
        if let Some(first) = config.entrypoint.first() {
            if !ctx.is_launcher(first) {
                return node_like(first);
            }
        }
        config.arguments.first().is_some_and(|arg| node_like(arg))
    }

    fn apply(
        &self,
        container: &mut Container,
        config: &ImageConfiguration,
        allocator: &mut PortAllocator,
        ctx: &TransformContext,
    ) -> Result<Transformation> {
        let port = match retrieve_inspect_spec(config) {
            Some(spec) => {
                let port = spec.port.unwrap_or(DEFAULT_DEVTOOLS_PORT);
                allocator.reserve(port);
                port
            }
            None => {
                let port = allocator.allocate(DEFAULT_DEVTOOLS_PORT);
                self.rewrite_command_line(container, config, port, ctx);
                port
            }
        };

        // Make the wrapped node binary win over the image's.
        let path = match config.env.get("PATH") {
            Some(existing) => format!("/dbg/nodejs/bin:{existing}"),
            None => "/dbg/nodejs/bin".to_string(),
        };
        container.set_env("PATH", path);
        container.expose_port("devtools", port);

        Ok(Transformation {
            configuration: ContainerDebugConfiguration {
                artifact: config.artifact.clone(),
                runtime: RuntimeType::Nodejs,
                working_dir: None,
                ports: BTreeMap::from([("devtools".to_string(), port)]),
            },
            support_image: Some("nodejs"),
        })
    }
}

impl NodeTransformer {
    fn rewrite_command_line(
        &self,
        container: &mut Container,
        config: &ImageConfiguration,
        port: u32,
        ctx: &TransformContext,
    ) {
        if let Some(first) = config.entrypoint.first() {
            if !ctx.is_launcher(first) {
                if let Some(rewritten) = rewrite(&config.entrypoint, port) {
                    container.command = Some(rewritten);
                    return;
                }
            }
        }
        if let Some(rewritten) = rewrite(&config.arguments, port) {
            container.args = Some(rewritten);
            return;
        }
        let inspect = format!("--inspect={INSPECT_HOST}:{port}");
        let value = match config.env.get(NODE_OPTIONS) {
            Some(existing) => format!("{existing} {inspect}"),
            None => inspect,
        };
        container.set_env(NODE_OPTIONS, value);
    }
}

fn rewrite(command_line: &[String], port: u32) -> Option<Vec<String>> {
    let first = command_line.first()?;
    let mut rewritten = command_line.to_vec();
    if invokes(first, "node") || invokes(first, "nodemon") {
        rewritten.insert(1, format!("--inspect={INSPECT_HOST}:{port}"));
        return Some(rewritten);
    }
    if invokes(first, "npm") {
        let flag = format!("--node-options=--inspect={INSPECT_HOST}:{port}");
        match rewritten.iter().position(|arg| arg == "--") {
            Some(separator) => rewritten.insert(separator, flag),
            None => rewritten.push(flag),
        }
        return Some(rewritten);
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InspectSpec {
    brk: bool,
    host: Option<String>,
    port: Option<u32>,
}

/// Parse `--inspect[-brk][=[host:]port]` tokens.
fn parse_inspect_arg(token: &str) -> Option<InspectSpec> {
    let rest = token.strip_prefix("--inspect")?;
    let (brk, rest) = match rest.strip_prefix("-brk") {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    if rest.is_empty() {
        return Some(InspectSpec {
            brk,
            host: None,
            port: None,
        });
    }
    let address = rest.strip_prefix('=')?;
    match address.rsplit_once(':') {
        Some((host, port)) => Some(InspectSpec {
            brk,
            host: Some(host.to_string()),
            port: port.parse().ok(),
        }),
        None => Some(InspectSpec {
            brk,
            host: None,
            port: address.parse().ok(),
        }),
    }
}

fn retrieve_inspect_spec(config: &ImageConfiguration) -> Option<InspectSpec> {
    for token in config.entrypoint.iter().chain(config.arguments.iter()) {
        if let Some(spec) = parse_inspect_arg(token) {
            return Some(spec);
        }
    }
    config
        .env
        .get(NODE_OPTIONS)?
        .split_whitespace()
        .find_map(parse_inspect_arg)
}
