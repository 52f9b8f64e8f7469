use std::collections::BTreeMap;

use crate::debug::pod::Container;
use crate::debug::ports::PortAllocator;
use crate::debug::{invokes, ContainerDebugConfiguration, TransformContext, Transformation, Transformer};
use crate::errors::Result;
use crate::image::{ImageConfiguration, RuntimeType};

/// Marks .NET Core containers as debuggable and installs `vsdbg` through
/// the `netcore` support image. The debugger attaches out-of-band, so no
/// port is opened and the command line is left alone.
pub struct NetcoreTransformer;

fn invokes_dotnet(command_line: &[String]) -> bool {
    match command_line.first().map(String::as_str) {
        Some(first) if invokes(first, "dotnet") => true,
        // `exec dotnet app.dll` as emitted by some entrypoint shims.
        Some("exec") => command_line
            .get(1)
            .is_some_and(|token| invokes(token, "dotnet")),
        _ => false,
    }
}

impl Transformer for NetcoreTransformer {
    fn runtime(&self) -> RuntimeType {
        RuntimeType::Netcore
    }

    fn is_applicable(&self, config: &ImageConfiguration, ctx: &TransformContext) -> bool {
        if config.runtime == Some(RuntimeType::Netcore) {
            return true;
        }
        if [
            "ASPNETCORE_URLS",
            "DOTNET_RUNNING_IN_CONTAINER",
            "DOTNET_SYSTEM_GLOBALIZATION_INVARIANT",
        ]
        .iter()
        .any(|v| config.env.contains_key(*v))
        {
            return true;
        }
        if let Some(first) = config.entrypoint.first() {
            if !ctx.is_launcher(first) {
                return invokes_dotnet(&config.entrypoint);
            }
        }
        invokes_dotnet(&config.arguments)
    }

    fn apply(
        &self,
        _container: &mut Container,
        config: &ImageConfiguration,
        _allocator: &mut PortAllocator,
        _ctx: &TransformContext,
    ) -> Result<Transformation> {
        Ok(Transformation {
            configuration: ContainerDebugConfiguration {
                artifact: config.artifact.clone(),
                runtime: RuntimeType::Netcore,
                working_dir: None,
                ports: BTreeMap::new(),
            },
            support_image: Some("netcore"),
        })
    }
}
