use owo_colors::OwoColorize;

use crate::cli::{DebugOpts, DeployFlags, GlobalOpts};
use crate::commands::{cancel_on_ctrl_c, Settings};
use crate::image::{CachingLoader, DockerCliLoader};

pub async fn run(
    global: &GlobalOpts,
    flags: &DeployFlags,
    debug_opts: &DebugOpts,
) -> anyhow::Result<()> {
    let settings = Settings::resolve(global, Some(flags), Some(debug_opts))?;
    settings.require_manifests()?;
    let mut deployer = settings.deployer()?;
    let cancel = cancel_on_ctrl_c();

    let list = deployer
        .read_manifests(&cancel, &settings.paths, &settings.remotes)
        .await?;
    let (rendered, namespaces) = deployer.render(&list);

    let engine = settings.engine();
    let artifacts = settings.artifacts.clone();
    let instrumented = tokio::task::spawn_blocking(move || {
        let mut loader = CachingLoader::new(DockerCliLoader::new(artifacts));
        engine.transform(&rendered, &mut loader)
    })
    .await?;

    let outcome = deployer.deploy(&cancel, &instrumented, namespaces).await?;
    println!(
        "  {} deployed {} resources with debugging enabled",
        "\u{2713}".green(),
        outcome.resources.len(),
    );
    println!("    attach with your IDE or port-forward the debug ports above");
    Ok(())
}
