use crate::cli::{DebugOpts, GlobalOpts};
use crate::commands::{cancel_on_ctrl_c, Settings};
use crate::image::{CachingLoader, DockerCliLoader};

pub async fn run(global: &GlobalOpts, debug: bool, debug_opts: &DebugOpts) -> anyhow::Result<()> {
    let settings = Settings::resolve(global, None, Some(debug_opts))?;
    settings.require_manifests()?;
    let deployer = settings.deployer()?;
    let cancel = cancel_on_ctrl_c();

    let list = deployer
        .read_manifests(&cancel, &settings.paths, &settings.remotes)
        .await?;
    let (mut rendered, _) = deployer.render(&list);

    if debug {
        let engine = settings.engine();
        let artifacts = settings.artifacts.clone();
        rendered = tokio::task::spawn_blocking(move || {
            let mut loader = CachingLoader::new(DockerCliLoader::new(artifacts));
            engine.transform(&rendered, &mut loader)
        })
        .await?;
    }

    println!("{rendered}");
    Ok(())
}
