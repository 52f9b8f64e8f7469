use owo_colors::OwoColorize;

use crate::cli::GlobalOpts;
use crate::commands::{cancel_on_ctrl_c, Settings};

pub async fn run(global: &GlobalOpts, dry_run: bool) -> anyhow::Result<()> {
    let settings = Settings::resolve(global, None, None)?;
    settings.require_manifests()?;
    let mut deployer = settings.deployer()?;
    let cancel = cancel_on_ctrl_c();

    let list = deployer
        .read_manifests(&cancel, &settings.paths, &settings.remotes)
        .await?;
    let (rendered, _) = deployer.render(&list);
    deployer.cleanup(&cancel, &rendered, dry_run).await?;

    if dry_run {
        println!("  {} delete dry-run finished", "\u{2713}".green());
    } else {
        println!("  {} resources deleted", "\u{2713}".green());
    }
    Ok(())
}
