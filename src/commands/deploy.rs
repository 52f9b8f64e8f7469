use owo_colors::OwoColorize;

use crate::cli::{DeployFlags, GlobalOpts};
use crate::commands::{cancel_on_ctrl_c, Settings};

pub async fn run(global: &GlobalOpts, flags: &DeployFlags) -> anyhow::Result<()> {
    let settings = Settings::resolve(global, Some(flags), None)?;
    settings.require_manifests()?;
    let mut deployer = settings.deployer()?;
    let cancel = cancel_on_ctrl_c();

    let list = deployer
        .read_manifests(&cancel, &settings.paths, &settings.remotes)
        .await?;
    let (rendered, namespaces) = deployer.render(&list);
    let outcome = deployer.deploy(&cancel, &rendered, namespaces).await?;

    if outcome.resources.is_empty() {
        println!("  {} nothing to redeploy", "\u{2713}".green());
    } else {
        println!(
            "  {} applied {} resources{}",
            "\u{2713}".green(),
            outcome.resources.len(),
            if outcome.namespaces.is_empty() {
                String::new()
            } else {
                format!(" in {}", outcome.namespaces.join(", "))
            },
        );
    }
    Ok(())
}
