use owo_colors::OwoColorize;

use crate::cli::GlobalOpts;
use crate::config;
use crate::config::resolve::resolve_config;
use crate::config::validate::validate;

pub fn run(global: &GlobalOpts) -> anyhow::Result<()> {
    let Some(config_path) = resolve_config(global.config_file.as_deref())? else {
        anyhow::bail!("no skiff.toml found in the current directory or any parent");
    };

    let config = config::load_config(&config_path)?;
    let filename = config_path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "skiff.toml".to_string());

    match validate(&config) {
        Ok(()) => {
            println!(
                "  {} {} is valid ({} artifacts, {} manifests)",
                "\u{2713}".green(),
                filename,
                config.artifacts.len(),
                config.deploy.manifests.len(),
            );
            Ok(())
        }
        Err(errors) => {
            for err in errors {
                let report: miette::Report = err.into();
                eprintln!("{:?}", report);
            }
            std::process::exit(1);
        }
    }
}
