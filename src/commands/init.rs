use anyhow::Result;
use std::path::Path;

pub fn run() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = cwd.join("skiff.toml");

    if config_path.exists() {
        anyhow::bail!("skiff.toml already exists in {}", cwd.display());
    }

    let project_name = cwd
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "my-project".to_string());

    let manifests_dir = detect_manifests_dir(&cwd);

    let config = format!(
        r#"[project]
name = "{project_name}"

[deploy]
manifests = ["{manifests_dir}"]
# context = "minikube"
# namespace = "dev"
# default_repo = "gcr.io/my-project"

# [deploy.wait]
# delay = "2s"
# max = "60s"

# Built images, usually passed by your build pipeline via --image:
# [[artifact]]
# image = "{project_name}"
# tag = "{project_name}:dirty"
# runtime = "go"        # optional override: jvm, nodejs, go, python, netcore
"#
    );

    std::fs::write(&config_path, &config)?;
    println!("Created skiff.toml in {}", cwd.display());
    println!();
    println!("  Project:   {}", project_name);
    println!("  Manifests: {}", manifests_dir);
    println!();
    println!("Edit the file, then run `skiff deploy` to begin.");
    Ok(())
}

fn detect_manifests_dir(dir: &Path) -> &'static str {
    ["k8s", "kubernetes", "manifests", "deploy"]
        .into_iter()
        .find(|candidate| dir.join(candidate).is_dir())
        .unwrap_or("k8s")
}
