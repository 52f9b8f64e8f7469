use tokio_util::sync::CancellationToken;

use crate::kubectl::Kubectl;

/// Minor version below which kubectl is known to misbehave with this tool.
const MIN_RECOMMENDED_MINOR: u32 = 12;

pub async fn run() -> anyhow::Result<()> {
    println!("skiff doctor");
    println!("============");
    println!();

    let mut all_ok = true;

    match which::which("kubectl") {
        Ok(path) => {
            println!("  [ok] kubectl              {}", path.display());
            let kubectl = Kubectl::new(None, None)?;
            let cancel = CancellationToken::new();
            let version = kubectl.version(&cancel).await;
            match version.minor_number() {
                Some(minor) if minor >= MIN_RECOMMENDED_MINOR => {
                    println!("  [ok] kubectl version      {version}");
                }
                Some(_) => {
                    println!(
                        "  [!!] kubectl version      {version} (older than 1.{MIN_RECOMMENDED_MINOR}, upgrade recommended)"
                    );
                    all_ok = false;
                }
                None => {
                    println!("  [!!] kubectl version      could not be determined");
                    all_ok = false;
                }
            }
        }
        Err(_) => {
            println!("  [!!] kubectl              not found");
            all_ok = false;
        }
    }

    // docker is only needed for `skiff debug`, which inspects image configs
    // through the local daemon.
    match which::which("docker") {
        Ok(path) => println!("  [ok] docker               {}", path.display()),
        Err(_) => {
            println!("  [!!] docker               not found (needed for `skiff debug`)");
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All dependencies found.");
    } else {
        println!("Some dependencies are missing or outdated.");
    }
    Ok(())
}
