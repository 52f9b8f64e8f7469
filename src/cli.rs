use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "skiff",
    version,
    about = "Build-and-deploy tool for Kubernetes workloads"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Use a specific config file instead of searching for skiff.toml
    #[arg(short = 'c', long = "config", global = true)]
    pub config_file: Option<PathBuf>,

    /// Kubernetes context to deploy to
    #[arg(long, global = true)]
    pub kube_context: Option<String>,

    /// Namespace passed to every kubectl invocation
    #[arg(short = 'n', long, global = true)]
    pub namespace: Option<String>,

    /// Manifest file or directory (repeatable)
    #[arg(short = 'f', long = "filename", global = true)]
    pub filenames: Vec<PathBuf>,

    /// In-cluster resource to include, e.g. deployment/frontend (repeatable)
    #[arg(long = "remote", global = true)]
    pub remotes: Vec<String>,

    /// Built artifact as NAME=TAG (repeatable)
    #[arg(long = "image", global = true, value_name = "NAME=TAG")]
    pub images: Vec<String>,

    /// Registry prefix substituted into unqualified image references
    #[arg(long, global = true)]
    pub default_repo: Option<String>,

    /// Label added to every resource when missing (repeatable)
    #[arg(long = "label", global = true, value_name = "KEY=VALUE")]
    pub labels: Vec<String>,

    /// Annotation added to every resource when missing (repeatable)
    #[arg(long = "annotation", global = true, value_name = "KEY=VALUE")]
    pub annotations: Vec<String>,

    /// Run identifier stamped onto every deployed resource
    #[arg(long, global = true)]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DeployFlags {
    /// Pass --force --grace-period=0 to kubectl apply
    #[arg(long)]
    pub force: bool,

    /// Skip kubectl client-side validation
    #[arg(long)]
    pub no_validate: bool,

    /// Delay between wait-for-deletion polls
    #[arg(long, value_parser = humantime::parse_duration)]
    pub wait_delay: Option<Duration>,

    /// Give up waiting for in-flight deletions after this long
    #[arg(long, value_parser = humantime::parse_duration)]
    pub wait_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DebugOpts {
    /// Registry holding the language debug-support images
    #[arg(long)]
    pub helpers_registry: Option<String>,

    /// Python debugger preference, e.g. debugpy or pydevd (repeatable)
    #[arg(long = "protocol")]
    pub protocols: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print rendered manifests without applying them
    Render {
        /// Also apply the debug transformation
        #[arg(long)]
        debug: bool,

        #[command(flatten)]
        debug_opts: DebugOpts,
    },
    /// Render manifests and apply them
    Deploy {
        #[command(flatten)]
        flags: DeployFlags,
    },
    /// Deploy with workloads rewritten for remote debugging
    Debug {
        #[command(flatten)]
        flags: DeployFlags,

        #[command(flatten)]
        debug_opts: DebugOpts,
    },
    /// Delete everything the manifests describe
    Delete {
        /// Show what would be deleted without deleting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a starter skiff.toml
    Init,
    /// Validate the configuration file
    Validate,
    /// Check that kubectl is installed and supported
    Doctor,
}
