use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::deploy::DeployOptions;
use crate::reconcile::ImageOverride;

pub const DEFAULT_ENVIRONMENT: &str = "staging";

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Shared credentials profile used to reach AWS
    #[arg(env = "AWS_PROFILE", long = "profile", value_name = "name", global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Deploy service(s) described in `gtd/<env>.yaml` or `configs/<env>.yaml`
    Deploy(DeployArgs),
}

#[derive(Clone, Debug, Args)]
pub struct DeployArgs {
    /// Environment to deploy to
    #[arg(short = 'e', long = "env", default_value = DEFAULT_ENVIRONMENT)]
    pub env: String,

    /// Container image to deploy, replaces each service's registry
    #[arg(short = 'c', long = "container-image", value_name = "image")]
    pub container_image: Option<String>,

    /// Tag of the image to deploy
    #[arg(short = 't', long = "tag", value_name = "tag")]
    pub tag: Option<String>,

    /// Selected service(s), repeatable or comma separated
    #[arg(short = 's', long = "service", value_name = "name", value_delimiter = ',')]
    pub services: Vec<String>,

    /// Directory searched before `configs/` for the environment file
    #[arg(long = "config-dir", value_name = "dir")]
    pub config_dir: Option<PathBuf>,

    /// Report what would change without registering or updating anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl DeployArgs {
    pub fn options(&self) -> DeployOptions {
        DeployOptions {
            environment: self.env.clone(),
            overrides: ImageOverride {
                image: non_empty(self.container_image.clone()),
                tag: non_empty(self.tag.clone()),
            },
            services: self
                .services
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            dry_run: self.dry_run,
        }
    }
}
