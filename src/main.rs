use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cli;
pub mod config;
pub mod deploy;
pub mod ecs;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod status;

use cli::{Cli, Command, DeployArgs};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,aws_config=warn,aws_smithy_http_tower=warn,aws_http=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

async fn run_deploy(profile: Option<&str>, args: &DeployArgs) -> Result<String, deploy::Error> {
    let options = args.options();
    let search = config::SearchPaths::default().with_primary(args.config_dir.clone());

    let mut environment = config::load(&options.environment, &search)?;
    info!(
        "deploying {} to cluster {} in {}",
        options.environment, environment.ecs_cluster, environment.ecs_region
    );

    let ecs = ecs::Ecs::connect(&environment.ecs_region, profile).await?;
    let outcomes = deploy::run(&ecs, &mut environment, &options).await?;

    return Ok(report::render_summary(&outcomes));
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Deploy(args) => run_deploy(cli.profile.as_deref(), args).await,
    };

    match result {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
