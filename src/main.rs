use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use reelsmith::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    reelsmith::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Produce(args) => {
            reelsmith::pipeline::produce(args).await.context("produce")?;
        }
        Command::Batch(args) => {
            reelsmith::pipeline::batch(args).await.context("batch")?;
        }
        Command::Publish(args) => {
            reelsmith::publish::run(args).await.context("publish")?;
        }
        Command::Manifest(args) => {
            reelsmith::manifest::run(args).await.context("manifest")?;
        }
        Command::Narrate(args) => {
            reelsmith::narration::run(args).await.context("narrate")?;
        }
        Command::Visuals(args) => {
            reelsmith::visuals::run(args).await.context("visuals")?;
        }
        Command::Render(args) => {
            reelsmith::render::run(args).await.context("render")?;
        }
    }

    Ok(())
}
