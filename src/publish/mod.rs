//! Browser automation that uploads a finished video through the platform's
//! web editor.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::{PublishArgs, PublisherArgs};
use crate::config::Settings;
use crate::formats::PublishJob;
use crate::history::{self, FileHistoryStore, HistoryEntry, HistoryStore as _};

pub mod automator;
pub mod browser;
pub mod poll;
pub mod probe;
pub mod profile;
pub mod session;
pub mod webdriver;

pub use automator::{PublishOptions, Publisher, VideoPublisher, WebDriverPublisher};
pub use browser::{Browser, ElementId, Locator};
pub use probe::{Selector, find_actionable};
pub use profile::SelectorProfile;
pub use webdriver::{LaunchOptions, WebDriverBrowser};

/// Builds the production publisher from command-line flags.
pub fn webdriver_publisher(
    settings: &Settings,
    args: &PublisherArgs,
) -> anyhow::Result<WebDriverPublisher> {
    let profile = match &args.profile {
        Some(path) => SelectorProfile::load(Path::new(path))?,
        None => SelectorProfile::default(),
    };
    profile
        .validate()
        .context("incomplete selector profile (pass --profile)")?;

    let mut settings = settings.clone();
    if let Some(url) = &args.webdriver_url {
        settings.webdriver_url = url.clone();
    }
    let launch = LaunchOptions {
        headless: args.headless,
        args: Vec::new(),
    };
    let options = PublishOptions {
        cookie_path: PathBuf::from(&args.cookies),
        diagnostics_dir: PathBuf::from(&args.diagnostics_dir),
        profile,
    };
    Ok(WebDriverPublisher::new(&settings, launch, options))
}

pub async fn run(args: PublishArgs) -> anyhow::Result<()> {
    let video = PathBuf::from(&args.video);
    if !video.is_file() {
        anyhow::bail!("video not found: {}", video.display());
    }

    let settings = Settings::from_env();
    let publisher = webdriver_publisher(&settings, &args.publisher)?;
    let history = FileHistoryStore::new(&args.publisher.history);
    if !args.force && history::contains(&history.load().await?, &args.title) {
        tracing::info!(title = %args.title, "already published; use --force to publish again");
        return Ok(());
    }

    let mut job = PublishJob::new(args.title, args.description, video);
    job.tags = args.publisher.tags;
    job.cover_path = args.cover.map(PathBuf::from);

    if !publisher.publish(&mut job).await {
        anyhow::bail!(
            "publishing `{}` did not complete (screenshots in {})",
            job.title,
            args.publisher.diagnostics_dir
        );
    }
    history
        .append(&HistoryEntry::now(job.title.clone(), job.video_path.clone()))
        .await
        .context("record publish history")?;
    Ok(())
}
