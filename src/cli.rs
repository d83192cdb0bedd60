use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Turn one article into a video (all stages, resumable).
    Produce(ProduceArgs),
    /// Produce every `*.txt` in a directory, optionally publishing each.
    Batch(BatchArgs),
    /// Upload a finished video through the platform's web editor.
    Publish(PublishArgs),
    /// Generate `manifest.json` for an article.
    Manifest(ManifestArgs),
    /// Synthesize `narration.wav` from a work dir's manifest.
    Narrate(WorkDirArgs),
    /// Generate the scene images of a work dir.
    Visuals(WorkDirArgs),
    /// Assemble `video.mp4` from a work dir's images and narration.
    Render(WorkDirArgs),
}

#[derive(Debug, Args)]
pub struct ProduceArgs {
    /// Article text file.
    #[arg(long)]
    pub input: String,

    /// Output root; the article is written to `<out>/<slug>/`.
    #[arg(long, default_value = "output")]
    pub out: String,

    /// Also copy the finished video here as `<slug>.mp4`.
    #[arg(long)]
    pub public_dir: Option<String>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Directory of `*.txt` articles.
    #[arg(long)]
    pub input_dir: String,

    /// Output root; each article is written to `<out>/<slug>/`.
    #[arg(long, default_value = "output")]
    pub out: String,

    /// Also copy finished videos here as `<slug>.mp4`.
    #[arg(long)]
    pub public_dir: Option<String>,

    /// Publish each newly produced video.
    #[arg(long)]
    pub publish: bool,

    #[command(flatten)]
    pub publisher: PublisherArgs,
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Video file to upload.
    #[arg(long)]
    pub video: String,

    #[arg(long)]
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Cover image (optional).
    #[arg(long)]
    pub cover: Option<String>,

    /// Publish even if the history already lists this title.
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub publisher: PublisherArgs,
}

#[derive(Debug, Args)]
pub struct PublisherArgs {
    /// Cookie file exported from a logged-in browser.
    #[arg(long, default_value = "cookies.json")]
    pub cookies: String,

    /// YAML selector profile (URLs, selectors, timeouts).
    #[arg(long)]
    pub profile: Option<String>,

    /// Where failure screenshots are written.
    #[arg(long, default_value = "diagnostics")]
    pub diagnostics_dir: String,

    /// Publication history (JSON Lines).
    #[arg(long, default_value = "publish_history.jsonl")]
    pub history: String,

    /// Tag to add; repeat for several.
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Run the browser without a window.
    #[arg(long)]
    pub headless: bool,

    /// WebDriver server (overrides REELSMITH_WEBDRIVER_URL).
    #[arg(long)]
    pub webdriver_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Article text file.
    #[arg(long)]
    pub input: String,

    /// Article work directory.
    #[arg(long)]
    pub work_dir: String,

    /// Regenerate even if `manifest.json` exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct WorkDirArgs {
    /// Article work directory holding `manifest.json`.
    #[arg(long)]
    pub work_dir: String,

    /// Redo the stage even if its output exists.
    #[arg(long)]
    pub force: bool,
}
