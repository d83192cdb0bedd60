use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use anyhow::Context as _;
use sha2::{Digest as _, Sha256};

use crate::cli::{BatchArgs, ProduceArgs};
use crate::config::Settings;
use crate::formats::{Manifest, PublishJob};
use crate::genai::GenaiClient;
use crate::history::{self, FileHistoryStore, HistoryEntry, HistoryStore};
use crate::narration::{self, AUDIO_FILE_NAME};
use crate::publish::VideoPublisher;
use crate::render::{self, VIDEO_FILE_NAME};
use crate::visuals::{self, GenaiImages};
use crate::{fsutil, manifest};

pub const IMAGES_DIR_NAME: &str = "images";

/// Checkpoint locations inside one article's work directory.
#[derive(Debug, Clone)]
pub struct ArticlePaths {
    pub work_dir: PathBuf,
    pub manifest: PathBuf,
    pub audio: PathBuf,
    pub images_dir: PathBuf,
    pub video: PathBuf,
}

impl ArticlePaths {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            manifest: work_dir.join(manifest::MANIFEST_FILE_NAME),
            audio: work_dir.join(AUDIO_FILE_NAME),
            images_dir: work_dir.join(IMAGES_DIR_NAME),
            video: work_dir.join(VIDEO_FILE_NAME),
            work_dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleOutputs {
    pub manifest: Manifest,
    pub audio_path: PathBuf,
    pub images: BTreeMap<u32, PathBuf>,
    pub video_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchSummary {
    pub produced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub published: usize,
    pub publish_failed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub input_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Finished videos are also copied here as `<slug>.mp4`.
    pub public_dir: Option<PathBuf>,
    pub tags: Vec<String>,
}

/// Publisher plus the history that keeps a title from going out twice.
pub struct BatchPublishing<'a> {
    pub publisher: &'a dyn VideoPublisher,
    pub history: &'a dyn HistoryStore,
}

/// Runs the production stages for articles, one at a time.
pub struct Orchestrator {
    settings: Settings,
    client: GenaiClient,
    font: Option<FontVec>,
}

impl Orchestrator {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let client = GenaiClient::from_settings(&settings)?;
        let font = match settings.font_path.as_deref() {
            Some(path) => match visuals::load_font(path) {
                Ok(font) => Some(font),
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "placeholder captions disabled");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            settings,
            client,
            font,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &GenaiClient {
        &self.client
    }

    pub fn font(&self) -> Option<&FontVec> {
        self.font.as_ref()
    }

    /// Text to video. Each stage is skipped when its checkpoint already exists
    /// in `work_dir`, so a rerun picks up at the first missing artifact.
    pub async fn process_article(
        &self,
        article_text: &str,
        work_dir: &Path,
    ) -> anyhow::Result<ArticleOutputs> {
        let paths = ArticlePaths::new(work_dir);
        tokio::fs::create_dir_all(&paths.work_dir)
            .await
            .with_context(|| format!("create work dir: {}", paths.work_dir.display()))?;

        let manifest = match manifest::load(&paths.manifest).await? {
            Some(manifest) => {
                tracing::info!(path = %paths.manifest.display(), "manifest exists; skipping");
                manifest
            }
            None => {
                let manifest =
                    manifest::generate_manifest(&self.client, &self.settings, article_text).await?;
                manifest::write(&manifest, &paths.manifest).await?;
                manifest
            }
        };

        if fsutil::is_checkpoint(&paths.audio).await {
            tracing::info!(path = %paths.audio.display(), "narration exists; skipping");
        } else {
            narration::synthesize(&self.client, &self.settings, &manifest, &paths.audio).await?;
        }

        let generator = GenaiImages::new(&self.client, &self.settings.image_model);
        let images =
            visuals::prepare_visuals(&generator, &manifest, &paths.images_dir, self.font()).await?;

        if fsutil::is_checkpoint(&paths.video).await {
            tracing::info!(path = %paths.video.display(), "video exists; skipping");
        } else {
            render::render(
                &self.settings,
                &manifest,
                &paths.images_dir,
                &paths.audio,
                &paths.video,
            )
            .await?;
        }

        Ok(ArticleOutputs {
            manifest,
            audio_path: paths.audio,
            images,
            video_path: paths.video,
        })
    }

    /// Processes every `*.txt` in `options.input_dir` in name order. One
    /// article's failure never stops the batch.
    pub async fn run_batch(
        &self,
        options: &BatchOptions,
        publishing: Option<&BatchPublishing<'_>>,
    ) -> anyhow::Result<BatchSummary> {
        let articles = list_articles(&options.input_dir)?;
        tracing::info!(
            count = articles.len(),
            input = %options.input_dir.display(),
            "batch started"
        );

        let mut summary = BatchSummary::default();
        for article in &articles {
            let slug = article_slug(article);
            let paths = ArticlePaths::new(options.out_dir.join(&slug));
            if fsutil::is_checkpoint(&paths.video).await {
                tracing::info!(article = %slug, "SKIP video exists");
                summary.skipped += 1;
                continue;
            }

            let outputs = match self.produce_file(article, &paths.work_dir).await {
                Ok(outputs) => outputs,
                Err(err) => {
                    tracing::error!(article = %slug, error = %format!("{err:#}"), "FAIL");
                    summary.failed += 1;
                    continue;
                }
            };
            summary.produced += 1;
            tracing::info!(
                article = %slug,
                title = %outputs.manifest.title,
                video = %outputs.video_path.display(),
                "PASS"
            );

            if let Some(public_dir) = &options.public_dir
                && let Err(err) = copy_public(&outputs.video_path, public_dir, &slug).await
            {
                tracing::warn!(article = %slug, error = %format!("{err:#}"), "public copy failed");
            }

            if let Some(publishing) = publishing {
                match publish_once(publishing, &outputs, &options.tags).await {
                    Ok(Some(true)) => summary.published += 1,
                    Ok(Some(false)) => summary.publish_failed += 1,
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(article = %slug, error = %format!("{err:#}"), "publish bookkeeping failed");
                        summary.publish_failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            produced = summary.produced,
            skipped = summary.skipped,
            failed = summary.failed,
            published = summary.published,
            publish_failed = summary.publish_failed,
            "batch finished"
        );
        Ok(summary)
    }

    async fn produce_file(&self, article: &Path, work_dir: &Path) -> anyhow::Result<ArticleOutputs> {
        let text = tokio::fs::read_to_string(article)
            .await
            .with_context(|| format!("read article: {}", article.display()))?;
        self.process_article(&text, work_dir).await
    }
}

/// `Some(published)` when a publish was attempted, `None` when the title is
/// already in the history.
async fn publish_once(
    publishing: &BatchPublishing<'_>,
    outputs: &ArticleOutputs,
    tags: &[String],
) -> anyhow::Result<Option<bool>> {
    let title = &outputs.manifest.title;
    let entries = publishing.history.load().await.context("load publish history")?;
    if history::contains(&entries, title) {
        tracing::info!(title = %title, "already published; skipping");
        return Ok(None);
    }

    let mut job = publish_job(outputs, tags);
    if !publishing.publisher.publish(&mut job).await {
        tracing::warn!(title = %title, state = ?job.state, "publish did not complete; video kept");
        return Ok(Some(false));
    }
    publishing
        .history
        .append(&HistoryEntry::now(title.clone(), outputs.video_path.clone()))
        .await
        .context("record publish history")?;
    Ok(Some(true))
}

/// Publish job for a produced article: hook as description, first scene
/// image as cover.
pub fn publish_job(outputs: &ArticleOutputs, tags: &[String]) -> PublishJob {
    let manifest = &outputs.manifest;
    let mut job = PublishJob::new(
        manifest.title.clone(),
        manifest.hook.clone(),
        outputs.video_path.clone(),
    );
    job.tags = tags.to_vec();
    job.cover_path = outputs.images.values().next().cloned();
    job
}

pub fn list_articles(input_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(input_dir)
        .with_context(|| format!("read input dir: {}", input_dir.display()))?;
    let mut articles = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("read input dir entry: {}", input_dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            articles.push(path);
        }
    }
    articles.sort();
    Ok(articles)
}

/// Work-directory name for an article file: its stem reduced to lowercase
/// ASCII words joined by `-`. Stems with nothing left fall back to a short
/// hash of the stem.
pub fn article_slug(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut slug = String::with_capacity(stem.len());
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if !slug.is_empty() {
        return slug.to_owned();
    }

    let digest = Sha256::digest(stem.as_bytes());
    format!("article-{}", &hex::encode(digest)[..10])
}

async fn copy_public(video: &Path, public_dir: &Path, slug: &str) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(public_dir)
        .await
        .with_context(|| format!("create public dir: {}", public_dir.display()))?;
    let target = public_dir.join(format!("{slug}.mp4"));
    let tmp = fsutil::tmp_sibling(&target);
    tokio::fs::copy(video, &tmp)
        .await
        .with_context(|| format!("copy video to {}", tmp.display()))?;
    fsutil::sync_file(&tmp).await?;
    tokio::fs::rename(&tmp, &target)
        .await
        .with_context(|| format!("rename tmp to final: {}", target.display()))?;
    tracing::info!(path = %target.display(), "public copy written");
    Ok(target)
}

pub async fn produce(args: ProduceArgs) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(Settings::from_env())?;
    let input = PathBuf::from(&args.input);
    let slug = article_slug(&input);
    let work_dir = Path::new(&args.out).join(&slug);

    let outputs = orchestrator.produce_file(&input, &work_dir).await?;
    if let Some(public_dir) = &args.public_dir {
        copy_public(&outputs.video_path, Path::new(public_dir), &slug).await?;
    }
    tracing::info!(title = %outputs.manifest.title, video = %outputs.video_path.display(), "done");
    println!("{}", outputs.video_path.display());
    Ok(())
}

pub async fn batch(args: BatchArgs) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(Settings::from_env())?;
    let options = BatchOptions {
        input_dir: PathBuf::from(&args.input_dir),
        out_dir: PathBuf::from(&args.out),
        public_dir: args.public_dir.as_ref().map(PathBuf::from),
        tags: args.publisher.tags.clone(),
    };

    let summary = if args.publish {
        let publisher = crate::publish::webdriver_publisher(orchestrator.settings(), &args.publisher)?;
        let history = FileHistoryStore::new(&args.publisher.history);
        let publishing = BatchPublishing {
            publisher: &publisher,
            history: &history,
        };
        orchestrator.run_batch(&options, Some(&publishing)).await?
    } else {
        orchestrator.run_batch(&options, None).await?
    };

    println!(
        "{}",
        serde_json::to_string(&summary).context("serialize batch summary")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_file_stem() {
        assert_eq!(article_slug(Path::new("in/The Lost City.txt")), "the-lost-city");
        assert_eq!(article_slug(Path::new("in/__2024 -- recap!.txt")), "2024-recap");
    }

    #[test]
    fn non_ascii_stem_gets_stable_hash_slug() {
        let a = article_slug(Path::new("in/東京の夜.txt"));
        let b = article_slug(Path::new("other/東京の夜.txt"));
        let c = article_slug(Path::new("in/大阪の朝.txt"));
        assert!(a.starts_with("article-"));
        assert_eq!(a.len(), "article-".len() + 10);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn lists_only_txt_files_in_name_order() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        for name in ["b.txt", "a.txt", "notes.md", "c.TXT.bak"] {
            std::fs::write(temp.path().join(name), "x")?;
        }
        std::fs::create_dir(temp.path().join("d.txt"))?;
        let names: Vec<String> = list_articles(temp.path())?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        Ok(())
    }

    #[test]
    fn publish_job_uses_hook_and_first_image() {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "title": "Title",
            "hook": "Did you know?",
            "scenes": [],
        }))
        .unwrap();
        let outputs = ArticleOutputs {
            manifest,
            audio_path: PathBuf::from("w/narration.wav"),
            images: BTreeMap::from([
                (2, PathBuf::from("w/images/scene_2.png")),
                (1, PathBuf::from("w/images/scene_1.png")),
            ]),
            video_path: PathBuf::from("w/video.mp4"),
        };
        let job = publish_job(&outputs, &["travel".to_owned()]);
        assert_eq!(job.composite_text(), "Title\n\nDid you know?");
        assert_eq!(job.tags, vec!["travel"]);
        assert_eq!(job.cover_path, Some(PathBuf::from("w/images/scene_1.png")));
    }
}
