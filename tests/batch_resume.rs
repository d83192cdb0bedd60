mod genai_stub;

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use genai_stub::{GenaiStub, GenaiStubConfig, Reply};
use reelsmith::config::Settings;
use reelsmith::formats::{PublishJob, PublishState};
use reelsmith::history::{HistoryStore as _, InMemoryHistoryStore};
use reelsmith::pipeline::{BatchOptions, BatchPublishing, BatchSummary, Orchestrator};
use reelsmith::publish::VideoPublisher;

fn full_stub() -> GenaiStub {
    GenaiStub::spawn(GenaiStubConfig {
        text: Reply::Text(genai_stub::manifest_json("Batch Title", 2)),
        speech: Reply::Inline {
            mime_type: Some("audio/L16;codec=pcm;rate=24000".to_owned()),
            data: genai_stub::silence_pcm(1.5),
        },
        image: Reply::Error {
            status: 503,
            message: "image model overloaded".to_owned(),
        },
    })
}

fn batch_options(root: &Path) -> BatchOptions {
    BatchOptions {
        input_dir: root.join("articles"),
        out_dir: root.join("out"),
        public_dir: None,
        tags: vec!["news".to_owned()],
    }
}

fn write_article(root: &Path, name: &str, text: &str) -> anyhow::Result<()> {
    let dir = root.join("articles");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(name), text)?;
    Ok(())
}

#[tokio::test]
async fn existing_videos_are_skipped_without_any_request() -> anyhow::Result<()> {
    let stub = full_stub();
    let temp = tempfile::TempDir::new()?;
    write_article(temp.path(), "First Story.txt", "Once upon a time.")?;
    write_article(temp.path(), "second.txt", "Another one.")?;
    for slug in ["first-story", "second"] {
        let work_dir = temp.path().join("out").join(slug);
        std::fs::create_dir_all(&work_dir)?;
        std::fs::write(work_dir.join("video.mp4"), b"done")?;
    }

    let orchestrator = Orchestrator::new(stub.settings())?;
    let summary = orchestrator.run_batch(&batch_options(temp.path()), None).await?;

    assert_eq!(
        summary,
        BatchSummary {
            skipped: 2,
            ..BatchSummary::default()
        }
    );
    assert!(stub.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn one_failing_article_does_not_stop_the_batch() -> anyhow::Result<()> {
    let stub = full_stub();
    let temp = tempfile::TempDir::new()?;
    write_article(temp.path(), "a-empty.txt", "   \n")?;
    write_article(temp.path(), "b-done.txt", "Finished earlier.")?;
    write_article(temp.path(), "notes.md", "not an article")?;
    let done = temp.path().join("out").join("b-done");
    std::fs::create_dir_all(&done)?;
    std::fs::write(done.join("video.mp4"), b"done")?;

    let orchestrator = Orchestrator::new(stub.settings())?;
    let summary = orchestrator.run_batch(&batch_options(temp.path()), None).await?;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.produced, 0);
    Ok(())
}

#[derive(Default)]
struct RecordingPublisher {
    jobs: Mutex<Vec<PublishJob>>,
}

#[async_trait]
impl VideoPublisher for RecordingPublisher {
    async fn publish(&self, job: &mut PublishJob) -> bool {
        job.state = PublishState::Published;
        self.jobs.lock().unwrap().push(job.clone());
        true
    }
}

#[cfg(unix)]
#[tokio::test]
async fn produced_videos_are_published_once_per_title() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    let stub = full_stub();
    let temp = tempfile::TempDir::new()?;
    write_article(temp.path(), "one.txt", "The first article.")?;
    write_article(temp.path(), "two.txt", "The second article.")?;

    let ffmpeg = temp.path().join("ffmpeg");
    std::fs::write(
        &ffmpeg,
        "#!/bin/sh\nfor a in \"$@\"; do last=\"$a\"; done\nprintf 'mp4' > \"$last\"\n",
    )?;
    std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755))?;

    let base_url = stub.base_url.clone();
    let ffmpeg_bin = ffmpeg.to_string_lossy().to_string();
    let settings = Settings::from_lookup(move |key| match key {
        "REELSMITH_API_KEY" => Some(genai_stub::API_KEY.to_owned()),
        "REELSMITH_API_BASE_URL" => Some(base_url.clone()),
        "REELSMITH_FFMPEG" => Some(ffmpeg_bin.clone()),
        _ => None,
    });

    let mut options = batch_options(temp.path());
    options.public_dir = Some(temp.path().join("public"));
    let publisher = RecordingPublisher::default();
    let history = InMemoryHistoryStore::new();
    let publishing = BatchPublishing {
        publisher: &publisher,
        history: &history,
    };

    let orchestrator = Orchestrator::new(settings)?;
    let summary = orchestrator.run_batch(&options, Some(&publishing)).await?;

    assert_eq!(
        summary,
        BatchSummary {
            produced: 2,
            published: 1,
            ..BatchSummary::default()
        }
    );
    for slug in ["one", "two"] {
        let work_dir = temp.path().join("out").join(slug);
        assert!(work_dir.join("manifest.json").is_file());
        assert!(work_dir.join("narration.wav").is_file());
        // Image service was down: placeholders stand in.
        assert!(work_dir.join("images").join("scene_1.png").is_file());
        assert!(work_dir.join("images").join("scene_2.png").is_file());
        assert_eq!(std::fs::read(work_dir.join("video.mp4"))?, b"mp4");
        assert!(temp.path().join("public").join(format!("{slug}.mp4")).is_file());
    }

    let jobs = publisher.jobs.lock().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].title, "Batch Title");
    assert_eq!(jobs[0].tags, vec!["news"]);
    assert!(jobs[0].video_path.ends_with("out/one/video.mp4"));
    assert_eq!(history.load().await?.len(), 1);

    // Second run: everything is on disk already.
    let requests_before = stub.requests().len();
    let summary = orchestrator.run_batch(&options, Some(&publishing)).await?;
    assert_eq!(summary.skipped, 2);
    assert_eq!(stub.requests().len(), requests_before);
    Ok(())
}
