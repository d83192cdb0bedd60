use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::WorkDirArgs;
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::formats::Manifest;
use crate::genai::GenaiClient;
use crate::{fsutil, manifest, wav};

/// Speech is mono 16-bit PCM.
const CHANNELS: u16 = 1;

pub const AUDIO_FILE_NAME: &str = "narration.wav";

/// Synthesizes the whole narration in one request and writes it as a WAVE
/// file at `out_path`.
pub async fn synthesize(
    client: &GenaiClient,
    settings: &Settings,
    manifest: &Manifest,
    out_path: &Path,
) -> Result<PathBuf> {
    let text = manifest.full_narration();
    if text.trim().is_empty() {
        return Err(PipelineError::Synthesis(
            "manifest has no narration text".to_owned(),
        ));
    }

    let voice = settings.voice_for(manifest.voice_gender);
    tracing::info!(
        model = %settings.tts_model,
        voice,
        chars = text.chars().count(),
        scenes = manifest.scenes.len(),
        "synthesize narration"
    );

    let audio = client
        .generate_speech(&settings.tts_model, voice, &text)
        .await
        .context("speech request")
        .map_err(PipelineError::synthesis)?;

    let sample_rate = audio
        .mime_type
        .as_deref()
        .and_then(wav::sample_rate_from_mime)
        .unwrap_or(settings.sample_rate);

    let file = wav::encode(&audio.data, sample_rate, CHANNELS)
        .context("wrap pcm in wave container")
        .map_err(PipelineError::synthesis)?;

    fsutil::write_atomic(out_path, &file)
        .await
        .map_err(PipelineError::synthesis)?;

    tracing::info!(
        path = %out_path.display(),
        sample_rate,
        bytes = audio.data.len(),
        seconds = audio.data.len() as f64 / f64::from(sample_rate * u32::from(CHANNELS) * 2),
        "narration written"
    );
    Ok(out_path.to_path_buf())
}

/// Duration of a WAVE file on disk, from its header.
pub async fn audio_duration_secs(path: &Path) -> anyhow::Result<f64> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read audio: {}", path.display()))?;
    let info = wav::parse(&bytes).with_context(|| format!("parse audio: {}", path.display()))?;
    Ok(info.duration_secs())
}

pub async fn run(args: WorkDirArgs) -> anyhow::Result<()> {
    let work_dir = Path::new(&args.work_dir);
    let out_path = work_dir.join(AUDIO_FILE_NAME);
    if !args.force && fsutil::is_checkpoint(&out_path).await {
        tracing::info!(path = %out_path.display(), "narration exists; nothing to do");
        return Ok(());
    }

    let manifest = manifest::load_from_work_dir(work_dir).await?;
    let settings = Settings::from_env();
    let client = GenaiClient::from_settings(&settings)?;
    synthesize(&client, &settings, &manifest, &out_path).await?;
    Ok(())
}
