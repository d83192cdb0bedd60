use std::path::Path;

use anyhow::Context as _;

use crate::cli::ManifestArgs;
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::formats::Manifest;
use crate::fsutil;
use crate::genai::GenaiClient;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

const INSTRUCTIONS: &str = "You are a short-form video scriptwriter.\n\
Task: Turn the article between BEGIN_ARTICLE and END_ARTICLE into a vertical short video script.\n\
\n\
Output a single JSON object with these fields:\n\
- title: string, catchy, under 80 characters\n\
- cover_caption: string or null, 2-6 words for the cover image\n\
- hook: string, the opening line that grabs attention\n\
- music_mood: one of calm, upbeat, dramatic, mysterious, inspiring\n\
- voice_gender: one of female, male\n\
- character_description: string or null, recurring visual character to keep consistent\n\
- scenes: array, in order, each with\n\
  - id: integer, starting at 1 and increasing by 1\n\
  - narration: string, spoken text for this scene\n\
  - caption: string, short on-screen caption\n\
  - image_prompt: string, detailed English prompt for a vertical 9:16 illustration\n\
  - duration_estimate: number of seconds, > 0\n\
  - effect: one of zoom_in, zoom_out, pan_left, pan_right, static\n\
  - transition: one of fade, cut, slide\n\
- total_duration_estimate: number of seconds\n\
\n\
Rules:\n\
- Keep the facts of the article. Do not invent claims.\n\
- 4 to 10 scenes. Narration of all scenes together should read naturally aloud.\n\
- Output ONLY the JSON object.\n";

/// Asks the content service for a scene breakdown of `article_text`.
///
/// Not retried here: the call is billed and its output differs per attempt.
pub async fn generate_manifest(
    client: &GenaiClient,
    settings: &Settings,
    article_text: &str,
) -> Result<Manifest> {
    if article_text.trim().is_empty() {
        return Err(PipelineError::Generation("article text is empty".to_owned()));
    }

    tracing::info!(
        model = %settings.text_model,
        chars = article_text.chars().count(),
        "generate manifest"
    );

    let input = format!("BEGIN_ARTICLE\n{}\nEND_ARTICLE", article_text.trim());
    let raw = client
        .generate_json(&settings.text_model, INSTRUCTIONS, &input)
        .await
        .context("manifest request")
        .map_err(PipelineError::generation)?;

    let manifest = parse_manifest(&raw).map_err(PipelineError::generation)?;
    tracing::info!(
        title = %manifest.title,
        scenes = manifest.scenes.len(),
        estimate_secs = manifest.total_duration_estimate,
        "manifest generated"
    );
    Ok(manifest)
}

/// Parses and validates a manifest as returned by the service.
pub fn parse_manifest(raw: &str) -> anyhow::Result<Manifest> {
    let json = strip_code_fence(raw);
    let mut manifest: Manifest = serde_json::from_str(json).context("parse manifest json")?;
    validate(&manifest)?;
    if !(manifest.total_duration_estimate.is_finite() && manifest.total_duration_estimate > 0.0) {
        manifest.total_duration_estimate = manifest.scene_duration_sum();
    }
    Ok(manifest)
}

pub fn validate(manifest: &Manifest) -> anyhow::Result<()> {
    if manifest.title.trim().is_empty() {
        anyhow::bail!("manifest title is empty");
    }
    let Some(first) = manifest.scenes.first() else {
        anyhow::bail!("manifest has no scenes");
    };
    if first.id > 1 {
        anyhow::bail!("scene ids must start at 0 or 1 (got {})", first.id);
    }

    for (idx, scene) in manifest.scenes.iter().enumerate() {
        let expected = first.id + idx as u32;
        if scene.id != expected {
            anyhow::bail!(
                "scene ids must be dense and ascending: expected {expected}, got {}",
                scene.id
            );
        }
        if !(scene.duration_estimate.is_finite() && scene.duration_estimate > 0.0) {
            anyhow::bail!(
                "scene {} has non-positive duration estimate {}",
                scene.id,
                scene.duration_estimate
            );
        }
        if scene.narration.trim().is_empty() {
            anyhow::bail!("scene {} has empty narration", scene.id);
        }
        if scene.image_prompt.trim().is_empty() {
            anyhow::bail!("scene {} has empty image prompt", scene.id);
        }
    }
    Ok(())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

pub async fn write(manifest: &Manifest, path: &Path) -> anyhow::Result<()> {
    fsutil::write_json_atomic(path, manifest)
        .await
        .with_context(|| format!("write manifest: {}", path.display()))
}

/// Reads a manifest checkpoint; `None` when it does not exist yet.
pub async fn load(path: &Path) -> anyhow::Result<Option<Manifest>> {
    let manifest: Option<Manifest> = fsutil::read_json(path)
        .await
        .with_context(|| format!("read manifest: {}", path.display()))?;
    if let Some(manifest) = &manifest {
        validate(manifest).with_context(|| format!("validate manifest: {}", path.display()))?;
    }
    Ok(manifest)
}

/// The manifest checkpoint of an article work dir, which must exist.
pub async fn load_from_work_dir(work_dir: &Path) -> anyhow::Result<Manifest> {
    let path = work_dir.join(MANIFEST_FILE_NAME);
    load(&path)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no manifest at {}; run `manifest` first", path.display()))
}

pub async fn run(args: ManifestArgs) -> anyhow::Result<()> {
    let path = Path::new(&args.work_dir).join(MANIFEST_FILE_NAME);
    if !args.force && fsutil::is_checkpoint(&path).await {
        anyhow::bail!(
            "manifest already exists: {} (use --force to regenerate)",
            path.display()
        );
    }

    let settings = Settings::from_env();
    let client = GenaiClient::from_settings(&settings)?;
    let text = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("read article: {}", args.input))?;

    let manifest = generate_manifest(&client, &settings, &text).await?;
    write(&manifest, &path).await?;
    tracing::info!(path = %path.display(), "manifest written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{Transition, VisualEffect, VoiceGender};

    fn scene_json(id: u32, duration: f64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "narration": format!("narration {id}"),
            "caption": format!("caption {id}"),
            "image_prompt": format!("prompt {id}"),
            "duration_estimate": duration,
            "effect": "zoom-in",
            "transition": "slide",
        })
    }

    fn manifest_json(scenes: Vec<serde_json::Value>) -> String {
        serde_json::json!({
            "title": "A title",
            "hook": "Listen",
            "music_mood": "dramatic",
            "voice_gender": "male",
            "scenes": scenes,
        })
        .to_string()
    }

    #[test]
    fn parses_fenced_json_and_fills_total() {
        let raw = format!(
            "```json\n{}\n```",
            manifest_json(vec![scene_json(1, 4.0), scene_json(2, 6.0)])
        );
        let manifest = parse_manifest(&raw).unwrap();
        assert_eq!(manifest.scenes.len(), 2);
        assert_eq!(manifest.voice_gender, VoiceGender::Male);
        assert_eq!(manifest.scenes[0].effect, VisualEffect::ZoomIn);
        assert_eq!(manifest.scenes[1].transition, Transition::Slide);
        assert!((manifest.total_duration_estimate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_based_ids_are_accepted() {
        let raw = manifest_json(vec![scene_json(0, 1.0), scene_json(1, 1.0)]);
        assert!(parse_manifest(&raw).is_ok());
    }

    #[test]
    fn rejects_gaps_and_bad_starts() {
        let gap = manifest_json(vec![scene_json(1, 1.0), scene_json(3, 1.0)]);
        assert!(parse_manifest(&gap).is_err());
        let late_start = manifest_json(vec![scene_json(2, 1.0)]);
        assert!(parse_manifest(&late_start).is_err());
        let descending = manifest_json(vec![scene_json(1, 1.0), scene_json(0, 1.0)]);
        assert!(parse_manifest(&descending).is_err());
    }

    #[test]
    fn rejects_empty_scenes_and_non_positive_durations() {
        assert!(parse_manifest(&manifest_json(vec![])).is_err());
        assert!(parse_manifest(&manifest_json(vec![scene_json(1, 0.0)])).is_err());
        assert!(parse_manifest(&manifest_json(vec![scene_json(1, -2.0)])).is_err());
    }

    #[test]
    fn rejects_unknown_enum_values_instead_of_coercing() {
        let mut scene = scene_json(1, 1.0);
        scene["effect"] = serde_json::json!("spin");
        assert!(parse_manifest(&manifest_json(vec![scene])).is_err());
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_manifest("Sure! Here is your script.").is_err());
    }

    #[tokio::test]
    async fn write_then_load_round_trips_checkpoint() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join(MANIFEST_FILE_NAME);
        assert!(load(&path).await?.is_none());

        let manifest = parse_manifest(&manifest_json(vec![scene_json(1, 3.0)]))?;
        write(&manifest, &path).await?;
        assert_eq!(load(&path).await?, Some(manifest));
        Ok(())
    }
}
