use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context as _;

use crate::cli::WorkDirArgs;
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::formats::{Manifest, Transition, VisualEffect};
use crate::visuals::{TARGET_HEIGHT, TARGET_WIDTH};
use crate::{caption, fsutil, manifest, narration, visuals};

pub const FPS: u32 = 30;
pub const VIDEO_FILE_NAME: &str = "video.mp4";

const TRANSITION_SECS: f64 = 0.5;
const MAX_ZOOM: f64 = 1.15;
const CAPTION_COLUMNS: usize = 22;

/// Splits `total_frames` across scenes in proportion to `weights`.
///
/// Non-finite or negative weights count as missing. Missing weights take the
/// mean of the present ones; with no usable weight at all every scene gets an
/// equal share. Each scene gets at least one frame when `total_frames`
/// allows, and the result always sums to `total_frames`.
pub fn allocate_frames(weights: &[f64], total_frames: u64) -> Vec<u64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }

    let usable = |w: f64| w.is_finite() && w > 0.0;
    // Scaled to the largest weight so huge estimates cannot overflow the sums.
    let scale = weights.iter().copied().filter(|w| usable(*w)).fold(0.0, f64::max);
    let weights: Vec<f64> = if scale > 0.0 {
        let scaled: Vec<Option<f64>> = weights
            .iter()
            .map(|w| usable(*w).then(|| w / scale))
            .collect();
        let present: Vec<f64> = scaled.iter().flatten().copied().collect();
        let fill = present.iter().sum::<f64>() / present.len() as f64;
        scaled.into_iter().map(|w| w.unwrap_or(fill)).collect()
    } else {
        vec![1.0; n]
    };
    let weight_sum: f64 = weights.iter().sum();

    let floor = u64::from(total_frames >= n as u64);
    let remaining = total_frames - floor * n as u64;

    let mut frames = Vec::with_capacity(n);
    let mut remainders = Vec::with_capacity(n);
    let mut assigned = 0u64;
    for (idx, weight) in weights.iter().enumerate() {
        let exact = remaining as f64 * weight / weight_sum;
        let base = (exact.floor() as u64).min(remaining - assigned);
        assigned += base;
        frames.push(floor + base);
        remainders.push((idx, exact - base as f64));
    }

    // Largest remainder gets the leftover frames; ties go to the earlier scene.
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let leftover = remaining - assigned;
    for (idx, _) in remainders.iter().take(leftover as usize) {
        frames[*idx] += 1;
    }
    frames
}

/// Frames needed to cover `secs` without ending before it.
pub fn frames_covering(secs: f64, fps: u32) -> u64 {
    if !(secs.is_finite() && secs > 0.0) {
        return 0;
    }
    (secs * f64::from(fps) - 1e-6).ceil().max(1.0) as u64
}

#[derive(Debug, Clone)]
pub struct SceneClip {
    pub scene_id: u32,
    pub image: PathBuf,
    pub caption: String,
    pub effect: VisualEffect,
    pub frames: u64,
    /// Seconds of overlap with the next clip; zero for cuts and the last clip.
    pub transition_out: Option<(Transition, f64)>,
}

impl SceneClip {
    pub fn screen_secs(&self, fps: u32) -> f64 {
        self.frames as f64 / f64::from(fps)
    }

    /// Input length including the tail consumed by the outgoing transition.
    pub fn input_secs(&self, fps: u32) -> f64 {
        self.screen_secs(fps) + self.transition_out.map_or(0.0, |(_, secs)| secs)
    }
}

/// Everything the encoder is told to do, computed up front.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub fps: u32,
    pub audio_path: PathBuf,
    pub audio_secs: f64,
    pub clips: Vec<SceneClip>,
}

impl RenderPlan {
    pub fn build(
        manifest: &Manifest,
        images: &BTreeMap<u32, PathBuf>,
        audio_path: &Path,
        audio_secs: f64,
        fps: u32,
    ) -> anyhow::Result<Self> {
        if manifest.scenes.is_empty() {
            anyhow::bail!("manifest has no scenes");
        }
        let total_frames = frames_covering(audio_secs, fps);
        if total_frames == 0 {
            anyhow::bail!("audio track has no duration");
        }

        let weights: Vec<f64> = manifest
            .scenes
            .iter()
            .map(|scene| scene.duration_estimate)
            .collect();
        let frames = allocate_frames(&weights, total_frames);

        let mut clips = Vec::with_capacity(manifest.scenes.len());
        for (idx, scene) in manifest.scenes.iter().enumerate() {
            let image = images
                .get(&scene.id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no image for scene {}", scene.id))?;

            let transition_out = frames.get(idx + 1).and_then(|next_frames| {
                if scene.transition == Transition::Cut {
                    return None;
                }
                let shorter = frames[idx].min(*next_frames) as f64 / f64::from(fps);
                let secs = TRANSITION_SECS.min(shorter / 2.0);
                // Anything under two frames reads as a cut anyway.
                (secs >= 2.0 / f64::from(fps)).then_some((scene.transition, secs))
            });

            clips.push(SceneClip {
                scene_id: scene.id,
                image,
                caption: scene.caption.trim().to_owned(),
                effect: scene.effect,
                frames: frames[idx],
                transition_out,
            });
        }

        Ok(Self {
            fps,
            audio_path: audio_path.to_path_buf(),
            audio_secs,
            clips,
        })
    }

    pub fn total_frames(&self) -> u64 {
        self.clips.iter().map(|clip| clip.frames).sum()
    }

    pub fn video_secs(&self) -> f64 {
        self.total_frames() as f64 / f64::from(self.fps)
    }

    /// Start of each clip on the output timeline, in seconds.
    pub fn offsets(&self) -> Vec<f64> {
        let mut start = 0u64;
        self.clips
            .iter()
            .map(|clip| {
                let offset = start as f64 / f64::from(self.fps);
                start += clip.frames;
                offset
            })
            .collect()
    }

    /// `-filter_complex_script` body. `caption_files[i]` holds the wrapped
    /// caption of clip `i`, or `None` when it has no caption.
    pub fn filter_graph(&self, caption_files: &[Option<PathBuf>], font: Option<&Path>) -> String {
        let mut graph = String::new();
        let fps = self.fps;

        for (idx, clip) in self.clips.iter().enumerate() {
            let input_frames = (clip.input_secs(fps) * f64::from(fps)).round().max(1.0);
            let mut chain = vec![motion_filter(clip.effect, input_frames, fps)];
            if let Some(Some(path)) = caption_files.get(idx) {
                chain.push(drawtext_filter(path, font));
            }
            chain.push(format!("fps={fps},format=yuv420p,setsar=1"));
            let _ = writeln!(graph, "[{idx}:v]{}[v{idx}];", chain.join(","));
        }

        let offsets = self.offsets();
        let mut current = "v0".to_owned();
        for idx in 1..self.clips.len() {
            let next = format!("x{idx}");
            match self.clips[idx - 1].transition_out {
                Some((transition, secs)) => {
                    let _ = writeln!(
                        graph,
                        "[{current}][v{idx}]xfade=transition={}:duration={secs:.4}:offset={:.4}[{next}];",
                        xfade_name(transition),
                        offsets[idx],
                    );
                }
                None => {
                    let _ = writeln!(graph, "[{current}][v{idx}]concat=n=2:v=1:a=0[{next}];");
                }
            }
            current = next;
        }
        let _ = write!(graph, "[{current}]null[vout]");
        graph
    }

    pub fn ffmpeg_args(&self, script_path: &Path, out_path: &Path) -> Vec<String> {
        let fps = self.fps.to_string();
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(str::to_owned)
            .collect();

        for clip in &self.clips {
            args.extend([
                "-loop".to_owned(),
                "1".to_owned(),
                "-framerate".to_owned(),
                fps.clone(),
                "-t".to_owned(),
                format!("{:.4}", clip.input_secs(self.fps)),
                "-i".to_owned(),
                clip.image.to_string_lossy().to_string(),
            ]);
        }
        args.extend(["-i".to_owned(), self.audio_path.to_string_lossy().to_string()]);

        let script = script_path.to_string_lossy().to_string();
        let audio_map = format!("{}:a:0", self.clips.len());
        let duration = format!("{:.6}", self.audio_secs);
        args.extend(
            [
                "-filter_complex_script",
                script.as_str(),
                "-map",
                "[vout]",
                "-map",
                audio_map.as_str(),
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-crf",
                "20",
                "-pix_fmt",
                "yuv420p",
                "-r",
                fps.as_str(),
                "-c:a",
                "aac",
                "-b:a",
                "192k",
                "-shortest",
                "-t",
                duration.as_str(),
                "-movflags",
                "+faststart",
            ]
            .into_iter()
            .map(str::to_owned),
        );
        args.push(out_path.to_string_lossy().to_string());
        args
    }
}

fn motion_filter(effect: VisualEffect, frames: f64, fps: u32) -> String {
    let size = format!("{TARGET_WIDTH}x{TARGET_HEIGHT}");
    let upscale = format!("scale={}:{}", TARGET_WIDTH * 2, TARGET_HEIGHT * 2);
    let delta = MAX_ZOOM - 1.0;
    let center_x = "iw/2-(iw/zoom/2)";
    let center_y = "ih/2-(ih/zoom/2)";
    let (z, x, y) = match effect {
        VisualEffect::Static => {
            return format!("scale={TARGET_WIDTH}:{TARGET_HEIGHT}");
        }
        VisualEffect::ZoomIn => (
            format!("1+{delta:.3}*on/{frames}"),
            center_x.to_owned(),
            center_y.to_owned(),
        ),
        VisualEffect::ZoomOut => (
            format!("{MAX_ZOOM:.3}-{delta:.3}*on/{frames}"),
            center_x.to_owned(),
            center_y.to_owned(),
        ),
        VisualEffect::PanLeft => (
            format!("{MAX_ZOOM:.3}"),
            format!("(iw-iw/zoom)*(1-on/{frames})"),
            center_y.to_owned(),
        ),
        VisualEffect::PanRight => (
            format!("{MAX_ZOOM:.3}"),
            format!("(iw-iw/zoom)*on/{frames}"),
            center_y.to_owned(),
        ),
    };
    format!("{upscale},zoompan=z='{z}':x='{x}':y='{y}':d=1:s={size}:fps={fps}")
}

/// Body of a caption file: the wrapped lines, or `None` for a blank caption.
/// The text is drawn literally, so `%` and `\` need no escaping here.
fn caption_text(caption: &str) -> Option<String> {
    let lines = caption::wrap(caption, CAPTION_COLUMNS);
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn drawtext_filter(text_file: &Path, font: Option<&Path>) -> String {
    let mut filter = format!(
        "drawtext=textfile='{}':expansion=none:fontsize=64:fontcolor=white:borderw=5:bordercolor=black@0.85:line_spacing=14:x=(w-text_w)/2:y=h*0.70",
        quote_path(text_file)
    );
    if let Some(font) = font {
        let _ = write!(filter, ":fontfile='{}'", quote_path(font));
    }
    filter
}

/// Escapes a path for use inside single quotes in a filter graph.
fn quote_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

fn xfade_name(transition: Transition) -> &'static str {
    match transition {
        Transition::Slide => "slideleft",
        Transition::Fade | Transition::Cut => "fade",
    }
}

/// Assembles scene images and the narration into `out_path`. The video
/// length is taken from the audio track.
pub async fn render(
    settings: &Settings,
    manifest: &Manifest,
    asset_dir: &Path,
    audio_path: &Path,
    out_path: &Path,
) -> Result<()> {
    let audio_secs = narration::audio_duration_secs(audio_path)
        .await
        .map_err(PipelineError::render)?;

    let images: BTreeMap<u32, PathBuf> = manifest
        .scenes
        .iter()
        .map(|scene| (scene.id, visuals::scene_image_path(asset_dir, scene.id)))
        .collect();
    for (id, path) in &images {
        if !fsutil::is_checkpoint(path).await {
            return Err(PipelineError::Render(format!(
                "scene {id} image missing: {}",
                path.display()
            )));
        }
    }

    let plan = RenderPlan::build(manifest, &images, audio_path, audio_secs, FPS)
        .map_err(PipelineError::render)?;
    tracing::info!(
        scenes = plan.clips.len(),
        audio_secs,
        video_secs = plan.video_secs(),
        "render plan"
    );
    for (clip, offset) in plan.clips.iter().zip(plan.offsets()) {
        tracing::debug!(
            scene = clip.scene_id,
            offset_secs = offset,
            secs = clip.screen_secs(plan.fps),
            effect = ?clip.effect,
            transition = ?clip.transition_out,
            "clip"
        );
    }

    execute(settings, &plan, out_path)
        .await
        .map_err(PipelineError::render)
}

async fn execute(settings: &Settings, plan: &RenderPlan, out_path: &Path) -> anyhow::Result<()> {
    let parent = out_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("output has no parent: {}", out_path.display()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create output dir: {}", parent.display()))?;

    let scratch = tempfile::Builder::new()
        .prefix(".render")
        .tempdir_in(parent)
        .context("create render scratch dir")?;

    let mut caption_files = Vec::with_capacity(plan.clips.len());
    for clip in &plan.clips {
        let Some(text) = caption_text(&clip.caption) else {
            caption_files.push(None);
            continue;
        };
        let path = scratch.path().join(format!("caption_{}.txt", clip.scene_id));
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("write caption: {}", path.display()))?;
        caption_files.push(Some(path));
    }

    let script_path = scratch.path().join("graph.txt");
    let graph = plan.filter_graph(&caption_files, settings.font_path.as_deref());
    tokio::fs::write(&script_path, &graph)
        .await
        .context("write filter graph")?;

    let tmp_out = fsutil::tmp_sibling(out_path);
    let args = plan.ffmpeg_args(&script_path, &tmp_out);
    tracing::info!(bin = %settings.ffmpeg_bin, out = %out_path.display(), "ffmpeg");

    let output = tokio::process::Command::new(&settings.ffmpeg_bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("spawn ffmpeg: {}", settings.ffmpeg_bin))?;

    if !output.status.success() {
        let _ = tokio::fs::remove_file(&tmp_out).await;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
        let tail = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
        match output.status.code() {
            Some(code) => anyhow::bail!("ffmpeg exited with code {code}: {tail}"),
            None => anyhow::bail!("ffmpeg terminated by signal: {tail}"),
        }
    }

    if !fsutil::is_checkpoint(&tmp_out).await {
        let _ = tokio::fs::remove_file(&tmp_out).await;
        anyhow::bail!("ffmpeg produced no output: {}", tmp_out.display());
    }
    fsutil::sync_file(&tmp_out).await?;
    tokio::fs::rename(&tmp_out, out_path)
        .await
        .with_context(|| format!("move video into place: {}", out_path.display()))?;

    tracing::info!(path = %out_path.display(), "video written");
    Ok(())
}

pub async fn run(args: WorkDirArgs) -> anyhow::Result<()> {
    let work_dir = Path::new(&args.work_dir);
    let out_path = work_dir.join(VIDEO_FILE_NAME);
    if !args.force && fsutil::is_checkpoint(&out_path).await {
        tracing::info!(path = %out_path.display(), "video exists; nothing to do");
        return Ok(());
    }

    let manifest = manifest::load_from_work_dir(work_dir).await?;
    let settings = Settings::from_env();
    render(
        &settings,
        &manifest,
        &work_dir.join(crate::pipeline::IMAGES_DIR_NAME),
        &work_dir.join(narration::AUDIO_FILE_NAME),
        &out_path,
    )
    .await?;
    Ok(())
}
