use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::Context as _;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::cli::WorkDirArgs;
use crate::config::Settings;
use crate::error::PipelineError;
use crate::formats::{Manifest, Scene};
use crate::genai::{GenaiClient, InlineData};
use crate::{caption, fsutil, manifest};

pub const TARGET_WIDTH: u32 = 1080;
pub const TARGET_HEIGHT: u32 = 1920;

const FRAMING_HINT: &str = "Vertical 9:16 composition, no text, no watermark.";

/// Source of generated scene images.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<InlineData>;
}

pub struct GenaiImages<'a> {
    client: &'a GenaiClient,
    model: &'a str,
}

impl<'a> GenaiImages<'a> {
    pub fn new(client: &'a GenaiClient, model: &'a str) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ImageGenerator for GenaiImages<'_> {
    async fn generate(&self, prompt: &str) -> anyhow::Result<InlineData> {
        self.client.generate_image(self.model, prompt).await
    }
}

pub fn scene_image_path(out_dir: &Path, scene_id: u32) -> PathBuf {
    out_dir.join(format!("scene_{scene_id}.png"))
}

/// Resolves one normalized image per scene. A scene whose generation fails
/// gets a placeholder instead; only filesystem errors are returned.
pub async fn prepare_visuals(
    generator: &dyn ImageGenerator,
    manifest: &Manifest,
    out_dir: &Path,
    font: Option<&FontVec>,
) -> anyhow::Result<BTreeMap<u32, PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("create image dir: {}", out_dir.display()))?;

    let total = manifest.scenes.len();
    let mut images = BTreeMap::new();
    let mut placeholders = 0usize;

    for (idx, scene) in manifest.scenes.iter().enumerate() {
        let path = scene_image_path(out_dir, scene.id);
        if fsutil::is_checkpoint(&path).await {
            tracing::info!(scene = scene.id, "scene image exists; skipping");
            images.insert(scene.id, path);
            continue;
        }

        let prompt = scene_prompt(manifest, scene);
        let image = match fetch_normalized(generator, &prompt).await {
            Ok(image) => image,
            Err(err) => {
                let failure = PipelineError::Asset {
                    scene: scene.id,
                    message: format!("{err:#}"),
                };
                tracing::warn!(error = %failure, "using placeholder image");
                placeholders += 1;
                placeholder(scene.id, &scene.caption, font)
            }
        };

        let png = encode_png(&image).context("encode scene image")?;
        fsutil::write_atomic(&path, &png)
            .await
            .with_context(|| format!("write scene image: {}", path.display()))?;
        tracing::info!(scene = scene.id, done = idx + 1, total, "scene image ready");
        images.insert(scene.id, path);
    }

    if placeholders > 0 {
        tracing::warn!(placeholders, total, "visuals completed with placeholders");
    }
    Ok(images)
}

fn scene_prompt(manifest: &Manifest, scene: &Scene) -> String {
    let mut prompt = scene.image_prompt.trim().to_owned();
    if let Some(character) = manifest
        .character_description
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        prompt.push_str("\nRecurring character: ");
        prompt.push_str(character);
    }
    prompt.push('\n');
    prompt.push_str(FRAMING_HINT);
    prompt
}

async fn fetch_normalized(generator: &dyn ImageGenerator, prompt: &str) -> anyhow::Result<RgbImage> {
    let inline = generator.generate(prompt).await?;
    if inline.data.is_empty() {
        anyhow::bail!("image payload is empty");
    }
    let mime = inline
        .mime_type
        .as_deref()
        .filter(|m| m.starts_with("image/"))
        .unwrap_or_else(|| sniff_image_mime(&inline.data));
    normalize(&inline.data, mime)
}

/// Mime type from the leading magic bytes; JPEG when nothing matches.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Decodes and cover-fits an image onto the fixed vertical canvas.
pub fn normalize(bytes: &[u8], mime: &str) -> anyhow::Result<RgbImage> {
    let decoded = match ImageFormat::from_mime_type(mime) {
        Some(format) => image::load_from_memory_with_format(bytes, format)
            .or_else(|_| image::load_from_memory(bytes)),
        None => image::load_from_memory(bytes),
    }
    .with_context(|| format!("decode image ({mime})"))?;

    let fitted = decoded.resize_to_fill(TARGET_WIDTH, TARGET_HEIGHT, FilterType::CatmullRom);
    Ok(fitted.to_rgb8())
}

const PALETTE: [[u8; 3]; 6] = [
    [0x1F, 0x2A, 0x44],
    [0x3A, 0x1C, 0x32],
    [0x12, 0x3D, 0x3A],
    [0x40, 0x2E, 0x14],
    [0x26, 0x26, 0x2E],
    [0x1B, 0x35, 0x1F],
];

/// Flat background chosen by scene id, with the caption drawn centered when
/// a font is available.
pub fn placeholder(scene_id: u32, caption_text: &str, font: Option<&FontVec>) -> RgbImage {
    let background = Rgb(PALETTE[scene_id as usize % PALETTE.len()]);
    let mut image = RgbImage::from_pixel(TARGET_WIDTH, TARGET_HEIGHT, background);

    let Some(font) = font else {
        return image;
    };
    let lines = caption::wrap(caption_text, 16);
    if lines.is_empty() {
        return image;
    }

    let scale = PxScale::from(84.0);
    let line_height = 108i32;
    let block_height = line_height * lines.len() as i32;
    let mut y = (TARGET_HEIGHT as i32 - block_height) / 2;
    for line in &lines {
        let (width, _) = imageproc::drawing::text_size(scale, font, line);
        let x = (TARGET_WIDTH as i32 - width as i32).max(0) / 2;
        imageproc::drawing::draw_text_mut(
            &mut image,
            Rgb([0xF5, 0xF5, 0xF0]),
            x,
            y,
            scale,
            font,
            line,
        );
        y += line_height;
    }
    image
}

pub fn load_font(path: &Path) -> anyhow::Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("read font: {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|err| anyhow::anyhow!("parse font {}: {err}", path.display()))
}

fn encode_png(image: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buf, ImageFormat::Png)
        .context("encode png")?;
    Ok(buf.into_inner())
}

pub async fn run(args: WorkDirArgs) -> anyhow::Result<()> {
    let work_dir = Path::new(&args.work_dir);
    let manifest = manifest::load_from_work_dir(work_dir).await?;
    let images_dir = work_dir.join(crate::pipeline::IMAGES_DIR_NAME);
    if args.force {
        for scene in &manifest.scenes {
            let path = scene_image_path(&images_dir, scene.id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("remove: {}", path.display()));
                }
            }
        }
    }

    let settings = Settings::from_env();
    let client = GenaiClient::from_settings(&settings)?;
    let font = settings.font_path.as_deref().map(load_font).transpose()?;
    let generator = GenaiImages::new(&client, &settings.image_model);
    let images = prepare_visuals(&generator, &manifest, &images_dir, font.as_ref()).await?;
    tracing::info!(count = images.len(), dir = %images_dir.display(), "visuals ready");
    Ok(())
}
