use std::path::Path;

use anyhow::Context as _;
use tokio::fs;
use tokio::io::AsyncWriteExt as _;

/// Writes through a sibling temp file and renames it into place, so a
/// checkpoint is either absent or complete.
pub async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = tmp_sibling(path);
    let mut file = fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("create tmp: {}", tmp_path.display()))?;
    file.write_all(data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("sync tmp: {}", tmp_path.display()))?;
    drop(file);
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

pub async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    write_atomic(path, &data).await
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

/// Flushes a file written by someone else (ffmpeg, `fs::copy`) to disk
/// before it is renamed into place.
pub async fn sync_file(path: &Path) -> anyhow::Result<()> {
    let file = fs::File::open(path)
        .await
        .with_context(|| format!("open for sync: {}", path.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("sync: {}", path.display()))?;
    Ok(())
}

/// A checkpoint counts only if it exists and is non-empty.
pub async fn is_checkpoint(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// `video.mp4` -> `video.tmp.<uuid>.mp4`, keeping the extension so tools that
/// infer formats from file names still work.
pub fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => path.with_extension(format!("tmp.{tag}.{ext}")),
        None => path.with_extension(format!("tmp.{tag}")),
    }
}
