use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_caption: Option<String>,
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub music_mood: MusicMood,
    #[serde(default)]
    pub voice_gender: VoiceGender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_description: Option<String>,
    pub scenes: Vec<Scene>,
    /// Seconds. Filled from the scene estimates when the service omits it.
    #[serde(default)]
    pub total_duration_estimate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: u32,
    pub narration: String,
    #[serde(default)]
    pub caption: String,
    pub image_prompt: String,
    /// Seconds. Used as a weight at render time, the audio track decides the
    /// real length.
    pub duration_estimate: f64,
    #[serde(default)]
    pub effect: VisualEffect,
    #[serde(default)]
    pub transition: Transition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicMood {
    #[default]
    Calm,
    Upbeat,
    Dramatic,
    Mysterious,
    Inspiring,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    #[default]
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualEffect {
    #[serde(alias = "zoom-in")]
    ZoomIn,
    #[serde(alias = "zoom-out")]
    ZoomOut,
    #[serde(alias = "pan-left")]
    PanLeft,
    #[serde(alias = "pan-right")]
    PanRight,
    #[default]
    Static,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    #[default]
    Fade,
    Cut,
    Slide,
}

impl Manifest {
    /// Sum of the per-scene estimates, in seconds.
    pub fn scene_duration_sum(&self) -> f64 {
        self.scenes
            .iter()
            .map(|scene| scene.duration_estimate)
            .filter(|d| d.is_finite() && *d > 0.0)
            .sum()
    }

    /// Narration of every scene in order, joined into one synthesis request.
    pub fn full_narration(&self) -> String {
        self.scenes
            .iter()
            .map(|scene| scene.narration.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Init,
    Navigate,
    DismissOverlays,
    OpenUploadDialog,
    UploadFile,
    WaitFormReady,
    FillMetadata,
    UploadCover,
    WaitPublishEnabled,
    ClickPublish,
    Confirm,
    Published,
    Failed,
}

impl PublishState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub video_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<PathBuf>,
    pub state: PublishState,
}

impl PublishJob {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        video_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tags: Vec::new(),
            video_path: video_path.into(),
            cover_path: None,
            state: PublishState::Init,
        }
    }

    /// Title and description as one block for the platform's single editor.
    pub fn composite_text(&self) -> String {
        let title = self.title.trim();
        let description = self.description.trim();
        if description.is_empty() {
            return title.to_owned();
        }
        format!("{title}\n\n{description}")
    }
}
