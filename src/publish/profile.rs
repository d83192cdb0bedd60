use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::publish::probe::Selector;

/// URLs, control selectors and wait limits for the target platform's editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorProfile {
    /// Page opened before cookies are installed (cookies bind to its domain).
    pub home_url: String,
    pub editor_url: String,
    pub overlay_dismiss: Vec<Selector>,
    pub create_menu: Vec<Selector>,
    pub upload_video_option: Vec<Selector>,
    pub file_input: Vec<Selector>,
    pub form_ready: Vec<Selector>,
    pub description_editor: Vec<Selector>,
    pub tag_input: Vec<Selector>,
    pub cover_input: Vec<Selector>,
    pub publish_button: Vec<Selector>,
    pub timings: Timings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub poll_interval_ms: u64,
    /// Wait for a control that should already be on the page.
    pub control_timeout_ms: u64,
    pub form_ready_timeout_ms: u64,
    pub publish_enabled_timeout_ms: u64,
    pub confirm_wait_ms: u64,
    /// Pause after clicks that open menus or dialogs.
    pub settle_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            control_timeout_ms: 15_000,
            form_ready_timeout_ms: 180_000,
            publish_enabled_timeout_ms: 600_000,
            confirm_wait_ms: 10_000,
            settle_ms: 800,
        }
    }
}

impl Timings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn form_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.form_ready_timeout_ms)
    }

    pub fn publish_enabled_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_enabled_timeout_ms)
    }

    pub fn confirm_wait(&self) -> Duration {
        Duration::from_millis(self.confirm_wait_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn css(values: &[&str]) -> Vec<Selector> {
    values.iter().map(|v| Selector::Css((*v).to_owned())).collect()
}

impl Default for SelectorProfile {
    fn default() -> Self {
        let mut overlay_dismiss = css(&[
            "[role=dialog] button[aria-label=Close]",
            "[role=dialog] [data-testid=close-button]",
            "button.modal-close",
        ]);
        overlay_dismiss.extend([
            Selector::Button("Got it".to_owned()),
            Selector::Button("Not now".to_owned()),
            Selector::Button("Dismiss".to_owned()),
            Selector::LabeledDiv("Close".to_owned()),
        ]);

        let mut create_menu = css(&["[data-testid=create-button]", "button[aria-label=Create]"]);
        create_menu.extend([
            Selector::Button("Create".to_owned()),
            Selector::Button("New post".to_owned()),
        ]);

        let mut upload_video_option = css(&[
            "[data-testid=create-menu] [data-type=video]",
            "[role=menu] [data-value=video]",
        ]);
        upload_video_option.extend([
            Selector::Button("Video".to_owned()),
            Selector::Anchor("Video".to_owned()),
            Selector::LabeledDiv("Video".to_owned()),
        ]);

        let mut publish_button = css(&["[data-testid=publish-button]", "button[type=submit]"]);
        publish_button.extend([
            Selector::Button("Publish".to_owned()),
            Selector::Button("Post".to_owned()),
        ]);

        Self {
            home_url: String::new(),
            editor_url: String::new(),
            overlay_dismiss,
            create_menu,
            upload_video_option,
            file_input: css(&[
                "input[type=file][accept*=video]",
                "[role=dialog] input[type=file]",
                "input[type=file]",
            ]),
            form_ready: css(&[
                "[data-testid=post-description]",
                "[contenteditable=true][data-placeholder]",
                "textarea[name=description]",
            ]),
            description_editor: css(&[
                "[data-testid=post-description] [contenteditable=true]",
                "[contenteditable=true][data-placeholder]",
                "textarea[name=description]",
            ]),
            tag_input: css(&[
                "[data-testid=tag-input] input",
                "input[placeholder*=tag i]",
                "input[name=tags]",
            ]),
            cover_input: css(&[
                "[data-testid=cover-upload] input[type=file]",
                "input[type=file][accept*=image]",
            ]),
            publish_button,
            timings: Timings::default(),
        }
    }
}

impl SelectorProfile {
    /// Reads a YAML profile; missing keys keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read selector profile: {}", path.display()))?;
        let profile: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parse selector profile: {}", path.display()))?;
        Ok(profile)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [("home_url", &self.home_url), ("editor_url", &self.editor_url)] {
            url::Url::parse(url).with_context(|| format!("selector profile `{name}` is not a URL"))?;
        }
        for (name, list) in [
            ("upload_video_option", &self.upload_video_option),
            ("file_input", &self.file_input),
            ("form_ready", &self.form_ready),
            ("description_editor", &self.description_editor),
            ("publish_button", &self.publish_button),
        ] {
            if list.is_empty() {
                anyhow::bail!("selector profile `{name}` has no selectors");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let profile: SelectorProfile = serde_yaml::from_str(
            "home_url: https://studio.example.com/\n\
editor_url: https://studio.example.com/posts/new\n\
publish_button:\n  - button: Share\n\
timings:\n  form_ready_timeout_ms: 5000\n",
        )
        .unwrap();
        assert_eq!(profile.publish_button, vec![Selector::Button("Share".to_owned())]);
        assert_eq!(profile.timings.form_ready_timeout_ms, 5_000);
        assert_eq!(profile.timings.poll_interval_ms, 1_000);
        assert!(!profile.file_input.is_empty());
        profile.validate().unwrap();
    }

    #[test]
    fn default_profile_needs_urls() {
        assert!(SelectorProfile::default().validate().is_err());
    }

    #[test]
    fn load_reads_selector_overrides_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("profile.yaml");
        std::fs::write(
            &path,
            "home_url: https://studio.example.com/\n\
editor_url: https://studio.example.com/upload\n\
overlay_dismiss:\n  - css: '[role=dialog] .close'\n  - labeled_div: Close\n\
upload_video_option:\n  - anchor: Upload video\n",
        )
        .unwrap();

        let profile = SelectorProfile::load(&path).unwrap();
        assert_eq!(
            profile.overlay_dismiss,
            vec![
                Selector::Css("[role=dialog] .close".to_owned()),
                Selector::LabeledDiv("Close".to_owned()),
            ]
        );
        assert_eq!(
            profile.upload_video_option,
            vec![Selector::Anchor("Upload video".to_owned())]
        );
        profile.validate().unwrap();
    }
}
