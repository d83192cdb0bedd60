use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::config::Settings;
use crate::error::PipelineError;
use crate::formats::{PublishJob, PublishState};
use crate::publish::browser::{Browser, ElementId, ENTER, SELECT_ALL_DELETE};
use crate::publish::poll::poll_until;
use crate::publish::probe::{find_actionable, find_present, Selector};
use crate::publish::profile::SelectorProfile;
use crate::publish::session::load_cookies;
use crate::publish::webdriver::{LaunchOptions, WebDriverBrowser};

/// Overlays are dismissed one at a time; stop after this many in case a
/// close control keeps matching.
const MAX_OVERLAY_DISMISSALS: usize = 4;

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub cookie_path: PathBuf,
    /// Failure screenshots land here.
    pub diagnostics_dir: PathBuf,
    pub profile: SelectorProfile,
}

/// Drives one editor session through the upload flow.
pub struct Publisher<'a> {
    browser: &'a dyn Browser,
    options: &'a PublishOptions,
}

impl<'a> Publisher<'a> {
    pub fn new(browser: &'a dyn Browser, options: &'a PublishOptions) -> Self {
        Self { browser, options }
    }

    /// Runs the job to a terminal state. Errors never escape: the job ends in
    /// `Failed`, a screenshot is saved and `false` is returned.
    pub async fn publish(&self, job: &mut PublishJob) -> bool {
        job.state = PublishState::Init;
        tracing::info!(title = %job.title, video = %job.video_path.display(), "publish started");

        while !job.state.is_terminal() {
            let current = job.state;
            match self.step(job).await {
                Ok(next) => {
                    tracing::info!(title = %job.title, from = ?current, to = ?next, "publish state");
                    job.state = next;
                }
                Err(err) => {
                    let err = PipelineError::publish(format!("{current:?}: {err:#}"));
                    tracing::error!(title = %job.title, state = ?current, error = %err, "publish failed");
                    self.capture_diagnostics(current).await;
                    job.state = PublishState::Failed;
                }
            }
        }

        let published = job.state == PublishState::Published;
        if published {
            tracing::info!(title = %job.title, "published");
        }
        published
    }

    async fn step(&self, job: &PublishJob) -> anyhow::Result<PublishState> {
        let profile = &self.options.profile;
        let timings = profile.timings;
        let browser = self.browser;

        let next = match job.state {
            PublishState::Init => {
                profile.validate()?;
                let cookies = load_cookies(&self.options.cookie_path)?;
                browser.goto(&profile.home_url).await?;
                let mut installed = 0usize;
                for cookie in &cookies {
                    match browser.add_cookie(cookie).await {
                        Ok(()) => installed += 1,
                        Err(err) => {
                            tracing::warn!(cookie = %cookie.name, error = %format!("{err:#}"), "cookie rejected");
                        }
                    }
                }
                if installed == 0 {
                    anyhow::bail!("no cookie from {} was accepted", self.options.cookie_path.display());
                }
                tracing::debug!(installed, total = cookies.len(), "session restored");
                PublishState::Navigate
            }
            PublishState::Navigate => {
                browser.goto(&profile.editor_url).await?;
                PublishState::DismissOverlays
            }
            PublishState::DismissOverlays => {
                self.dismiss_overlays().await;
                PublishState::OpenUploadDialog
            }
            PublishState::OpenUploadDialog => {
                if find_present(browser, &profile.file_input).await.is_some() {
                    tracing::debug!("file input already on page");
                } else {
                    if !profile.create_menu.is_empty() {
                        let menu = self
                            .wait_actionable(&profile.create_menu, "create menu")
                            .await?;
                        browser.click(&menu).await.context("open create menu")?;
                        tokio::time::sleep(timings.settle()).await;
                    }
                    let option = self
                        .wait_actionable(&profile.upload_video_option, "upload video option")
                        .await?;
                    browser.click(&option).await.context("choose upload video")?;
                    tokio::time::sleep(timings.settle()).await;
                }
                PublishState::UploadFile
            }
            PublishState::UploadFile => {
                let video = std::fs::canonicalize(&job.video_path)
                    .with_context(|| format!("resolve video path: {}", job.video_path.display()))?;
                let input = poll_until(timings.poll_interval(), timings.control_timeout(), || {
                    find_present(browser, &profile.file_input)
                })
                .await
                .context("wait for file input")?;
                browser
                    .send_keys(&input.element, &video.to_string_lossy())
                    .await
                    .context("attach video")?;
                PublishState::WaitFormReady
            }
            PublishState::WaitFormReady => {
                poll_until(timings.poll_interval(), timings.form_ready_timeout(), || {
                    find_actionable(browser, &profile.form_ready)
                })
                .await
                .context("upload form never became ready")?;
                PublishState::FillMetadata
            }
            PublishState::FillMetadata => {
                self.fill_metadata(job).await?;
                PublishState::UploadCover
            }
            PublishState::UploadCover => {
                if let Err(err) = self.upload_cover(job.cover_path.as_deref()).await {
                    tracing::warn!(error = %format!("{err:#}"), "cover upload skipped");
                }
                PublishState::WaitPublishEnabled
            }
            PublishState::WaitPublishEnabled => {
                poll_until(
                    timings.poll_interval(),
                    timings.publish_enabled_timeout(),
                    || enabled_control(browser, &profile.publish_button),
                )
                .await
                .context("publish control stayed disabled")?;
                PublishState::ClickPublish
            }
            PublishState::ClickPublish => {
                let control = enabled_control(browser, &profile.publish_button)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("publish control disappeared"))?;
                browser.click(&control).await.context("click publish")?;
                PublishState::Confirm
            }
            PublishState::Confirm => {
                tokio::time::sleep(timings.confirm_wait()).await;
                PublishState::Published
            }
            PublishState::Published | PublishState::Failed => job.state,
        };
        Ok(next)
    }

    async fn dismiss_overlays(&self) {
        let profile = &self.options.profile;
        for _ in 0..MAX_OVERLAY_DISMISSALS {
            let Some(found) = find_actionable(self.browser, &profile.overlay_dismiss).await else {
                return;
            };
            if let Err(err) = self.browser.click(&found.element).await {
                tracing::debug!(selector = found.index, error = %format!("{err:#}"), "overlay dismiss failed");
                return;
            }
            tracing::debug!(selector = found.index, "overlay dismissed");
            tokio::time::sleep(profile.timings.settle()).await;
        }
    }

    async fn wait_actionable(&self, selectors: &[Selector], what: &str) -> anyhow::Result<ElementId> {
        let timings = self.options.profile.timings;
        let found = poll_until(timings.poll_interval(), timings.control_timeout(), || {
            find_actionable(self.browser, selectors)
        })
        .await
        .with_context(|| format!("find {what}"))?;
        Ok(found.element)
    }

    async fn fill_metadata(&self, job: &PublishJob) -> anyhow::Result<()> {
        let profile = &self.options.profile;
        let editor = self
            .wait_actionable(&profile.description_editor, "description editor")
            .await?;
        self.browser.click(&editor).await.context("focus description")?;
        // Rich-text editors often reject `clear`; the key chord covers them.
        if let Err(err) = self.browser.clear(&editor).await {
            tracing::debug!(error = %format!("{err:#}"), "clear rejected");
        }
        self.browser
            .send_keys(&editor, SELECT_ALL_DELETE)
            .await
            .context("clear description")?;
        self.browser
            .send_keys(&editor, &job.composite_text())
            .await
            .context("type description")?;

        let tags: Vec<&str> = job
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .collect();
        if tags.is_empty() {
            return Ok(());
        }
        let Some(input) = find_actionable(self.browser, &profile.tag_input).await else {
            tracing::warn!(count = tags.len(), "tag input not found; tags skipped");
            return Ok(());
        };
        for tag in tags {
            self.browser
                .send_keys(&input.element, tag)
                .await
                .with_context(|| format!("type tag `{tag}`"))?;
            self.browser
                .send_keys(&input.element, ENTER)
                .await
                .with_context(|| format!("commit tag `{tag}`"))?;
        }
        Ok(())
    }

    async fn upload_cover(&self, cover: Option<&Path>) -> anyhow::Result<()> {
        let Some(cover) = cover else {
            return Ok(());
        };
        let cover = std::fs::canonicalize(cover)
            .with_context(|| format!("resolve cover path: {}", cover.display()))?;
        let Some(input) = find_present(self.browser, &self.options.profile.cover_input).await else {
            tracing::info!("no cover input on page");
            return Ok(());
        };
        self.browser
            .send_keys(&input.element, &cover.to_string_lossy())
            .await
            .context("attach cover")?;
        Ok(())
    }

    async fn capture_diagnostics(&self, state: PublishState) {
        let dir = &self.options.diagnostics_dir;
        let path = dir.join(format!(
            "publish-{}-{:?}.png",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            state
        ));
        let result = async {
            let png = self.browser.screenshot_png().await?;
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create diagnostics dir: {}", dir.display()))?;
            tokio::fs::write(&path, png)
                .await
                .with_context(|| format!("write screenshot: {}", path.display()))?;
            anyhow::Ok(())
        }
        .await;
        match result {
            Ok(()) => tracing::info!(path = %path.display(), "diagnostic screenshot saved"),
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "diagnostic screenshot failed"),
        }
    }
}

/// The first visible publish control that is neither `disabled` nor
/// `aria-disabled`.
async fn enabled_control(browser: &dyn Browser, selectors: &[Selector]) -> Option<ElementId> {
    let found = find_actionable(browser, selectors).await?;
    let disabled = browser.attribute(&found.element, "disabled").await.ok()?;
    let aria_disabled = browser.attribute(&found.element, "aria-disabled").await.ok()?;
    let enabled = disabled.is_none_or(|v| v == "false")
        && aria_disabled.as_deref() != Some("true");
    enabled.then_some(found.element)
}

/// Anything that can take a finished video through to publication.
#[async_trait]
pub trait VideoPublisher: Send + Sync {
    async fn publish(&self, job: &mut PublishJob) -> bool;
}

/// Opens a fresh WebDriver session per job and closes it afterwards.
#[derive(Debug, Clone)]
pub struct WebDriverPublisher {
    pub webdriver_url: String,
    pub http_timeout: Duration,
    pub launch: LaunchOptions,
    pub options: PublishOptions,
}

impl WebDriverPublisher {
    pub fn new(settings: &Settings, launch: LaunchOptions, options: PublishOptions) -> Self {
        Self {
            webdriver_url: settings.webdriver_url.clone(),
            http_timeout: settings.http_timeout,
            launch,
            options,
        }
    }
}

#[async_trait]
impl VideoPublisher for WebDriverPublisher {
    async fn publish(&self, job: &mut PublishJob) -> bool {
        let browser =
            match WebDriverBrowser::connect(&self.webdriver_url, &self.launch, self.http_timeout).await
            {
                Ok(browser) => browser,
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "browser session failed");
                    job.state = PublishState::Failed;
                    return false;
                }
            };
        let published = Publisher::new(&browser, &self.options).publish(job).await;
        if let Err(err) = browser.close().await {
            tracing::warn!(error = %format!("{err:#}"), "browser session close failed");
        }
        published
    }
}
