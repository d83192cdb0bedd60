use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;

use crate::publish::browser::{Browser, ElementId, Locator};
use crate::publish::session::Cookie;

/// Key under which W3C WebDriver returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Extra browser command-line switches.
    pub args: Vec<String>,
}

/// A browser session driven through a WebDriver server (chromedriver,
/// geckodriver, ...).
#[derive(Debug)]
pub struct WebDriverBrowser {
    client: reqwest::Client,
    session_url: String,
}

impl WebDriverBrowser {
    pub async fn connect(
        webdriver_url: &str,
        options: &LaunchOptions,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let base = url::Url::parse(webdriver_url)
            .with_context(|| format!("invalid webdriver url: {webdriver_url}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;

        let mut args = options.args.clone();
        if options.headless {
            args.push("--headless=new".to_owned());
        }
        args.push("--window-size=1280,1600".to_owned());
        let firefox_args: Vec<&str> = if options.headless { vec!["-headless"] } else { Vec::new() };
        let body = serde_json::json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": { "args": args },
                    "moz:firefoxOptions": { "args": firefox_args },
                }
            }
        });

        let root = base.as_str().trim_end_matches('/').to_owned();
        let value = send(client.post(format!("{root}/session")).json(&body), "new session").await?;
        let session_id = value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("webdriver response has no sessionId"))?;
        tracing::info!(session = %session_id, webdriver = %root, "browser session started");

        Ok(Self {
            client,
            session_url: format!("{root}/session/{session_id}"),
        })
    }

    async fn get(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let endpoint = format!("{}{path}", self.session_url);
        send(self.client.get(&endpoint), &format!("GET {path}")).await
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let endpoint = format!("{}{path}", self.session_url);
        send(self.client.post(&endpoint).json(&body), &format!("POST {path}")).await
    }
}

/// Sends a command and unwraps the `value` member of the reply.
async fn send(request: reqwest::RequestBuilder, what: &str) -> anyhow::Result<serde_json::Value> {
    let response = request.send().await.with_context(|| format!("webdriver {what}"))?;
    let status = response.status();
    let raw = response.text().await.context("read webdriver response body")?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        anyhow::bail!("webdriver {what} failed ({status}): {message}");
    }
    let mut value: serde_json::Value =
        serde_json::from_str(&raw).context("parse webdriver response")?;
    // Legacy servers put sessionId beside `value` instead of inside it.
    if let Some(session_id) = value.get("sessionId").cloned()
        && let Some(inner) = value.get_mut("value").and_then(|v| v.as_object_mut())
    {
        inner.entry("sessionId").or_insert(session_id);
    }
    Ok(value
        .get_mut("value")
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null))
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let value = value.get("value")?;
    let error = value.get("error")?.as_str()?;
    let message = value.get("message").and_then(|v| v.as_str()).unwrap_or("");
    let first_line = message.lines().next().unwrap_or("");
    Some(format!("{error}: {first_line}"))
}

fn element_ids(value: &serde_json::Value) -> anyhow::Result<Vec<ElementId>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("expected an array of elements"))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(|v| v.as_str())
                .map(|id| ElementId(id.to_owned()))
                .ok_or_else(|| anyhow::anyhow!("element reference without `{ELEMENT_KEY}`"))
        })
        .collect()
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> anyhow::Result<()> {
        self.post("/url", serde_json::json!({ "url": url })).await?;
        Ok(())
    }

    async fn add_cookie(&self, cookie: &Cookie) -> anyhow::Result<()> {
        self.post("/cookie", serde_json::json!({ "cookie": cookie }))
            .await
            .with_context(|| format!("add cookie `{}`", cookie.name))?;
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> anyhow::Result<Vec<ElementId>> {
        let value = self
            .post(
                "/elements",
                serde_json::json!({ "using": locator.strategy(), "value": locator.value() }),
            )
            .await?;
        element_ids(&value)
    }

    async fn is_displayed(&self, element: &ElementId) -> anyhow::Result<bool> {
        let value = self.get(&format!("/element/{}/displayed", element.0)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn attribute(&self, element: &ElementId, name: &str) -> anyhow::Result<Option<String>> {
        let value = self
            .get(&format!("/element/{}/attribute/{name}", element.0))
            .await?;
        Ok(match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(text),
            other => Some(other.to_string()),
        })
    }

    async fn click(&self, element: &ElementId) -> anyhow::Result<()> {
        self.post(&format!("/element/{}/click", element.0), serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementId) -> anyhow::Result<()> {
        self.post(&format!("/element/{}/clear", element.0), serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementId, text: &str) -> anyhow::Result<()> {
        self.post(
            &format!("/element/{}/value", element.0),
            serde_json::json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn screenshot_png(&self) -> anyhow::Result<Vec<u8>> {
        let value = self.get("/screenshot").await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("screenshot response is not a string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .context("decode screenshot")
    }

    async fn close(&self) -> anyhow::Result<()> {
        send(self.client.delete(&self.session_url), "DELETE session").await?;
        Ok(())
    }
}
