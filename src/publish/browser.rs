use async_trait::async_trait;

use crate::publish::session::Cookie;

/// WebDriver key code for Enter.
pub const ENTER: &str = "\u{E007}";
/// Ctrl+A followed by Backspace, for editors that ignore `clear`.
pub const SELECT_ALL_DELETE: &str = "\u{E009}a\u{E009}\u{E003}";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css selector",
            Self::XPath(_) => "xpath",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Css(value) | Self::XPath(value) => value,
        }
    }
}

/// Opaque handle of an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

/// The browser operations the publisher needs.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> anyhow::Result<()>;
    async fn add_cookie(&self, cookie: &Cookie) -> anyhow::Result<()>;
    async fn find_all(&self, locator: &Locator) -> anyhow::Result<Vec<ElementId>>;
    async fn is_displayed(&self, element: &ElementId) -> anyhow::Result<bool>;
    async fn attribute(&self, element: &ElementId, name: &str) -> anyhow::Result<Option<String>>;
    async fn click(&self, element: &ElementId) -> anyhow::Result<()>;
    async fn clear(&self, element: &ElementId) -> anyhow::Result<()>;
    async fn send_keys(&self, element: &ElementId, text: &str) -> anyhow::Result<()>;
    async fn screenshot_png(&self) -> anyhow::Result<Vec<u8>>;
    async fn close(&self) -> anyhow::Result<()>;
}
