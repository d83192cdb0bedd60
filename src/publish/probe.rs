use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::publish::browser::{Browser, ElementId, Locator};

/// One way of finding a UI control. Platform markup drifts, so every control
/// is described by an ordered list of these.
///
/// In profiles each selector is a single-key map such as `css: button.close`
/// or `button: Publish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub enum Selector {
    Css(String),
    /// `<button>` (or `role=button`) whose text contains the value.
    Button(String),
    /// `<a>` whose text contains the value.
    Anchor(String),
    /// `<div>` acting as a control, matched by `aria-label` or text.
    LabeledDiv(String),
}

impl Selector {
    pub fn locator(&self) -> Locator {
        match self {
            Self::Css(css) => Locator::Css(css.clone()),
            Self::Button(text) => {
                let text = xpath_literal(text);
                Locator::XPath(format!(
                    "//button[contains(normalize-space(.), {text})] | //*[@role='button' and contains(normalize-space(.), {text})]"
                ))
            }
            Self::Anchor(text) => Locator::XPath(format!(
                "//a[contains(normalize-space(.), {})]",
                xpath_literal(text)
            )),
            Self::LabeledDiv(label) => {
                let label = xpath_literal(label);
                Locator::XPath(format!(
                    "//div[@aria-label={label} or ((@role='button' or @role='menuitem' or @tabindex) and contains(normalize-space(.), {label}))]"
                ))
            }
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for Selector {
    type Error = String;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut entries = map.into_iter();
        let (Some((kind, value)), None) = (entries.next(), entries.next()) else {
            return Err(
                "a selector needs exactly one of `css`, `button`, `anchor`, `labeled_div`".to_owned(),
            );
        };
        match kind.as_str() {
            "css" => Ok(Self::Css(value)),
            "button" => Ok(Self::Button(value)),
            "anchor" => Ok(Self::Anchor(value)),
            "labeled_div" => Ok(Self::LabeledDiv(value)),
            other => Err(format!("unknown selector kind `{other}`")),
        }
    }
}

impl From<Selector> for BTreeMap<String, String> {
    fn from(selector: Selector) -> Self {
        let (kind, value) = match selector {
            Selector::Css(value) => ("css", value),
            Selector::Button(value) => ("button", value),
            Selector::Anchor(value) => ("anchor", value),
            Selector::LabeledDiv(value) => ("labeled_div", value),
        };
        BTreeMap::from([(kind.to_owned(), value)])
    }
}

/// Quotes `text` as an XPath 1.0 string literal.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts: Vec<String> = text.split('\'').map(|part| format!("'{part}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeMatch {
    /// Position of the winning selector in the candidate list.
    pub index: usize,
    pub element: ElementId,
}

/// First element, across `selectors` in order, that exists and is visible.
/// Lookup errors count as "no match" for that candidate.
pub async fn find_actionable(browser: &dyn Browser, selectors: &[Selector]) -> Option<ProbeMatch> {
    find_first(browser, selectors, true).await
}

/// Like [`find_actionable`] but accepts hidden elements, as file inputs
/// usually are.
pub async fn find_present(browser: &dyn Browser, selectors: &[Selector]) -> Option<ProbeMatch> {
    find_first(browser, selectors, false).await
}

async fn find_first(
    browser: &dyn Browser,
    selectors: &[Selector],
    require_visible: bool,
) -> Option<ProbeMatch> {
    for (index, selector) in selectors.iter().enumerate() {
        let locator = selector.locator();
        let elements = match browser.find_all(&locator).await {
            Ok(elements) => elements,
            Err(err) => {
                tracing::debug!(?selector, error = %format!("{err:#}"), "probe failed");
                continue;
            }
        };
        for element in elements {
            if !require_visible {
                return Some(ProbeMatch { index, element });
            }
            match browser.is_displayed(&element).await {
                Ok(true) => return Some(ProbeMatch { index, element }),
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!(?selector, error = %format!("{err:#}"), "visibility check failed");
                }
            }
        }
    }
    None
}
