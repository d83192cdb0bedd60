use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// One persisted cookie, in the shape browser exports and WebDriver share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// Unix seconds. Session cookies (`-1` in some exports) are left unset.
    #[serde(
        default,
        alias = "expires",
        alias = "expirationDate",
        deserialize_with = "de_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieFile {
    List(Vec<Cookie>),
    StorageState { cookies: Vec<Cookie> },
}

fn de_expiry<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<f64> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|v| v.is_finite() && *v > 0.0).map(|v| v as u64))
}

/// Loads the credential set written by a previous manual login.
pub fn load_cookies(path: &Path) -> anyhow::Result<Vec<Cookie>> {
    if !path.is_file() {
        anyhow::bail!("cookie file not found: {}", path.display());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read cookie file: {}", path.display()))?;
    let file: CookieFile = serde_json::from_str(&raw)
        .with_context(|| format!("parse cookie file: {}", path.display()))?;
    let cookies = match file {
        CookieFile::List(cookies) | CookieFile::StorageState { cookies } => cookies,
    };
    if cookies.is_empty() {
        anyhow::bail!("cookie file has no cookies: {}", path.display());
    }
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_plain_list_and_storage_state() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;

        let list = temp.path().join("list.json");
        std::fs::write(
            &list,
            r#"[{"name":"sid","value":"abc","domain":".example.com","httpOnly":true,"expirationDate":1893456000.5}]"#,
        )?;
        let cookies = load_cookies(&list)?;
        assert_eq!(cookies[0].http_only, Some(true));
        assert_eq!(cookies[0].expiry, Some(1_893_456_000));

        let state = temp.path().join("state.json");
        std::fs::write(
            &state,
            r#"{"cookies":[{"name":"sid","value":"abc","expires":-1}],"origins":[]}"#,
        )?;
        let cookies = load_cookies(&state)?;
        assert_eq!(cookies[0].expiry, None);
        Ok(())
    }

    #[test]
    fn missing_or_empty_file_is_fatal() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        assert!(load_cookies(&temp.path().join("absent.json")).is_err());
        let empty = temp.path().join("empty.json");
        std::fs::write(&empty, "[]")?;
        assert!(load_cookies(&empty).is_err());
        Ok(())
    }
}
