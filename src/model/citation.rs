//! Citation records and URL identity

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// A source reference attached to a research note.
///
/// Identity is the normalized URL (see [`identity_key`]), never the title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub source: String,
}

impl Citation {
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            source: source.into(),
        }
    }

    /// Decode one citation item as note producers have written it over time.
    ///
    /// Accepts an object (`url|link|href`, `title|name`, `source|publisher|domain`)
    /// or a bare URL string. Returns `None` when no URL can be found.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => {
                let url = s.trim();
                if url.is_empty() {
                    return None;
                }
                Some(Self::new("", url, domain_of(url).unwrap_or_default()))
            }
            Value::Object(map) => {
                let pick = |keys: &[&str]| {
                    keys.iter()
                        .filter_map(|k| map.get(*k))
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .find(|s| !s.is_empty())
                        .map(str::to_string)
                };

                let url = pick(&["url", "link", "href"])?;
                let title = pick(&["title", "name"]).unwrap_or_default();
                let source = pick(&["source", "publisher", "domain"])
                    .or_else(|| domain_of(&url))
                    .unwrap_or_default();
                Some(Self { title, url, source })
            }
            _ => None,
        }
    }

    /// Normalized identity of this citation.
    pub fn identity_key(&self) -> String {
        identity_key(&self.url)
    }

    /// Host of this citation's URL with any leading `www.` removed.
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.url)
    }
}

/// Host of a URL, lowercased, with a leading `www.` stripped.
///
/// Scheme-less URLs (`example.com/page`) are accepted.
pub fn domain_of(raw: &str) -> Option<String> {
    let parsed = parse_lenient(raw)?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Identity key for a URL: host without `www.`, path without trailing slash,
/// and query. Scheme and fragment are ignored.
///
/// Unparseable input falls back to the trimmed, lowercased string with any
/// `www.` prefix removed.
pub fn identity_key(raw: &str) -> String {
    match parse_lenient(raw) {
        Some(parsed) if parsed.host_str().is_some() => {
            let host = domain_of(raw).unwrap_or_default();
            let path = parsed.path().trim_end_matches('/');
            match parsed.query() {
                Some(q) if !q.is_empty() => format!("{}{}?{}", host, path, q),
                _ => format!("{}{}", host, path),
            }
        }
        _ => {
            let lowered = raw.trim().to_ascii_lowercase();
            lowered
                .strip_prefix("www.")
                .unwrap_or(&lowered)
                .trim_end_matches('/')
                .to_string()
        }
    }
}

fn parse_lenient(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Url::parse(trimmed)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", trimmed)).ok())
}
