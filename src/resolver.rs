use crate::auth::AuthContext;
use crate::events::{redact_url_for_log, LogFn};
use crate::http::{HttpRequest, Transport};
use crate::models::{LeafResult, ResolvedVideo};
use crate::{EngineError, Result};
use scraper::{Html, Selector};
use url::Url;

pub const DISPLAY_LABEL: &str = "Video";

const VIDEO_DOMAIN_KEY: &str = "videodomain";
const DOWNLOAD_DOMAIN_KEY: &str = "downloaddomain";
const NO_SECOND_DOMAIN: &str = "\"second_domain_for_dl\":false";

/// Turns leaf references into playable urls. Store ids and index/proxy links go
/// through the same view-page scan.
pub struct LinkResolver<'a> {
    pub transport: &'a dyn Transport,
    pub auth: &'a AuthContext,
    pub log: LogFn<'a>,
}

impl<'a> LinkResolver<'a> {
    pub fn new(transport: &'a dyn Transport, auth: &'a AuthContext, log: LogFn<'a>) -> Self {
        Self { transport, auth, log }
    }

    pub fn resolve(&self, leaf: &LeafResult) -> Result<ResolvedVideo> {
        self.resolve_url(&leaf.raw_reference)
    }

    pub fn resolve_url(&self, url: &str) -> Result<ResolvedVideo> {
        let view = view_url(url)?;
        let request = self.auth.apply(HttpRequest::get(view.as_str()));
        let response = self.transport.execute(&request).map_err(|e| EngineError::Resolution {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        for header in &response.set_cookies {
            self.auth.cookies.absorb_set_cookie(header);
        }
        if !response.is_success() {
            return Err(EngineError::Resolution {
                url: url.to_string(),
                reason: format!("view page answered {}", response.status),
            });
        }

        let playback_url = playback_url_from_view_page(url, &response.text())?;
        Ok(ResolvedVideo {
            playback_url,
            display_label: DISPLAY_LABEL.to_string(),
        })
    }

    /// Resolve every leaf, dropping the ones that fail. Order is preserved.
    pub fn resolve_all(&self, leaves: &[LeafResult]) -> Vec<(LeafResult, ResolvedVideo)> {
        let mut out = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            match self.resolve(leaf) {
                Ok(video) => out.push((leaf.clone(), video)),
                Err(err) => {
                    (self.log)(
                        "warn",
                        "resolve_failed",
                        serde_json::json!({
                            "url": redact_url_for_log(&leaf.raw_reference),
                            "ordinal": leaf.ordinal,
                            "error": err.to_string(),
                        }),
                    );
                }
            }
        }
        out
    }
}

/// The page that carries the player script for `url`.
pub fn view_url(url: &str) -> Result<Url> {
    let mut parsed = Url::parse(url)?;
    if parsed.host_str() == Some("drive.google.com") && parsed.path() == "/uc" {
        if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "id") {
            let view = format!("https://drive.google.com/file/d/{id}/view");
            return Ok(Url::parse(&view)?);
        }
    }
    parsed.query_pairs_mut().append_pair("a", "view");
    Ok(parsed)
}

/// Pick the playback url out of a view page. Falls back to `original` when the page
/// names no usable secondary domain.
pub fn playback_url_from_view_page(original: &str, html: &str) -> Result<String> {
    let Some(script) = find_domain_script(html) else {
        return Ok(original.to_string());
    };
    if script.contains(NO_SECOND_DOMAIN) {
        return Ok(original.to_string());
    }

    let key = if script.to_lowercase().contains(VIDEO_DOMAIN_KEY) {
        VIDEO_DOMAIN_KEY
    } else {
        DOWNLOAD_DOMAIN_KEY
    };
    let domain = json_string_value(&script, key).unwrap_or_default();
    if domain.trim().is_empty() {
        return Ok(original.to_string());
    }
    substitute_domain(original, domain.trim())
}

fn find_domain_script(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script").expect("script selector");
    let scripts: Vec<String> = document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect();
    scripts
        .iter()
        .find(|s| s.contains(VIDEO_DOMAIN_KEY))
        .or_else(|| scripts.iter().find(|s| s.contains(DOWNLOAD_DOMAIN_KEY)))
        .cloned()
}

/// Text between `"<key>":"` and the next quote, with `\/` unescaped.
fn json_string_value(script: &str, key: &str) -> Option<String> {
    let marker = format!("\"{key}\":\"");
    let start = script.find(&marker)? + marker.len();
    let rest = &script[start..];
    let end = rest.find('"')?;
    Some(rest[..end].replace("\\/", "/"))
}

/// `domain` (with or without scheme) as the authority, `original`'s path and query
/// kept so store references like `/uc?id=X` stay addressable. The fragment is dropped.
fn substitute_domain(original: &str, domain: &str) -> Result<String> {
    let parsed = Url::parse(original)?;
    let domain = domain.trim_end_matches('/');
    let base = if domain.contains("://") {
        domain.to_string()
    } else {
        format!("{}://{domain}", parsed.scheme())
    };
    let mut candidate = format!("{base}{}", parsed.path());
    if let Some(query) = parsed.query() {
        candidate.push('?');
        candidate.push_str(query);
    }
    Url::parse(&candidate).map_err(|e| EngineError::Resolution {
        url: original.to_string(),
        reason: format!("bad secondary domain {domain:?}: {e}"),
    })?;
    Ok(candidate)
}
