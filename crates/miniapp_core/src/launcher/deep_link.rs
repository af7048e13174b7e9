//! Shareable mini-app links.
//!
//! Two shapes are understood:
//! - `<scheme>://app/<appId>[/<path>][?k=v&...]`
//! - `https://<host>/app/{store|external}/<appId>[/<path>][?k=v&...]`
//!
//! Parsing never fails loudly: anything unrecognized yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use url::Url;

static WEB_APP_PATH: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^/app/(?:store|external)/([^/]+)(/.*)?$").ok());

const CUSTOM_HOST: &str = "app";

/// Parsed deep link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLink {
    pub app_id: String,
    /// Always starts with `/`; `/` when the link names no sub-path.
    pub path: String,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkResolver {
    scheme: String,
    web_hosts: Vec<String>,
}

impl DeepLinkResolver {
    /// `web_hosts` empty accepts web links from any host.
    pub fn new(scheme: &str, web_hosts: &[String]) -> Self {
        Self {
            scheme: scheme.trim().to_ascii_lowercase(),
            web_hosts: web_hosts
                .iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn parse(&self, raw: &str) -> Option<DeepLink> {
        let url = Url::parse(raw.trim()).ok()?;
        let scheme = url.scheme();
        if scheme == self.scheme {
            return self.parse_custom(&url);
        }
        if scheme == "https" || scheme == "http" {
            return self.parse_web(&url);
        }
        None
    }

    /// Builds a custom-scheme link that [`parse`](Self::parse) accepts.
    pub fn create(
        &self,
        app_id: &str,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> Option<String> {
        if !is_link_app_id(app_id) {
            return None;
        }
        let path = path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{}://{CUSTOM_HOST}/{app_id}", self.scheme)).ok()?;
        if !path.is_empty() {
            url.set_path(&format!("/{app_id}/{path}"));
        }
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Some(url.to_string())
    }

    fn parse_custom(&self, url: &Url) -> Option<DeepLink> {
        if url.host_str() != Some(CUSTOM_HOST) {
            return None;
        }
        let mut segments = url.path_segments()?;
        let app_id = segments.next()?;
        let rest: Vec<&str> = segments.filter(|segment| !segment.is_empty()).collect();
        build_link(app_id, &rest.join("/"), url)
    }

    fn parse_web(&self, url: &Url) -> Option<DeepLink> {
        let host = url.host_str()?.to_ascii_lowercase();
        if !self.web_hosts.is_empty() && !self.web_hosts.contains(&host) {
            return None;
        }
        let pattern = WEB_APP_PATH.as_ref()?;
        let captures = pattern.captures(url.path())?;
        let app_id = captures.get(1)?.as_str();
        let rest = captures
            .get(2)
            .map(|tail| tail.as_str().trim_matches('/'))
            .unwrap_or("");
        build_link(app_id, rest, url)
    }
}

fn build_link(app_id: &str, rest: &str, url: &Url) -> Option<DeepLink> {
    if !is_link_app_id(app_id) {
        return None;
    }
    let params = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    Some(DeepLink {
        app_id: app_id.to_string(),
        path: format!("/{rest}"),
        params,
    })
}

fn is_link_app_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}
