//! Request classification.
//!
//! First match wins:
//! 1. `Static`: path ends in a stylesheet, script or font suffix, or the
//!    host is one of the CDN hosts.
//! 2. `Dynamic`: an API or analytics path, or any method other than `GET`.
//! 3. `Default`: everything else.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::request::WorkerRequest;

static STATIC_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(css|js|mjs|woff2?)$").expect("static suffix pattern is valid"));

static DYNAMIC_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|/)(api|analytics)([/._-]|$)").expect("dynamic path pattern is valid"));

/// Category that selects a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Static,
    Dynamic,
    Default,
}

pub(crate) fn is_cdn_host(host: &str, cdn_hosts: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    cdn_hosts.iter().any(|cdn| {
        let cdn = cdn.trim().trim_start_matches('.').to_ascii_lowercase();
        !cdn.is_empty() && (host == cdn || host.ends_with(&format!(".{cdn}")))
    })
}

/// Map a request to the strategy category that handles it.
pub fn classify(request: &WorkerRequest, cdn_hosts: &[String]) -> RequestClass {
    let path = request.url.path();
    let host = request.url.host_str().unwrap_or_default();

    if STATIC_SUFFIX.is_match(path) || is_cdn_host(host, cdn_hosts) {
        return RequestClass::Static;
    }

    if request.method != Method::GET || DYNAMIC_PATH.is_match(path) {
        return RequestClass::Dynamic;
    }

    RequestClass::Default
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cdn() -> Vec<String> {
        vec!["fonts.googleapis.com".into(), "cdnjs.cloudflare.com".into(), "unpkg.com".into()]
    }

    fn get(url: &str) -> WorkerRequest {
        WorkerRequest::get(url).unwrap()
    }

    #[test]
    fn test_static_suffixes() {
        for url in [
            "http://localhost:8080/styles.css",
            "http://localhost:8080/script.js?v=3",
            "http://localhost:8080/fonts/rajdhani.woff2",
            "http://localhost:8080/fonts/orbitron.WOFF",
            "https://cdn.jsdelivr.net/npm/chart.js",
        ] {
            assert_eq!(classify(&get(url), &cdn()), RequestClass::Static, "{url}");
        }
    }

    #[test]
    fn test_cdn_hosts_are_static() {
        let req = get("https://fonts.googleapis.com/css2?family=Orbitron");
        assert_eq!(classify(&req, &cdn()), RequestClass::Static);

        let req = get("https://www.unpkg.com/aos@2.3.1/dist/");
        assert_eq!(classify(&req, &cdn()), RequestClass::Static);

        let req = get("https://notunpkg.com/page");
        assert_eq!(classify(&req, &cdn()), RequestClass::Default);
    }

    #[test]
    fn test_dynamic_paths_and_methods() {
        assert_eq!(classify(&get("http://localhost:8080/api/projects"), &cdn()), RequestClass::Dynamic);
        assert_eq!(classify(&get("http://localhost:8080/analytics-data"), &cdn()), RequestClass::Dynamic);

        let post = WorkerRequest::with_method_name("POST", "http://localhost:8080/contact").unwrap();
        assert_eq!(classify(&post, &cdn()), RequestClass::Dynamic);
    }

    #[test]
    fn test_static_wins_over_dynamic() {
        let post = WorkerRequest::with_method_name("POST", "http://localhost:8080/api/bundle.js").unwrap();
        assert_eq!(classify(&post, &cdn()), RequestClass::Static);
    }

    #[test]
    fn test_default() {
        assert_eq!(classify(&get("http://localhost:8080/"), &cdn()), RequestClass::Default);
        assert_eq!(classify(&get("http://localhost:8080/manifest.json"), &cdn()), RequestClass::Default);
        assert_eq!(classify(&get("http://localhost:8080/rapid-prototypes"), &cdn()), RequestClass::Default);
    }
}
