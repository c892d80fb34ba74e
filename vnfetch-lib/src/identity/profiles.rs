use http::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, DNT, PRAGMA};
use http::{HeaderMap, HeaderValue};

use super::IdentityProfile;

const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const CHROME_MACOS: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const FIREFOX_WINDOWS: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";
const SAFARI_MACOS: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15";
const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

const CHROME_BRANDS: &str =
    "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"";
const EDGE_BRANDS: &str =
    "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Microsoft Edge\";v=\"120\"";

/// The browser profiles rotated through when no profiles are configured.
///
/// `Accept-Encoding` is left to the HTTP client so it only advertises
/// encodings it can decode.
#[must_use]
pub fn default_profiles() -> Vec<IdentityProfile> {
    vec![
        profile(
            "chrome-windows",
            CHROME_WINDOWS,
            Some((CHROME_BRANDS, "\"Windows\"")),
        ),
        profile(
            "chrome-macos",
            CHROME_MACOS,
            Some((CHROME_BRANDS, "\"macOS\"")),
        ),
        profile("firefox-windows", FIREFOX_WINDOWS, None),
        profile("safari-macos", SAFARI_MACOS, None),
        profile(
            "edge-windows",
            EDGE_WINDOWS,
            Some((EDGE_BRANDS, "\"Windows\"")),
        ),
    ]
}

/// `client_hints` is `(sec-ch-ua, sec-ch-ua-platform)` for Chromium browsers
fn profile(
    name: &str,
    user_agent: &'static str,
    client_hints: Option<(&'static str, &'static str)>,
) -> IdentityProfile {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,vi-VN;q=0.8,vi;q=0.7"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));

    if let Some((brands, platform)) = client_hints {
        headers.insert("sec-ch-ua", HeaderValue::from_static(brands));
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static(platform));
    }

    IdentityProfile {
        name: name.to_owned(),
        user_agent: HeaderValue::from_static(user_agent),
        headers,
    }
}

#[cfg(test)]
mod tests {
    use http::header::{ACCEPT_ENCODING, USER_AGENT};

    use super::*;

    #[test]
    fn test_default_profiles() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), 5);

        for profile in &profiles {
            assert!(profile.user_agent.to_str().unwrap().starts_with("Mozilla/5.0"));
            assert!(profile.headers.contains_key(ACCEPT));
            assert!(!profile.headers.contains_key(ACCEPT_ENCODING));
            assert!(!profile.headers.contains_key(USER_AGENT));
        }
    }

    #[test]
    fn test_client_hints_only_for_chromium() {
        let profiles = default_profiles();
        let with_hints: Vec<_> = profiles
            .iter()
            .filter(|p| p.headers.contains_key("sec-ch-ua"))
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(with_hints, ["chrome-windows", "chrome-macos", "edge-windows"]);
    }
}
