use std::collections::HashSet;

use url::Url;

/// Rules applied to user-supplied page URLs before anything touches the network.
#[derive(Clone, Debug)]
pub struct UrlValidationPolicy {
    pub allowed_protocols: HashSet<String>,
    pub require_top_level_domain: bool,
    pub allow_localhost: bool,
    pub max_length: usize,
}

impl Default for UrlValidationPolicy {
    fn default() -> Self {
        Self {
            allowed_protocols: ["http", "https"].iter().map(|s| s.to_string()).collect(),
            require_top_level_domain: true,
            allow_localhost: false,
            // Longest URL Internet Explorer accepted
            max_length: 2083,
        }
    }
}

/// Returns whether `candidate` is an acceptable page URL under `policy`.
///
/// Never fails: anything unparseable or disallowed is simply `false`.
pub fn is_valid_url(candidate: &str, policy: &UrlValidationPolicy) -> bool {
    if candidate.len() > policy.max_length {
        return false;
    }

    let Ok(url) = Url::parse(candidate) else {
        return false;
    };

    if !policy.allowed_protocols.contains(url.scheme()) {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };

    let is_localhost = host == "localhost";

    if policy.require_top_level_domain
        && host.split('.').count() < 2
        && !(policy.allow_localhost && is_localhost)
    {
        return false;
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return false;
    }

    if !policy.allow_localhost && (is_localhost || host == "127.0.0.1") {
        return false;
    }

    true
}
