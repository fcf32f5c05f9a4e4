use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Response};
use url::Url;

use crate::error::FetchError;
use crate::validator::{UrlValidationPolicy, is_valid_url};

// Create a static client to reuse connections. Redirects are followed by hand
// so every hop goes through the URL policy.
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .redirect(Policy::none())
        .user_agent(concat!("page-insight/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to build HTTP client")
});

/// Limits applied to a single page download.
#[derive(Clone, Debug)]
pub struct FetchConstraints {
    pub timeout: Duration,
    pub max_bytes: u64,
    pub required_content_type_prefix: String,
    pub max_redirects: usize,
    /// Applied to every redirect target.
    pub url_policy: UrlValidationPolicy,
}

impl Default for FetchConstraints {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            max_bytes: 15 * 1024 * 1024,
            required_content_type_prefix: "text/html".to_string(),
            max_redirects: 10,
            url_policy: UrlValidationPolicy::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RawPage {
    /// Final URL after redirects.
    pub url: String,
    pub content_type: String,
    pub body: String,
}

/// Downloads `url`, enforcing the time and size ceilings in `constraints`.
///
/// The whole exchange (every hop, headers, body) shares one deadline. When it
/// expires the request future is dropped, which aborts the connection.
pub async fn fetch_page(url: &str, constraints: &FetchConstraints) -> Result<RawPage, FetchError> {
    match tokio::time::timeout(constraints.timeout, fetch_bounded(url, constraints)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(constraints.timeout.as_millis() as u64)),
    }
}

async fn fetch_bounded(url: &str, constraints: &FetchConstraints) -> Result<RawPage, FetchError> {
    let mut response = follow_redirects(url, constraints).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::BadStatus(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string();
    let prefix = constraints.required_content_type_prefix.to_ascii_lowercase();
    if !content_type.to_ascii_lowercase().starts_with(&prefix) {
        return Err(FetchError::UnsupportedContentType(if content_type.is_empty() {
            "<missing>".to_string()
        } else {
            content_type
        }));
    }

    let max = constraints.max_bytes;
    if let Some(len) = response.content_length() {
        if len > max {
            return Err(FetchError::TooLarge { size: len, max });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let size = (body.len() + chunk.len()) as u64;
        if size > max {
            return Err(FetchError::TooLarge { size, max });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(RawPage {
        url: response.url().to_string(),
        body: decode_body(&body, &content_type),
        content_type,
    })
}

/// Sends the GET and walks redirects, checking each target against the URL policy.
async fn follow_redirects(url: &str, constraints: &FetchConstraints) -> Result<Response, FetchError> {
    let mut response = CLIENT.get(url).send().await?;
    let mut hops = 0;

    while matches!(response.status().as_u16(), 301 | 302 | 303 | 307 | 308) {
        hops += 1;
        if hops > constraints.max_redirects {
            return Err(FetchError::Redirect(format!(
                "more than {} redirects",
                constraints.max_redirects
            )));
        }

        let next = next_location(&response)?;
        if !is_valid_url(next.as_str(), &constraints.url_policy) {
            return Err(FetchError::Redirect(format!("target not allowed: {}", next)));
        }

        tracing::debug!(from = %response.url(), to = %next, "following redirect");
        response = CLIENT.get(next).send().await?;
    }

    Ok(response)
}

fn next_location(response: &Response) -> Result<Url, FetchError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FetchError::Redirect("redirect without a Location header".to_string()))?;

    response
        .url()
        .join(location.trim())
        .map_err(|_| FetchError::Redirect(format!("unresolvable Location: {}", location)))
}

/// Decodes with the charset named in the content type, falling back to UTF-8.
fn decode_body(bytes: &[u8], content_type: &str) -> String {
    let encoding = content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, label)| Encoding::for_label(label.trim().trim_matches('"').as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}
