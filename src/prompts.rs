//! Fixed system instructions and user-message builders for each endpoint.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::config::Config;
use crate::llm::CompletionRequest;

// Create static selectors to avoid recompiling them each time
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("Failed to parse body selector"));

pub const CODER_INSTRUCTION: &str = "You are an expert in computer programming.
Please make friendly answer for the noobs.
Add source code examples if you can.
Your replies can be only structured in valid JSON strings.";

pub const PAGE_INSTRUCTION: &str = "You are an expert in computer programming and web scraping.
You can reply only in valid strict json format without any other text (also cannot be a markdown enclosed in ```json), using an object with the keys:
  - url,
  - category (choose between music, science, business, lifestyle, work, cinema, spare time, cooking, sport, other),
  - title,
  - header,
  - subheader,
  - excerpt which is a summary of the content obtained analyzing the page at the URL I'm pasting.
Please treat each one as the starting point of the analysis to get unbiased data.
If I'm pasting a google search page try to get detailed infos from the element with data-attrid=\"description\".";

/// A model plus the instruction it is always prompted with.
#[derive(Clone, Debug)]
pub struct EndpointProfile {
    pub model: String,
    pub system_instruction: &'static str,
}

impl EndpointProfile {
    pub fn coder(config: &Config) -> Self {
        Self {
            model: config.coder_model.clone(),
            system_instruction: CODER_INSTRUCTION,
        }
    }

    pub fn page(config: &Config) -> Self {
        Self {
            model: config.page_model.clone(),
            system_instruction: PAGE_INSTRUCTION,
        }
    }

    pub fn request(&self, user_content: String) -> CompletionRequest {
        CompletionRequest::new(&self.model, self.system_instruction, user_content)
    }
}

/// Wraps a raw question the way the coder endpoint always has.
pub fn coder_question(question: &str) -> String {
    format!(
        "I need a clear explanation regarding my {}.\nAnd, please, be structured with bullet points and respect a valid JSON string output.",
        question.trim()
    )
}

pub fn extract_body(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document
        .select(&BODY_SELECTOR)
        .next()
        .map(|element| element.inner_html())
}

pub fn format_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());

    for line in html.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(trimmed);
        }
    }

    result
}

/// Builds the user message for page analysis: the requested URL, then the page.
pub fn build_page_message(url: &str, page: &str, body_only: bool) -> String {
    let content = if body_only {
        extract_body(page)
            .map(|body| format_html(&body))
            .filter(|body| !body.is_empty())
            .unwrap_or_else(|| page.to_string())
    } else {
        page.to_string()
    };

    let mut result = String::with_capacity(content.len() + url.len() + 16);
    result.push_str("URL: ");
    result.push_str(url);
    result.push_str("\n\n");
    result.push_str(&content);
    result
}
