use serde::{Deserialize, Serialize};

use crate::extract::PageRecord;

#[derive(Deserialize)]
pub struct UrlRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Deserialize)]
pub struct CoderRequest {
    #[serde(default)]
    pub question: String,
    /// Stream the answer as plain-text chunks instead of one JSON reply.
    #[serde(default)]
    pub stream: bool,
}

#[derive(Serialize)]
pub struct PageResponse {
    pub data: PageRecord,
}

#[derive(Serialize)]
pub struct CoderResponse {
    pub res: String,
}
