use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};

use super::SyncError;

/// Result of reading the daily note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteNote {
    Found(String),
    NotFound,
}

/// Minimal client for the Obsidian Local REST API vault endpoints.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: &str, accept_invalid_certs: bool) -> Result<Self, SyncError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| SyncError::Client(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Point the client at another base URL, keeping credentials.
    pub fn with_base_url(&self, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
            http: self.http.clone(),
        }
    }

    /// `<base>/vault/<folder>/<YYYY-MM-DD>.md`, each path segment encoded.
    pub fn note_url(&self, folder: &str, day: NaiveDate) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        let file_name = format!("{}.md", day.format("%Y-%m-%d"));
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("vault")
            .extend(folder.split('/').filter(|s| !s.is_empty()))
            .push(&file_name);
        Ok(url)
    }

    /// Probe the API root. `Ok(true)` on any 2xx.
    pub async fn probe(&self) -> Result<bool, SyncError> {
        let resp = self
            .http
            .get(format!("{}/", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    /// GET the note for `day`. A 404 means the note does not exist yet.
    pub async fn read_note(&self, folder: &str, day: NaiveDate) -> Result<RemoteNote, SyncError> {
        let url = self.note_url(folder, day)?;
        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(&self.api_key)
            .header("Accept", "text/markdown")
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(RemoteNote::NotFound),
            s if s.is_success() => Ok(RemoteNote::Found(resp.text().await?)),
            s => Err(SyncError::UnexpectedStatus {
                status: s,
                url: url.to_string(),
            }),
        }
    }

    /// PUT the note for `day`, replacing whatever is there.
    pub async fn write_note(&self, folder: &str, day: NaiveDate, content: &str) -> Result<(), SyncError> {
        let url = self.note_url(folder, day)?;
        let resp = self
            .http
            .put(url.clone())
            .bearer_auth(&self.api_key)
            .header("Content-Type", "text/markdown")
            .body(content.to_string())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SyncError::UnexpectedStatus {
                status: resp.status(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_url_encodes_each_segment() {
        let client = RestClient::new("https://127.0.0.1:27124/", "key", true).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let url = client.note_url("0. 目标及计划/Daily", day).unwrap();
        assert_eq!(
            url.as_str(),
            "https://127.0.0.1:27124/vault/0.%20%E7%9B%AE%E6%A0%87%E5%8F%8A%E8%AE%A1%E5%88%92/Daily/2026-02-09.md"
        );
    }

    #[test]
    fn note_url_ignores_stray_slashes() {
        let client = RestClient::new("http://localhost:27123", "key", false).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let url = client.note_url("/Daily/", day).unwrap();
        assert_eq!(url.as_str(), "http://localhost:27123/vault/Daily/2026-10-18.md");
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        let client = RestClient::new("not a url", "key", false).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert!(matches!(client.note_url("Daily", day), Err(SyncError::InvalidUrl(_))));
    }
}
