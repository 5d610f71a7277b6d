use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::ResolvedConfig;
use crate::domain::TranslationId;
use crate::error::CorpusError;

pub trait EbibleClient: Send + Sync {
    fn download_catalog(&self, destination: &Path) -> Result<(), CorpusError>;

    /// Writes the archive for `id` to `destination` and returns the byte count.
    fn download_archive(&self, id: &TranslationId, destination: &Path)
    -> Result<u64, CorpusError>;
}

#[derive(Clone)]
pub struct EbibleHttpClient {
    client: Client,
    catalog_url: String,
    archive_base_url: String,
}

impl EbibleHttpClient {
    pub fn new(
        catalog_url: impl Into<String>,
        archive_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CorpusError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ebible-corpus/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CorpusError::Fetch(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CorpusError::Fetch(err.to_string()))?;
        Ok(Self {
            client,
            catalog_url: catalog_url.into(),
            archive_base_url: archive_base_url.into(),
        })
    }

    pub fn from_config(config: &ResolvedConfig) -> Result<Self, CorpusError> {
        Self::new(
            config.catalog_url.clone(),
            config.archive_base_url.clone(),
            config.fetch_timeout,
        )
    }

    pub fn archive_url(&self, id: &TranslationId) -> String {
        format!("{}{}_usfm.zip", self.archive_base_url, id.as_str())
    }

    fn write_response_to_file(
        &self,
        url: &str,
        mut response: Response,
        destination: &Path,
    ) -> Result<u64, CorpusError> {
        if !response.status().is_success() {
            return Err(CorpusError::FetchStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let mut file =
            File::create(destination).map_err(|err| CorpusError::Filesystem(err.to_string()))?;
        // A body that fails mid-stream is a network failure, not a local one.
        let written = std::io::copy(&mut response, &mut file)
            .map_err(|err| CorpusError::Fetch(format!("{url}: {err}")))?;
        file.flush()
            .map_err(|err| CorpusError::Filesystem(err.to_string()))?;
        Ok(written)
    }

    fn send_with_retries<F>(&self, url: &str, mut make_req: F) -> Result<Response, CorpusError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        attempt += 1;
                        tracing::debug!(url, status, attempt, "Retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        attempt += 1;
                        tracing::debug!(url, error = %err, attempt, "Retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    if err.is_timeout() {
                        return Err(CorpusError::Fetch(format!("{url}: timed out")));
                    }
                    return Err(CorpusError::Fetch(format!("{url}: {err}")));
                }
            }
        }
    }
}

impl EbibleClient for EbibleHttpClient {
    fn download_catalog(&self, destination: &Path) -> Result<(), CorpusError> {
        let url = self.catalog_url.clone();
        let response = self.send_with_retries(&url, || self.client.get(&url))?;
        self.write_response_to_file(&url, response, destination)?;
        Ok(())
    }

    fn download_archive(
        &self,
        id: &TranslationId,
        destination: &Path,
    ) -> Result<u64, CorpusError> {
        let url = self.archive_url(id);
        let response = self.send_with_retries(&url, || self.client.get(&url))?;
        self.write_response_to_file(&url, response, destination)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_request()
}
