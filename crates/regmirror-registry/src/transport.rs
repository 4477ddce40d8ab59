use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use regmirror_core::FetchError;
use reqwest::blocking::{Client, Response};

/// Plain HTTP(S) GET, the only registry protocol the mirror speaks.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Streams the body into `sink` without buffering it; returns bytes written.
    fn get_to_writer(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("regmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn send(&self, url: &str) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::transport(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(url, status.as_u16()));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url)?;
        let body = response
            .bytes()
            .map_err(|err| FetchError::transport(url, err))?;
        Ok(body.to_vec())
    }

    fn get_to_writer(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        let mut response = self.send(url)?;
        response
            .copy_to(sink)
            .map_err(|err| FetchError::transport(url, err))
    }
}
