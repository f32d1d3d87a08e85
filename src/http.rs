//! Abstract HTTP transport used to reach the registration API.
//!
//! The trait is the seam that lets tests swap `reqwest` for an in-memory
//! recording transport.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};

use crate::constants::DEFAULT_USER_AGENT;
use crate::errors::BuildError;

pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Asynchronous JSON POST transport.
///
/// An `Err` means the request never produced an HTTP response (DNS, TLS,
/// connect or read failure). Any response, including non-2xx, comes back as
/// `Ok` so the API layer can decode error bodies.
#[async_trait]
pub trait HttpTransport: Clone + Send + Sync + 'static {
    async fn post_json(&self, url: Url, body: Vec<u8>) -> Result<HttpResponse>;
}

/// Production transport backed by `reqwest` with rustls.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, BuildError> {
        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, url: Url, body: Vec<u8>) -> Result<HttpResponse> {
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
