use super::{Backend, types::*};
use crate::{config::Config, sizes::SizeCatalog};
use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const ERROR_BODY_LIMIT: usize = 500;

pub struct HttpBackend {
    cfg: Config,
    client: Client,
}

impl HttpBackend {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            cfg: cfg.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.backend.api_url.trim_end_matches('/'), path)
    }

    fn bg_remove_timeout(&self, quality: Quality) -> u64 {
        match quality {
            Quality::Fast => self.cfg.backend.fast_timeout_seconds,
            Quality::Ai => self.cfg.backend.ai_timeout_seconds,
        }
    }

    fn get_text(&self, path: &str, timeout_seconds: u64) -> Result<String> {
        let url = self.url(path);
        debug!("GET {url} timeout={timeout_seconds}s");
        let req = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(timeout_seconds));
        self.send(path, req, timeout_seconds)
    }

    fn post_json<I: Serialize, O: DeserializeOwned>(
        &self,
        path: &str,
        body: &I,
        timeout_seconds: u64,
    ) -> Result<O> {
        let url = self.url(path);
        let bytes = serde_json::to_vec(body)?;
        debug!("POST {url} timeout={timeout_seconds}s size={}", bytes.len());
        let req = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(bytes)
            .timeout(Duration::from_secs(timeout_seconds));
        let text = self.send(path, req, timeout_seconds)?;
        serde_json::from_str(&text).with_context(|| format!("parsing JSON response: {path}"))
    }

    fn send(
        &self,
        path: &str,
        req: reqwest::blocking::RequestBuilder,
        timeout_seconds: u64,
    ) -> Result<String> {
        let res = req.send().map_err(|e| {
            warn!("request error path={path} timeout={timeout_seconds}s: {e}");
            if e.is_timeout() {
                anyhow!("{path} timed out after {}ms", timeout_seconds * 1000)
            } else {
                anyhow!("{path} request failed: {e}")
            }
        })?;

        let status = res.status();
        let text = res
            .text()
            .with_context(|| format!("reading response body: {path}"))?;

        if !status.is_success() {
            let snippet: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            if snippet.is_empty() {
                return Err(anyhow!("{path} failed: {}", status.as_u16()));
            }
            return Err(anyhow!("{path} failed: {} - {snippet}", status.as_u16()));
        }
        Ok(text)
    }
}

impl Backend for HttpBackend {
    fn bg_remove(&self, req: &BgRemoveIn) -> Result<BgRemoveOut> {
        let timeout = self.bg_remove_timeout(req.quality);
        self.post_json("/bg-remove", req, timeout)
    }

    fn compose_final(&self, req: &ComposeIn) -> Result<ComposeOut> {
        self.post_json("/api/compose", req, self.cfg.backend.compose_timeout_seconds)
    }

    fn compose_pdf(&self, req: &ComposePdfIn) -> Result<ComposePdfOut> {
        self.post_json("/compose-pdf", req, self.cfg.backend.default_timeout_seconds)
    }

    fn fetch_sizes(&self) -> Result<SizeCatalog> {
        let raw = self.get_text("/sizes", self.cfg.backend.default_timeout_seconds)?;
        SizeCatalog::from_json(&raw)
    }
}
