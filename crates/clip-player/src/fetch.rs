//! Resource fetching and the default [`ResourceLoader`].
//!
//! Resources are either `http(s)://` URLs (fetched with ureq in one request)
//! or local paths, optionally written as `file://` URLs.

use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::backend::{DecodedBuffer, ResourceLoader};
use crate::{decode, resample};

/// Where a resource string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    Http(String),
    File(PathBuf),
}

impl ResourceLocation {
    pub fn parse(resource: &str) -> Self {
        let trimmed = resource.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ResourceLocation::Http(trimmed.to_string())
        } else if lower.starts_with("file://") {
            ResourceLocation::File(PathBuf::from(&trimmed["file://".len()..]))
        } else {
            ResourceLocation::File(PathBuf::from(trimmed))
        }
    }
}

/// Read all bytes behind `resource`.
pub fn fetch_bytes(resource: &str, timeout: Duration) -> Result<Vec<u8>> {
    match ResourceLocation::parse(resource) {
        ResourceLocation::Http(url) => fetch_http(&url, timeout),
        ResourceLocation::File(path) => {
            std::fs::read(&path).with_context(|| format!("read {:?}", path))
        }
    }
}

fn fetch_http(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let start = Instant::now();
    let resp = ureq::get(url)
        .config()
        .timeout_per_call(Some(timeout))
        .build()
        .call()
        .with_context(|| format!("http request failed: {url}"))?;

    let mut buf = Vec::new();
    let (_, body) = resp.into_parts();
    body.into_reader()
        .read_to_end(&mut buf)
        .with_context(|| format!("http read failed: {url}"))?;

    let elapsed = start.elapsed();
    if elapsed > Duration::from_secs(2) {
        tracing::warn!(
            took_ms = elapsed.as_millis() as u64,
            bytes = buf.len(),
            url,
            "http fetch slow"
        );
    } else {
        tracing::debug!(took_ms = elapsed.as_millis() as u64, bytes = buf.len(), url, "http fetch");
    }
    Ok(buf)
}

/// Fetches over HTTP or from disk, decodes with Symphonia, and resamples to the output rate.
#[derive(Clone, Debug)]
pub struct DefaultLoader {
    http_timeout: Duration,
    target_rate: Option<u32>,
    chunk_frames: usize,
}

impl DefaultLoader {
    /// `target_rate` of `None` keeps each resource at its native rate.
    pub fn new(http_timeout: Duration, target_rate: Option<u32>, chunk_frames: usize) -> Self {
        Self {
            http_timeout,
            target_rate,
            chunk_frames,
        }
    }
}

impl ResourceLoader for DefaultLoader {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        fetch_bytes(resource, self.http_timeout)
    }

    fn decode(&self, resource: &str, bytes: Vec<u8>) -> Result<DecodedBuffer> {
        let ext = decode::infer_ext(resource);
        let buffer = decode::decode_bytes(bytes, ext.as_deref())
            .with_context(|| format!("decode {resource}"))?;
        match self.target_rate {
            Some(rate) => resample::resample_buffer(buffer, rate, self.chunk_frames),
            None => Ok(buffer),
        }
    }
}
