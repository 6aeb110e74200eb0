use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde_json::Value;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::config::ProviderConfig;

const REQUEST_TIMEOUT_SECS: u64 = 60;

pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("failed to build http client")
}

/// Verbose runs report every response status at the default level.
fn log_status(verbose: bool, url: &str, status: StatusCode) {
    if verbose {
        info!(%url, %status, "GET");
    } else {
        debug!(%url, %status, "GET");
    }
}

/// Single-attempt authenticated GET. An empty JSON array counts as failure.
pub fn get_json(client: &Client, cfg: &ProviderConfig, url: &str) -> Result<Value> {
    let resp = client
        .get(url)
        .basic_auth(&cfg.username, Some(&cfg.password))
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    log_status(cfg.verbose, url, status);
    let resp = resp
        .error_for_status()
        .with_context(|| format!("http {status} for {url}"))?;
    let body: Value = resp
        .json()
        .with_context(|| format!("invalid json from {url}"))?;
    if body.as_array().is_some_and(|a| a.is_empty()) {
        bail!("received empty response from {url}");
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_at_info(verbose: bool) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            log_status(verbose, "https://example.test/v3/matches/1/events", StatusCode::OK);
        });
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn verbose_status_is_visible_at_info() {
        let out = logged_at_info(true);
        assert!(out.contains("200 OK"), "{out}");
        assert!(out.contains("matches/1/events"));
        assert!(logged_at_info(false).is_empty());
    }
}
