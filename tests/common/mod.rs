//! Common test utilities for fetchwatch E2E tests

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use fetchwatch::{Config, FetchWatch};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A wired pipeline pointed at a mock remote, plus the temp dirs keeping
/// its store and download directory alive
pub struct TestEnv {
    pub watch: FetchWatch,
    pub server: MockServer,
    pub temp: TempDir,
}

impl TestEnv {
    /// Pipeline pointing at `<server>/listing`, fast retries, isolated dirs
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();

        let config = test_config(&temp, Some(format!("{}/listing", server.uri())));
        let watch = FetchWatch::new(config).await.unwrap();

        Self {
            watch,
            server,
            temp,
        }
    }

    /// Reopen the pipeline over the same store and download directory,
    /// simulating a process restart
    pub async fn reopen(self) -> Self {
        self.watch.shutdown().await.unwrap();

        let config = test_config(&self.temp, Some(format!("{}/listing", self.server.uri())));
        let watch = FetchWatch::new(config).await.unwrap();

        Self {
            watch,
            server: self.server,
            temp: self.temp,
        }
    }

    /// Serve a JSON listing body at `/listing`
    pub async fn mount_listing_json(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/listing"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(body),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve an HTML listing body at `/listing`
    pub async fn mount_listing_html(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path("/listing"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html"),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve a plain-text listing body at `/listing`
    pub async fn mount_listing_text(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path("/listing"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve downloadable bytes at the given path
    pub async fn mount_file(&self, file_path: &str, bytes: &[u8]) {
        Mock::given(method("GET"))
            .and(path(file_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Absolute URL for a path on the mock server
    pub fn url(&self, file_path: &str) -> String {
        format!("{}{}", self.server.uri(), file_path)
    }

    /// Sorted filenames currently in the download directory
    pub fn downloaded_files(&self) -> Vec<String> {
        let dir = self.temp.path().join("downloads");
        if !dir.exists() {
            return Vec::new();
        }
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Build an isolated config rooted in the given temp directory
pub fn test_config(temp: &TempDir, monitor_url: Option<String>) -> Config {
    let mut config = Config::default();
    config.monitor.monitor_url = monitor_url;
    config.monitor.poll_interval = Duration::from_secs(1);
    config.monitor.request_timeout = Duration::from_secs(5);
    config.download.download_dir = temp.path().join("downloads");
    config.persistence.db_path = temp.path().join("fetchwatch.db");
    config.retry.max_attempts = 2;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.jitter = false;
    config
}
