//! Static pages served from the assets directory

use axum::response::Html;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locations of the single-page-app shell, the error page, and the favicon
#[derive(Debug, Clone)]
pub struct Assets {
    root: PathBuf,
}

impl Assets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.html")
    }

    pub fn not_found_path(&self) -> PathBuf {
        self.root.join("404.html")
    }

    pub fn favicon_path(&self) -> PathBuf {
        self.root.join("img").join("favicon.ico")
    }

    /// The app shell, re-read on every request so edits show up without a restart
    pub async fn index_page(&self) -> Html<String> {
        Html(read_or(&self.index_path(), FALLBACK_INDEX_HTML).await)
    }

    /// Body of the 404 response
    pub async fn not_found_page(&self) -> Html<String> {
        Html(read_or(&self.not_found_path(), FALLBACK_404_HTML).await)
    }
}

async fn read_or(path: &Path, fallback: &str) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            debug!("Serving built-in page, {} unavailable: {}", path.display(), e);
            fallback.to_string()
        }
    }
}

pub const FALLBACK_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Visual Recognition Tool</title>
    <link rel="icon" href="/favicon.ico">
</head>
<body>
    <main id="app">
        <h1>Visual Recognition Tool</h1>
        <p>The web client has not been installed. The REST API is available under <code>/api</code>.</p>
    </main>
</body>
</html>
"#;

pub const FALLBACK_404_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Page not found</title>
</head>
<body>
    <h1>404</h1>
    <p>The page you were looking for does not exist.</p>
    <p><a href="/">Back to the start page</a></p>
</body>
</html>
"#;
