//! Proxy authentication for Chrome.
//!
//! Chrome ignores credentials embedded in `--proxy-server`, so authenticated
//! proxies get a small extension that answers the proxy's auth challenge.
//! It is packed as a zip and handed to the WebDriver server base64-encoded,
//! which works for remote servers too.

use std::io::{Cursor, Write};

use base64::Engine;
use serde_json::json;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::scraper::error::ScrapeError;

const BACKGROUND_SCRIPT: &str = "background.js";

fn manifest() -> serde_json::Value {
    json!({
        "manifest_version": 3,
        "name": "Scout proxy auth",
        "version": "1.0.0",
        "permissions": ["webRequest", "webRequestAuthProvider"],
        "host_permissions": ["<all_urls>"],
        "background": { "service_worker": BACKGROUND_SCRIPT },
    })
}

fn background_script(username: &str, password: &str) -> String {
    let credentials = json!({ "username": username, "password": password });
    format!(
        r#"
const credentials = {credentials};
chrome.webRequest.onAuthRequired.addListener(
  (details, callback) => callback(details.isProxy ? {{ authCredentials: credentials }} : {{}}),
  {{ urls: ["<all_urls>"] }},
  ["asyncBlocking"]
);
"#
    )
}

/// Zipped proxy-auth extension, base64-encoded for the `extensions` capability
pub fn proxy_auth_extension(username: &str, password: &str) -> Result<String, ScrapeError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let files = [
        ("manifest.json", serde_json::to_string_pretty(&manifest())?),
        (BACKGROUND_SCRIPT, background_script(username, password)),
    ];
    for (name, contents) in files {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(name, options)
            .map_err(|e| ScrapeError::Browser(format!("failed to pack proxy extension: {}", e)))?;
        zip.write_all(contents.as_bytes())?;
    }

    let archive = zip
        .finish()
        .map_err(|e| ScrapeError::Browser(format!("failed to pack proxy extension: {}", e)))?
        .into_inner();

    Ok(base64::engine::general_purpose::STANDARD.encode(archive))
}
