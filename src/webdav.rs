// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! WebDAV transport for named snapshot files.
//!
//! The endpoint is a dumb file server: listing is PROPFIND depth 1,
//! upload is PUT, download is GET. Users configure the endpoint once and
//! the server layout may shift, so listing walks a fallback chain of
//! candidate collection URLs until one yields backup entries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use thiserror::Error;

/// Backup filenames embed user/device identity and recency, so both can be
/// recovered from a bare directory listing without downloading anything.
pub const BACKUP_PREFIX: &str = "Kassenbuch";

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^KassenbuchBackup_user([0-9a-f]{8})_device([0-9a-f]{8})_(\d+)\.json$")
        .expect("filename regex")
});

static RESPONSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:[a-z0-9_-]+:)?response[\s>](.*?)</(?:[a-z0-9_-]+:)?response>")
        .expect("response regex")
});
static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:[a-z0-9_-]+:)?href[^>]*>\s*(.*?)\s*</(?:[a-z0-9_-]+:)?href>")
        .expect("href regex")
});
static LASTMOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<(?:[a-z0-9_-]+:)?getlastmodified[^>]*>\s*(.*?)\s*</(?:[a-z0-9_-]+:)?getlastmodified>",
    )
    .expect("lastmod regex")
});
static LENGTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<(?:[a-z0-9_-]+:)?getcontentlength[^>]*>\s*(\d+)\s*</(?:[a-z0-9_-]+:)?getcontentlength>",
    )
    .expect("length regex")
});
static COLLECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:[a-z0-9_-]+:)?collection\b").expect("collection regex"));

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:displayname/><d:getlastmodified/><d:getcontentlength/><d:resourcetype/></d:prop></d:propfind>"#;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport credentials are missing or incomplete")]
    MissingCredentials,
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid endpoint URL '{0}'")]
    BadUrl(String),
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl RemoteConfig {
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.trim().is_empty()
    }
}

/// One remote snapshot file, described entirely by its listing entry.
#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub filename: String,
    pub user_id: String,
    pub device_id: String,
    /// Upload time embedded in the filename; the recency authority.
    pub timestamp: i64,
    /// Server-reported modification time. `None` when absent or
    /// unparsable; an unknown date must never win a recency comparison.
    pub last_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// Storage seam between the sync orchestrator and the wire. Implemented by
/// [`WebDavTransport`] and by in-memory fakes in tests.
pub trait RemoteStore {
    fn list_backups(&self) -> Result<Vec<BackupEntry>, TransportError>;
    fn upload(&self, filename: &str, body: Vec<u8>) -> Result<(), TransportError>;
    fn download(&self, filename: &str) -> Result<Vec<u8>, TransportError>;
}

pub fn build_backup_filename(user_id: &str, device_id: &str, timestamp: i64) -> String {
    format!(
        "{}Backup_user{}_device{}_{}.json",
        BACKUP_PREFIX, user_id, device_id, timestamp
    )
}

pub fn parse_backup_filename(name: &str) -> Option<(String, String, i64)> {
    let caps = FILENAME_RE.captures(name)?;
    let ts: i64 = caps.get(3)?.as_str().parse().ok()?;
    Some((caps[1].to_string(), caps[2].to_string(), ts))
}

fn entry_from_filename(
    filename: &str,
    last_modified: Option<DateTime<Utc>>,
    size: Option<u64>,
) -> Option<BackupEntry> {
    let (user_id, device_id, timestamp) = parse_backup_filename(filename)?;
    Some(BackupEntry {
        filename: filename.to_string(),
        user_id,
        device_id,
        timestamp,
        last_modified,
        size,
    })
}

/// Scrapes a PROPFIND multistatus response into backup entries.
///
/// Namespace prefixes differ per server, so tags are matched
/// namespace-agnostically. Directory entries and files that do not match
/// the backup naming pattern are dropped. Unparsable `getlastmodified`
/// values yield `None`, not "now".
pub fn parse_propfind(xml: &str) -> Vec<BackupEntry> {
    let mut entries = Vec::new();
    for resp in RESPONSE_RE.captures_iter(xml) {
        let block = &resp[1];
        if COLLECTION_RE.is_match(block) {
            continue;
        }
        let Some(href) = HREF_RE.captures(block).map(|c| c[1].to_string()) else {
            continue;
        };
        let filename = href.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        let last_modified = LASTMOD_RE
            .captures(block)
            .and_then(|c| DateTime::parse_from_rfc2822(c[1].trim()).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let size = LENGTH_RE
            .captures(block)
            .and_then(|c| c[1].parse::<u64>().ok());
        if let Some(entry) = entry_from_filename(filename, last_modified, size) {
            entries.push(entry);
        }
    }
    entries
}

/// Candidate collection URLs to try, in order: the configured path as-is,
/// its parent when the path names a snapshot file, and the server root.
pub fn candidate_collections(base_url: &str) -> Vec<String> {
    let trimmed = base_url.trim_end_matches('/');
    let mut candidates = vec![base_url.to_string()];
    if trimmed.ends_with(".json") {
        if let Some(parent) = trimmed.rsplit_once('/').map(|(p, _)| p.to_string()) {
            candidates.push(parent);
        }
    }
    if let Ok(url) = Url::parse(base_url) {
        if let Some(host) = url.host_str() {
            let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
            candidates.push(format!("{}://{}{}/", url.scheme(), host, port));
        }
    }
    candidates.dedup();
    candidates
}

#[derive(Debug)]
pub struct WebDavTransport {
    client: Client,
    config: RemoteConfig,
}

impl WebDavTransport {
    pub fn new(client: Client, config: RemoteConfig) -> Result<WebDavTransport, TransportError> {
        if !config.is_complete() {
            return Err(TransportError::MissingCredentials);
        }
        Ok(WebDavTransport { client, config })
    }

    /// Collection URL that uploads and downloads resolve against.
    fn collection_url(&self) -> String {
        let trimmed = self.config.base_url.trim_end_matches('/');
        if trimmed.ends_with(".json") {
            trimmed
                .rsplit_once('/')
                .map(|(p, _)| p.to_string())
                .unwrap_or_else(|| trimmed.to_string())
        } else {
            trimmed.to_string()
        }
    }

    fn file_url(&self, filename: &str) -> String {
        format!("{}/{}", self.collection_url(), filename)
    }

    fn propfind(&self, url: &str) -> Result<Vec<BackupEntry>, TransportError> {
        let method = reqwest::Method::from_bytes(b"PROPFIND")
            .map_err(|_| TransportError::BadUrl(url.to_string()))?;
        let resp = self
            .client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .map_err(|source| TransportError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: truncate_body(&body),
            });
        }
        Ok(parse_propfind(&body))
    }

    fn head(&self, url: &str) -> Result<bool, TransportError> {
        let resp = self
            .client
            .head(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .map_err(|source| TransportError::Http {
                url: url.to_string(),
                source,
            })?;
        Ok(resp.status().is_success())
    }
}

impl RemoteStore for WebDavTransport {
    fn list_backups(&self) -> Result<Vec<BackupEntry>, TransportError> {
        let mut last_err: Option<TransportError> = None;
        for candidate in candidate_collections(&self.config.base_url) {
            match self.propfind(&candidate) {
                Ok(entries) if !entries.is_empty() => return Ok(entries),
                Ok(_) => {}
                Err(err) => last_err = Some(err),
            }
        }
        // The configured URL may name the single backup file directly.
        let trimmed = self.config.base_url.trim_end_matches('/');
        if trimmed.ends_with(".json") {
            let filename = trimmed.rsplit('/').next().unwrap_or("");
            if let Some(entry) = entry_from_filename(filename, None, None) {
                if self.head(trimmed)? {
                    return Ok(vec![entry]);
                }
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(Vec::new()),
        }
    }

    fn upload(&self, filename: &str, body: Vec<u8>) -> Result<(), TransportError> {
        let url = self.file_url(filename);
        let resp = self
            .client
            .put(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .map_err(|source| TransportError::Http {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
                body: truncate_body(&body),
            });
        }
        Ok(())
    }

    fn download(&self, filename: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.file_url(filename);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .map_err(|source| TransportError::Http {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
                body: truncate_body(&body),
            });
        }
        let bytes = resp.bytes().map_err(|source| TransportError::Http {
            url: url.clone(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

/// Builds the transport from persisted settings; `None` when credentials
/// are absent (sync disabled, not an error).
pub fn transport_from_settings(conn: &rusqlite::Connection) -> Result<Option<WebDavTransport>> {
    let base_url = crate::utils::get_setting(conn, "webdav_url")?.unwrap_or_default();
    let username = crate::utils::get_setting(conn, "webdav_user")?.unwrap_or_default();
    let password = crate::utils::get_setting(conn, "webdav_password")?.unwrap_or_default();
    let config = RemoteConfig {
        base_url,
        username,
        password,
    };
    if !config.is_complete() {
        return Ok(None);
    }
    let client = crate::utils::http_client().context("Build HTTP client")?;
    Ok(Some(WebDavTransport::new(client, config)?))
}
