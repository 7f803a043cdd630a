//! Conditional fetching with local cache fallback.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use log::*;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::*;

/// `IMF-fixdate`, the preferred HTTP date layout.
const HTTP_DATE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Downloads remote resources into local cache files, reusing the cached
/// copy whenever the remote side has nothing newer to offer or cannot be
/// reached at all.
///
/// Safe to call concurrently for distinct destination paths. Two
/// concurrent fetches for the same path are not supported; the sync
/// pipeline never issues them because each manifest entry owns its paths.
#[derive(Clone)]
pub struct Fetcher {
    agent: ureq::Agent,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        // Status codes are handled here, not turned into transport errors
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }

    /// Fetch `src` into `dst` and return a read handle positioned at the
    /// start of the content.
    ///
    /// With `prefer_local_cache` set an existing `dst` is returned without
    /// any network traffic. Otherwise an existing `dst` turns the request
    /// into a conditional one, and connection failures, "not modified"
    /// answers and error statuses all fall back to the local copy. Errors
    /// only escape when there is no local copy to fall back to.
    pub fn fetch(
        &self,
        src: &str,
        dst: &Path,
        prefer_local_cache: bool,
    ) -> Result<File, SyncError> {
        debug!("Trying to decide how to get {}", src);
        if dst.exists() {
            if prefer_local_cache {
                debug!(
                    "Prefer local copy at {} according to configuration",
                    dst.display()
                );
                return Ok(File::open(dst)?);
            }
            let mut request = self.agent.get(src);
            if let Some(stamp) = local_modification_date(dst) {
                request = request.header("If-Modified-Since", stamp.as_str());
            }
            let response = match request.call() {
                Ok(response) => response,
                Err(e) => {
                    debug!(
                        "Failed to connect to {}, fallback to local copy at {}: {}",
                        src,
                        dst.display(),
                        e
                    );
                    return Ok(File::open(dst)?);
                }
            };
            let status = response.status().as_u16();
            if status == 304 {
                debug!(
                    "Remote {} does not have updates, use local copy at {}",
                    src,
                    dst.display()
                );
                return Ok(File::open(dst)?);
            }
            if status >= 400 {
                warn!(
                    "Remote {} fails with status code {}, use local copy at {}",
                    src,
                    status,
                    dst.display()
                );
                return Ok(File::open(dst)?);
            }
            return self.store(response, dst);
        }

        // No local copy to fall back to, failures propagate from here
        let response = self
            .agent
            .get(src)
            .call()
            .map_err(|e| SyncError::Network(format!("{}: {}", src, e)))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(SyncError::HttpStatus(status, src.to_string()));
        }
        self.store(response, dst)
    }

    fn store(
        &self,
        response: ureq::http::Response<ureq::Body>,
        dst: &Path,
    ) -> Result<File, SyncError> {
        debug!("Fetching remote resource into {}", dst.display());
        let mut reader = response.into_body().into_reader();
        let mut file = File::create(dst)?;
        io::copy(&mut reader, &mut file)?;
        drop(file);
        Ok(File::open(dst)?)
    }
}

fn local_modification_date(path: &Path) -> Option<String> {
    let modified: SystemTime = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    OffsetDateTime::from(modified).format(&HTTP_DATE).ok()
}
