//! Blocking HTTP helpers shared by the release sources
//!
//! All functions here block; callers run them on tokio's blocking pool.

use crate::release::{LocalRelease, RemoteRelease};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;
use ureq::Agent;

/// GET `url` with `query` appended and return the body.
///
/// `Ok(None)` means the server answered 404. Any other non-200 status or
/// transport failure is an `Err` with a readable reason.
pub(crate) fn get_text(
    agent: &Agent,
    url: &str,
    query: &[(&str, &str)],
    auth: Option<&str>,
) -> Result<Option<String>, String> {
    debug!("GET {} {:?}", url, query);

    let mut request = agent.get(url);
    for (key, value) in query {
        request = request.query(*key, *value);
    }
    if let Some(auth) = auth {
        request = request.header("Authorization", auth);
    }

    let mut response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::StatusCode(404)) => return Ok(None),
        Err(ureq::Error::StatusCode(code)) => {
            return Err(format!("unexpected status {} from {}", code, url))
        }
        Err(e) => return Err(format!("request to {} failed: {}", url, e)),
    };

    let status = response.status().as_u16();
    if status == 404 {
        return Ok(None);
    }
    if status != 200 {
        return Err(format!("unexpected status {} from {}", status, url));
    }

    response
        .body_mut()
        .read_to_string()
        .map(Some)
        .map_err(|e| format!("reading response from {} failed: {}", url, e))
}

/// Stream `release` into `releases_dir` under its standardized filename.
///
/// Content goes to a temporary file in the same directory first and is
/// renamed into place only once the whole body has been written.
pub(crate) fn download_release(
    agent: &Agent,
    releases_dir: &Path,
    release: &RemoteRelease,
    auth: Option<&str>,
) -> Result<LocalRelease, String> {
    debug!("Downloading {} from {}", release.id, release.url);

    let mut request = agent.get(&release.url);
    if let Some(auth) = auth {
        request = request.header("Authorization", auth);
    }

    let mut response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::StatusCode(code)) => {
            return Err(format!("unexpected status {} from {}", code, release.url))
        }
        Err(e) => return Err(format!("request to {} failed: {}", release.url, e)),
    };

    let status = response.status().as_u16();
    if status != 200 {
        return Err(format!("unexpected status {} from {}", status, release.url));
    }

    let mut tmp = NamedTempFile::new_in(releases_dir)
        .map_err(|e| format!("creating temporary file in {}: {}", releases_dir.display(), e))?;
    let mut body = response.body_mut().as_reader();
    std::io::copy(&mut body, &mut tmp)
        .and_then(|_| tmp.flush())
        .map_err(|e| format!("writing {}: {}", release.url, e))?;

    let path = releases_dir.join(release.standardized_filename());
    tmp.persist(&path)
        .map_err(|e| format!("moving download to {}: {}", path.display(), e.error))?;

    Ok(release.materialize(path))
}
