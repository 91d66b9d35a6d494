use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::FetchOutcome;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CHUNK_SIZE: usize = 64 * 1024;

/// Progress of a single archive download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadProgress {
    Started { url: String, total: Option<u64> },
    Advanced { downloaded: u64 },
    Finished,
}

pub type ProgressHook = Box<dyn Fn(DownloadProgress)>;

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(format!("rpm-py-installer/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to create HTTP client")
}

/// GETs `url` into `destination`. A 404 is reported as
/// [`FetchOutcome::NotFound`]; any other failure is an error.
pub(crate) fn download_archive(
    client: &Client,
    url: &str,
    destination: &Path,
    progress: Option<&ProgressHook>,
) -> Result<FetchOutcome> {
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("HTTP request failed: {url}"))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(FetchOutcome::NotFound);
    }
    if !status.is_success() {
        return Err(anyhow!(
            "HTTP {} for {url}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown error")
        ));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create download dir: {}", parent.display()))?;
    }
    let part_path = part_path(destination);
    let report = |event: DownloadProgress| {
        if let Some(hook) = progress {
            hook(event);
        }
    };

    report(DownloadProgress::Started {
        url: url.to_string(),
        total: response.content_length(),
    });
    let result = stream_to_file(&mut response, &part_path, &report);
    report(DownloadProgress::Finished);
    if let Err(err) = result {
        let _ = fs::remove_file(&part_path);
        return Err(err.context(format!("failed to download {url}")));
    }

    if destination.exists() {
        fs::remove_file(destination)
            .with_context(|| format!("failed to replace {}", destination.display()))?;
    }
    fs::rename(&part_path, destination).with_context(|| {
        format!(
            "failed to move downloaded archive into place: {}",
            destination.display()
        )
    })?;
    Ok(FetchOutcome::Fetched(destination.to_path_buf()))
}

fn stream_to_file(
    response: &mut impl Read,
    path: &Path,
    report: &dyn Fn(DownloadProgress),
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut downloaded = 0_u64;
    loop {
        let read = response
            .read(&mut buffer)
            .context("failed reading response body")?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .with_context(|| format!("failed to write {}", path.display()))?;
        downloaded += read as u64;
        report(DownloadProgress::Advanced { downloaded });
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

fn part_path(destination: &Path) -> PathBuf {
    destination.with_file_name(format!(
        "{}.part",
        destination
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("archive")
    ))
}
