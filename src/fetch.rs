use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use tracing::info;
use url::Url;

const BAR_WIDTH: usize = 64;

/// Console progress for one download. The reporter owns its start time, so
/// nothing about the transfer lives outside this value.
pub struct DownloadProgress {
    started: Instant,
}

impl DownloadProgress {
    pub fn new() -> Self {
        DownloadProgress {
            started: Instant::now(),
        }
    }

    /// Redraw the bar. Advisory output only; rendering failures are ignored,
    /// as is a response without a known length.
    pub fn update(&self, received: u64, total: Option<u64>) {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let fraction = (received as f64 / total as f64).min(1.0);
        let filled = (BAR_WIDTH as f64 * fraction) as usize;
        let _ = write!(
            std::io::stderr(),
            "\r[{:<width$}] {}%, took {:.2} sec",
            "=".repeat(filled),
            (fraction * 100.0) as u32,
            self.started.elapsed().as_secs_f64(),
            width = BAR_WIDTH,
        );
    }

    /// Terminate the bar line.
    pub fn finish(&self) {
        let _ = writeln!(std::io::stderr());
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Download `url` to `dest`, blocking until complete. The body streams
/// through a staging file in the destination directory and is renamed into
/// place, so `dest` only ever appears complete.
pub fn download(client: &Client, url: &str, dest: &Path, progress: &DownloadProgress) -> Result<()> {
    let url = Url::parse(url).with_context(|| format!("parsing URL {url}"))?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut resp = client
        .get(url.as_str())
        .send()
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?;
    let total = resp.content_length();

    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).context("creating download staging file")?;

    let mut received = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = resp.read(&mut buf).context("reading response body")?;
        if n == 0 {
            break;
        }
        tmp.write_all(&buf[..n])
            .context("writing download staging file")?;
        received += n as u64;
        progress.update(received, total);
    }
    progress.finish();

    tmp.persist(dest)
        .with_context(|| format!("persisting {}", dest.display()))?;
    info!(bytes = received, dest = %dest.display(), "download complete");
    Ok(())
}
