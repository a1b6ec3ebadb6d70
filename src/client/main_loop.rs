//! Main client mode event loop
// (c) 2024 Ross Younger

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use tokio::io::AsyncWriteExt as _;
use tracing::{Instrument as _, debug, error_span, info, warn};
use url::Url;

use crate::{
    config::Configuration,
    h09,
    session::Dialer,
    testcase::TestCase,
    util::{PathError, resolve_under},
};

/// How long to let closed connections drain before giving up on them
const DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// Name saved when the requested path names a directory
const INDEX_FILE: &str = "index.html";

/// Runs a test case as the client.
///
/// Only the first URL is fetched; any others are logged and ignored.
/// The downloaded file lands under the configured downloads directory at the URL's path,
/// percent-decoded. The request itself carries the path as it appears in the URL.
pub async fn run(testcase: &str, urls: &[String], config: &Configuration) -> anyhow::Result<()> {
    let testcase = TestCase::from_name(testcase)?;
    let (first, rest) = urls
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("no URLs to fetch"))?;
    for ignored in rest {
        warn!("only one URL is fetched per run; ignoring {ignored}");
    }
    let url = Url::parse(first).with_context(|| format!("invalid URL {first:?}"))?;
    let session_url = session_url(&url, &config.upgrade_path);
    let destination = destination(&config.downloads, url.path())
        .with_context(|| format!("cannot save {url} under {}", config.downloads.display()))?;
    debug!("running {testcase} against {session_url}");

    let dialer = Dialer::new(config)?;
    let result = fetch(&dialer, &session_url, &url, &destination)
        .instrument(error_span!("CLIENT"))
        .await;
    dialer.close();
    dialer.wait_idle(DRAIN_LIMIT).await;
    result
}

async fn fetch(
    dialer: &Dialer,
    session_url: &Url,
    url: &Url,
    destination: &Path,
) -> anyhow::Result<()> {
    let session = dialer
        .dial(session_url)
        .await
        .with_context(|| format!("establishing session at {session_url}"))?;
    let stream = session.open_stream().await?;
    let mut body = h09::request(stream, "GET", url.path()).await?;

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut file = tokio::fs::File::create(destination)
        .await
        .with_context(|| format!("creating {}", destination.display()))?;
    let received = body
        .copy_to(&mut file)
        .await
        .with_context(|| format!("receiving {url}"))?;
    file.flush().await?;
    info!(
        "saved {url} to {} ({received} bytes)",
        destination.display()
    );
    session.close().await;
    Ok(())
}

/// The URL of the session endpoint on the same server as `target`
fn session_url(target: &Url, upgrade_path: &str) -> Url {
    let mut url = target.clone();
    url.set_path(upgrade_path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Where to save the resource at `url_path`
fn destination(downloads: &Path, url_path: &str) -> Result<PathBuf, PathError> {
    let mut dest = resolve_under(downloads, url_path)?;
    if url_path.ends_with('/') {
        dest.push(INDEX_FILE);
    }
    Ok(dest)
}
