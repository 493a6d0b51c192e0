//! Package download and unpacking
//!
//! The marketplace only serves packages through a rendered download button,
//! so the fetcher clicks it and then watches the worker's download directory
//! for the browser to finish writing the archive.

use crate::browser::BrowserSession;
use crate::config::BrowserConfig;
use crate::crawler::wait::wait_for;
use crate::state::FetchState;
use crate::url::extract_item_name;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Download trigger on a listing page
pub const DOWNLOAD_BUTTON: &str = "button.root-47";

const ARCHIVE_EXTENSION: &str = "vsix";

const PARTIAL_EXTENSION: &str = "crdownload";

/// Why a package could not be fetched; the display text is the ledger reason
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadFailure {
    #[error("No button found")]
    NoButtonFound,

    #[error("Download timed out")]
    TimedOut,

    #[error("Multiple files found")]
    MultipleFiles,

    #[error("{0}")]
    Unpack(String),

    #[error("{0}")]
    Browser(String),

    #[error("{0}")]
    InvalidUrl(String),
}

/// A package archive extracted into the download directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedPackage {
    pub path: PathBuf,
}

/// Outcome of one fetch: exactly one of an unpacked path or a failure
pub type DownloadResult = Result<UnpackedPackage, DownloadFailure>;

/// Drives one package download through its [`FetchState`]s
pub struct PackageFetcher<'a> {
    session: &'a dyn BrowserSession,
    download_dir: &'a Path,
    browser: &'a BrowserConfig,
    state: FetchState,
}

impl<'a> PackageFetcher<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        download_dir: &'a Path,
        browser: &'a BrowserConfig,
    ) -> Self {
        Self {
            session,
            download_dir,
            browser,
            state: FetchState::NavigatingToItem,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Downloads and unpacks the package behind the listing at `url`
    ///
    /// No archive is left in the download directory afterwards, whatever
    /// the outcome.
    pub async fn fetch(&mut self, url: &str) -> DownloadResult {
        let result = self.run(url).await;
        match &result {
            Ok(_) => self.advance(FetchState::Done),
            Err(failure) => {
                tracing::debug!("Fetch of {} failed while {}: {}", url, self.state, failure);
                self.advance(FetchState::Failed);
            }
        }
        result
    }

    async fn run(&mut self, url: &str) -> DownloadResult {
        let expected =
            extract_item_name(url).map_err(|e| DownloadFailure::InvalidUrl(e.to_string()))?;

        self.session
            .navigate(url)
            .await
            .map_err(|e| DownloadFailure::Browser(e.to_string()))?;

        let dir = self.download_dir.to_path_buf();
        run_blocking({
            let dir = dir.clone();
            move || sweep_leftovers(&dir)
        })
        .await;

        self.advance(FetchState::AwaitingDownloadButton);
        let (session, poll) = (self.session, self.browser.poll_interval());
        wait_for(self.browser.page_load_timeout(), poll, || async move {
            session
                .click_first(DOWNLOAD_BUTTON)
                .await
                .ok()
                .filter(|clicked| *clicked)
        })
        .await
        .map_err(|_| DownloadFailure::NoButtonFound)?;
        self.advance(FetchState::Downloading);

        self.advance(FetchState::AwaitingArtifact);
        let archives = wait_for(self.browser.download_timeout(), poll, || {
            let (dir, expected) = (dir.clone(), expected.clone());
            async move {
                let found = run_blocking(move || matching_archives(&dir, &expected)).await;
                found.filter(|found| !found.is_empty())
            }
        })
        .await
        .map_err(|_| DownloadFailure::TimedOut)?;

        let archive = match <[PathBuf; 1]>::try_from(archives) {
            Ok([archive]) => archive,
            Err(archives) => {
                for archive in &archives {
                    remove_archive(archive);
                }
                return Err(DownloadFailure::MultipleFiles);
            }
        };

        self.advance(FetchState::Unpacking);
        let target = archive.with_extension("");
        let unpacked = {
            let (archive, target) = (archive.clone(), target.clone());
            tokio::task::spawn_blocking(move || unpack(&archive, &target)).await
        };
        remove_archive(&archive);

        let unpack_error = match unpacked {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(error) = unpack_error {
            if target.exists() {
                let _ = fs::remove_dir_all(&target);
            }
            return Err(DownloadFailure::Unpack(error));
        }

        self.advance(FetchState::AwaitingDirectory);
        let name = target.file_name().map(|n| n.to_os_string());
        wait_for(self.browser.download_timeout(), poll, || {
            let (dir, name) = (dir.clone(), name.clone());
            async move {
                let listed = run_blocking(move || {
                    name.as_deref().is_some_and(|name| directory_listed(&dir, name))
                })
                .await;
                listed.filter(|listed| *listed).map(|_| ())
            }
        })
        .await
        .map_err(|_| DownloadFailure::TimedOut)?;

        Ok(UnpackedPackage { path: target })
    }

    fn advance(&mut self, to: FetchState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid fetch transition {} -> {}",
            self.state,
            to
        );
        tracing::trace!("Fetch state {} -> {}", self.state, to);
        self.state = to;
    }
}

/// Runs a directory probe off the async workers; `None` if the task died
async fn run_blocking<T, F>(probe: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(probe).await.ok()
}

/// Removes archives and partial downloads left behind by earlier jobs
///
/// A download that completes after its job timed out would otherwise be
/// matched by a later job whose item name is a prefix of it.
fn sweep_leftovers(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
        let leftover = path.is_file()
            && matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(ARCHIVE_EXTENSION | PARTIAL_EXTENSION)
            );
        if leftover {
            tracing::debug!("Removing leftover download {}", path.display());
            remove_archive(&path);
        }
    }
}

/// Completed archives for `expected` in `dir`
///
/// In-progress browser downloads carry a different extension and are ignored.
fn matching_archives(dir: &Path, expected: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            file_name.starts_with(expected)
                && path.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_EXTENSION)
        })
        .collect();
    found.sort();
    found
}

fn directory_listed(dir: &Path, name: &std::ffi::OsStr) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_name() == name && entry.path().is_dir())
}

fn remove_archive(archive: &Path) {
    if let Err(e) = fs::remove_file(archive) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove archive {}: {}", archive.display(), e);
        }
    }
}

/// Extracts every entry of the zip at `archive` below `target`
///
/// Entries whose names would escape `target` are skipped.
pub fn unpack(archive: &Path, target: &Path) -> zip::result::ZipResult<()> {
    let reader = BufReader::new(File::open(archive)?);
    let mut zip = zip::ZipArchive::new(reader)?;
    fs::create_dir_all(target)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let entry_path = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => continue,
        };

        let output_path = target.join(&entry_path);
        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&output_path)?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }
    Ok(())
}
