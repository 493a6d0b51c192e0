//! Integration tests for the harvesting pipeline
//!
//! These tests replace the browser with an in-process fake marketplace whose
//! download button writes real zip archives into the worker's download
//! directory, and drive full runs end-to-end.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use theme_harvester::browser::{BrowserSession, SessionFactory, SessionResult};
use theme_harvester::config::Config;
use theme_harvester::crawler::package_fetcher::DOWNLOAD_BUTTON;
use theme_harvester::crawler::{collect_listing_urls, Coordinator, RunMode};
use theme_harvester::output::{
    read_document, Document, DocumentWriter, FailureIndex, JsonDocumentWriter, MetadataRecord,
    ThemeFormat, ThemeRecord, METADATA_CHECKPOINT, METADATA_FAILURES_FILE, METADATA_FILE,
    PACKAGE_FAILURES_FILE, THEMES_CHECKPOINT, THEMES_FILE, THEME_URLS_FILE,
};
use zip::write::SimpleFileOptions;

const MARKETPLACE: &str = "https://marketplace.test";

type Package = Vec<(&'static str, String)>;

/// One listing page of the fake marketplace
#[derive(Clone, Default)]
struct Listing {
    html: String,
    button: bool,
    /// Archives written on click, one per entry
    archives: Vec<Package>,
}

/// Listings keyed by URL, plus the search page
#[derive(Default)]
struct Marketplace {
    listings: HashMap<String, Listing>,
    search_html: String,
    search_pages: u64,
}

impl Marketplace {
    fn add(&mut self, url: &str, listing: Listing) {
        self.listings.insert(url.to_string(), listing);
    }
}

struct FakeSession {
    market: Arc<Marketplace>,
    download_dir: Option<PathBuf>,
    current: Mutex<String>,
    scrolls: Mutex<u64>,
}

impl FakeSession {
    fn listing(&self) -> Listing {
        let current = self.current.lock().unwrap();
        self.market
            .listings
            .get(current.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        *self.current.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn rendered_html(&self) -> SessionResult<String> {
        if self.current.lock().unwrap().contains("/search") {
            return Ok(self.market.search_html.clone());
        }
        Ok(self.listing().html)
    }

    async fn click_first(&self, selector: &str) -> SessionResult<bool> {
        assert_eq!(selector, DOWNLOAD_BUTTON);
        let listing = self.listing();
        if !listing.button {
            return Ok(false);
        }

        let dir = self.download_dir.as_ref().expect("package sessions download");
        let url = self.current.lock().unwrap().clone();
        let item = url.split("itemName=").nth(1).unwrap().to_string();
        for (i, files) in listing.archives.iter().enumerate() {
            write_vsix(&dir.join(format!("{}-1.0.{}.vsix", item, i)), files);
        }
        Ok(true)
    }

    async fn scroll_to_end(&self) -> SessionResult<u64> {
        let mut scrolls = self.scrolls.lock().unwrap();
        *scrolls = (*scrolls + 1).min(self.market.search_pages);
        Ok(*scrolls * 1000)
    }

    async fn close(&mut self) -> SessionResult<()> {
        Ok(())
    }
}

struct FakeFactory {
    market: Arc<Marketplace>,
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, download_dir: Option<&Path>) -> SessionResult<Box<dyn BrowserSession>> {
        Ok(Box::new(FakeSession {
            market: Arc::clone(&self.market),
            download_dir: download_dir.map(Path::to_path_buf),
            current: Mutex::new(String::new()),
            scrolls: Mutex::new(0),
        }))
    }
}

fn write_vsix(path: &Path, files: &[(&str, String)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, contents) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn listing_url(item: &str) -> String {
    format!("{}/items?itemName={}", MARKETPLACE, item)
}

fn listing_html(name: &str) -> String {
    format!(
        r#"<html><body>
        <span class="ux-item-name">{name}</span>
        <a class="ux-item-publisher-link">publisher</a>
        <span class="installs-text">1,024 installs</span>
        <span class="ux-item-rating-count">(12)</span>
        <span class="ux-item-review-rating" title="Average rating: 4.2 out of 5"></span>
        <div class="ux-item-shortdesc">A theme called {name}</div>
        <span class="item-price-category">Free</span>
        <a class="meta-data-list-link" aria-label="Category Themes">Themes</a>
        </body></html>"#
    )
}

fn json_theme_package(display_name: &str) -> Package {
    vec![
        (
            "extension/package.json",
            format!(
                r#"{{
                    "displayName": "{}",
                    "contributes": {{
                        "themes": [{{"uiTheme": "vs-dark", "path": "./themes/theme.json"}}],
                    }},
                }}"#,
                display_name
            ),
        ),
        (
            "extension/themes/theme.json",
            r##"{"colors": {"editor.background": "#1e1e1e"}}"##.to_string(),
        ),
    ]
}

fn non_theme_package() -> Package {
    vec![(
        "extension/package.json",
        r#"{"displayName": "Linter", "contributes": {"commands": []}}"#.to_string(),
    )]
}

fn theme_listing(name: &str) -> Listing {
    Listing {
        html: listing_html(name),
        button: true,
        archives: vec![json_theme_package(name)],
    }
}

/// Creates a test configuration with short timeouts rooted at `root`
fn create_test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.workers.metadata_scrapers = 2;
    config.workers.package_analyzers = 3;
    config.browser.page_load_timeout_ms = 100;
    config.browser.download_timeout_ms = 150;
    config.browser.poll_interval_ms = 10;
    config.checkpoint.interval_ms = 20;
    config.marketplace.search_url = format!("{}/search?category=Themes", MARKETPLACE);
    config.marketplace.scroll_timeout_ms = 50;
    config.paths.data_dir = root.join("data");
    config.paths.log_dir = root.join("log");
    config.paths.temp_dir = root.join("temp");
    config
}

fn write_jobs(config: &Config, jobs: &[String]) {
    JsonDocumentWriter::new(&config.paths.data_dir)
        .write(THEME_URLS_FILE, Document::JobList(jobs))
        .unwrap();
}

fn coordinator(config: Config, mode: RunMode, market: Marketplace) -> Coordinator {
    Coordinator::new(config, mode)
        .with_session_factory(Arc::new(FakeFactory {
            market: Arc::new(market),
        }))
        .without_progress()
}

#[tokio::test]
async fn test_one_theme_one_timeout() {
    let temp = TempDir::new().unwrap();
    let config = create_test_config(temp.path());
    let url_a = listing_url("pub.theme-a");
    let url_b = listing_url("pub.theme-b");
    write_jobs(&config, &[url_a.clone(), url_b.clone()]);

    let mut market = Marketplace::default();
    market.add(&url_a, theme_listing("Theme A"));
    // B renders a button but the download never lands
    market.add(
        &url_b,
        Listing {
            html: "<html><body>Loading...</body></html>".to_string(),
            button: true,
            archives: vec![],
        },
    );

    let data_dir = config.paths.data_dir.clone();
    let log_dir = config.paths.log_dir.clone();
    let temp_dir = config.paths.temp_dir.clone();
    let report = coordinator(config, RunMode::Normal, market)
        .run()
        .await
        .unwrap();

    let themes: Vec<ThemeRecord> = read_document(&data_dir.join(THEMES_FILE)).unwrap();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].display_name, "Theme A");
    assert_eq!(themes[0].ui_theme, "vs-dark");
    assert_eq!(themes[0].relative_path, "themes/theme.json");
    assert_eq!(themes[0].format, ThemeFormat::Json);
    assert_eq!(themes[0].contents["colors"]["editor.background"], "#1e1e1e");

    let failures: FailureIndex = read_document(&data_dir.join(PACKAGE_FAILURES_FILE)).unwrap();
    assert_eq!(failures.len(), 1);
    let (key, jobs) = failures.iter().next().unwrap();
    assert!(key.contains("timed out"), "unexpected key {}", key);
    assert_eq!(jobs, &vec![url_b.clone()]);

    let metadata: Vec<MetadataRecord> = read_document(&data_dir.join(METADATA_FILE)).unwrap();
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0].url, url_a);
    assert_eq!(metadata[0].install_count, 1_024);

    let metadata_failures: FailureIndex =
        read_document(&data_dir.join(METADATA_FAILURES_FILE)).unwrap();
    assert_eq!(metadata_failures.values().flatten().collect::<Vec<_>>(), vec![&url_b]);

    let packages = report.packages.unwrap();
    assert_eq!(packages.seeded, 2);
    assert_eq!(packages.popped, 2);
    assert_eq!(packages.completed, 1);
    assert_eq!(packages.failed, 1);
    assert_eq!(packages.records, 1);
    assert_eq!(packages.unprocessed(), 0);
    assert!(!report.interrupted);

    // Checkpoints were written and nothing was left behind in temp
    assert!(log_dir.join(METADATA_CHECKPOINT).is_file());
    assert!(log_dir.join(THEMES_CHECKPOINT).is_file());
    for worker_dir in fs::read_dir(&temp_dir).unwrap() {
        let worker_dir = worker_dir.unwrap().path();
        assert_eq!(fs::read_dir(&worker_dir).unwrap().count(), 0);
    }
}

#[tokio::test]
async fn test_every_job_lands_in_sink_or_ledger() {
    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.workers.package_analyzers = 4;

    let mut market = Marketplace::default();
    let mut jobs = Vec::new();
    for i in 0..24 {
        let url = listing_url(&format!("pub.item-{}", i));
        let listing = match i % 4 {
            0 => theme_listing(&format!("Theme {}", i)),
            1 => Listing {
                html: listing_html("Linter"),
                button: true,
                archives: vec![non_theme_package()],
            },
            2 => Listing {
                html: listing_html("Gone"),
                button: false,
                archives: vec![],
            },
            _ => Listing {
                html: listing_html("Twice"),
                button: true,
                archives: vec![json_theme_package("Twice"), json_theme_package("Twice")],
            },
        };
        market.add(&url, listing);
        jobs.push(url);
    }
    write_jobs(&config, &jobs);

    let data_dir = config.paths.data_dir.clone();
    let report = coordinator(config, RunMode::Normal, market)
        .run()
        .await
        .unwrap();

    for pool in [report.metadata.unwrap(), report.packages.clone().unwrap()] {
        assert_eq!(pool.abandoned, 0);
        assert_eq!(pool.popped, 24);
        assert_eq!(pool.completed + pool.failed, pool.popped);
    }

    let failures: FailureIndex = read_document(&data_dir.join(PACKAGE_FAILURES_FILE)).unwrap();
    assert_eq!(failures["[Analysis] Not a theme extension"].len(), 6);
    assert_eq!(failures["[Download] No button found"].len(), 6);
    assert_eq!(failures["[Download] Multiple files found"].len(), 6);

    let themes: Vec<ThemeRecord> = read_document(&data_dir.join(THEMES_FILE)).unwrap();
    assert_eq!(themes.len(), 6);
    assert_eq!(report.packages.unwrap().completed, 6);
}

#[tokio::test]
async fn test_retry_run_requeues_retryable_failures() {
    let temp = TempDir::new().unwrap();
    let config = create_test_config(temp.path());
    let url_b = listing_url("pub.theme-b");
    let url_c = listing_url("pub.not-a-theme");

    let writer = JsonDocumentWriter::new(&config.paths.data_dir);
    let mut previous = FailureIndex::new();
    previous.insert("[Download] Download timed out".to_string(), vec![url_b.clone()]);
    previous.insert(
        "[Analysis] Not a theme extension".to_string(),
        vec![url_c.clone()],
    );
    writer
        .write(PACKAGE_FAILURES_FILE, Document::Failures(&previous))
        .unwrap();

    let earlier_theme = ThemeRecord {
        display_name: "Earlier".to_string(),
        ui_theme: "vs".to_string(),
        relative_path: "themes/light.json".to_string(),
        format: ThemeFormat::Json,
        contents: serde_json::json!({"name": "light"}),
    };
    writer
        .write(THEMES_FILE, Document::Themes(&[earlier_theme.clone()]))
        .unwrap();

    let mut market = Marketplace::default();
    market.add(&url_b, theme_listing("Theme B"));

    let data_dir = config.paths.data_dir.clone();
    let report = coordinator(config, RunMode::RetryFailed, market)
        .run()
        .await
        .unwrap();

    assert!(report.metadata.is_none());
    let packages = report.packages.unwrap();
    assert_eq!(packages.seeded, 1);
    assert_eq!(packages.completed, 1);

    let themes: Vec<ThemeRecord> = read_document(&data_dir.join(THEMES_FILE)).unwrap();
    assert_eq!(themes.len(), 2);
    assert_eq!(themes[0].display_name, "Theme B");
    assert_eq!(themes[1], earlier_theme);

    // The terminal entry survives, the retried one is gone
    let failures: FailureIndex = read_document(&data_dir.join(PACKAGE_FAILURES_FILE)).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures["[Analysis] Not a theme extension"], vec![url_c]);
    assert!(!data_dir.join(METADATA_FILE).exists());
}

#[tokio::test]
async fn test_stopped_run_still_writes_outputs() {
    let temp = TempDir::new().unwrap();
    let config = create_test_config(temp.path());
    let url = listing_url("pub.theme-a");
    write_jobs(&config, &[url.clone()]);

    let mut market = Marketplace::default();
    market.add(&url, theme_listing("Theme A"));

    let data_dir = config.paths.data_dir.clone();
    let coordinator = coordinator(config, RunMode::Normal, market);
    coordinator.stop_handle().store(true, Ordering::SeqCst);
    let report = coordinator.run().await.unwrap();

    assert!(report.interrupted);
    let packages = report.packages.unwrap();
    assert_eq!(packages.popped, 0);
    assert_eq!(packages.unprocessed(), 1);

    let themes: Vec<ThemeRecord> = read_document(&data_dir.join(THEMES_FILE)).unwrap();
    assert!(themes.is_empty());
    let metadata: Vec<MetadataRecord> = read_document(&data_dir.join(METADATA_FILE)).unwrap();
    assert!(metadata.is_empty());
}

#[tokio::test]
async fn test_disabled_stages_are_skipped() {
    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.stages.analyze_packages = false;
    config.stages.checkpoint_metadata = false;
    let url = listing_url("pub.theme-a");
    write_jobs(&config, &[url.clone()]);

    let mut market = Marketplace::default();
    market.add(&url, theme_listing("Theme A"));

    let data_dir = config.paths.data_dir.clone();
    let log_dir = config.paths.log_dir.clone();
    let report = coordinator(config, RunMode::Normal, market)
        .run()
        .await
        .unwrap();

    assert!(report.packages.is_none());
    assert_eq!(report.metadata.unwrap().completed, 1);
    assert!(!data_dir.join(THEMES_FILE).exists());
    assert!(!log_dir.join(METADATA_CHECKPOINT).exists());
}

#[tokio::test]
async fn test_collect_listing_urls_scrolls_to_end() {
    let temp = TempDir::new().unwrap();
    let config = create_test_config(temp.path());

    let market = Arc::new(Marketplace {
        search_html: r#"<html><body>
            <a class="gallery-item-card-container" href="/items?itemName=pub.one">One</a>
            <a class="gallery-item-card-container" href="/items?itemName=pub.two">Two</a>
        </body></html>"#
            .to_string(),
        search_pages: 3,
        ..Marketplace::default()
    });
    let mut session = FakeFactory {
        market: Arc::clone(&market),
    }
    .open(None)
    .await
    .unwrap();

    let urls = collect_listing_urls(session.as_ref(), &config).await.unwrap();
    session.close().await.unwrap();

    assert_eq!(urls, vec![listing_url("pub.one"), listing_url("pub.two")]);
}
