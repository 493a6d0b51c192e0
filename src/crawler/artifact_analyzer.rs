//! Theme extraction from unpacked packages
//!
//! A package declares its color themes under `contributes.themes` in
//! `extension/package.json`. Manifests and JSON themes are hand-written and
//! routinely carry comments and trailing commas, so both go through `json5`.
//! TextMate themes are property lists and are converted to JSON values.

use crate::output::{ThemeFormat, ThemeRecord};
use serde_json::Value;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const MANIFEST_DIR: &str = "extension";
const MANIFEST_FILE: &str = "package.json";

/// Attempts made while a read fails before anything was collected
pub const MAX_ATTEMPTS: usize = 5;

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Why a package yielded no themes, or stopped yielding them
///
/// The display text is the ledger reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisFailure {
    #[error("Not a theme extension")]
    NotThemeExtension,

    #[error("Unknown file type")]
    UnknownFileType,

    #[error("{0}")]
    Unreadable(String),
}

/// Themes collected from one package, and the failure that stopped collection
///
/// Both may be set: an unknown or unreadable theme file ends the analysis
/// but keeps the themes read before it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisResult {
    pub records: Vec<ThemeRecord>,
    pub error: Option<AnalysisFailure>,
}

impl AnalysisResult {
    fn failed(records: Vec<ThemeRecord>, error: AnalysisFailure) -> Self {
        Self {
            records,
            error: Some(error),
        }
    }
}

/// Extracts every theme declared by the package unpacked at `unpacked`
///
/// Blocks on file I/O and sleeps between retries; call it from a blocking
/// context.
pub fn analyze(unpacked: &Path) -> AnalysisResult {
    let mut attempt = 1;
    loop {
        let result = analyze_once(unpacked);
        let retry = matches!(result.error, Some(AnalysisFailure::Unreadable(_)))
            && result.records.is_empty()
            && attempt < MAX_ATTEMPTS;
        if !retry {
            return result;
        }

        tracing::debug!(
            "Analysis of {} failed (attempt {}/{}): {:?}",
            unpacked.display(),
            attempt,
            MAX_ATTEMPTS,
            result.error
        );
        attempt += 1;
        thread::sleep(RETRY_DELAY);
    }
}

fn analyze_once(unpacked: &Path) -> AnalysisResult {
    let manifest_dir = unpacked.join(MANIFEST_DIR);
    let manifest = match read_json5(&manifest_dir.join(MANIFEST_FILE)) {
        Ok(manifest) => manifest,
        Err(e) => return AnalysisResult::failed(Vec::new(), e),
    };

    let Some(themes) = manifest
        .get("contributes")
        .and_then(|contributes| contributes.get("themes"))
        .and_then(Value::as_array)
    else {
        return AnalysisResult::failed(Vec::new(), AnalysisFailure::NotThemeExtension);
    };

    let display_name = manifest
        .get("displayName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| unpacked.display().to_string());

    let mut records = Vec::new();
    for theme in themes {
        let Some(path) = theme.get("path").and_then(Value::as_str) else {
            continue;
        };
        let relative_path = path.trim_start_matches("./");
        let theme_path = manifest_dir.join(relative_path);

        let Some(format) = theme_format(relative_path) else {
            tracing::debug!("Skipping {}, not a json or tmTheme file", relative_path);
            return AnalysisResult::failed(records, AnalysisFailure::UnknownFileType);
        };

        let contents = match format {
            ThemeFormat::Json => read_json5(&theme_path),
            ThemeFormat::TmTheme => read_plist(&theme_path),
        };
        let contents = match contents {
            Ok(contents) => contents,
            Err(e) => return AnalysisResult::failed(records, e),
        };

        records.push(ThemeRecord {
            display_name: display_name.clone(),
            ui_theme: theme
                .get("uiTheme")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            relative_path: relative_path.to_string(),
            format,
            contents,
        });
    }

    AnalysisResult {
        records,
        error: None,
    }
}

fn theme_format(relative_path: &str) -> Option<ThemeFormat> {
    if relative_path.ends_with(".json") {
        Some(ThemeFormat::Json)
    } else if relative_path.to_ascii_lowercase().ends_with(".tmtheme") {
        Some(ThemeFormat::TmTheme)
    } else {
        None
    }
}

fn read_json5(path: &Path) -> Result<Value, AnalysisFailure> {
    let text = fs::read_to_string(path).map_err(|e| unreadable(path, e))?;
    json5::from_str(text.trim_start_matches('\u{feff}')).map_err(|e| unreadable(path, e))
}

fn read_plist(path: &Path) -> Result<Value, AnalysisFailure> {
    let bytes = fs::read(path).map_err(|e| unreadable(path, e))?;
    let plist =
        plist::Value::from_reader(Cursor::new(bytes)).map_err(|e| unreadable(path, e))?;
    serde_json::to_value(plist).map_err(|e| unreadable(path, e))
}

fn unreadable(path: &Path, error: impl std::fmt::Display) -> AnalysisFailure {
    AnalysisFailure::Unreadable(format!("{}: {}", path.display(), error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{is_terminal_reason, NOT_A_THEME_EXTENSION};
    use tempfile::TempDir;

    const TM_THEME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>name</key>
    <string>Monokai</string>
    <key>settings</key>
    <array>
        <dict>
            <key>settings</key>
            <dict>
                <key>background</key>
                <string>#272822</string>
            </dict>
        </dict>
    </array>
</dict>
</plist>
"#;

    fn package(manifest: &str, files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        let extension = temp.path().join(MANIFEST_DIR);
        fs::create_dir_all(&extension).unwrap();
        fs::write(extension.join(MANIFEST_FILE), manifest).unwrap();
        for (path, contents) in files {
            let path = extension.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        temp
    }

    #[test]
    fn test_json_and_tmtheme_themes() {
        let temp = package(
            r#"{
                // manifests may carry comments
                "displayName": "Monokai Pro",
                "contributes": {
                    "themes": [
                        {"label": "Dark", "uiTheme": "vs-dark", "path": "./themes/dark.json"},
                        {"label": "Classic", "path": "./themes/Classic.tmTheme"},
                    ],
                },
            }"#,
            &[
                (
                    "themes/dark.json",
                    r##"{"colors": {"editor.background": "#2d2a2e",},}"##,
                ),
                ("themes/Classic.tmTheme", TM_THEME),
            ],
        );

        let result = analyze(temp.path());
        assert_eq!(result.error, None);
        assert_eq!(result.records.len(), 2);

        let dark = &result.records[0];
        assert_eq!(dark.display_name, "Monokai Pro");
        assert_eq!(dark.ui_theme, "vs-dark");
        assert_eq!(dark.relative_path, "themes/dark.json");
        assert_eq!(dark.format, ThemeFormat::Json);
        assert_eq!(dark.contents["colors"]["editor.background"], "#2d2a2e");

        let classic = &result.records[1];
        assert_eq!(classic.ui_theme, "");
        assert_eq!(classic.format, ThemeFormat::TmTheme);
        assert_eq!(classic.contents["name"], "Monokai");
        assert_eq!(
            classic.contents["settings"][0]["settings"]["background"],
            "#272822"
        );
    }

    #[test]
    fn test_analysis_is_repeatable() {
        let temp = package(
            r#"{"contributes": {"themes": [{"path": "t.json"}]}}"#,
            &[("t.json", r#"{"name": "t"}"#)],
        );

        assert_eq!(analyze(temp.path()), analyze(temp.path()));
    }

    #[test]
    fn test_display_name_falls_back_to_path() {
        let temp = package(
            r#"{"contributes": {"themes": [{"path": "t.json"}]}}"#,
            &[("t.json", "{}")],
        );

        let result = analyze(temp.path());
        assert_eq!(
            result.records[0].display_name,
            temp.path().display().to_string()
        );
    }

    #[test]
    fn test_not_a_theme_extension() {
        let temp = package(r#"{"contributes": {"commands": []}}"#, &[]);

        let result = analyze(temp.path());
        assert!(result.records.is_empty());
        let error = result.error.unwrap();
        assert_eq!(error.to_string(), NOT_A_THEME_EXTENSION);
        assert!(is_terminal_reason(&error.to_string()));
    }

    #[test]
    fn test_unknown_file_type_keeps_earlier_records() {
        let temp = package(
            r#"{"contributes": {"themes": [
                {"path": "./a.json"},
                {"path": "./b.yaml"},
                {"path": "./c.json"}
            ]}}"#,
            &[("a.json", "{}"), ("b.yaml", "name: b"), ("c.json", "{}")],
        );

        let result = analyze(temp.path());
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].relative_path, "a.json");
        assert_eq!(result.error, Some(AnalysisFailure::UnknownFileType));
    }

    #[test]
    fn test_entries_without_path_are_skipped() {
        let temp = package(
            r#"{"contributes": {"themes": [{"label": "no path"}, {"path": "a.json"}]}}"#,
            &[("a.json", "{}")],
        );

        let result = analyze(temp.path());
        assert_eq!(result.error, None);
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn test_unreadable_theme_file() {
        let temp = package(
            r#"{"contributes": {"themes": [{"path": "a.json"}, {"path": "missing.json"}]}}"#,
            &[("a.json", "{}")],
        );

        let result = analyze(temp.path());
        assert_eq!(result.records.len(), 1);
        assert!(matches!(result.error, Some(AnalysisFailure::Unreadable(_))));
    }

    #[test]
    fn test_missing_manifest_is_retryable() {
        let temp = TempDir::new().unwrap();

        let result = analyze(temp.path());
        assert!(result.records.is_empty());
        let error = result.error.unwrap();
        assert!(!is_terminal_reason(&error.to_string()));
        assert!(error.to_string().contains(MANIFEST_FILE));
    }

    #[test]
    fn test_late_manifest_is_picked_up_on_retry() {
        let temp = TempDir::new().unwrap();
        let extension = temp.path().join(MANIFEST_DIR);
        fs::create_dir_all(&extension).unwrap();
        fs::write(extension.join("t.json"), r#"{"name": "late"}"#).unwrap();

        let writer = {
            let manifest = extension.join(MANIFEST_FILE);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                fs::write(manifest, r#"{"contributes": {"themes": [{"path": "t.json"}]}}"#)
                    .unwrap();
            })
        };

        let result = analyze(temp.path());
        writer.join().unwrap();

        assert_eq!(result.error, None);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].contents["name"], "late");
    }

    #[test]
    fn test_failure_after_records_is_not_retried() {
        let temp = package(
            r#"{"contributes": {"themes": [{"path": "a.json"}, {"path": "late.json"}]}}"#,
            &[("a.json", "{}")],
        );

        let writer = {
            let late = temp.path().join(MANIFEST_DIR).join("late.json");
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                fs::write(late, "{}").unwrap();
            })
        };

        let result = analyze(temp.path());
        writer.join().unwrap();

        assert_eq!(result.records.len(), 1);
        assert!(matches!(result.error, Some(AnalysisFailure::Unreadable(_))));
    }

    #[test]
    fn test_json_theme_survives_reserialization() {
        let temp = package(
            r#"{"contributes": {"themes": [{"path": "t.json"}]}}"#,
            &[(
                "t.json",
                r#"{"tokenColors": [{"scope": ["comment"], "settings": {"fontStyle": "italic"}}]}"#,
            )],
        );

        let record = analyze(temp.path()).records.remove(0);
        let reparsed: ThemeRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(reparsed.contents, record.contents);
    }
}
