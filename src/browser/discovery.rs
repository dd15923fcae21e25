use std::path::PathBuf;

use crate::error::{PresenceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Chromium,
    Brave,
    Edge,
}

impl BrowserKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "Google Chrome",
            BrowserKind::Chromium => "Chromium",
            BrowserKind::Brave => "Brave",
            BrowserKind::Edge => "Microsoft Edge",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub kind: BrowserKind,
    pub path: PathBuf,
}

/// Find a Chromium-family browser the session can drive: well-known install
/// locations first, then whatever is on PATH.
pub fn discover_browser() -> Result<BrowserInfo> {
    for (kind, paths) in browser_candidates() {
        for path in paths {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(BrowserInfo { kind, path });
            }
        }
    }

    for (kind, name) in [
        (BrowserKind::Chrome, "google-chrome"),
        (BrowserKind::Chrome, "google-chrome-stable"),
        (BrowserKind::Chromium, "chromium"),
        (BrowserKind::Chromium, "chromium-browser"),
    ] {
        if let Ok(path) = which::which(name) {
            return Ok(BrowserInfo { kind, path });
        }
    }

    Err(PresenceError::BrowserNotFound)
}

fn browser_candidates() -> Vec<(BrowserKind, Vec<&'static str>)> {
    #[cfg(target_os = "macos")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec!["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"],
            ),
            (
                BrowserKind::Chromium,
                vec!["/Applications/Chromium.app/Contents/MacOS/Chromium"],
            ),
            (
                BrowserKind::Brave,
                vec!["/Applications/Brave Browser.app/Contents/MacOS/Brave Browser"],
            ),
            (
                BrowserKind::Edge,
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
            ),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec![
                    "/usr/bin/google-chrome",
                    "/usr/bin/google-chrome-stable",
                    "/opt/google/chrome/chrome",
                ],
            ),
            (
                BrowserKind::Chromium,
                vec![
                    "/usr/bin/chromium",
                    "/usr/bin/chromium-browser",
                    "/snap/bin/chromium",
                ],
            ),
            (
                BrowserKind::Brave,
                vec!["/usr/bin/brave-browser", "/usr/bin/brave"],
            ),
            (
                BrowserKind::Edge,
                vec!["/usr/bin/microsoft-edge", "/usr/bin/microsoft-edge-stable"],
            ),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ],
            ),
            (
                BrowserKind::Edge,
                vec![
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                ],
            ),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        assert_eq!(BrowserKind::Chrome.name(), "Google Chrome");
        assert_eq!(BrowserKind::Edge.name(), "Microsoft Edge");
    }

    #[test]
    fn discovery_reports_existing_paths_only() {
        if let Ok(info) = discover_browser() {
            assert!(info.path.exists());
        }
    }
}
