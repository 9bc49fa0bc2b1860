//! Chromium-family browser discovery and command-line construction
//!
//! Discovery walks a per-platform list of install locations (stable Chrome,
//! Edge, Brave, Chromium; package-manager, snap and flatpak locations on
//! Linux), prefers the user's registered default browser when it is one of
//! them, then falls back to a `PATH` lookup of each candidate's base name.
//! Not finding anything is not an error: the caller degrades to the OS opener.

use std::path::{Path, PathBuf};

use webgui_core::prelude::*;
use webgui_core::Platform;

use crate::process::ProcessCommand;

/// Ordered install locations to probe on `platform`
pub fn candidate_paths(platform: Platform) -> Vec<PathBuf> {
    match platform {
        Platform::Linux | Platform::Other => [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/microsoft-edge-stable",
            "/usr/bin/microsoft-edge",
            "/usr/bin/brave-browser",
            "/usr/bin/brave",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/snap/bin/brave",
            "/var/lib/flatpak/exports/bin/com.google.Chrome",
            "/var/lib/flatpak/exports/bin/com.microsoft.Edge",
            "/var/lib/flatpak/exports/bin/com.brave.Browser",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .collect(),
        Platform::MacOS => [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .collect(),
        Platform::Windows => {
            let mut paths: Vec<PathBuf> = [
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
                r"C:\Program Files\Chromium\Application\chrome.exe",
            ]
            .iter()
            .map(PathBuf::from)
            .collect();

            // Per-user installs
            if let Some(local) = std::env::var_os("LOCALAPPDATA") {
                let local = PathBuf::from(local);
                paths.push(local.join(r"Google\Chrome\Application\chrome.exe"));
                paths.push(local.join(r"BraveSoftware\Brave-Browser\Application\brave.exe"));
                paths.push(local.join(r"Chromium\Application\chrome.exe"));
            }
            paths
        }
    }
}

/// Ask the desktop environment which browser is the default.
///
/// Only Linux exposes this cheaply (`xdg-settings`); elsewhere returns `None`.
pub fn default_browser_hint() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let output = std::process::Command::new("xdg-settings")
            .args(["get", "default-web-browser"])
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .output()
            .inspect_err(|e| debug!("xdg-settings check failed: {}", e))
            .ok()?;
        let hint = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (output.status.success() && !hint.is_empty()).then_some(hint)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Browser discovery over an ordered candidate list
#[derive(Debug, Clone)]
pub struct BrowserLocator {
    candidates: Vec<PathBuf>,
    default_hint: Option<String>,
}

impl BrowserLocator {
    pub fn for_platform(platform: Platform) -> Self {
        Self::with_candidates(candidate_paths(platform))
    }

    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            default_hint: None,
        }
    }

    /// Prefer the candidate matching the OS default browser (e.g. `brave-browser.desktop`)
    pub fn with_default_hint(mut self, hint: Option<String>) -> Self {
        self.default_hint = hint;
        self
    }

    /// Locate against the real filesystem and `PATH`
    pub fn locate(&self) -> Option<PathBuf> {
        self.locate_with(|p| p.is_file(), |name| which::which(name).ok())
    }

    /// Locate with injectable existence and `PATH` lookups
    pub fn locate_with<E, W>(&self, exists: E, which: W) -> Option<PathBuf>
    where
        E: Fn(&Path) -> bool,
        W: Fn(&str) -> Option<PathBuf>,
    {
        let existing: Vec<&PathBuf> = self.candidates.iter().filter(|p| exists(p)).collect();

        if let Some(hint) = &self.default_hint {
            if let Some(preferred) = existing.iter().find(|p| matches_hint(p, hint)) {
                debug!("Preferring default browser {}", preferred.display());
                return Some((*preferred).clone());
            }
        }

        if let Some(first) = existing.first() {
            return Some((*first).clone());
        }

        let mut tried: Vec<&str> = Vec::new();
        for candidate in &self.candidates {
            let Some(name) = candidate.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if tried.contains(&name) {
                continue;
            }
            tried.push(name);

            if let Some(found) = which(name) {
                debug!("Found {} on PATH at {}", name, found.display());
                return Some(dunce::simplified(&found).to_path_buf());
            }
        }

        None
    }
}

/// Locate a browser for the current platform, honouring the default browser
pub fn find_browser() -> Option<PathBuf> {
    let found = BrowserLocator::for_platform(Platform::current())
        .with_default_hint(default_browser_hint())
        .locate();
    match &found {
        Some(path) => info!("Browser detected at {}", path.display()),
        None => warn!("No Chromium-family browser found, falling back to the default browser"),
    }
    found
}

/// Loose match between a candidate path and a default-browser identifier
fn matches_hint(candidate: &Path, hint: &str) -> bool {
    fn normalize(s: &str) -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }

    let hint = normalize(hint.trim_end_matches(".desktop"));
    let name = candidate
        .file_stem()
        .and_then(|n| n.to_str())
        .map(normalize)
        .unwrap_or_default();

    !hint.is_empty() && !name.is_empty() && (name.contains(&hint) || hint.contains(&name))
}

/// Window and URL settings for the browser command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserOptions {
    pub url: String,
    pub profile_dir: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fullscreen: bool,
    pub maximized: bool,
    pub app_mode: bool,
    pub extra_flags: Vec<String>,
}

/// Fully resolved browser invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserCommand {
    /// A located browser spawned directly; its exit means the window closed
    Direct(ProcessCommand),
    /// The OS opener handing the URL to the default browser; exits immediately
    DefaultBrowser(ProcessCommand),
}

impl BrowserCommand {
    /// Build the command for `browser`, or the OS-opener fallback when `None`
    pub fn derive(browser: Option<&Path>, options: &BrowserOptions, platform: Platform) -> Self {
        match browser {
            Some(path) => Self::Direct(ProcessCommand::new(path).args(browser_flags(options))),
            None => Self::DefaultBrowser(default_opener(&options.url, platform)),
        }
    }

    /// Use a caller-supplied argv verbatim (program first)
    pub fn custom(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::config("browser command must not be empty"))?;
        if program.trim().is_empty() {
            return Err(Error::config("browser command has an empty program"));
        }
        Ok(Self::Direct(ProcessCommand::new(program).args(args.iter().cloned())))
    }

    pub fn process_command(&self) -> &ProcessCommand {
        match self {
            BrowserCommand::Direct(cmd) | BrowserCommand::DefaultBrowser(cmd) => cmd,
        }
    }

    pub fn argv(&self) -> Vec<String> {
        self.process_command().argv()
    }

    /// Whether the spawned process tracks the window's lifetime
    pub fn is_direct(&self) -> bool {
        matches!(self, BrowserCommand::Direct(_))
    }
}

/// Flags for an isolated, chromeless window
fn browser_flags(options: &BrowserOptions) -> Vec<String> {
    let mut flags = vec![
        format!("--user-data-dir={}", options.profile_dir.display()),
        "--new-window".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-sync".to_string(),
    ];

    match (options.width, options.height) {
        (Some(w), Some(h)) => flags.push(format!("--window-size={},{}", w, h)),
        _ if options.fullscreen => flags.push("--start-fullscreen".to_string()),
        _ if options.maximized => flags.push("--start-maximized".to_string()),
        _ => {}
    }

    flags.extend(options.extra_flags.iter().cloned());

    if options.app_mode {
        flags.push(format!("--app={}", options.url));
    } else {
        flags.push(options.url.clone());
    }
    flags
}

/// OS-level "open this URL in the default browser"
fn default_opener(url: &str, platform: Platform) -> ProcessCommand {
    match platform {
        Platform::Windows => ProcessCommand::new("cmd").args(["/C", "start", "", url]),
        Platform::MacOS => ProcessCommand::new("open").arg(url),
        Platform::Linux | Platform::Other => ProcessCommand::new("xdg-open").arg(url),
    }
}

/// Throwaway user-data directory for one session
pub fn default_profile_dir(port: u16) -> PathBuf {
    std::env::temp_dir().join(format!("webgui-{}-{}", std::process::id(), port))
}

/// Remove a profile directory; a directory that was never created is fine
pub fn remove_profile_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("Removed profile directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing profile {}", path.display())),
    }
}
