//! Page navigation targets.
//!
//! The auth operations finish by sending the user somewhere else: to the
//! backend's authorization page, or back to the application root. A
//! `Navigator` decides what "go to this URL" means for the host.

use parking_lot::Mutex;
use tracing::{info, warn};

pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// Opens URLs in the user's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Navigator for SystemBrowser {
    fn navigate(&self, url: &str) {
        info!(url, "Opening browser");
        if let Err(e) = open::that(url) {
            warn!(error = %e, url, "Failed to open browser; visit the URL manually");
        }
    }
}

/// Remembers every URL it was asked to visit.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.visited.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        self.visited.lock().push(url.to_string());
    }
}
