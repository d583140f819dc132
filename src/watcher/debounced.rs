//! Debounced, glob-filtered filesystem watcher.

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked with each (debounced) changed path.
pub type ChangeHandler = Box<dyn Fn(&Path) + Send + Sync>;
/// Callback invoked with watcher errors.
pub type ErrorHandler = Box<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directory to observe, recursively
    pub root: PathBuf,
    /// Include globs, relative to the root; empty means everything
    pub include: Vec<String>,
    /// Exclude globs; a path matching one is dropped even when included
    pub exclude: Vec<String>,
    /// Quiet interval a path must reach before its callback fires
    pub debounce: Duration,
}

impl WatcherConfig {
    /// Watch everything under `root` with the default 100 ms debounce.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            debounce: Duration::from_millis(100),
        }
    }

    /// Set include globs.
    pub fn with_include(mut self, include: Vec<String>) -> Self {
        self.include = include;
        self
    }

    /// Set exclude globs.
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Set the debounce interval.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Debounced filesystem observer.
///
/// `start` blocks the calling thread until `stop`; rapid successive events
/// for one path coalesce into a single callback once the path has been
/// quiet for the debounce interval.
pub struct FileWatcher {
    config: WatcherConfig,
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    on_change: ChangeHandler,
    on_error: ErrorHandler,
    stopped: Arc<AtomicBool>,
}

impl FileWatcher {
    /// Create a watcher with its callbacks.
    pub fn new(
        config: WatcherConfig,
        on_change: ChangeHandler,
        on_error: ErrorHandler,
    ) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<glob::Pattern>> {
            patterns
                .iter()
                .map(|p| {
                    glob::Pattern::new(p).with_context(|| format!("Invalid glob pattern: {p}"))
                })
                .collect()
        };

        Ok(Self {
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
            config,
            on_change,
            on_error,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle for signalling `stop` from another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }

    /// Signal the running `start` loop to exit.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Release watcher resources. The OS watch is owned by the `start`
    /// loop, so closing is signalling it to exit; idempotent.
    pub fn close(&self) {
        self.stop();
    }

    /// Check whether a path passes the include/exclude filters.
    ///
    /// Exclusion wins over inclusion. Matching happens on the path
    /// relative to the watch root.
    pub fn matches(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.config.root).unwrap_or(path);

        if self.exclude.iter().any(|p| p.matches_path(relative)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.matches_path(relative))
    }

    /// Observe the root until `stop` is called.
    ///
    /// Events arriving while a path is still inside its debounce window
    /// push the window out; the callback fires once per quiet path.
    pub fn start(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(&self.config.root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", self.config.root.display()))?;

        tracing::debug!(root = %self.config.root.display(), "file watcher started");

        // Pending paths and the instant of their most recent event.
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        let tick = self.config.debounce.max(Duration::from_millis(10)) / 2;

        while !self.stopped.load(Ordering::SeqCst) {
            match rx.recv_timeout(tick) {
                Ok(Ok(event)) => {
                    let now = Instant::now();
                    for path in event.paths {
                        if self.matches(&path) {
                            pending.insert(path, now);
                        }
                    }
                }
                Ok(Err(e)) => {
                    let err = anyhow::Error::new(e).context("filesystem watcher error");
                    (self.on_error)(&err);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            let ready: Vec<PathBuf> = pending
                .iter()
                .filter(|&(_, &last)| now.duration_since(last) >= self.config.debounce)
                .map(|(path, _)| path.clone())
                .collect();
            for path in ready {
                pending.remove(&path);
                (self.on_change)(&path);
            }
        }

        tracing::debug!(root = %self.config.root.display(), "file watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn watcher_with(
        root: &Path,
        include: Vec<&str>,
        exclude: Vec<&str>,
    ) -> (Arc<FileWatcher>, Arc<Mutex<Vec<PathBuf>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let config = WatcherConfig::new(root)
            .with_include(include.into_iter().map(String::from).collect())
            .with_exclude(exclude.into_iter().map(String::from).collect())
            .with_debounce(Duration::from_millis(50));

        let watcher = FileWatcher::new(
            config,
            Box::new(move |path| {
                seen_clone.lock().unwrap().push(path.to_path_buf());
            }),
            Box::new(|e| eprintln!("watcher error: {e}")),
        )
        .unwrap();
        (Arc::new(watcher), seen)
    }

    fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        cond()
    }

    #[test]
    fn test_matching_include_exclude() {
        let dir = tempdir().unwrap();
        let (watcher, _) = watcher_with(
            dir.path(),
            vec!["**/*.rs"],
            vec!["**/tests/**", "**/*_mock.rs"],
        );

        assert!(watcher.matches(&dir.path().join("src/lib.rs")));
        assert!(!watcher.matches(&dir.path().join("src/tests/it.rs")));
        assert!(!watcher.matches(&dir.path().join("src/auth_mock.rs")));
        assert!(!watcher.matches(&dir.path().join("README.md")));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let dir = tempdir().unwrap();
        let (watcher, _) = watcher_with(dir.path(), vec!["**/*.rs"], vec!["**/*.rs"]);
        assert!(!watcher.matches(&dir.path().join("src/lib.rs")));
    }

    #[test]
    fn test_empty_include_matches_everything_not_excluded() {
        let dir = tempdir().unwrap();
        let (watcher, _) = watcher_with(dir.path(), vec![], vec!["**/*.log"]);
        assert!(watcher.matches(&dir.path().join("anything.txt")));
        assert!(!watcher.matches(&dir.path().join("debug.log")));
    }

    #[test]
    fn test_change_is_observed_and_stop_unblocks_start() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        let (watcher, seen) = watcher_with(dir.path(), vec!["**/*.rs"], vec![]);

        let runner = Arc::clone(&watcher);
        let handle = std::thread::spawn(move || runner.start());

        // Give the OS watch a moment to establish
        std::thread::sleep(Duration::from_millis(200));
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn x() {}").unwrap();

        assert!(
            wait_for(|| !seen.lock().unwrap().is_empty(), Duration::from_secs(5)),
            "expected a change callback"
        );

        watcher.stop();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_rapid_events_coalesce_per_path() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        let (watcher, seen) = watcher_with(dir.path(), vec!["**/*.rs"], vec![]);

        let runner = Arc::clone(&watcher);
        let handle = std::thread::spawn(move || runner.start());
        std::thread::sleep(Duration::from_millis(200));

        let file = dir.path().join("src/lib.rs");
        for i in 0..5 {
            std::fs::write(&file, format!("// rev {i}")).unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(
            wait_for(|| !seen.lock().unwrap().is_empty(), Duration::from_secs(5)),
            "expected a change callback"
        );
        // Let any stragglers inside the debounce window flush
        std::thread::sleep(Duration::from_millis(200));

        let count = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.ends_with("lib.rs"))
            .count();
        assert_eq!(count, 1, "rapid writes must coalesce into one callback");

        watcher.stop();
        handle.join().unwrap().unwrap();
    }
}
