//! The per-app review-app registry (`.git/flashpointrepos`).
//!
//! The registry is a git config fragment pulled into `.git/config` through an
//! `[include]` directive, so every review app is also a usable git remote.
//! Each entry is one fixed-shape block:
//!
//! ```text
//!
//! #DO NOT MANUALLY EDIT THESE IN ANY WAY
//! [remote "<name>"]
//!   url = https://git.heroku.com/<name>.git
//!   fetch = +refs/heads/*:refs/remotes/<name>/*
//! ```
//!
//! Grammar (blank lines between blocks are ignored):
//!
//! ```text
//! registry := block*
//! block    := MARKER HEADER URL FETCH
//! MARKER   := "#DO NOT MANUALLY EDIT THESE IN ANY WAY"
//! HEADER   := "[remote \"" name "\"]"
//! URL      := ws "url = " text
//! FETCH    := ws "fetch = " text
//! ```
//!
//! Anything else is reported as [`FlashpointError::RegistryCorruption`] and the
//! file is left untouched. Provisioning only ever appends; reclamation parses,
//! drops records and writes the survivors back. Both hold an advisory lock on
//! `<registry>.lock` while they work.

use crate::error::{FlashpointError, Result};
use crate::{io, paths};
use fs2::FileExt;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

pub const ENTRY_MARKER: &str = "#DO NOT MANUALLY EDIT THESE IN ANY WAY";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub url: String,
    pub fetch: String,
}

impl RegistryEntry {
    /// The entry written for a freshly forked review app.
    pub fn for_review_app(name: &str) -> Self {
        Self {
            name: name.to_string(),
            url: paths::app_git_url(name),
            fetch: format!("+refs/heads/*:refs/remotes/{name}/*"),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "\n{ENTRY_MARKER}\n[remote \"{}\"]\n  url = {}\n  fetch = {}\n",
            self.name, self.url, self.fetch
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    pub entries: Vec<RegistryEntry>,
}

static HEADER_RE: OnceLock<Regex> = OnceLock::new();
static URL_RE: OnceLock<Regex> = OnceLock::new();
static FETCH_RE: OnceLock<Regex> = OnceLock::new();

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| Regex::new(r#"^\[remote "(.+)"\]$"#).expect("header regex is valid"))
}

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r"^\s+url = (\S+)$").expect("url regex is valid"))
}

fn fetch_re() -> &'static Regex {
    FETCH_RE.get_or_init(|| Regex::new(r"^\s+fetch = (\S+)$").expect("fetch regex is valid"))
}

impl Registry {
    /// Parse registry text. `path` is only used for error reporting.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let corrupt = |line: usize, reason: String| FlashpointError::RegistryCorruption {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut lines = content
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end()))
            .filter(|(_, l)| !l.is_empty());
        let mut entries = Vec::new();

        while let Some((n, marker)) = lines.next() {
            if marker != ENTRY_MARKER {
                return Err(corrupt(n, format!("expected '{ENTRY_MARKER}', found '{marker}'")));
            }

            let (n, header) = lines
                .next()
                .ok_or_else(|| corrupt(n, "entry ends after the marker line".into()))?;
            let name = header_re()
                .captures(header)
                .map(|c| c[1].to_string())
                .ok_or_else(|| corrupt(n, format!("expected a remote header, found '{header}'")))?;

            let (n, url_line) = lines
                .next()
                .ok_or_else(|| corrupt(n, format!("remote '{name}' has no url line")))?;
            let url = url_re()
                .captures(url_line)
                .map(|c| c[1].to_string())
                .ok_or_else(|| corrupt(n, format!("expected a url line, found '{url_line}'")))?;

            let (n, fetch_line) = lines
                .next()
                .ok_or_else(|| corrupt(n, format!("remote '{name}' has no fetch line")))?;
            let fetch = fetch_re()
                .captures(fetch_line)
                .map(|c| c[1].to_string())
                .ok_or_else(|| corrupt(n, format!("expected a fetch line, found '{fetch_line}'")))?;

            entries.push(RegistryEntry { name, url, fetch });
        }

        Ok(Self { entries })
    }

    pub fn render(&self) -> String {
        self.entries.iter().map(RegistryEntry::render).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Drop every entry whose name is in `names`. Returns the dropped names in
    /// file order.
    pub fn remove(&mut self, names: &HashSet<String>) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if names.contains(&e.name) {
                removed.push(e.name.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

/// Advisory lock on `<registry>.lock`, released on drop.
struct RegistryLock {
    _file: File,
}

impl RegistryLock {
    fn open(registry: &Path) -> Result<File> {
        let lock_path = paths::registry_lock_path(registry);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        Ok(file)
    }

    fn exclusive(registry: &Path) -> Result<Self> {
        let file = Self::open(registry)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }

    fn shared(registry: &Path) -> Result<Self> {
        let file = Self::open(registry)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { _file: file })
    }
}

// ---------------------------------------------------------------------------
// File operations
// ---------------------------------------------------------------------------

/// Make sure the git config at `git_config` includes the registry fragment.
/// Returns true if the directive was added.
pub fn ensure_include_directive(git_config: &Path) -> Result<bool> {
    let marker = format!("path = ./{}", paths::REGISTRY_FILE);
    let block = format!("[include]\n  {marker}\n");
    let added = io::append_unless_present(git_config, &marker, &block)?;
    if added {
        tracing::debug!(config = %git_config.display(), "added registry include directive");
    }
    Ok(added)
}

/// Append one entry, creating the registry if needed. Existing bytes are
/// never rewritten.
pub fn append_entry(registry: &Path, entry: &RegistryEntry) -> Result<()> {
    let _lock = RegistryLock::exclusive(registry)?;
    io::append_text(registry, &entry.render())?;
    tracing::debug!(registry = %registry.display(), name = %entry.name, "registered review app");
    Ok(())
}

/// Load and parse the registry. A missing file is an empty registry.
pub fn load(registry: &Path) -> Result<Registry> {
    if !registry.exists() {
        return Ok(Registry::default());
    }
    let _lock = RegistryLock::shared(registry)?;
    let content = io::read_or_empty(registry)?;
    Registry::parse(registry, &content)
}

/// Names of every registered review app, in file order.
pub fn list_entries(registry: &Path) -> Result<Vec<String>> {
    Ok(load(registry)?.names())
}

/// Remove the named entries and rewrite the registry in one pass.
/// Names that are not registered are ignored. Returns the names removed.
pub fn remove_entries(registry: &Path, names: &HashSet<String>) -> Result<Vec<String>> {
    if !registry.exists() || names.is_empty() {
        return Ok(Vec::new());
    }
    let _lock = RegistryLock::exclusive(registry)?;
    let content = io::read_or_empty(registry)?;
    let mut parsed = Registry::parse(registry, &content)?;
    let removed = parsed.remove(names);
    if removed.len() < names.len() {
        let missing: Vec<&String> = names.iter().filter(|n| !removed.contains(n)).collect();
        tracing::debug!(registry = %registry.display(), ?missing, "names not present in registry");
    }
    if !removed.is_empty() {
        io::atomic_write(registry, parsed.render().as_bytes())?;
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> PathBuf {
        paths::registry_path(dir.path())
    }

    fn append_all(path: &Path, names: &[&str]) {
        for name in names {
            append_entry(path, &RegistryEntry::for_review_app(name)).unwrap();
        }
    }

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn entry_renders_fixed_block() {
        let block = RegistryEntry::for_review_app("a1b2c3d-web").render();
        assert_eq!(
            block,
            "\n#DO NOT MANUALLY EDIT THESE IN ANY WAY\n\
             [remote \"a1b2c3d-web\"]\n\
             \x20 url = https://git.heroku.com/a1b2c3d-web.git\n\
             \x20 fetch = +refs/heads/*:refs/remotes/a1b2c3d-web/*\n"
        );
    }

    #[test]
    fn missing_registry_lists_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(list_entries(&registry_in(&dir)).unwrap().is_empty());
        assert!(!registry_in(&dir).exists());
    }

    #[test]
    fn list_returns_names_in_append_order() {
        let dir = TempDir::new().unwrap();
        let path = registry_in(&dir);
        append_all(&path, &["a111111-web", "a222222-api", "a333333-worker"]);
        assert_eq!(
            list_entries(&path).unwrap(),
            vec!["a111111-web", "a222222-api", "a333333-worker"]
        );
    }

    #[test]
    fn append_never_rewrites_existing_bytes() {
        let dir = TempDir::new().unwrap();
        let path = registry_in(&dir);
        append_all(&path, &["a111111-web"]);
        let before = std::fs::read_to_string(&path).unwrap();
        append_all(&path, &["a222222-web"]);
        let after = std::fs::read_to_string(&path).unwrap();
        assert!(after.starts_with(&before));
    }

    #[test]
    fn remove_subset_preserves_survivor_order() {
        let dir = TempDir::new().unwrap();
        let path = registry_in(&dir);
        append_all(&path, &["a1-one", "a2-two", "a3-three", "a4-four"]);
        let removed = remove_entries(&path, &set(&["a2-two", "a4-four"])).unwrap();
        assert_eq!(removed, vec!["a2-two", "a4-four"]);
        assert_eq!(list_entries(&path).unwrap(), vec!["a1-one", "a3-three"]);
    }

    #[test]
    fn remove_everything_leaves_empty_registry() {
        let dir = TempDir::new().unwrap();
        let path = registry_in(&dir);
        append_all(&path, &["a1-one", "a2-two"]);
        remove_entries(&path, &set(&["a1-one", "a2-two"])).unwrap();
        assert!(list_entries(&path).unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn remove_unknown_name_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = registry_in(&dir);
        append_all(&path, &["a1-one"]);
        let before = std::fs::read_to_string(&path).unwrap();
        assert!(remove_entries(&path, &set(&["a9-nine"])).unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn name_that_prefixes_another_is_not_confused() {
        let dir = TempDir::new().unwrap();
        let path = registry_in(&dir);
        append_all(&path, &["a1-web", "a1-web-admin"]);
        remove_entries(&path, &set(&["a1-web"])).unwrap();
        assert_eq!(list_entries(&path).unwrap(), vec!["a1-web-admin"]);
    }

    #[test]
    fn corrupt_registry_is_reported_and_untouched() {
        let dir = TempDir::new().unwrap();
        let path = registry_in(&dir);
        append_all(&path, &["a1-one"]);
        // A hand-edited block missing its fetch line.
        io::append_text(
            &path,
            "\n#DO NOT MANUALLY EDIT THESE IN ANY WAY\n[remote \"a2-two\"]\n  url = x\n",
        )
        .unwrap();
        append_all(&path, &["a3-three"]);
        let before = std::fs::read_to_string(&path).unwrap();

        let err = remove_entries(&path, &set(&["a1-one"])).unwrap_err();
        match err {
            FlashpointError::RegistryCorruption { line, reason, .. } => {
                assert_eq!(line, 11);
                assert!(reason.contains("fetch"), "{reason}");
            }
            other => panic!("expected corruption, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(list_entries(&path).is_err());
    }

    #[test]
    fn stray_line_is_corruption() {
        let err = Registry::parse(Path::new("r"), "[remote \"x\"]\n").unwrap_err();
        assert!(matches!(err, FlashpointError::RegistryCorruption { line: 1, .. }));
    }

    #[test]
    fn parse_tolerates_missing_blank_separators() {
        let text = "#DO NOT MANUALLY EDIT THESE IN ANY WAY\n[remote \"a\"]\n\turl = u\n\tfetch = f\n\
                    #DO NOT MANUALLY EDIT THESE IN ANY WAY\n[remote \"b\"]\n\turl = u\n\tfetch = f";
        let reg = Registry::parse(Path::new("r"), text).unwrap();
        assert_eq!(reg.names(), vec!["a", "b"]);
    }

    #[test]
    fn include_directive_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = paths::git_config_path(dir.path());
        std::fs::create_dir_all(config.parent().unwrap()).unwrap();
        std::fs::write(&config, "[core]\n\trepositoryformatversion = 0\n").unwrap();

        assert!(ensure_include_directive(&config).unwrap());
        let first = std::fs::read(&config).unwrap();
        assert!(!ensure_include_directive(&config).unwrap());
        let second = std::fs::read(&config).unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(second).unwrap();
        assert!(text.starts_with("[core]\n\trepositoryformatversion = 0\n"));
        assert!(text.ends_with("[include]\n  path = ./flashpointrepos\n"));
    }
}
