//! Sentinel-file marking of directories selected for backup.
//!
//! A directory is marked iff a file named after the configured sentinel
//! exists directly inside it. Marking policies only choose directories;
//! the sentinel itself carries no content.

use regex::Regex;
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, ZipdirError};

/// Directory names matching this pattern are skipped by every policy,
/// together with everything below them.
#[derive(Debug, Clone)]
pub struct ExcludePattern(Regex);

impl ExcludePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| ZipdirError::Config(format!("invalid exclude pattern: {}", e)))
    }

    pub fn matches(&self, name: &OsStr) -> bool {
        self.0.is_match(&name.to_string_lossy())
    }
}

#[derive(Debug, Clone)]
pub struct Marker {
    sentinel: String,
}

impl Marker {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self { sentinel: sentinel.into() }
    }

    /// Every marked directory under `root`, root included.
    ///
    /// The returned value walks lazily and can be iterated any number of times.
    pub fn list_marked(&self, root: &Path) -> Result<MarkedDirs> {
        let root = fs::canonicalize(root)?;
        Ok(MarkedDirs { root, sentinel: self.sentinel.clone() })
    }

    /// Remove the sentinel from every marked directory under `root`.
    pub fn clear_marks(&self, root: &Path) -> Result<usize> {
        let marked: Vec<PathBuf> = self.list_marked(root)?.iter().collect();
        for dir in &marked {
            let path = dir.join(&self.sentinel);
            match fs::remove_file(&path) {
                Ok(()) => debug!(dir = %dir.display(), "mark removed"),
                // Someone beat us to it
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(marked.len())
    }

    /// Place the sentinel in each directory; already-marked ones are left alone.
    /// Returns how many marks were newly created.
    pub fn mark<I, P>(&self, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut created = 0;
        for path in paths {
            let dir = path.as_ref();
            if !dir.is_dir() {
                return Err(ZipdirError::Precondition(format!(
                    "cannot mark {}: not a directory",
                    dir.display()
                )));
            }
            let sentinel = dir.join(&self.sentinel);
            if sentinel.is_file() {
                continue;
            }
            // append keeps any existing content untouched
            OpenOptions::new().create(true).append(true).open(&sentinel)?;
            debug!(dir = %dir.display(), "marked");
            created += 1;
        }
        Ok(created)
    }

    /// Mark every immediate child directory of `root` not matching `exclude`.
    pub fn mark_top_level_children(&self, root: &Path, exclude: &ExcludePattern) -> Result<Vec<PathBuf>> {
        require_absolute_dir(root)?;
        let mut selected = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && !exclude.matches(&entry.file_name()) {
                selected.push(entry.path());
            }
        }
        self.mark(&selected)?;
        Ok(selected)
    }

    /// Mark every directory below `root` that has no subdirectories.
    pub fn mark_leaf_directories(&self, root: &Path, exclude: &ExcludePattern) -> Result<Vec<PathBuf>> {
        require_absolute_dir(root)?;
        let mut selected = Vec::new();
        for dir in policy_candidates(root, exclude) {
            let dir = dir?;
            if subdirectory_count(&dir)? == 0 {
                selected.push(dir);
            }
        }
        self.mark(&selected)?;
        Ok(selected)
    }

    /// Mark every directory below `root` holding at least `max_entries`
    /// immediate entries. The sentinel itself is not counted.
    pub fn mark_directories_over_threshold(
        &self,
        root: &Path,
        max_entries: usize,
        exclude: &ExcludePattern,
    ) -> Result<Vec<PathBuf>> {
        require_absolute_dir(root)?;
        let mut selected = Vec::new();
        for dir in policy_candidates(root, exclude) {
            let dir = dir?;
            if self.entry_count(&dir)? >= max_entries {
                selected.push(dir);
            }
        }
        self.mark(&selected)?;
        Ok(selected)
    }

    fn entry_count(&self, dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(dir)? {
            if entry?.file_name() != OsStr::new(&self.sentinel) {
                count += 1;
            }
        }
        Ok(count)
    }
}

pub struct MarkedDirs {
    root: PathBuf,
    sentinel: String,
}

impl MarkedDirs {
    pub fn iter(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_dir())
            .filter(|e| e.path().join(&self.sentinel).is_file())
            .map(DirEntry::into_path)
    }
}

impl<'a> IntoIterator for &'a MarkedDirs {
    type Item = PathBuf;
    type IntoIter = Box<dyn Iterator<Item = PathBuf> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

fn require_absolute_dir(root: &Path) -> Result<()> {
    if !root.is_absolute() {
        return Err(ZipdirError::Precondition(format!(
            "root must be an absolute path, got {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(ZipdirError::Precondition(format!("{} is not a directory", root.display())));
    }
    Ok(())
}

/// Directories strictly below `root`, pruning excluded subtrees.
fn policy_candidates(root: &Path, exclude: &ExcludePattern) -> impl Iterator<Item = Result<PathBuf>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(move |e| !(e.file_type().is_dir() && exclude.matches(e.file_name())))
        .filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_dir() => Some(Ok(e.into_path())),
            Ok(_) => None,
            Err(err) => Some(Err(err.into())),
        })
}

fn subdirectory_count(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.file_type()?.is_dir() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    const SENTINEL: &str = ".compress_dir";

    fn default_exclude() -> ExcludePattern {
        ExcludePattern::new(crate::config::settings::DEFAULT_EXCLUDE).unwrap()
    }

    fn tree(dirs: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for d in dirs {
            fs::create_dir_all(tmp.path().join(d)).unwrap();
        }
        tmp
    }

    fn root_of(tmp: &TempDir) -> PathBuf {
        fs::canonicalize(tmp.path()).unwrap()
    }

    fn marked_set(marker: &Marker, root: &Path) -> BTreeSet<PathBuf> {
        marker.list_marked(root).unwrap().iter().collect()
    }

    fn set(root: &Path, rels: &[&str]) -> BTreeSet<PathBuf> {
        rels.iter().map(|r| root.join(r)).collect()
    }

    #[test]
    fn list_marked_finds_nested_marks_once() {
        let tmp = tree(&["a/b/c", "d", "e/f"]);
        let root = root_of(&tmp);
        for d in ["a", "a/b/c", "e/f"] {
            fs::write(root.join(d).join(SENTINEL), b"").unwrap();
        }
        let marker = Marker::new(SENTINEL);
        let listed: Vec<PathBuf> = marker.list_marked(&root).unwrap().iter().collect();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed.iter().cloned().collect::<BTreeSet<_>>(), set(&root, &["a", "a/b/c", "e/f"]));
        assert!(listed.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn list_marked_is_restartable() {
        let tmp = tree(&["x", "y"]);
        let root = root_of(&tmp);
        fs::write(root.join("x").join(SENTINEL), b"").unwrap();
        let marker = Marker::new(SENTINEL);
        let marked = marker.list_marked(&root).unwrap();
        let first: Vec<_> = marked.iter().collect();
        let second: Vec<_> = (&marked).into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn marking_marked_dirs_is_a_fixed_point() {
        let tmp = tree(&["p/q", "r"]);
        let root = root_of(&tmp);
        let marker = Marker::new(SENTINEL);
        marker.mark([root.join("p/q"), root.join("r")]).unwrap();
        fs::write(root.join("r").join(SENTINEL), b"keep").unwrap();

        let before = marked_set(&marker, &root);
        let created = marker.mark(&before).unwrap();
        assert_eq!(created, 0);
        assert_eq!(marked_set(&marker, &root), before);
        assert_eq!(fs::read(root.join("r").join(SENTINEL)).unwrap(), b"keep");
    }

    #[test]
    fn clear_then_list_is_empty() {
        let tmp = tree(&["a/b", "c"]);
        let root = root_of(&tmp);
        let marker = Marker::new(SENTINEL);
        marker.mark([root.clone(), root.join("a/b"), root.join("c")]).unwrap();
        assert_eq!(marker.clear_marks(&root).unwrap(), 3);
        assert!(marked_set(&marker, &root).is_empty());
        // idempotent
        assert_eq!(marker.clear_marks(&root).unwrap(), 0);
    }

    #[test]
    fn mark_rejects_non_directories() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        let err = Marker::new(SENTINEL).mark([&file]).unwrap_err();
        assert!(matches!(err, ZipdirError::Precondition(_)));
    }

    #[test]
    fn policies_require_absolute_root() {
        let marker = Marker::new(SENTINEL);
        let exclude = default_exclude();
        let rel = Path::new("relative/dir");
        assert!(matches!(marker.mark_top_level_children(rel, &exclude), Err(ZipdirError::Precondition(_))));
        assert!(matches!(marker.mark_leaf_directories(rel, &exclude), Err(ZipdirError::Precondition(_))));
        assert!(matches!(
            marker.mark_directories_over_threshold(rel, 1, &exclude),
            Err(ZipdirError::Precondition(_))
        ));
    }

    #[test]
    fn top_level_children_mixed() {
        let tmp = tree(&["docs", "src/inner", ".git", ".cache"]);
        let root = root_of(&tmp);
        fs::write(root.join("README"), b"file, not dir").unwrap();
        let marker = Marker::new(SENTINEL);
        marker.mark_top_level_children(&root, &default_exclude()).unwrap();
        assert_eq!(marked_set(&marker, &root), set(&root, &["docs", "src"]));
    }

    #[test]
    fn top_level_children_zero_and_all_excluded() {
        let marker = Marker::new(SENTINEL);
        let empty = tree(&[]);
        assert!(marker.mark_top_level_children(&root_of(&empty), &default_exclude()).unwrap().is_empty());

        let hidden = tree(&[".a", ".b"]);
        let root = root_of(&hidden);
        marker.mark_top_level_children(&root, &default_exclude()).unwrap();
        assert!(marked_set(&marker, &root).is_empty());
    }

    #[test]
    fn custom_exclude_pattern() {
        let tmp = tree(&["keep", "tmp_build", ".hidden"]);
        let root = root_of(&tmp);
        let marker = Marker::new(SENTINEL);
        marker.mark_top_level_children(&root, &ExcludePattern::new("^tmp_").unwrap()).unwrap();
        assert_eq!(marked_set(&marker, &root), set(&root, &["keep", ".hidden"]));
    }

    #[test]
    fn leaf_directories_only() {
        let tmp = tree(&["a/b/c", "a/d", "e", ".git/objects"]);
        let root = root_of(&tmp);
        fs::write(root.join("a/d/file"), b"x").unwrap();
        let marker = Marker::new(SENTINEL);
        marker.mark_leaf_directories(&root, &default_exclude()).unwrap();
        assert_eq!(marked_set(&marker, &root), set(&root, &["a/b/c", "a/d", "e"]));
    }

    #[test]
    fn threshold_includes_boundary() {
        let tmp = tree(&["two", "three", "four/sub"]);
        let root = root_of(&tmp);
        for i in 0..2 {
            fs::write(root.join("two").join(format!("f{}", i)), b"").unwrap();
        }
        for i in 0..3 {
            fs::write(root.join("three").join(format!("f{}", i)), b"").unwrap();
        }
        for i in 0..3 {
            fs::write(root.join("four").join(format!("f{}", i)), b"").unwrap();
        }
        let marker = Marker::new(SENTINEL);
        marker.mark_directories_over_threshold(&root, 3, &default_exclude()).unwrap();
        assert_eq!(marked_set(&marker, &root), set(&root, &["three", "four"]));

        // rerunning does not count the new sentinels
        marker.mark_directories_over_threshold(&root, 4, &default_exclude()).unwrap();
        assert_eq!(marked_set(&marker, &root), set(&root, &["three", "four"]));
    }
}
