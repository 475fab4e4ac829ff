use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, ZipdirError};

/// One directory per line; blank lines and `#` comments are skipped.
pub fn read_path_list(file: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(file)?;
    Ok(content_lines(&content).map(PathBuf::from).collect())
}

/// `<dir>\t<base archive>` per line. The base may be omitted and resolved later.
pub fn read_pair_list(file: &Path) -> Result<Vec<(PathBuf, Option<PathBuf>)>> {
    let content = fs::read_to_string(file)?;
    let mut pairs = Vec::new();
    for (n, line) in content_lines(&content).enumerate() {
        let fields: Vec<&str> = line.split('\t').map(str::trim).filter(|f| !f.is_empty()).collect();
        match fields.as_slice() {
            [dir] => pairs.push((PathBuf::from(dir), None)),
            [dir, base] => pairs.push((PathBuf::from(dir), Some(PathBuf::from(base)))),
            _ => {
                return Err(ZipdirError::Precondition(format!(
                    "{}: entry {} has {} fields, expected <dir>[TAB<base archive>]",
                    file.display(),
                    n + 1,
                    fields.len()
                )));
            }
        }
    }
    Ok(pairs)
}

fn content_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

/// Every entry under `dir` (dir included), as `<folder>/<relative path>`
/// with forward slashes, which is how tar records members.
pub fn relative_listing(dir: &Path, folder: &str) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let mut member = folder.to_string();
        for part in rel.components() {
            member.push('/');
            member.push_str(&part.as_os_str().to_string_lossy());
        }
        out.insert(member);
    }
    Ok(out)
}

/// Strip what tar adds around member names: `./` prefixes and trailing `/`.
pub fn normalize_member(raw: &str) -> Option<String> {
    let mut m = raw.trim_end_matches(['\r', '\n']);
    while let Some(rest) = m.strip_prefix("./") {
        m = rest;
    }
    let m = m.trim_end_matches('/');
    if m.is_empty() || m == "." { None } else { Some(m.to_string()) }
}

/// Members recorded in the base archive but gone from the current tree.
pub fn deleted_members<I, S>(base_members: I, current: &BTreeSet<String>) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    base_members
        .into_iter()
        .filter_map(|m| normalize_member(m.as_ref()))
        .filter(|m| !current.contains(m))
        .collect()
}

pub fn write_deleted_list(path: &Path, deleted: &BTreeSet<String>) -> Result<()> {
    let mut content = String::new();
    for m in deleted {
        content.push_str(m);
        content.push('\n');
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn deleted_is_base_minus_current() {
        let deleted = deleted_members(["a", "b", "c"], &set(&["a", "c"]));
        assert_eq!(deleted, set(&["b"]));
    }

    #[test]
    fn deleted_normalizes_tar_output() {
        let base = ["./proj/", "proj/keep.txt", "proj/gone/", "proj/gone/x.txt"];
        let current = set(&["proj", "proj/keep.txt"]);
        assert_eq!(deleted_members(base, &current), set(&["proj/gone", "proj/gone/x.txt"]));
    }

    #[test]
    fn listing_is_relative_to_folder_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("proj");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("a.txt"), b"a").unwrap();
        fs::write(dir.join("sub/b.txt"), b"b").unwrap();
        let listing = relative_listing(&dir, "proj").unwrap();
        assert_eq!(listing, set(&["proj", "proj/a.txt", "proj/sub", "proj/sub/b.txt"]));
    }

    #[test]
    fn path_list_skips_comments_and_blanks() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("dirs.txt");
        fs::write(&file, "/data/a\n\n# old\n  /data/b  \n").unwrap();
        assert_eq!(read_path_list(&file).unwrap(), vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")]);
    }

    #[test]
    fn pair_list_parses_optional_base() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("pairs.txt");
        fs::write(&file, "/data/a\t/bk/a.1.base.7z\n/data/b\n").unwrap();
        let pairs = read_pair_list(&file).unwrap();
        assert_eq!(pairs[0], (PathBuf::from("/data/a"), Some(PathBuf::from("/bk/a.1.base.7z"))));
        assert_eq!(pairs[1], (PathBuf::from("/data/b"), None));

        fs::write(&file, "/data/a\tx\ty\n").unwrap();
        assert!(matches!(read_pair_list(&file), Err(ZipdirError::Precondition(_))));
    }

    #[test]
    fn deleted_list_is_newline_delimited() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".deleted_list");
        write_deleted_list(&path, &set(&["p/b", "p/c"])).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "p/b\np/c\n");
    }
}
