use std::fs;

use tempfile::TempDir;
use treetally_scan::{JwalkScanner, ScanConfig, ScanError};

fn create_test_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir(root.join("dir1")).unwrap();
    fs::create_dir(root.join("dir2")).unwrap();
    fs::create_dir(root.join("dir1/subdir")).unwrap();
    fs::create_dir(root.join(".hidden")).unwrap();

    fs::write(root.join("file1.txt"), "hello").unwrap();
    fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
    fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
    fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();
    fs::write(root.join(".hidden/secret"), "xx").unwrap();

    temp
}

fn relative(temp: &TempDir) -> ScanConfig {
    ScanConfig::builder()
        .root(temp.path())
        .relative_paths(true)
        .build()
        .unwrap()
}

fn paths(config: &ScanConfig) -> Vec<String> {
    let table = JwalkScanner::new().scan(config).unwrap();
    let mut paths: Vec<String> = table.rows.iter().map(|r| r.raw_path.to_string()).collect();
    paths.sort();
    paths
}

#[test]
fn test_one_row_per_file() {
    let temp = create_test_tree();
    let table = JwalkScanner::new().scan(&relative(&temp)).unwrap();

    assert_eq!(table.rows.len(), 5);
    assert_eq!(table.stats.files, 5);
    assert!(table.stats.dirs >= 4);
    assert_eq!(table.stats.total_size, 5 + 17 + 4 + 17 + 2);

    let file2 = table
        .rows
        .iter()
        .find(|r| r.raw_path == "/dir1/file2.txt")
        .unwrap();
    assert_eq!(file2.size, 17);
    assert!(file2.modified.is_some());
}

#[test]
fn test_absolute_paths_end_with_relative_path() {
    let temp = create_test_tree();
    let table = JwalkScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();
    assert!(table
        .rows
        .iter()
        .any(|r| r.raw_path.starts_with('/') && r.raw_path.ends_with("/dir1/subdir/file3.txt")));
}

#[test]
fn test_skip_hidden() {
    let temp = create_test_tree();
    let config = ScanConfig::builder()
        .root(temp.path())
        .relative_paths(true)
        .include_hidden(false)
        .build()
        .unwrap();

    assert!(!paths(&config).iter().any(|p| p.contains(".hidden")));
}

#[test]
fn test_ignore_patterns_prune_subtrees() {
    let temp = create_test_tree();
    let config = ScanConfig::builder()
        .root(temp.path())
        .relative_paths(true)
        .ignore_patterns(vec!["dir1".to_string(), "*.log".to_string()])
        .build()
        .unwrap();

    let paths = paths(&config);
    assert!(!paths.iter().any(|p| p.starts_with("/dir1")));
    assert!(paths.contains(&"/dir2/file4.txt".to_string()));
}

#[test]
fn test_max_depth() {
    let temp = create_test_tree();
    let config = ScanConfig::builder()
        .root(temp.path())
        .relative_paths(true)
        .max_depth(Some(1u32))
        .build()
        .unwrap();

    assert_eq!(paths(&config), vec!["/file1.txt".to_string()]);
}

#[cfg(unix)]
#[test]
fn test_hardlinks_counted_once() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("original"), "0123456789").unwrap();
    fs::hard_link(temp.path().join("original"), temp.path().join("link")).unwrap();

    let table = JwalkScanner::new().scan(&relative(&temp)).unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.stats.total_size, 10);

    let apparent = ScanConfig::builder()
        .root(temp.path())
        .apparent_size(true)
        .build()
        .unwrap();
    assert_eq!(JwalkScanner::new().scan(&apparent).unwrap().stats.total_size, 20);
}

#[cfg(unix)]
#[test]
fn test_broken_symlink_is_a_warning() {
    let temp = TempDir::new().unwrap();
    std::os::unix::fs::symlink(temp.path().join("missing"), temp.path().join("dangling")).unwrap();

    let table = JwalkScanner::new().scan(&relative(&temp)).unwrap();
    assert!(table.rows.is_empty());
    assert_eq!(table.warnings.len(), 1);
}

#[test]
fn test_missing_root() {
    let temp = TempDir::new().unwrap();
    let err = JwalkScanner::new()
        .scan(&ScanConfig::new(temp.path().join("nope")))
        .unwrap_err();
    assert!(matches!(err, ScanError::NotFound { .. }));
}

#[test]
fn test_file_root_is_rejected() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("plain");
    fs::write(&file, "x").unwrap();
    let err = JwalkScanner::new().scan(&ScanConfig::new(file)).unwrap_err();
    assert!(matches!(err, ScanError::NotADirectory { .. }));
}
