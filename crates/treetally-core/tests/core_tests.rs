use std::io::Write;

use treetally_core::path::{decompose, normalize, prefix};
use treetally_core::{
    AggregationResult, AnalyticsConfig, Completeness, ConfigError, HierarchyLevel, LevelGroup,
    PageWindow, PathRow, RawRow, SamplingMethod,
};

#[test]
fn test_round_trip_for_well_formed_paths() {
    let paths = [
        "/home/user/docs/report.pdf",
        "var/log/syslog",
        "/srv/",
        "/a/b/c/d/e/f/g/h",
    ];

    for path in paths {
        let segments = decompose(path);
        assert!(segments.iter().all(|s| !s.is_empty()));
        assert_eq!(format!("/{}", segments.join("/")), normalize(path));

        for depth in 1..=segments.len() {
            let expected = format!("/{}", segments[..depth].join("/"));
            assert_eq!(prefix(&segments, depth), expected);
        }
    }
}

#[test]
fn test_malformed_paths_never_yield_empty_segments() {
    for path in ["", "/", "//", "a//", "//b//c//", "\u{0}/x"] {
        assert!(decompose(path).iter().all(|s| !s.is_empty()), "path {path:?}");
    }
}

#[test]
fn test_raw_row_field_aliases() {
    let raw: RawRow = toml::from_str("parentPath = \"/a/b\"\nsize = 12\ncountHint = 3").unwrap();
    let row = PathRow::from(raw);
    assert_eq!(row.raw_path, "/a/b");
    assert_eq!(row.size, 12);
    assert_eq!(row.count_hint, Some(3));
}

#[test]
fn test_pagination_boundaries() {
    assert_eq!(PageWindow::for_page(0, 10, 1).total_pages, 0);

    let last = PageWindow::for_page(95, 10, 10);
    assert_eq!(last.offset, 90);
    assert_eq!(last.page_number, last.total_pages);

    let clamped = PageWindow::for_page(95, 10, 99);
    assert_eq!(clamped.page_number, 10);
    assert_eq!(clamped.offset, 90);
}

#[test]
fn test_pages_cover_every_record_once() {
    let total = 1_234u64;
    let size = 100u64;
    let pages = PageWindow::for_page(total, size, 1).total_pages;

    let covered: u64 = (1..=pages)
        .map(|p| PageWindow::for_page(total, size, p).limit())
        .sum();
    assert_eq!(covered, total);
}

#[test]
fn test_result_children_and_find() {
    let record = |depth, prefix: &str, metric| HierarchyLevel {
        depth,
        prefix_path: prefix.to_string(),
        aggregated_metric: metric,
        item_count: 1,
        own_metric: 0,
    };

    let result = AggregationResult {
        levels: vec![
            LevelGroup {
                depth: 1,
                records: vec![record(1, "/a", 35)],
            },
            LevelGroup {
                depth: 2,
                records: vec![record(2, "/a/b", 30), record(2, "/a/e", 5)],
            },
        ],
        max_depth_observed: 2,
        rows_processed: 3,
        completeness: Completeness::Exact,
    };

    let root = result.find("/a").unwrap();
    let children: Vec<_> = result.children(root).map(|c| c.prefix_path.as_str()).collect();
    assert_eq!(children, vec!["/a/b", "/a/e"]);
    assert_eq!(result.total_metric(), 35);
    assert!(result.find("/missing").is_none());
}

#[test]
fn test_config_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sample_threshold = 5000").unwrap();
    writeln!(file, "sampling = \"reservoir\"").unwrap();

    let config = AnalyticsConfig::load(file.path()).unwrap();
    assert_eq!(config.sample_threshold, 5000);
    assert_eq!(config.sampling, SamplingMethod::Reservoir);
    assert_eq!(config.batch_size, 500_000);
}

#[test]
fn test_config_load_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "batch_size = 0").unwrap();

    let err = AnalyticsConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let missing = std::path::Path::new("/definitely/not/here/config.toml");
    let config = AnalyticsConfig::load_or_default(Some(missing)).unwrap();
    assert_eq!(config, AnalyticsConfig::default());
}
