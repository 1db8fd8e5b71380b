use std::fs;
use std::path::PathBuf;

use kiln_core::{ChangeCache, SignalMode};
use tempfile::TempDir;

fn write(temp: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = temp.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_no_record_is_stale() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache = ChangeCache::in_memory(SignalMode::Mtime);

    assert!(cache.is_stale_paths("sass", &[input], &[]).unwrap());
}

#[test]
fn test_commit_makes_fresh() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let output = write(&temp, "a.css.out", "out");
    let cache = ChangeCache::in_memory(SignalMode::Mtime);

    let signals = cache.snapshot(&[input.clone()]).unwrap();
    cache.commit("sass", signals).unwrap();

    assert!(!cache
        .is_stale_paths("sass", &[input.clone()], &[output])
        .unwrap());
    // Records are scoped by action.
    assert!(cache.is_stale_paths("autoprefix", &[input], &[]).unwrap());
}

#[test]
fn test_content_change_is_stale_in_hash_mode() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache = ChangeCache::in_memory(SignalMode::Hash);

    cache
        .commit("sass", cache.snapshot(&[input.clone()]).unwrap())
        .unwrap();
    fs::write(&input, "b").unwrap();

    assert!(cache.is_stale_paths("sass", &[input], &[]).unwrap());
}

#[test]
fn test_length_change_is_stale_in_mtime_mode() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache = ChangeCache::in_memory(SignalMode::Mtime);

    cache
        .commit("sass", cache.snapshot(&[input.clone()]).unwrap())
        .unwrap();
    fs::write(&input, "a longer body").unwrap();

    assert!(cache.is_stale_paths("sass", &[input], &[]).unwrap());
}

#[test]
fn test_missing_output_is_stale() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache = ChangeCache::in_memory(SignalMode::Mtime);
    cache
        .commit("sass", cache.snapshot(&[input.clone()]).unwrap())
        .unwrap();

    let missing = temp.path().join("a.css.out");
    assert!(cache.is_stale_paths("sass", &[input], &[missing]).unwrap());
}

#[test]
fn test_added_input_is_stale() {
    let temp = TempDir::new().unwrap();
    let a = write(&temp, "a.css", "a");
    let b = write(&temp, "b.css", "b");
    let cache = ChangeCache::in_memory(SignalMode::Mtime);
    cache
        .commit("sass", cache.snapshot(&[a.clone()]).unwrap())
        .unwrap();

    assert!(cache.is_stale_paths("sass", &[a, b], &[]).unwrap());
}

#[test]
fn test_snapshot_before_run_keeps_concurrent_edit_stale() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache = ChangeCache::in_memory(SignalMode::Hash);

    let before = cache.snapshot(&[input.clone()]).unwrap();
    fs::write(&input, "edited while the transform ran").unwrap();
    cache.commit("sass", before).unwrap();

    assert!(cache.is_stale_paths("sass", &[input], &[]).unwrap());
}

#[test]
fn test_persist_and_reload() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache_file = temp.path().join("state/cache.bin");

    let cache = ChangeCache::load(&cache_file, SignalMode::Hash).unwrap();
    cache
        .commit("sass", cache.snapshot(&[input.clone()]).unwrap())
        .unwrap();

    let reloaded = ChangeCache::load(&cache_file, SignalMode::Hash).unwrap();
    assert_eq!(reloaded.scopes(), vec!["sass".to_string()]);
    assert!(!reloaded.is_stale_paths("sass", &[input], &[]).unwrap());
}

#[test]
fn test_corrupt_file_loads_empty() {
    let temp = TempDir::new().unwrap();
    let cache_file = write(&temp, "cache.bin", "definitely not bincode");

    let cache = ChangeCache::load(&cache_file, SignalMode::Mtime).unwrap();
    assert!(cache.scopes().is_empty());
}

#[test]
fn test_mode_mismatch_loads_empty() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache_file = temp.path().join("cache.bin");

    let cache = ChangeCache::load(&cache_file, SignalMode::Mtime).unwrap();
    cache
        .commit("sass", cache.snapshot(&[input]).unwrap())
        .unwrap();

    let reloaded = ChangeCache::load(&cache_file, SignalMode::Hash).unwrap();
    assert!(reloaded.scopes().is_empty());
}

#[test]
fn test_clear_removes_file() {
    let temp = TempDir::new().unwrap();
    let input = write(&temp, "a.css", "a");
    let cache_file = temp.path().join("cache.bin");
    let cache = ChangeCache::load(&cache_file, SignalMode::Mtime).unwrap();
    cache
        .commit("sass", cache.snapshot(&[input]).unwrap())
        .unwrap();

    cache.clear().unwrap();
    assert!(!cache_file.exists());
    assert!(cache.record("sass").is_none());
}
