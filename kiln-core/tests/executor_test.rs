mod common;

use std::fs;
use std::sync::Arc;

use common::RecordingRunner;
use kiln_core::{
    ActionDef, ActionExecutor, ActionKind, ActionOutcome, ChangeCache, Error, SignalMode,
};
use tempfile::TempDir;

fn sass() -> ActionDef {
    ActionDef::new("sass", ActionKind::Transform, "sass a.css a.css.out")
        .inputs(["a.css"])
        .outputs(["a.css.out"])
}

fn setup(mode: SignalMode) -> (TempDir, Arc<RecordingRunner>, Arc<ChangeCache>) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.css"), "body { color: red; }").unwrap();
    let fake = Arc::new(RecordingRunner::new().writes(
        "sass",
        temp.path().join("a.css.out"),
        "body{color:red}",
    ));
    let cache = Arc::new(ChangeCache::in_memory(mode));
    (temp, fake, cache)
}

fn executor(temp: &TempDir, fake: &Arc<RecordingRunner>, cache: &Arc<ChangeCache>) -> ActionExecutor {
    ActionExecutor::new(temp.path())
        .with_cache(cache.clone())
        .with_process_runner(fake.clone())
}

#[test]
fn test_unchanged_input_is_skipped() {
    let (temp, fake, cache) = setup(SignalMode::Mtime);
    let executor = executor(&temp, &fake, &cache);

    let first = executor.execute(&sass()).unwrap();
    assert_eq!(first.outcome, ActionOutcome::Ran);
    let output_before = fs::read(temp.path().join("a.css.out")).unwrap();

    let second = executor.execute(&sass()).unwrap();
    assert_eq!(second.outcome, ActionOutcome::Skipped);
    assert_eq!(fake.calls("sass"), 1);
    assert_eq!(fs::read(temp.path().join("a.css.out")).unwrap(), output_before);
}

#[test]
fn test_changed_input_reruns() {
    let (temp, fake, cache) = setup(SignalMode::Hash);
    let executor = executor(&temp, &fake, &cache);

    executor.execute(&sass()).unwrap();
    fs::write(temp.path().join("a.css"), "body { color: blue; }").unwrap();

    let report = executor.execute(&sass()).unwrap();
    assert_eq!(report.outcome, ActionOutcome::Ran);
    assert_eq!(fake.calls("sass"), 2);
}

#[test]
fn test_missing_output_reruns() {
    let (temp, fake, cache) = setup(SignalMode::Mtime);
    let executor = executor(&temp, &fake, &cache);

    executor.execute(&sass()).unwrap();
    fs::remove_file(temp.path().join("a.css.out")).unwrap();

    let report = executor.execute(&sass()).unwrap();
    assert_eq!(report.outcome, ActionOutcome::Ran);
    assert!(temp.path().join("a.css.out").exists());
}

#[test]
fn test_unresolvable_input_fails_action() {
    let (temp, fake, cache) = setup(SignalMode::Mtime);
    let executor = executor(&temp, &fake, &cache);
    let action = ActionDef::new("imagemin", ActionKind::Transform, "imagemin")
        .inputs(["lib/img/**/*.png"])
        .outputs(["dist/img"]);

    let err = executor.execute(&action).unwrap_err();
    match err {
        Error::StaleInputUnresolvable { action, pattern } => {
            assert_eq!(action, "imagemin");
            assert_eq!(pattern, "lib/img/**/*.png");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fake.calls("imagemin"), 0);
}

#[test]
fn test_failed_transform_commits_nothing() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.css"), "body {}").unwrap();
    let fake = Arc::new(RecordingRunner::new().fail("sass"));
    let cache = Arc::new(ChangeCache::in_memory(SignalMode::Mtime));
    let executor = executor(&temp, &fake, &cache);

    assert!(executor.execute(&sass()).is_err());
    assert!(cache.record("sass").is_none());
}

#[test]
fn test_force_runs_fresh_transform() {
    let (temp, fake, cache) = setup(SignalMode::Mtime);
    executor(&temp, &fake, &cache).execute(&sass()).unwrap();

    let forced = executor(&temp, &fake, &cache).force(true);
    let report = forced.execute(&sass()).unwrap();
    assert_eq!(report.outcome, ActionOutcome::Ran);
    assert_eq!(fake.calls("sass"), 2);
}

#[test]
fn test_glob_inputs_are_tracked_per_file() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("lib/sass")).unwrap();
    fs::write(temp.path().join("lib/sass/a.scss"), "a").unwrap();
    fs::write(temp.path().join("lib/sass/b.scss"), "b").unwrap();
    let fake = Arc::new(RecordingRunner::new().writes("sass", temp.path().join("dist/site.css"), "css"));
    let cache = Arc::new(ChangeCache::in_memory(SignalMode::Hash));
    let executor = executor(&temp, &fake, &cache);
    let action = ActionDef::new("sass", ActionKind::Transform, "sass")
        .inputs(["lib/sass/**/*.scss"])
        .outputs(["dist/site.css"]);

    executor.execute(&action).unwrap();
    assert_eq!(cache.record("sass").unwrap().len(), 2);

    fs::write(temp.path().join("lib/sass/c.scss"), "c").unwrap();
    assert_eq!(executor.execute(&action).unwrap().outcome, ActionOutcome::Ran);
    assert_eq!(executor.execute(&action).unwrap().outcome, ActionOutcome::Skipped);
}

#[test]
fn test_persisted_cache_survives_restart() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.css"), "body {}").unwrap();
    let fake = Arc::new(RecordingRunner::new().writes("sass", temp.path().join("a.css.out"), "out"));
    let cache_file = temp.path().join(".kiln/change-cache.bin");

    let cache = Arc::new(ChangeCache::load(&cache_file, SignalMode::Mtime).unwrap());
    executor(&temp, &fake, &cache).execute(&sass()).unwrap();
    assert!(cache_file.exists());

    let reloaded = Arc::new(ChangeCache::load(&cache_file, SignalMode::Mtime).unwrap());
    let report = executor(&temp, &fake, &reloaded).execute(&sass()).unwrap();
    assert_eq!(report.outcome, ActionOutcome::Skipped);
    assert_eq!(fake.calls("sass"), 1);
}

#[test]
fn test_command_action_always_runs() {
    let (temp, fake, cache) = setup(SignalMode::Mtime);
    let executor = executor(&temp, &fake, &cache);
    let lint = ActionDef::new("lint", ActionKind::Command, "jshint").inputs(["a.css"]);

    executor.execute(&lint).unwrap();
    executor.execute(&lint).unwrap();
    assert_eq!(fake.calls("lint"), 2);
}

#[test]
fn test_real_shell_transform() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.css"), "body {}").unwrap();
    let cache = Arc::new(ChangeCache::in_memory(SignalMode::Mtime));
    let executor = ActionExecutor::new(temp.path()).with_cache(cache);
    let action = ActionDef::new("copy", ActionKind::Transform, "cp a.css a.css.out")
        .inputs(["a.css"])
        .outputs(["a.css.out"]);

    assert_eq!(executor.execute(&action).unwrap().outcome, ActionOutcome::Ran);
    assert_eq!(executor.execute(&action).unwrap().outcome, ActionOutcome::Skipped);

    let failing = ActionDef::new("broken", ActionKind::Command, "echo 'no such tool' >&2; exit 127");
    let err = executor.execute(&failing).unwrap_err();
    assert_eq!(err.origin(), Some("broken"));
    assert!(err.to_string().contains("no such tool"));
}
