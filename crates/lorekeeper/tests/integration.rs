use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lore_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lore");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let campaign = root.join("campaign");
    for dir in ["Act 1", "Act 2", "Act 3"] {
        fs::create_dir_all(campaign.join(dir)).unwrap();
    }
    fs::write(
        campaign.join("Act 1").join("village.md"),
        "# The Village\n\nThe dragon was first sighted above the village mill.\n\nFarmers whisper about burned fields.",
    )
    .unwrap();
    fs::write(
        campaign.join("Act 2").join("castle.md"),
        "# The Castle\n\nThe dragon cult gathers in the castle cellars.\n\nTheir leader wears a silver mask.",
    )
    .unwrap();
    fs::write(
        campaign.join("Act 3").join("finale.md"),
        "# The Lair\n\nThe dragon awakens in the lair beneath the mountain and the dragon betrays the cult.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/lore.sqlite"

[cache]
path = "{root}/data/cache.json"

[corpus]
root = "{root}/campaign"
include_globs = ["**/*.md", "**/*.txt"]

[chunking]
max_chars = 400
overlap_chars = 80

[embedding]
provider = "hash"
dims = 128

[retrieval]
final_limit = 5
"#,
        root = root.display()
    );

    let config_path = config_dir.join("lore.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lore(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lore_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lore binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn campaign_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("campaign")
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lore(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_lore(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_sync_indexes_every_file() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lore(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files seen: 3"));
    assert!(stdout.contains("reindexed: 3"));
    assert!(stdout.contains("chunks written: 3"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_second_sync_is_noop() {
    let (_tmp, config_path) = setup_test_env();

    run_lore(&config_path, &["sync"]);
    let (stdout, _, success) = run_lore(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("unchanged: 3"));
    assert!(stdout.contains("reindexed: 0"));
    assert!(stdout.contains("embeddings computed: 0"));
}

#[test]
fn test_sync_picks_up_edit_and_delete() {
    let (_tmp, config_path) = setup_test_env();
    run_lore(&config_path, &["sync"]);

    let campaign = campaign_dir(&config_path);
    fs::write(
        campaign.join("Act 1").join("village.md"),
        "# The Village\n\nThe mill has been rebuilt.",
    )
    .unwrap();
    fs::remove_file(campaign.join("Act 3").join("finale.md")).unwrap();

    let (stdout, stderr, success) = run_lore(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files seen: 2"));
    assert!(stdout.contains("unchanged: 1"));
    assert!(stdout.contains("reindexed: 1"));
    assert!(stdout.contains("removed: 1"));

    let (stdout, _, _) = run_lore(&config_path, &["stats"]);
    assert!(stdout.contains("Chunks:      2"));
}

#[test]
fn test_full_sync_reuses_vectors() {
    let (_tmp, config_path) = setup_test_env();
    run_lore(&config_path, &["sync"]);

    let (stdout, _, success) = run_lore(&config_path, &["sync", "--full"]);
    assert!(success);
    assert!(stdout.contains("(full)"));
    assert!(stdout.contains("reindexed: 3"));
    assert!(stdout.contains("embeddings computed: 0"));
    assert!(stdout.contains("embeddings reused: 3"));
}

#[test]
fn test_retrieve_hides_later_acts() {
    let (_tmp, config_path) = setup_test_env();
    run_lore(&config_path, &["sync"]);

    let (stdout, stderr, success) =
        run_lore(&config_path, &["retrieve", "dragon cult", "--act", "2"]);
    assert!(success, "retrieve failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Act 2/castle.md"));
    assert!(stdout.contains("Act 1/village.md"));
    assert!(!stdout.contains("Act 3/finale.md"));

    let castle = stdout.find("Act 2/castle.md").unwrap();
    let village = stdout.find("Act 1/village.md").unwrap();
    assert!(castle < village, "current act should rank first:\n{}", stdout);
}

#[test]
fn test_retrieve_without_act_is_unfiltered() {
    let (_tmp, config_path) = setup_test_env();
    run_lore(&config_path, &["sync"]);

    let (stdout, stderr, success) = run_lore(&config_path, &["retrieve", "dragon"]);
    assert!(success);
    assert!(stderr.contains("not filtered"));
    assert!(stdout.contains("Act 3/finale.md"));
}

#[test]
fn test_retrieve_json_and_explain() {
    let (_tmp, config_path) = setup_test_env();
    run_lore(&config_path, &["sync"]);

    let (stdout, _, success) =
        run_lore(&config_path, &["retrieve", "dragon", "--act", "II", "--json"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["status"], "ranked");
    assert_eq!(json["passages"].as_array().unwrap().len(), 2);

    let (stdout, _, success) =
        run_lore(&config_path, &["retrieve", "dragon", "--act", "2", "--explain"]);
    assert!(success);
    assert!(stdout.contains("similarity:"));
    assert!(stdout.contains("intent:"));
}

#[test]
fn test_retrieve_rejects_bad_act() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_lore(&config_path, &["retrieve", "dragon", "--act", "soon"]);
    assert!(!success);
}

#[test]
fn test_reset_clears_everything() {
    let (_tmp, config_path) = setup_test_env();
    run_lore(&config_path, &["sync"]);

    let (stdout, _, success) = run_lore(&config_path, &["reset"]);
    assert!(success);
    assert!(stdout.contains("removed 3 chunks"));

    let (stdout, _, _) = run_lore(&config_path, &["stats"]);
    assert!(stdout.contains("Chunks:      0"));
    assert!(stdout.contains("Cached:      0 files"));

    let (stdout, _, _) = run_lore(&config_path, &["sync"]);
    assert!(stdout.contains("reindexed: 3"));
}

#[test]
fn test_missing_corpus_fails_sync() {
    let (_tmp, config_path) = setup_test_env();
    fs::remove_dir_all(campaign_dir(&config_path)).unwrap();

    let (_, stderr, success) = run_lore(&config_path, &["sync"]);
    assert!(!success);
    assert!(stderr.contains("corpus unreadable"));
}

#[test]
fn test_missing_config_fails() {
    let (tmp, _) = setup_test_env();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_lore(&missing, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
