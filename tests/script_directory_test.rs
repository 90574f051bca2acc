/// スクリプトディレクトリ索引の結合テスト
///
/// 再帰走査、サブディレクトリ間の重複解決、ファイルシステムイベントへの
/// 反応（作成・変更・削除・改名）を実際のディレクトリツリーで確認します。
use convoy::services::script_directory::{ScriptDirectory, ScriptEvent};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_recursive_scan_includes_subdirectories() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    write_script(temp.path(), "_1_Top.sql", "");
    write_script(&temp.path().join("sub"), "_2_Nested.sql", "");

    let directory = ScriptDirectory::new(temp.path(), true).unwrap();
    assert_eq!(directory.scripts().len(), 2);
}

#[test]
fn test_non_recursive_scan_ignores_subdirectories() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    write_script(temp.path(), "_1_Top.sql", "");
    write_script(&temp.path().join("sub"), "_2_Nested.sql", "");

    let directory = ScriptDirectory::new(temp.path(), false).unwrap();
    let scripts = directory.scripts();

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].name(), "Top");
}

#[test]
fn test_top_level_duplicate_beats_nested() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("deep/deeper")).unwrap();
    write_script(temp.path(), "_1_X.sql", "top");
    write_script(&temp.path().join("deep/deeper"), "_1_X.sql", "nested");

    let directory = ScriptDirectory::new(temp.path(), true).unwrap();
    let scripts = directory.scripts();

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].text(), "top");
}

#[test]
fn test_equal_depth_duplicates_resolved_alphabetically() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("alpha")).unwrap();
    fs::create_dir(temp.path().join("beta")).unwrap();
    write_script(&temp.path().join("beta"), "_1_X.sql", "beta wins?");
    write_script(&temp.path().join("alpha"), "_1_X.sql", "alpha wins");

    let directory = ScriptDirectory::new(temp.path(), true).unwrap();
    let scripts = directory.scripts();

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].text(), "alpha wins");
}

#[test]
fn test_distinct_ordinals_with_same_name_both_survive() {
    let temp = TempDir::new().unwrap();
    write_script(temp.path(), "_1_Same.sql", "");
    write_script(temp.path(), "_2_Same.sql", "");

    let directory = ScriptDirectory::new(temp.path(), true).unwrap();
    assert_eq!(directory.scripts().len(), 2);
}

#[test]
fn test_delete_event_shrinks_next_read() {
    let temp = TempDir::new().unwrap();
    write_script(temp.path(), "_1_Keep.sql", "");
    let victim = write_script(temp.path(), "_2_Drop.sql", "");

    let directory = ScriptDirectory::new(temp.path(), false).unwrap();
    assert_eq!(directory.scripts().len(), 2);

    fs::remove_file(&victim).unwrap();
    directory.handle_event(ScriptEvent::Removed(victim));

    let scripts = directory.scripts();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].name(), "Keep");
}

#[test]
fn test_rename_event_keeps_index_size_and_rederives_identity() {
    let temp = TempDir::new().unwrap();
    let old_path = write_script(temp.path(), "_1_Before.sql", "SELECT 1");

    let directory = ScriptDirectory::new(temp.path(), false).unwrap();
    assert_eq!(directory.scripts().len(), 1);

    let new_path = temp.path().join("_7_After.sql");
    fs::rename(&old_path, &new_path).unwrap();
    directory.handle_event(ScriptEvent::Renamed {
        from: old_path,
        to: new_path,
    });

    let scripts = directory.scripts();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].ordinal(), 7);
    assert_eq!(scripts[0].name(), "After");
    // 内容は引き継がれる（新しいパスから再読み込みされる）
    assert_eq!(scripts[0].text(), "SELECT 1");
}

#[test]
fn test_events_mark_dirty_until_next_read() {
    let temp = TempDir::new().unwrap();
    let directory = ScriptDirectory::new(temp.path(), false).unwrap();
    directory.scripts();
    assert!(!directory.is_dirty());

    let path = write_script(temp.path(), "_1_New.sql", "");
    directory.handle_event(ScriptEvent::Created(path));
    assert!(directory.is_dirty());

    directory.scripts();
    assert!(!directory.is_dirty());
}

#[test]
fn test_view_sorted_by_ordinal() {
    let temp = TempDir::new().unwrap();
    write_script(temp.path(), "_300_C.sql", "");
    write_script(temp.path(), "_20_B.sql", "");
    write_script(temp.path(), "_1_A.sql", "");

    let directory = ScriptDirectory::new(temp.path(), false).unwrap();
    let ordinals: Vec<u64> = directory.scripts().iter().map(|s| s.ordinal()).collect();

    assert_eq!(ordinals, [1, 20, 300]);
}
