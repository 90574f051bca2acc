// ファイルシステム監視アダプター
//
// notifyのRecommendedWatcherでスクリプトディレクトリへの変更通知を
// 購読し、プラットフォームのイベントをScriptEventに変換して索引へ
// 供給します。通知はnotifyのコールバックスレッドから届き、索引側の
// Mutexが読み取りとの競合を防ぎます。

use crate::services::script_directory::{ScriptDirectory, ScriptEvent};
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;

/// 購読ハンドル
///
/// ドロップすると購読が解除されます。
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

/// ディレクトリ索引への変更通知購読を開始する
///
/// 索引と同じ再帰スコープで購読します。通知処理中のエラーは
/// ログに記録され、監視ループを停止させません。
pub fn watch(directory: Arc<ScriptDirectory>) -> Result<DirectoryWatcher> {
    let root = directory.root().to_path_buf();
    let mode = if directory.recursive() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };

    let handler = Arc::clone(&directory);
    let mut watcher = RecommendedWatcher::new(
        move |result: std::result::Result<Event, notify::Error>| match result {
            Ok(event) => dispatch(&handler, event),
            Err(error) => tracing::warn!(%error, "file watch error"),
        },
        Config::default(),
    )
    .context("Failed to create filesystem watcher")?;

    watcher
        .watch(&root, mode)
        .with_context(|| format!("Failed to watch script directory: {:?}", root))?;

    Ok(DirectoryWatcher { _watcher: watcher })
}

/// notifyのイベントをScriptEventへ変換して索引に適用する
fn dispatch(directory: &ScriptDirectory, event: Event) {
    match event.kind {
        EventKind::Create(_) => {
            for path in event.paths {
                directory.handle_event(ScriptEvent::Created(path));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            if let (Some(from), Some(to)) = (paths.next(), paths.next()) {
                directory.handle_event(ScriptEvent::Renamed { from, to });
            }
        }
        // 片側しか通知されない改名は削除・作成として扱う
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in event.paths {
                directory.handle_event(ScriptEvent::Removed(path));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in event.paths {
                directory.handle_event(ScriptEvent::Created(path));
            }
        }
        EventKind::Modify(_) => {
            for path in event.paths {
                directory.handle_event(ScriptEvent::Changed(path));
            }
        }
        EventKind::Remove(_) => {
            for path in event.paths {
                directory.handle_event(ScriptEvent::Removed(path));
            }
        }
        _ => {}
    }
}
