// スクリプトディレクトリ索引
//
// 1つのルートディレクトリ配下の命名規則に一致するファイルを索引し、
// パス→スクリプトのライブマッピングを維持します。ファイルシステムの
// 変更イベントを適用して増分更新し、読み取り時にサブディレクトリ間の
// 同名衝突を決定論的に解決します。
//
// イベントは通知スレッドから、読み取りはアプリケーションスレッドから
// 到達するため、マップとダーティフラグは単一のMutexで保護します。

use crate::core::naming;
use crate::core::script::Script;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use walkdir::WalkDir;

/// ファイルシステム変更イベント
///
/// プラットフォームの通知機構（adapters::watcher）から供給されます。
#[derive(Debug, Clone)]
pub enum ScriptEvent {
    /// ファイルが作成された
    Created(PathBuf),
    /// ファイルの内容が変更された
    Changed(PathBuf),
    /// ファイルが削除された
    Removed(PathBuf),
    /// ファイルが移動・改名された
    Renamed {
        /// 旧パス
        from: PathBuf,
        /// 新パス
        to: PathBuf,
    },
}

/// Mutexで保護される可変状態
#[derive(Debug, Default)]
struct DirectoryState {
    /// 絶対ファイルパス → スクリプト
    scripts: HashMap<PathBuf, Script>,
    /// 最後のビュー計算以降に変更があったか
    dirty: bool,
    /// 重複解決・ソート済みのキャッシュビュー
    view: Vec<Script>,
}

/// スクリプトディレクトリ索引
///
/// 外部から見えるリストは常にファイル名単位で重複解決されています。
/// 同名ファイルが複数のサブディレクトリに存在する場合、パスの
/// ディレクトリ階層が浅い方が勝ち、同じ深さなら最初に分岐する
/// パスセグメントが辞書順で先の方が勝ちます。
#[derive(Debug)]
pub struct ScriptDirectory {
    root: PathBuf,
    recursive: bool,
    state: Mutex<DirectoryState>,
}

impl ScriptDirectory {
    /// ディレクトリを1回走査して索引を構築する
    ///
    /// 構築直後はダーティ状態です。変更通知の購読は
    /// `adapters::watcher::watch` が行います。
    pub fn new(root: impl Into<PathBuf>, include_subdirectories: bool) -> Result<Self> {
        let root = root.into();
        let scripts = scan_directory(&root, include_subdirectories)?;

        Ok(Self {
            root,
            recursive: include_subdirectories,
            state: Mutex::new(DirectoryState {
                scripts,
                dirty: true,
                view: Vec::new(),
            }),
        })
    }

    /// 索引のルートディレクトリ
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// サブディレクトリを含めて監視するかどうか
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// 最後の読み取り以降に未反映の変更があるかどうか
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// ファイルシステムイベントを索引に適用する
    ///
    /// イベント処理のエラーは致命的ではありません。未知のパスへの
    /// 変更通知や読めないファイルはログに記録して破棄し、監視ループを
    /// 停止させません。
    pub fn handle_event(&self, event: ScriptEvent) {
        match event {
            ScriptEvent::Created(path) => self.on_created(path),
            ScriptEvent::Changed(path) => self.on_changed(&path),
            ScriptEvent::Removed(path) => self.on_removed(&path),
            ScriptEvent::Renamed { from, to } => self.on_renamed(&from, to),
        }
    }

    /// 重複解決・序数昇順のスクリプト一覧を取得する
    ///
    /// ダーティな場合のみビューを再計算し、フラグをクリアします。
    /// イベントのない連続読み取りはキャッシュをそのまま返します。
    pub fn scripts(&self) -> Vec<Script> {
        let mut state = self.lock();

        if state.dirty {
            state.view = deduplicated_view(&state.scripts);
            state.dirty = false;
        }

        state.view.clone()
    }

    fn on_created(&self, path: PathBuf) {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        if !naming::is_script_file_name(file_name) {
            return;
        }

        match Script::from_file(&path) {
            Ok(script) => {
                let mut state = self.lock();
                state.scripts.insert(path, script);
                state.dirty = true;
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "ignoring unreadable created script");
            }
        }
    }

    fn on_changed(&self, path: &Path) {
        let mut state = self.lock();

        let Some(script) = state.scripts.get_mut(path) else {
            // 追跡していないパスへの変更通知は呼び出し元が観測するエラーではない
            tracing::warn!(path = %path.display(), "change notification for untracked path");
            return;
        };

        if let Err(error) = script.reread() {
            tracing::warn!(path = %path.display(), %error, "failed to re-read changed script");
        }
        state.dirty = true;
    }

    fn on_removed(&self, path: &Path) {
        let mut state = self.lock();

        if state.scripts.remove(path).is_some() {
            state.dirty = true;
        }
    }

    /// 改名は決して内容更新として扱わない
    ///
    /// 序数と名前は新しいパスから再導出する必要があるため、
    /// 旧エントリを削除して新しいエンティティを構築します。
    fn on_renamed(&self, from: &Path, to: PathBuf) {
        let mut state = self.lock();

        state.scripts.remove(from);
        state.dirty = true;

        let matches_convention = to
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(naming::is_script_file_name);
        if !matches_convention {
            return;
        }

        match Script::from_file(&to) {
            Ok(script) => {
                state.scripts.insert(to, script);
            }
            Err(error) => {
                tracing::warn!(path = %to.display(), %error, "ignoring unreadable renamed script");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// ルート配下の命名規則に一致するファイルを列挙してスクリプトを構築する
fn scan_directory(root: &Path, recursive: bool) -> Result<HashMap<PathBuf, Script>> {
    let mut scripts = HashMap::new();

    for path in list_script_files(root, recursive)? {
        match Script::from_file(&path) {
            Ok(script) => {
                scripts.insert(path, script);
            }
            Err(error) => {
                // 列挙と読み取りの間に消えたファイルは索引しない
                tracing::warn!(path = %path.display(), %error, "skipping unreadable script file");
            }
        }
    }

    Ok(scripts)
}

fn list_script_files(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in WalkDir::new(root) {
            let entry =
                entry.with_context(|| format!("Failed to scan script directory: {:?}", root))?;
            if entry.file_type().is_file() && is_script_entry(entry.path()) {
                files.push(entry.into_path());
            }
        }
    } else {
        let entries = fs::read_dir(root)
            .with_context(|| format!("Failed to read script directory: {:?}", root))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && is_script_entry(&path) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

fn is_script_entry(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(naming::is_script_file_name)
}

/// ファイル名単位で重複を解決し、序数昇順のビューを構築する
fn deduplicated_view(scripts: &HashMap<PathBuf, Script>) -> Vec<Script> {
    let mut winners: HashMap<String, (&PathBuf, &Script)> = HashMap::new();

    for (path, script) in scripts {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let key = file_name.to_lowercase();

        let replaces_incumbent = match winners.get(&key) {
            Some((incumbent, _)) => beats(path, incumbent),
            None => true,
        };
        if replaces_incumbent {
            winners.insert(key, (path, script));
        }
    }

    let mut view: Vec<Script> = winners.into_values().map(|(_, s)| s.clone()).collect();
    view.sort_by_key(Script::key);
    view
}

/// 深さ優先・辞書順の勝敗判定
///
/// 浅いパスが勝ち、同じ深さなら最初に分岐するセグメントが
/// 辞書順で先のパスが勝ちます。全順序なので同じディレクトリツリーは
/// 常に同じ勝者を生みます。
fn beats(challenger: &Path, incumbent: &Path) -> bool {
    let challenger_dirs: Vec<_> = challenger
        .parent()
        .map(|p| p.components().collect())
        .unwrap_or_default();
    let incumbent_dirs: Vec<_> = incumbent
        .parent()
        .map(|p| p.components().collect())
        .unwrap_or_default();

    if challenger_dirs.len() != incumbent_dirs.len() {
        return challenger_dirs.len() < incumbent_dirs.len();
    }

    for (challenger_seg, incumbent_seg) in challenger_dirs.iter().zip(&incumbent_dirs) {
        if challenger_seg != incumbent_seg {
            return challenger_seg < incumbent_seg;
        }
    }

    false
}
