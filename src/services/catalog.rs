// スクリプトカタログ
//
// 順序付きのスクリプトディレクトリのリストを保持し、単一の
// 重複解決・序数昇順の実行リストを生成します。リストの順序が
// そのまま優先順位であり、後のディレクトリにある同一の
// (name, ordinal) のスクリプトが前のディレクトリのものを上書きします。

use crate::core::config::ProjectConfig;
use crate::core::script::{Script, ScriptKey};
use crate::services::script_directory::ScriptDirectory;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// 変換プロジェクトのスクリプトカタログ
///
/// マージ結果はキャッシュされ、いずれかのディレクトリが未反映の
/// 変更を報告するまで再計算されません。マージは読み取りスレッド上で
/// 同期的に実行されます（ホットパスではありません）。
#[derive(Debug, Default)]
pub struct ScriptCatalog {
    directories: Vec<Arc<ScriptDirectory>>,
    merged: Mutex<Vec<Script>>,
}

impl ScriptCatalog {
    /// 空のカタログを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// プロジェクト設定からカタログを構築
    ///
    /// 設定内のディレクトリの並び順がそのまま優先順位になります。
    pub fn from_config(config: &ProjectConfig) -> Result<Self> {
        let mut catalog = Self::new();

        for entry in &config.directories {
            let directory = ScriptDirectory::new(&entry.path, entry.recursive)?;
            catalog.add_directory(Arc::new(directory));
        }

        Ok(catalog)
    }

    /// ディレクトリを優先順位リストの末尾に追加する（最後が最優先）
    pub fn add_directory(&mut self, directory: Arc<ScriptDirectory>) {
        self.directories.push(directory);
    }

    /// カタログに登録されたディレクトリ
    pub fn directories(&self) -> &[Arc<ScriptDirectory>] {
        &self.directories
    }

    /// マージ済み・序数昇順のスクリプト一覧を取得する
    ///
    /// キャッシュが空か、いずれかのディレクトリがダーティな場合のみ
    /// 再マージします。マージは毎回ゼロから構築するため、削除された
    /// スクリプトが結果に残り続けることはありません。
    pub fn scripts(&self) -> Vec<Script> {
        let mut merged = self
            .merged
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if merged.is_empty() || self.directories.iter().any(|d| d.is_dirty()) {
            let mut by_key: HashMap<ScriptKey, Script> = HashMap::new();

            for directory in &self.directories {
                for script in directory.scripts() {
                    // 後のディレクトリの同一キーが前のものを上書きする
                    by_key.insert(script.key(), script);
                }
            }

            let mut list: Vec<Script> = by_key.into_values().collect();
            list.sort_by_key(Script::key);
            *merged = list;
        }

        merged.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), text).unwrap();
    }

    fn directory(path: &Path) -> Arc<ScriptDirectory> {
        Arc::new(ScriptDirectory::new(path, false).unwrap())
    }

    #[test]
    fn test_later_directory_wins_for_same_identity() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        write_script(dir_a.path(), "_1_X.sql", "from A");
        write_script(dir_b.path(), "_1_X.sql", "from B");
        write_script(dir_b.path(), "_2_Y.sql", "only B");

        let mut catalog = ScriptCatalog::new();
        catalog.add_directory(directory(dir_a.path()));
        catalog.add_directory(directory(dir_b.path()));

        let scripts = catalog.scripts();
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].text(), "from B");
        assert_eq!(scripts[1].name(), "Y");
    }

    #[test]
    fn test_merged_result_sorted_by_ordinal() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "_30_C.sql", "");
        write_script(dir.path(), "_10_A.sql", "");
        write_script(dir.path(), "_20_B.sql", "");

        let mut catalog = ScriptCatalog::new();
        catalog.add_directory(directory(dir.path()));

        let ordinals: Vec<u64> = catalog.scripts().iter().map(Script::ordinal).collect();
        assert_eq!(ordinals, [10, 20, 30]);
    }

    #[test]
    fn test_merge_is_cached_until_dirty() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "_1_X.sql", "SELECT 1");

        let handle = directory(dir.path());
        let mut catalog = ScriptCatalog::new();
        catalog.add_directory(Arc::clone(&handle));

        assert_eq!(catalog.scripts().len(), 1);
        assert!(!handle.is_dirty());

        // 変更がなければ同じ結果が返る
        assert_eq!(catalog.scripts().len(), 1);
    }

    #[test]
    fn test_deletion_propagates_to_merge() {
        use crate::services::script_directory::ScriptEvent;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_1_X.sql");
        fs::write(&path, "SELECT 1").unwrap();

        let handle = directory(dir.path());
        let mut catalog = ScriptCatalog::new();
        catalog.add_directory(Arc::clone(&handle));
        assert_eq!(catalog.scripts().len(), 1);

        fs::remove_file(&path).unwrap();
        handle.handle_event(ScriptEvent::Removed(path));

        assert!(catalog.scripts().is_empty());
    }
}
