// 設定ファイル管理
//
// 変換プロジェクトの設定ファイル（YAML形式）の読み込みと検証を行います。
// スクリプトディレクトリの優先順位リスト、変数マッピング、
// 既定タイムアウトを管理します。

use crate::core::naming::DEFAULT_TIMEOUT;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// スクリプトディレクトリの設定
///
/// カタログへの登録順がそのまま優先順位になります（後のディレクトリが勝つ）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// ディレクトリのパス
    pub path: PathBuf,

    /// サブディレクトリを再帰的に走査するかどうか
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_recursive() -> bool {
    false
}

/// プロジェクト設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// 設定ファイルのバージョン
    pub version: String,

    /// スクリプトディレクトリの優先順位リスト
    pub directories: Vec<DirectoryEntry>,

    /// 変数マッピング（`<<NAME>>` プレースホルダーの置換値）
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Timeoutタグを持たないスクリプトに適用する既定タイムアウト
    #[serde(default = "default_timeout")]
    pub default_timeout: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

impl ProjectConfig {
    /// 設定の妥当性を検証
    pub fn validate(&self) -> Result<()> {
        // バージョンチェック
        if self.version.is_empty() {
            return Err(anyhow!("Config file version is not specified"));
        }

        // ディレクトリリストチェック
        if self.directories.is_empty() {
            return Err(anyhow!("At least one script directory is required"));
        }

        // 重複ディレクトリの検出
        for (i, entry) in self.directories.iter().enumerate() {
            if self.directories[..i].iter().any(|e| e.path == entry.path) {
                return Err(anyhow!(
                    "Duplicate script directory in config: {:?}",
                    entry.path
                ));
            }
        }

        Ok(())
    }
}

/// std::str::FromStrトレイトの実装
impl FromStr for ProjectConfig {
    type Err = anyhow::Error;

    fn from_str(yaml: &str) -> Result<Self, Self::Err> {
        let config: ProjectConfig =
            serde_saphyr::from_str(yaml).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
version: "1"
directories:
  - path: scripts/common
  - path: scripts/client
    recursive: true
variables:
  Environment: staging
default_timeout: 300
"#;

        let config = ProjectConfig::from_str(yaml).unwrap();
        assert_eq!(config.directories.len(), 2);
        assert!(!config.directories[0].recursive);
        assert!(config.directories[1].recursive);
        assert_eq!(config.variables["Environment"], "staging");
        assert_eq!(config.default_timeout, 300);
    }

    #[test]
    fn test_default_timeout_applied() {
        let yaml = r#"
version: "1"
directories:
  - path: scripts
"#;

        let config = ProjectConfig::from_str(yaml).unwrap();
        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
        assert!(config.variables.is_empty());
    }

    #[test]
    fn test_empty_directories_rejected() {
        let yaml = r#"
version: "1"
directories: []
"#;

        let result = ProjectConfig::from_str(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("At least one script directory"));
    }

    #[test]
    fn test_duplicate_directories_rejected() {
        let yaml = r#"
version: "1"
directories:
  - path: scripts
  - path: scripts
"#;

        let result = ProjectConfig::from_str(yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_missing_version_rejected() {
        let yaml = r#"
version: ""
directories:
  - path: scripts
"#;

        assert!(ProjectConfig::from_str(yaml).is_err());
    }
}
