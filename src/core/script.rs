// スクリプトエンティティ
//
// 1つの変換スクリプトを表現します。ファイル名から序数と名前を導出し、
// テキストからメタデータ（変数、サブセット、警告、タイムアウト、
// 対象データベース）を抽出します。テキストを設定するたびに
// メタデータは自動的に再導出されます。

use crate::core::error::ScriptError;
use crate::core::naming::{self, DEFAULT_TIMEOUT, UNASSIGNED_ORDINAL};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 変数プレースホルダー: `<<NAME>>`
static VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<<(\w+?)>>").expect("invalid variable regex"));

/// サブセットタグ: `{{Subset=VALUE}}`（VALUEはプレースホルダー可）
static SUBSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\{\{Subset=([\w<>]+?)\}\}").expect("invalid subset regex"));

/// タイムアウトタグ: `{{Timeout=VALUE}}`
static TIMEOUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\{\{Timeout=([\w<>]+?)\}\}").expect("invalid timeout regex"));

/// 警告タグ: `{{Warning=VALUE}}`
static WARNING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\{\{Warning=(.+?)\}\}").expect("invalid warning regex"));

/// データベースタグ: `{{Database=VALUE}}`
static DATABASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\{\{Database=(.+?)\}\}").expect("invalid database regex"));

/// 裸のプレースホルダー参照: 値全体が `<<NAME>>` の形
static BARE_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^<<(\w+)>>$").expect("invalid placeholder regex"));

/// スクリプトの識別キー
///
/// 2つのスクリプトは name と ordinal が一致すれば同一とみなされます
/// （内容は同一性に関与しません）。序数→名前の順で全順序を定めます。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptKey {
    /// 序数（第一ソートキー）
    pub ordinal: u64,
    /// スクリプト名
    pub name: String,
}

/// 変換スクリプトエンティティ
///
/// ファイルに裏付けられている場合、name と ordinal はパスから導出され
/// 不変になります。テキストの設定はメタデータの再導出を引き起こします。
#[derive(Debug, Clone)]
pub struct Script {
    ordinal: u64,
    name: String,
    file_path: Option<PathBuf>,
    text: String,
    variables: Vec<String>,
    subsets: Vec<String>,
    warning: Option<String>,
    timeout: Option<String>,
    database: Option<String>,
}

impl Script {
    /// ファイルに裏付けられない空のスクリプトを作成
    ///
    /// 序数は番兵値（未割り当て）で初期化され、末尾にソートされます。
    pub fn new() -> Self {
        Self {
            ordinal: UNASSIGNED_ORDINAL,
            name: String::new(),
            file_path: None,
            text: String::new(),
            variables: Vec::new(),
            subsets: Vec::new(),
            warning: None,
            timeout: None,
            database: None,
        }
    }

    /// ファイルからスクリプトを作成
    ///
    /// ファイル名が `_<digits>_<name>.sql` に一致しない場合は InvalidName、
    /// ファイルが読み込めない場合は NotFound を返します。
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ScriptError> {
        let path = path.into();

        let (ordinal, name) = naming::parse_script_path(&path)
            .ok_or_else(|| ScriptError::InvalidName { path: path.clone() })?;

        let text = fs::read_to_string(&path)
            .map_err(|_| ScriptError::NotFound { path: path.clone() })?;

        let mut script = Self::new();
        script.ordinal = ordinal;
        script.name = name;
        script.file_path = Some(path);
        script.set_text(text);

        Ok(script)
    }

    /// 序数を取得
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// 名前を取得
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 裏付けファイルのパスを取得
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// 生のテキストを取得
    pub fn text(&self) -> &str {
        &self.text
    }

    /// テキスト内の重複を除いた変数名の一覧を取得
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// 識別キーを取得
    pub fn key(&self) -> ScriptKey {
        ScriptKey {
            ordinal: self.ordinal,
            name: self.name.clone(),
        }
    }

    /// 名前を設定
    ///
    /// ファイルに裏付けられたスクリプトでは ImmutableField を返します。
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ScriptError> {
        if let Some(path) = &self.file_path {
            return Err(ScriptError::ImmutableField {
                field: "name",
                path: path.clone(),
            });
        }

        self.name = name.into();
        Ok(())
    }

    /// 序数を設定
    ///
    /// ファイルに裏付けられたスクリプトでは ImmutableField を返します。
    pub fn set_ordinal(&mut self, ordinal: u64) -> Result<(), ScriptError> {
        if let Some(path) = &self.file_path {
            return Err(ScriptError::ImmutableField {
                field: "ordinal",
                path: path.clone(),
            });
        }

        self.ordinal = ordinal;
        Ok(())
    }

    /// テキストを設定し、すべてのメタデータを再導出する
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.refresh_metadata();
    }

    /// 裏付けファイルの内容をテキストへ再読み込みする
    ///
    /// ファイルが消えている場合は NotFound を返します。
    /// ファイルに裏付けられていないスクリプトでは何もしません。
    pub fn reread(&mut self) -> Result<(), ScriptError> {
        let Some(path) = self.file_path.clone() else {
            return Ok(());
        };

        let text = fs::read_to_string(&path).map_err(|_| ScriptError::NotFound { path })?;
        self.set_text(text);
        Ok(())
    }

    /// 変数を置換したテキストを取得
    ///
    /// マッピングが与えられた場合、テキスト中のすべての変数がマッピングに
    /// 含まれている必要があります。欠落があれば MissingVariable で
    /// 欠落した名前をすべて列挙します。マッピングなしでは生のテキストを
    /// 検証なしでそのまま返します。
    pub fn resolved_text(
        &self,
        mapping: Option<&HashMap<String, String>>,
    ) -> Result<String, ScriptError> {
        let Some(mapping) = mapping else {
            return Ok(self.text.clone());
        };

        let missing: Vec<String> = self
            .variables
            .iter()
            .filter(|v| !mapping.contains_key(*v))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ScriptError::MissingVariable { names: missing });
        }

        let mut resolved = self.text.clone();
        for (key, value) in mapping {
            resolved = resolved.replace(&format!("<<{}>>", key), value);
        }

        Ok(resolved)
    }

    /// Databaseタグの値を取得（間接参照はマッピング経由で解決）
    pub fn resolved_database(
        &self,
        mapping: Option<&HashMap<String, String>>,
    ) -> Result<Option<String>, ScriptError> {
        self.database
            .as_deref()
            .map(|value| resolve_tag_value(value, mapping))
            .transpose()
    }

    /// Warningタグの値を取得（間接参照はマッピング経由で解決）
    pub fn resolved_warning(
        &self,
        mapping: Option<&HashMap<String, String>>,
    ) -> Result<Option<String>, ScriptError> {
        self.warning
            .as_deref()
            .map(|value| resolve_tag_value(value, mapping))
            .transpose()
    }

    /// Subsetタグの値の一覧を取得（間接参照はマッピング経由で解決）
    ///
    /// タグがなければ空のリストを返します。
    pub fn resolved_subsets(
        &self,
        mapping: Option<&HashMap<String, String>>,
    ) -> Result<Vec<String>, ScriptError> {
        self.subsets
            .iter()
            .map(|value| resolve_tag_value(value, mapping))
            .collect()
    }

    /// Timeoutタグの値を取得
    ///
    /// タグの欠落、数値として解釈できない値、間接参照の解決失敗は
    /// いずれも既定値（6000）を返します。不正なタイムアウトタグだけを
    /// 理由に実行をブロックすることはありません。
    pub fn resolved_timeout(&self, mapping: Option<&HashMap<String, String>>) -> u64 {
        self.resolved_timeout_or(mapping, DEFAULT_TIMEOUT)
    }

    /// Timeoutタグの値を取得（既定値を指定）
    ///
    /// プロジェクト設定の既定タイムアウトを適用する呼び出し元向けです。
    /// タグの値が有効な場合はタグが常に優先されます。
    pub fn resolved_timeout_or(
        &self,
        mapping: Option<&HashMap<String, String>>,
        default: u64,
    ) -> u64 {
        let Some(raw) = self.timeout.as_deref() else {
            return default;
        };

        match resolve_tag_value(raw, mapping) {
            Ok(value) => value.trim().parse().unwrap_or(default),
            Err(_) => default,
        }
    }

    /// テキストからすべてのメタデータフィールドを再導出する
    fn refresh_metadata(&mut self) {
        self.variables = load_multi_tag(&VARIABLE_RE, &self.text);
        self.subsets = load_multi_tag(&SUBSET_RE, &self.text);
        self.timeout = load_tag(&TIMEOUT_RE, &self.text);
        self.warning = load_tag(&WARNING_RE, &self.text);
        self.database = load_tag(&DATABASE_RE, &self.text);
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

/// 同一性は (name, ordinal) のみで決まる（内容は無関係）
impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal && self.name == other.name
    }
}

impl Eq for Script {}

/// 複数出現タグの値を出現順・重複除去で収集する
fn load_multi_tag(re: &Regex, text: &str) -> Vec<String> {
    let mut values = Vec::new();
    for captures in re.captures_iter(text) {
        if let Some(value) = captures.get(1) {
            let value = value.as_str().to_string();
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }
    values
}

/// 単一値タグの最初の出現を取得する
///
/// 行コメント内に置かれたタグ値からコメントマーカーを取り除きます。
fn load_tag(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().replace("--", ""))
}

/// 値が裸のプレースホルダー参照なら間接解決、それ以外はリテラルを返す
///
/// マッピングなしではプレースホルダーであっても格納値をそのまま返すため、
/// 解決失敗とリテラル値は区別可能です。
fn resolve_tag_value(
    value: &str,
    mapping: Option<&HashMap<String, String>>,
) -> Result<String, ScriptError> {
    let (Some(mapping), Some(captures)) = (mapping, BARE_PLACEHOLDER_RE.captures(value)) else {
        return Ok(value.to_string());
    };

    let key = &captures[1];
    mapping
        .get(key)
        .cloned()
        .ok_or_else(|| ScriptError::MissingVariable {
            names: vec![key.to_string()],
        })
}
