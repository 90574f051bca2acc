// 命名規則
//
// 変換スクリプトのファイル名規則と関連定数の単一ソースを提供します。
// ファイル名は `_<数字>_<名前>.sql`（大文字小文字を区別しない）に
// 一致する必要があります。

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// スクリプトファイルの拡張子
pub const SCRIPT_EXTENSION: &str = "sql";

/// バッチ区切りキーワード（トリム・大文字化した行全体と比較）
pub const BATCH_SEPARATOR: &str = "GO";

/// デバッグセクション開始マーカー（行頭、大文字小文字を区別しない）
pub const DEBUG_OPEN: &str = "--#debug";

/// デバッグセクション終了マーカー（行末、大文字小文字を区別しない）
pub const DEBUG_CLOSE: &str = "#enddebug";

/// Timeoutタグが欠落・不正な場合に使用する既定のタイムアウト
pub const DEFAULT_TIMEOUT: u64 = 6000;

/// ファイル未割り当てのスクリプトに与える序数の番兵値
///
/// 実際の順位ではなく「序数未割り当て」を表す番兵であり、
/// 未割り当てのスクリプトを常に末尾にソートさせます。
pub const UNASSIGNED_ORDINAL: u64 = u64::MAX;

/// スクリプトファイル名の正規表現: `_<digits>_<name>.sql`
static SCRIPT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)_(\d+)_(.*)\.sql$").expect("invalid script name regex"));

/// ファイル名が変換スクリプトの命名規則に一致するかどうか
pub fn is_script_file_name(file_name: &str) -> bool {
    SCRIPT_NAME_RE.is_match(file_name)
}

/// パスから (ordinal, name) を抽出する
///
/// ファイル名が命名規則に一致しない場合、または数字部分が
/// u64として解釈できない場合は None を返します。
pub fn parse_script_path(path: &Path) -> Option<(u64, String)> {
    let file_name = path.file_name()?.to_str()?;
    let captures = SCRIPT_NAME_RE.captures(file_name)?;

    let ordinal: u64 = captures.get(1)?.as_str().parse().ok()?;
    let name = captures.get(2)?.as_str().to_string();

    Some((ordinal, name))
}
