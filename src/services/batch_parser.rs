// バッチ分割パーサー
//
// スクリプトテキストを区切りキーワード（GO）の境界で
// (開始行番号, ステートメントテキスト) の順序付きリストに分割します。
// コメント領域とデバッグセクションの内側では区切りを認識しません。
// SQL構文の検証は行いません。

use crate::core::naming::{BATCH_SEPARATOR, DEBUG_CLOSE, DEBUG_OPEN};
use once_cell::sync::Lazy;
use regex::Regex;

/// 1行内で完結するブロックコメント
static INLINE_BLOCK_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\*.*?\*/").expect("invalid block comment regex"));

/// バッファー先頭に残った区切りキーワード
static SEPARATOR_REMNANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^GO\b").expect("invalid separator regex"));

/// 1つの実行単位
///
/// トランザクション内で順に実行されるステートメントのグループです。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 元のスクリプト内での開始行番号（1始まり）
    pub start_line: usize,
    /// バッチのテキスト
    pub text: String,
}

/// スクリプトテキストをバッチに分割する
///
/// 行単位の単一パスで処理します:
/// - デバッグセクション内の行は行コメントとして取り込まれ、実行されません
/// - 1行内で完結するブロックコメントは除去されます
/// - 複数行にまたがるブロックコメント内では区切りを認識しません
/// - トリム・大文字化した内容がちょうど区切りキーワードの行でバッチを区切ります
/// - 末尾の区切りは不要です（残りのバッファーが最終バッチになります）
///
/// コメントと空行だけのスクリプト、または裸の区切りだけのスクリプトは
/// 空のリストを返します（実行側はこれを成功扱いの no-op とします）。
pub fn split_batches(text: &str) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut buffer = String::new();
    let mut buffer_has_live_content = false;
    let mut start_line = 1;
    let mut in_block_comment = false;
    let mut in_debug_section = false;

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let mut line = raw_line.trim().to_string();

        // デバッグセクション内のコードはコメントアウトして取り込む
        if in_debug_section {
            line = format!("-- {}", line);
        }

        let lowered = line.to_lowercase();
        if lowered.starts_with(DEBUG_OPEN) {
            // 同じ行で開いて閉じてもその行自体は抑制される
            in_debug_section = true;
        }
        let closes_debug = lowered.ends_with(DEBUG_CLOSE);

        // 1行内で完結するブロックコメントを除去
        line = INLINE_BLOCK_COMMENT_RE.replace_all(&line, "").into_owned();

        // 行をまたぐブロックコメントの開閉を追跡する。閉じ記号の行は、
        // その後ろに実内容が残る場合だけ実行内容と数える
        let mut in_comment = in_block_comment;
        if line.contains("/*") {
            in_block_comment = true;
            in_comment = true;
        }
        if let Some((_, rest)) = line.rsplit_once("*/") {
            in_block_comment = false;
            in_comment = rest.trim().is_empty();
        }

        buffer.push_str(&line);
        buffer.push('\n');

        // コメント行・空行・デバッグ/ブロックコメント内の行は実行内容と数えない
        let is_live =
            !line.starts_with("--") && !line.is_empty() && !in_debug_section && !in_comment;
        let is_separator = is_live && line.to_uppercase() == BATCH_SEPARATOR;

        if closes_debug {
            in_debug_section = false;
        }

        if is_separator {
            if buffer_has_live_content {
                push_batch(&mut batches, start_line, &buffer);
            }
            buffer.clear();
            buffer_has_live_content = false;
            start_line = line_number + 1;
        } else if is_live {
            buffer_has_live_content = true;
        }
    }

    // スクリプトは明示的な区切りで終わる必要はない。
    // コメントと空行だけのバッファーは実行単位にならない。
    let trailing = buffer.trim();
    if buffer_has_live_content && !trailing.is_empty() {
        batches.push(Batch {
            start_line,
            text: trailing.to_string(),
        });
    }

    batches
}

/// 区切りキーワードの残骸を取り除いた上で空でなければバッチを追加する
fn push_batch(batches: &mut Vec<Batch>, start_line: usize, buffer: &str) {
    let text = SEPARATOR_REMNANT_RE.replace_all(buffer.trim(), "");
    let text = text.trim();

    if !text.is_empty() {
        batches.push(Batch {
            start_line,
            text: text.to_string(),
        });
    }
}
