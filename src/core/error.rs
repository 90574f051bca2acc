// エラー型定義
//
// ライブラリ全体で使用されるカスタムエラー型を提供します。
// thiserrorを使用して、ScriptError, DatabaseError, ExecutionError を定義します。

use std::path::PathBuf;
use thiserror::Error;

/// スクリプトエラー
///
/// スクリプトエンティティの構築・変更・変数解決時に発生するエラーを表現します。
/// データベースに触れる前に呼び出し元へ直接返されます。
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// File name does not match the `_<digits>_<name>.sql` convention
    #[error("Invalid script file name: {path} (expected '_<digits>_<name>.sql')")]
    InvalidName {
        /// 規則に一致しなかったパス
        path: PathBuf,
    },

    /// Backing file missing at read time
    #[error("Script file not found: {path}")]
    NotFound {
        /// 読み込めなかったパス
        path: PathBuf,
    },

    /// Attempt to mutate name/ordinal on a file-backed script
    #[error("Cannot set {field} on a file-backed script (backed by {path})")]
    ImmutableField {
        /// 変更しようとしたフィールド名
        field: &'static str,
        /// スクリプトを裏付けるファイル
        path: PathBuf,
    },

    /// Unresolved placeholders at text/tag resolution time
    #[error("Missing variables: {}", .names.join(", "))]
    MissingVariable {
        /// マッピングに存在しなかったすべての変数名
        names: Vec<String>,
    },
}

impl ScriptError {
    /// 命名規則違反かどうか
    pub fn is_invalid_name(&self) -> bool {
        matches!(self, ScriptError::InvalidName { .. })
    }

    /// ファイル欠落エラーかどうか
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScriptError::NotFound { .. })
    }

    /// 不変フィールド変更エラーかどうか
    pub fn is_immutable_field(&self) -> bool {
        matches!(self, ScriptError::ImmutableField { .. })
    }

    /// 変数未解決エラーかどうか
    pub fn is_missing_variable(&self) -> bool {
        matches!(self, ScriptError::MissingVariable { .. })
    }
}

/// データベースエラー
///
/// データベースケイパビリティの操作時に発生するエラーを表現します。
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection error
    #[error("Database connection error: {message} (cause: {cause})")]
    Connection {
        /// エラーメッセージ
        message: String,
        /// エラー原因
        cause: String,
    },

    /// Query execution error
    #[error("Query execution error: {message}")]
    Query {
        /// エラーメッセージ
        message: String,
        /// 失敗したSQL
        sql: Option<String>,
    },

    /// Transaction error
    #[error("Transaction error: {message}")]
    Transaction {
        /// エラーメッセージ
        message: String,
    },
}

impl DatabaseError {
    /// 接続エラーかどうか
    pub fn is_connection(&self) -> bool {
        matches!(self, DatabaseError::Connection { .. })
    }

    /// クエリエラーかどうか
    pub fn is_query(&self) -> bool {
        matches!(self, DatabaseError::Query { .. })
    }

    /// トランザクションエラーかどうか
    pub fn is_transaction(&self) -> bool {
        matches!(self, DatabaseError::Transaction { .. })
    }
}

/// 実行エラー
///
/// バッチ実行時に発生するエラーを表現します。トランザクション開始後の
/// 失敗は必ずロールバックを試みてから呼び出し元へ返されます。
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Structural error surfaced before any database interaction
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Database capability error outside a batch (begin/commit/switch)
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Cooperative cancellation observed between batches
    #[error("Script was cancelled before the batch starting on line {line}")]
    Cancelled {
        /// スキップされたバッチの開始行
        line: usize,
    },

    /// Statement-level database error within a batch
    #[error("Batch starting on line {line} failed: {message}\n{batch}")]
    BatchFailed {
        /// バッチの開始行
        line: usize,
        /// ドライバーが報告したエラー
        message: String,
        /// 失敗したバッチのテキスト
        batch: String,
    },

    /// Driver reports the transaction is no longer usable
    #[error("Transaction was rolled back within the batch starting on line {line}")]
    TransactionAborted {
        /// バッチの開始行
        line: usize,
    },

    /// Rollback itself failed; wraps both errors so the original cause is never lost
    #[error("Rollback failed: {rollback} (original cause: {cause})")]
    RollbackFailed {
        /// ロールバックの失敗
        rollback: DatabaseError,
        /// ロールバックの引き金となった元のエラー
        cause: Box<ExecutionError>,
    },
}

impl ExecutionError {
    /// キャンセルによる失敗かどうか
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled { .. })
    }

    /// バッチ実行エラーかどうか
    pub fn is_batch_failed(&self) -> bool {
        matches!(self, ExecutionError::BatchFailed { .. })
    }

    /// トランザクション中断エラーかどうか
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, ExecutionError::TransactionAborted { .. })
    }

    /// ロールバック失敗エラーかどうか
    pub fn is_rollback_failed(&self) -> bool {
        matches!(self, ExecutionError::RollbackFailed { .. })
    }

    /// 失敗したバッチの開始行を取得
    pub fn line(&self) -> Option<usize> {
        match self {
            ExecutionError::Cancelled { line }
            | ExecutionError::BatchFailed { line, .. }
            | ExecutionError::TransactionAborted { line } => Some(*line),
            ExecutionError::RollbackFailed { cause, .. } => cause.line(),
            _ => None,
        }
    }
}
