// データベースケイパビリティ
//
// エグゼキューターが消費するデータベース能力をトレイトとして定義します:
// トランザクション開始 / ステートメント実行 / コミット / ロールバック /
// アクティブデータベースの切り替え。SQLxのAnyPoolに対する実装を提供します。

use crate::core::error::DatabaseError;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Connection as _};
use std::time::Duration;
use thiserror::Error;

/// ステートメント実行の失敗
///
/// ステートメント単位のエラーと、トランザクション自体が使用不能に
/// なったことをドライバーが報告するケースを区別します。
#[derive(Debug, Error)]
pub enum StatementError {
    /// Statement-level database error
    #[error("Statement failed: {message}")]
    Failed {
        /// ドライバーが報告したエラー
        message: String,
    },

    /// The transaction was aborted by this statement and is no longer usable
    #[error("Transaction is no longer usable")]
    TransactionAborted,
}

/// スクリプト実行のためのトランザクション能力
#[async_trait]
pub trait ScriptTransaction: Send {
    /// ステートメントをタイムアウト付きで実行する
    async fn execute(&mut self, sql: &str, timeout: Duration) -> Result<(), StatementError>;

    /// トランザクションをコミットする
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    /// トランザクションをロールバックする
    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// スクリプト実行のための接続能力
#[async_trait]
pub trait ScriptConnection: Send {
    /// 現在アクティブなデータベース名
    fn active_database(&self) -> &str;

    /// アクティブなデータベースを切り替える
    async fn change_database(&mut self, name: &str) -> Result<(), DatabaseError>;

    /// 新しいトランザクションを開始する
    async fn begin(&mut self) -> Result<Box<dyn ScriptTransaction + Send + '_>, DatabaseError>;
}

/// SQLx接続アダプター
///
/// プールから確保した1本の物理接続の上でScriptConnectionを実装します。
/// データベース切り替えのようなセッション状態と後続のトランザクションが
/// 必ず同じ接続で実行されます。接続はドロップまで保持されます。
pub struct SqlxConnection {
    connection: PoolConnection<Any>,
    active_database: String,
}

impl SqlxConnection {
    /// プールから接続を1本確保してアダプターを作成
    pub async fn connect(
        pool: &AnyPool,
        active_database: impl Into<String>,
    ) -> Result<Self, DatabaseError> {
        let connection = pool.acquire().await.map_err(|e| DatabaseError::Connection {
            message: "Failed to acquire a connection from the pool".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            connection,
            active_database: active_database.into(),
        })
    }
}

#[async_trait]
impl ScriptConnection for SqlxConnection {
    fn active_database(&self) -> &str {
        &self.active_database
    }

    async fn change_database(&mut self, name: &str) -> Result<(), DatabaseError> {
        let quoted = quote_identifier(name)?;
        let sql = format!("USE {}", quoted);

        sqlx::query(&sql)
            .execute(&mut *self.connection)
            .await
            .map_err(|e| DatabaseError::Query {
                message: format!("Failed to change database to '{}': {}", name, e),
                sql: Some(sql),
            })?;

        self.active_database = name.to_string();
        Ok(())
    }

    async fn begin(&mut self) -> Result<Box<dyn ScriptTransaction + Send + '_>, DatabaseError> {
        let transaction = self
            .connection
            .begin()
            .await
            .map_err(|e| DatabaseError::Transaction {
                message: format!("Failed to begin transaction: {}", e),
            })?;

        Ok(Box::new(SqlxTransaction { transaction }))
    }
}

/// SQLxトランザクションアダプター
struct SqlxTransaction<'a> {
    transaction: sqlx::Transaction<'a, sqlx::Any>,
}

#[async_trait]
impl ScriptTransaction for SqlxTransaction<'_> {
    async fn execute(&mut self, sql: &str, timeout: Duration) -> Result<(), StatementError> {
        let query = sqlx::query(sql).execute(&mut *self.transaction);

        match tokio::time::timeout(timeout, query).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(sqlx::Error::Database(error))) => Err(StatementError::Failed {
                message: error.to_string(),
            }),
            // データベースエラー以外（接続断など）はトランザクション自体が死んでいる
            Ok(Err(_)) => Err(StatementError::TransactionAborted),
            Err(_) => Err(StatementError::Failed {
                message: format!("Statement timed out after {:?}", timeout),
            }),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.transaction
            .commit()
            .await
            .map_err(|e| DatabaseError::Transaction {
                message: format!("Failed to commit transaction: {}", e),
            })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.transaction
            .rollback()
            .await
            .map_err(|e| DatabaseError::Transaction {
                message: format!("Failed to roll back transaction: {}", e),
            })
    }
}

/// データベース名を安全に引用符で囲む
///
/// 英数字とアンダースコア以外を含む名前は拒否します。
fn quote_identifier(name: &str) -> Result<String, DatabaseError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(DatabaseError::Query {
            message: format!("Invalid database name: '{}'", name),
            sql: None,
        });
    }

    Ok(format!("\"{}\"", name))
}
