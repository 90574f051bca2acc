// スクリプトエグゼキューター
//
// スクリプトをバッチに分割し、1つのトランザクション内で順に実行します。
// バッチ間での協調的キャンセル、スクリプト単位のタイムアウト、
// 失敗時のロールバックを保証します。同一接続に対する複数スクリプトの
// 直列化は呼び出し元の責任です。

use crate::adapters::database::{ScriptConnection, ScriptTransaction, StatementError};
use crate::core::config::ProjectConfig;
use crate::core::error::{DatabaseError, ExecutionError};
use crate::core::naming::DEFAULT_TIMEOUT;
use crate::core::script::Script;
use crate::services::batch_parser::split_batches;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 協調的キャンセルシグナル
///
/// キャンセルはバッチの間でのみ検査されます。実行中のステートメントが
/// 中断されることはなく、次のバッチがスキップされるだけです。
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// 新しい未キャンセルのシグナルを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// キャンセルを要求する
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// キャンセルが要求されているかどうか
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// スクリプトエグゼキューター
///
/// Timeoutタグを持たない（または不正なタグの）スクリプトには
/// エグゼキューターの既定タイムアウトが適用されます。
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    default_timeout: u64,
}

impl ScriptExecutor {
    /// 既定タイムアウト（6000秒）のScriptExecutorを作成
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// プロジェクト設定の既定タイムアウトを適用するScriptExecutorを作成
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            default_timeout: config.default_timeout,
        }
    }

    /// 1つのスクリプトを1つのトランザクションとして実行する
    ///
    /// 1. Databaseタグを解決し、アクティブデータベースと異なれば切り替える
    /// 2. 変数を解決する（欠落はデータベースに触れる前にMissingVariable）
    /// 3. バッチに分割する（0バッチは成功扱いのno-op）
    /// 4. トランザクションを開始し、バッチを順に実行する
    /// 5. トランザクション開始後のあらゆる失敗はロールバックを試みる。
    ///    ロールバック自体の失敗は元のエラーを包んでRollbackFailedになる
    pub async fn run(
        &self,
        script: &Script,
        variables: Option<&HashMap<String, String>>,
        connection: &mut dyn ScriptConnection,
        cancel: Option<&CancelFlag>,
    ) -> Result<(), ExecutionError> {
        if let Some(database) = script.resolved_database(variables)? {
            if connection.active_database() != database {
                connection.change_database(&database).await?;
            }
        }

        let text = script.resolved_text(variables)?;
        let batches = split_batches(&text);
        if batches.is_empty() {
            return Ok(());
        }

        let timeout =
            Duration::from_secs(script.resolved_timeout_or(variables, self.default_timeout));

        let mut transaction = connection.begin().await?;

        for batch in &batches {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return rollback_with_cause(
                    transaction,
                    ExecutionError::Cancelled {
                        line: batch.start_line,
                    },
                )
                .await;
            }

            match transaction.execute(&batch.text, timeout).await {
                Ok(()) => {}
                Err(StatementError::TransactionAborted) => {
                    return rollback_with_cause(
                        transaction,
                        ExecutionError::TransactionAborted {
                            line: batch.start_line,
                        },
                    )
                    .await;
                }
                Err(StatementError::Failed { message }) => {
                    return rollback_with_cause(
                        transaction,
                        ExecutionError::BatchFailed {
                            line: batch.start_line,
                            message,
                            batch: batch.text.clone(),
                        },
                    )
                    .await;
                }
            }
        }

        transaction.commit().await?;
        Ok(())
    }

    /// 複数のスクリプトを序数順に実行する
    ///
    /// 最初に失敗したスクリプトで停止します。別の継続ポリシーが必要な
    /// 呼び出し元は `run` を直接ループしてください。
    pub async fn run_all(
        &self,
        scripts: &[Script],
        variables: Option<&HashMap<String, String>>,
        connection: &mut dyn ScriptConnection,
        cancel: Option<&CancelFlag>,
    ) -> Result<(), ExecutionError> {
        let mut ordered: Vec<&Script> = scripts.iter().collect();
        ordered.sort_by_key(|s| s.key());

        for script in ordered {
            tracing::info!(
                ordinal = script.ordinal(),
                name = script.name(),
                "running script"
            );
            self.run(script, variables, connection, cancel).await?;
        }

        Ok(())
    }

    /// `run` の同期版
    ///
    /// バッチの順序と失敗時の振る舞いは非同期版と同一で、各ステートメントの
    /// 完了またはタイムアウトまで呼び出しスレッドをブロックする点だけが
    /// 異なります。
    pub fn run_blocking(
        &self,
        script: &Script,
        variables: Option<&HashMap<String, String>>,
        connection: &mut dyn ScriptConnection,
        cancel: Option<&CancelFlag>,
    ) -> Result<(), ExecutionError> {
        let runtime = tokio::runtime::Runtime::new().map_err(|e| {
            ExecutionError::Database(DatabaseError::Connection {
                message: "Failed to create Tokio runtime".to_string(),
                cause: e.to_string(),
            })
        })?;

        runtime.block_on(self.run(script, variables, connection, cancel))
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// ロールバックを試みてから元のエラーを返す
///
/// ロールバックに失敗しても元の原因は決して握りつぶさず、
/// 両方をRollbackFailedに包んで返します。
async fn rollback_with_cause(
    transaction: Box<dyn ScriptTransaction + Send + '_>,
    cause: ExecutionError,
) -> Result<(), ExecutionError> {
    match transaction.rollback().await {
        Ok(()) => Err(cause),
        Err(rollback) => Err(ExecutionError::RollbackFailed {
            rollback,
            cause: Box::new(cause),
        }),
    }
}
