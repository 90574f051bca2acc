// Adapters
// データベースとファイルシステム変更通知へのアクセスを抽象化

pub mod database;
pub mod executor;
pub mod watcher;
