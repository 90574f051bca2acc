// Convoyライブラリのエントリーポイント
//
// モジュール構造:
// - core: コアドメインロジック（スクリプトエンティティ、メタデータ抽出、設定、エラー型）
// - services: スクリプトディレクトリの索引・マージとバッチ分割
// - adapters: データベースとファイルシステム通知へのアクセスを抽象化

pub mod core;
pub mod services;
pub mod adapters;
