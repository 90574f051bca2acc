// Core Domain
// スクリプトエンティティ、メタデータ抽出、命名規則、設定の純粋なビジネスロジック

pub mod config;
pub mod error;
pub mod naming;
pub mod script;
