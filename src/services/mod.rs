// Services Layer
// スクリプトの発見・索引・マージとバッチ分割を実行するサービス層

pub mod batch_parser;
pub mod catalog;
pub mod script_directory;
