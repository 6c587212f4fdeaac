//! flight-server エラー型

use flight_proto::ProtoError;
use thiserror::Error;

/// コンポーネント（非同期ノード）が返す任意のエラー
pub type ComponentError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// エンコード中のエラー
#[derive(Debug, Error)]
pub enum RenderError {
    /// 必要なフックが渡されていない（例: クライアント参照の記述子フック）
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// エンコードできないノード（ステートフルなコンポーネントなど）
    #[error("Unsupported node: {0}")]
    UnsupportedNode(String),
    /// 非同期ノードの計算そのものが失敗した
    #[error("Component failed: {0}")]
    Component(#[source] ComponentError),
    /// チャンクのシリアライズに失敗した
    #[error(transparent)]
    Encode(#[from] ProtoError),
    /// 出力先への書き込みに失敗した
    #[error("Failed to write chunk stream: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// バックグラウンドのサブツリー内で起きた場合に、そのホールだけの失敗として
    /// `E` チャンクに変換できるか
    ///
    /// 構造的なエラー（設定・未対応ノード・エンコード）はストリーム全体を止める。
    pub fn is_isolated(&self) -> bool {
        matches!(self, RenderError::Component(_))
    }
}
