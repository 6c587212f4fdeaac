//! flight-client エラー型

use flight_proto::ProtoError;
use flight_transport::TransportError;
use thiserror::Error;

/// 読み取り元のストリームが返した任意のエラー
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// ストリームのデコードエラー
///
/// どれもそのストリームの再構築を打ち切る。
#[derive(Debug, Error)]
pub enum DecodeError {
    /// チャンクの形式が不正（ProtocolError）
    #[error(transparent)]
    Protocol(#[from] ProtoError),
    /// 行の組み立てに失敗した
    #[error(transparent)]
    Framing(#[from] TransportError),
    /// 必要なフックが渡されていない
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// ルートの `J` チャンクが来ないままストリームが終わった
    #[error("Stream ended before the root chunk arrived")]
    MissingRoot,
    /// 未解決のホールを残したままストリームが終わった
    #[error("Stream ended with unresolved holes: {0:?}")]
    Truncated(Vec<u64>),
    /// 読み取り元のエラー
    #[error("Failed to read chunk stream: {0}")]
    Source(#[source] SourceError),
    /// ホールが失敗した（`materialize` 中）
    #[error("Hole @{id} failed: {source}")]
    Hole {
        id: u64,
        #[source]
        source: HoleError,
    },
    /// クライアント参照の解決に失敗した（`materialize` 中）
    #[error("Client reference @{id} failed: {source}")]
    Reference {
        id: u64,
        #[source]
        source: ResolveError,
    },
}

/// 1 つのホールの失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HoleError {
    /// エンコーダ側でサブツリーの解決が失敗した（`E` チャンク）
    #[error("Remote subtree failed: {0}")]
    Remote(String),
    /// 埋まる前にストリームが終わった、またはデコードが失敗した
    #[error("Hole aborted: {0}")]
    Aborted(String),
}

/// クライアント参照のリゾルバが返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to resolve client reference: {0}")]
pub struct ResolveError(pub String);

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        ResolveError(message.into())
    }
}
