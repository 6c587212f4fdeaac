//! flight-proto エラー型

use thiserror::Error;

/// ワイヤフォーマットのエラー（ProtocolError）
///
/// どれもストリームのデコードにとって致命的。
#[derive(Debug, Error)]
pub enum ProtoError {
    /// 行に `:` 区切りがない
    #[error("Malformed chunk line: missing ':' separator")]
    MissingSeparator,
    /// ID が安全な整数（0..=2^53-1 の 10 進数）ではない
    #[error("Invalid chunk ID: {0:?}")]
    InvalidId(String),
    /// 種別タグが M / S / J / E のいずれでもない
    #[error("Invalid chunk type: {0:?}")]
    InvalidChunkType(String),
    /// ペイロードの JSON が壊れている
    #[error("Invalid chunk payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// `["$", type, fallback, props]` の形になっていない
    #[error("Invalid element: {0}")]
    InvalidElement(String),
    /// `S` チャンクの名前が既知の組み込みではない
    #[error("Unknown builtin '{0}'")]
    UnknownBuiltin(String),
    /// `$<id>` が宣言済みの組み込みを指していない
    #[error("Unknown builtin ${0}")]
    UndeclaredBuiltin(u64),
    /// 対応する未解決ホールがない ID への `J` / `E` チャンク（未登録または解決済み）
    #[error("No outstanding hole for chunk {0}")]
    UnexpectedChunk(u64),
}
