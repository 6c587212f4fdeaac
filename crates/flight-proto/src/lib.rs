//! # flight-proto
//!
//! flight ストリームのチャンク定義とエンコード/デコードユーティリティ。
//!
//! ## Chunk の Wire Format
//!
//! ```text
//! <kind><id>:<json-payload>
//!
//! kind:
//!   M = Meta        クライアント参照の記述子（任意の JSON）
//!   S = BuiltinDecl 組み込みコンテナ名（"Fragment" / "Suspense"）
//!   J = NodeChunk   エンコード済みノード（最初の J がルート）
//!   E = Error       バックグラウンドで失敗したホールのエラー（{"message": ...}）
//! ```
//!
//! ID はストリーム内で共有される単調増加カウンタから割り当てられる。
//! 行の終端（改行）は `flight-transport` が扱う。

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod error;
pub mod node;

pub use error::ProtoError;
pub use node::{BuiltinKind, Encoded, EncodedNode, Primitive, TypeToken};

/// ID として許される最大値（JavaScript の Number.MAX_SAFE_INTEGER）
pub const MAX_SAFE_ID: u64 = (1 << 53) - 1;

/// チャンク種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Meta,
    Builtin,
    Node,
    Error,
}

impl ChunkKind {
    /// ワイヤ上の 1 文字タグ
    pub fn tag(&self) -> char {
        match self {
            ChunkKind::Meta => 'M',
            ChunkKind::Builtin => 'S',
            ChunkKind::Node => 'J',
            ChunkKind::Error => 'E',
        }
    }

    /// 1 文字タグから種別を判定する
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'M' => Some(ChunkKind::Meta),
            'S' => Some(ChunkKind::Builtin),
            'J' => Some(ChunkKind::Node),
            'E' => Some(ChunkKind::Error),
            _ => None,
        }
    }
}

/// ワイヤ上の 1 行
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// クライアント参照の記述子
    Meta { id: u64, data: Value },
    /// 組み込みコンテナの宣言
    Builtin { id: u64, kind: BuiltinKind },
    /// ID でアドレスされるノード
    Node { id: u64, node: Encoded },
    /// ホールを埋めるはずだったサブツリーの失敗
    Error { id: u64, message: String },
}

/// `E` チャンクのペイロード
#[derive(Debug, Serialize, Deserialize)]
struct ErrorPayload {
    message: String,
}

impl Chunk {
    /// ノードチャンクを組み立てる
    pub fn node(id: u64, node: impl Into<Encoded>) -> Self {
        Chunk::Node { id, node: node.into() }
    }

    /// チャンク ID
    pub fn id(&self) -> u64 {
        match self {
            Chunk::Meta { id, .. }
            | Chunk::Builtin { id, .. }
            | Chunk::Node { id, .. }
            | Chunk::Error { id, .. } => *id,
        }
    }

    /// チャンク種別
    pub fn kind(&self) -> ChunkKind {
        match self {
            Chunk::Meta { .. } => ChunkKind::Meta,
            Chunk::Builtin { .. } => ChunkKind::Builtin,
            Chunk::Node { .. } => ChunkKind::Node,
            Chunk::Error { .. } => ChunkKind::Error,
        }
    }

    /// `<kind><id>:<json>` 形式の 1 行にエンコードする（改行なし）
    pub fn to_line(&self) -> Result<String, ProtoError> {
        let payload = match self {
            Chunk::Meta { data, .. } => serde_json::to_string(data)?,
            Chunk::Builtin { kind, .. } => serde_json::to_string(kind.name())?,
            Chunk::Node { node, .. } => serde_json::to_string(node)?,
            Chunk::Error { message, .. } => serde_json::to_string(&ErrorPayload {
                message: message.clone(),
            })?,
        };
        Ok(format!("{}{}:{}", self.kind().tag(), self.id(), payload))
    }

    /// 1 行（改行を除いたもの）からチャンクをデコードする
    ///
    /// # エラー
    /// - `ProtoError::MissingSeparator`: `:` がない
    /// - `ProtoError::InvalidId`: ID が安全な整数ではない
    /// - `ProtoError::InvalidChunkType`: 種別タグが未知
    /// - `ProtoError::InvalidJson` / `InvalidElement` / `UnknownBuiltin`: ペイロード不正
    pub fn parse_line(line: &str) -> Result<Self, ProtoError> {
        let mut chars = line.chars();
        let tag = chars.next().ok_or(ProtoError::MissingSeparator)?;
        let rest = chars.as_str();
        let (id, payload) = rest.split_once(':').ok_or(ProtoError::MissingSeparator)?;
        let id = node::parse_id(id)?;

        let kind = ChunkKind::from_tag(tag).ok_or_else(|| ProtoError::InvalidChunkType(tag.into()))?;

        match kind {
            ChunkKind::Meta => Ok(Chunk::Meta {
                id,
                data: serde_json::from_str(payload)?,
            }),
            ChunkKind::Builtin => {
                let name: String = serde_json::from_str(payload)?;
                Ok(Chunk::Builtin {
                    id,
                    kind: BuiltinKind::from_name(&name)?,
                })
            }
            ChunkKind::Node => Ok(Chunk::Node {
                id,
                node: Encoded::from_value(serde_json::from_str(payload)?)?,
            }),
            ChunkKind::Error => {
                let ErrorPayload { message } = serde_json::from_str(payload)?;
                Ok(Chunk::Error { id, message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_line() {
        let chunk = Chunk::Builtin { id: 2, kind: BuiltinKind::Suspense };
        assert_eq!(chunk.to_line().unwrap(), r#"S2:"Suspense""#);
        assert_eq!(Chunk::parse_line(r#"S2:"Suspense""#).unwrap(), chunk);
    }

    #[test]
    fn test_meta_line() {
        let chunk = Chunk::Meta {
            id: 1,
            data: json!({"id": "/client.js", "name": "Client"}),
        };
        assert_eq!(chunk.to_line().unwrap(), r#"M1:{"id":"/client.js","name":"Client"}"#);
    }

    #[test]
    fn test_node_line() {
        let line = r#"J0:["$","div",null,{"children":["Hello world!"]}]"#;
        let chunk = Chunk::parse_line(line).unwrap();
        assert_eq!(chunk.kind(), ChunkKind::Node);
        assert_eq!(chunk.id(), 0);
        assert_eq!(chunk.to_line().unwrap(), line);
    }

    #[test]
    fn test_error_line() {
        let chunk = Chunk::Error { id: 7, message: "boom".into() };
        let line = chunk.to_line().unwrap();
        assert_eq!(line, r#"E7:{"message":"boom"}"#);
        assert_eq!(Chunk::parse_line(&line).unwrap(), chunk);
    }

    #[test]
    fn test_invalid_chunk_type() {
        let result = Chunk::parse_line(r#"X0:null"#);
        assert!(matches!(result, Err(ProtoError::InvalidChunkType(t)) if t == "X"));
    }

    #[test]
    fn test_invalid_id() {
        assert!(matches!(Chunk::parse_line("Jabc:null"), Err(ProtoError::InvalidId(_))));
        assert!(matches!(
            Chunk::parse_line("J99999999999999999999:null"),
            Err(ProtoError::InvalidId(_))
        ));
    }

    #[test]
    fn test_missing_separator() {
        assert!(matches!(Chunk::parse_line("J0"), Err(ProtoError::MissingSeparator)));
        assert!(matches!(Chunk::parse_line(""), Err(ProtoError::MissingSeparator)));
    }

    #[test]
    fn test_unknown_builtin_name() {
        let result = Chunk::parse_line(r#"S1:"Portal""#);
        assert!(matches!(result, Err(ProtoError::UnknownBuiltin(n)) if n == "Portal"));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(Chunk::parse_line("J0:[\"$\""), Err(ProtoError::InvalidJson(_))));
    }
}
