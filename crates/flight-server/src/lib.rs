//! # flight-server
//!
//! ノード木を flight ストリーム（改行区切りのチャンク列）にエンコードする。
//!
//! ## 処理の流れ
//!
//! ```text
//! Node ──walk──▶ Encoded ──encode_chunk──▶ "J0:[...]\n" ──▶ RenderStream
//!                  │
//!                  ├─ Suspense: 子とサスペンド要求を競争させる
//!                  │    子が先 → そのまま埋め込む
//!                  │    要求が先 → フォールバック + ホール "@<id>" を返し、
//!                  │               子はタスクグループで解決して "J<id>" を後送
//!                  └─ 組み込み / 参照: 初出時に "S<id>" / "M<id>" を先に送る
//! ```
//!
//! 実行はシングルスレッドの協調的スケジューリングを前提にしている。
//! ストリームは `Send` ではないので、`LocalSet` や `block_on` の上でポーリングする。

pub mod error;
pub mod ids;
pub mod node;
pub mod options;

mod group;
mod stream;
mod walk;

pub use error::{ComponentError, RenderError};
pub use ids::{Allocation, IdTables};
pub use node::{Component, ComponentKind, Element, Node, PropValue, Reference, RenderFuture, Suspense};
pub use options::RenderOptions;
pub use stream::{render_to_stream, render_to_vec, render_to_writer, RenderStream};

/// HTTP で運ぶときの Content-Type
pub const CONTENT_TYPE: &str = "text/x-component";
