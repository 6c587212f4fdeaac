//! # flight-client
//!
//! flight ストリームを読み、ノード木を組み立て直す。
//!
//! ## 構成
//!
//! ```text
//! bytes ──LineSplitter──▶ lines ──Chunk::parse_line──▶ Chunk ──Reconstructor──▶ Event
//!                                                                   │
//!                      最初の J ─▶ ルート（すぐに返す）                ◀─┘
//!                      以降の J ─▶ ホールを埋める / E ─▶ ホールを失敗させる
//! ```
//!
//! ホールとクライアント参照は `try_render` で `Render::Ready` か
//! `Render::Pending(Suspend)` を返す。`Node::materialize` は待って再試行する
//! ループで、すべてが揃った木を返す。

pub mod error;
pub mod node;
pub mod options;
pub mod reader;
pub mod reconstruct;
pub mod render;

pub use flight_proto::{BuiltinKind, Primitive};

pub use error::{DecodeError, HoleError, ResolveError, SourceError};
pub use node::{BuiltinElement, ClientComponent, ClientElement, Element, Hole, Node};
pub use options::{ClientOptions, ResolveFuture};
pub use reader::{create_from_reader, create_from_stream, ChunkReader, READ_BUFFER_SIZE};
pub use reconstruct::{Event, Reconstructor};
pub use render::{Render, Suspend};
