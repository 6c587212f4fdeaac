//! # flight-transport
//!
//! flight チャンクストリームの行フレーミング層。
//!
//! 送信側はチャンクを `\n` 終端の行にして書き出し、
//! 受信側は任意の境界で届くバイト列を行に再組み立てする。
//!
//! ```text
//! 送信:
//!   Chunk → encode_chunk() → "J0:[...]\n" → バイトストリーム
//!
//! 受信:
//!   バイトストリーム → LineSplitter::push() → "J0:[...]" → Chunk::parse_line()
//! ```
//!
//! JSON 文字列中の改行は `\n` とエスケープされるため、生の改行は必ず行終端になる。

pub mod error;
pub mod frame;
pub mod line;

pub use error::TransportError;
pub use frame::{encode_chunk, LINE_TERMINATOR};
pub use line::{LineSplitter, DEFAULT_MAX_LINE_LEN};
