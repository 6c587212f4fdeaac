//! チャンクを行としてフレーミングする
//!
//! ## Frame Format
//! ```text
//! <kind><id>:<json>\n
//! ```
//! 行の区切りは `\n` 1 バイトのみ。それ以外のフレーミングはない。

use flight_proto::{Chunk, ProtoError};

/// 行終端
pub const LINE_TERMINATOR: u8 = b'\n';

/// チャンクを改行付きの 1 行にエンコードする
pub fn encode_chunk(chunk: &Chunk) -> Result<Vec<u8>, ProtoError> {
    let line = chunk.to_line()?;
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(LINE_TERMINATOR);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LineSplitter;
    use flight_proto::BuiltinKind;

    #[test]
    fn test_encode_chunk_appends_newline() {
        let bytes = encode_chunk(&Chunk::Builtin { id: 3, kind: BuiltinKind::Fragment }).unwrap();
        assert_eq!(bytes, b"S3:\"Fragment\"\n");
    }

    #[test]
    fn test_framed_chunks_split_back() {
        let mut wire = Vec::new();
        wire.extend(encode_chunk(&Chunk::Builtin { id: 2, kind: BuiltinKind::Suspense }).unwrap());
        wire.extend(encode_chunk(&Chunk::Error { id: 1, message: "line\nbreak".into() }).unwrap());

        // 1 バイトずつ流しても行が復元される
        let mut splitter = LineSplitter::new();
        let mut lines = Vec::new();
        for b in &wire {
            lines.extend(splitter.push(core::slice::from_ref(b)).unwrap());
        }

        assert_eq!(lines.len(), 2);
        assert_eq!(
            Chunk::parse_line(&lines[1]).unwrap(),
            Chunk::Error { id: 1, message: "line\nbreak".into() }
        );
    }
}
