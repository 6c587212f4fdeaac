//! バイトストリームからチャンクを読み、再構築器に流す

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use flight_proto::Chunk;
use flight_transport::LineSplitter;
use futures::stream::{self, LocalBoxStream, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::error::{DecodeError, HoleError, SourceError};
use crate::node::Node;
use crate::options::ClientOptions;
use crate::reconstruct::{Event, Reconstructor};

/// `create_from_reader` の 1 回の読み取りサイズ
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// チャンクの読み取りループ
///
/// ルートを受け取った後も、ホールを埋めるために最後まで読み進める必要がある。
pub struct ChunkReader<S> {
    source: S,
    splitter: LineSplitter,
    lines: VecDeque<String>,
    reconstructor: Reconstructor,
    /// 読み取り元が終わった
    exhausted: bool,
    /// 終端処理またはエラーで読み取りを終えた
    done: bool,
}

impl<S, B, E> ChunkReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<SourceError>,
{
    pub fn new(source: S, options: ClientOptions) -> Self {
        ChunkReader {
            source,
            splitter: LineSplitter::with_max_line_len(options.max_line_len),
            lines: VecDeque::new(),
            reconstructor: Reconstructor::new(&options),
            exhausted: false,
            done: false,
        }
    }

    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }

    /// 次のチャンクを 1 つ適用する（ストリームが正常に終われば `None`）
    ///
    /// エラー時は未解決のホールをすべて `HoleError::Aborted` にする。
    pub async fn next_event(&mut self) -> Result<Option<Event>, DecodeError> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_event().await;
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => self.done = true,
            Err(err) => {
                self.done = true;
                self.reconstructor
                    .abort(HoleError::Aborted(format!("decode failed: {err}")));
            }
        }
        result
    }

    /// ストリームの終わりまで読み進める
    pub async fn run(mut self) -> Result<(), DecodeError> {
        while self.next_event().await?.is_some() {}
        debug!("chunk stream finished");
        Ok(())
    }

    async fn read_event(&mut self) -> Result<Option<Event>, DecodeError> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                let chunk = Chunk::parse_line(&line)?;
                return self.reconstructor.apply(chunk).map(Some);
            }
            if self.exhausted {
                self.reconstructor.finish()?;
                return Ok(None);
            }
            match self.source.next().await {
                Some(Ok(bytes)) => {
                    let lines = self.splitter.push(bytes.as_ref())?;
                    self.lines.extend(lines);
                }
                Some(Err(err)) => {
                    let err: SourceError = err.into();
                    warn!(error = %err, "chunk source failed");
                    return Err(DecodeError::Source(err));
                }
                None => {
                    self.exhausted = true;
                    self.lines.extend(self.splitter.finish()?);
                }
            }
        }
    }
}

/// バイトストリームを読み、ルートが届いた時点でルートと読み取りループを返す
///
/// ホールを埋めるには、返された `ChunkReader` を `run` で最後まで進める。
///
/// # エラー
/// - `DecodeError::MissingRoot`: ルートより先にストリームが終わった
/// - その他、ルートまでの読み取りで起きた `DecodeError`
pub async fn create_from_stream<S, B, E>(
    source: S,
    options: ClientOptions,
) -> Result<(Node, ChunkReader<S>), DecodeError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<SourceError>,
{
    let mut reader = ChunkReader::new(source, options);
    while let Some(event) = reader.next_event().await? {
        if let Event::Root(root) = event {
            return Ok((root, reader));
        }
    }
    Err(DecodeError::MissingRoot)
}

/// `AsyncRead` から読む版
pub async fn create_from_reader<R>(
    reader: R,
    options: ClientOptions,
) -> Result<(Node, ChunkReader<LocalBoxStream<'static, std::io::Result<Bytes>>>), DecodeError>
where
    R: AsyncRead + Unpin + 'static,
{
    create_from_stream(read_chunks(reader), options).await
}

fn read_chunks<R>(reader: R) -> LocalBoxStream<'static, std::io::Result<Bytes>>
where
    R: AsyncRead + Unpin + 'static,
{
    stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(buf.freeze()), Some(reader))),
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn pieces(text: &str, size: usize) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Unpin {
        let chunks: Vec<Result<Vec<u8>, Infallible>> =
            text.as_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect();
        stream::iter(chunks)
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let text = "S1:\"Fragment\"\r\nJ0:[\"$\",\"$1\",null,{\"children\":[\"a\",\"b\"]}]\n";
        let (root, reader) = create_from_stream(pieces(text, 3), ClientOptions::new())
            .await
            .unwrap();
        assert!(matches!(root, Node::Builtin(ref b) if b.children.len() == 2));
        reader.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let (root, reader) = create_from_stream(pieces("J0:\"only\"", 4), ClientOptions::new())
            .await
            .unwrap();
        assert!(root.as_primitive().is_some());
        reader.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_stream_is_missing_root() {
        let result = create_from_stream(pieces("", 1), ClientOptions::new()).await;
        assert!(matches!(result, Err(DecodeError::MissingRoot)));
    }

    #[tokio::test]
    async fn test_protocol_error_aborts_holes() {
        let text = "J0:[\"$\",\"@1\",null,{}]\nX1:null\n";
        let (root, reader) = create_from_stream(pieces(text, 64), ClientOptions::new())
            .await
            .unwrap();
        let err = reader.run().await.unwrap_err();
        assert!(matches!(err, DecodeError::Protocol(_)));

        let Node::Hole(hole) = root else { panic!("expected hole") };
        assert!(matches!(hole.try_render(), Err(HoleError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_source_error() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"J0:[\"$\",\"@1\",null,{}]\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let (_, reader) = create_from_stream(source, ClientOptions::new()).await.unwrap();
        assert!(matches!(reader.run().await, Err(DecodeError::Source(_))));
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let options = ClientOptions::new().with_max_line_len(8);
        let result = create_from_stream(pieces("J0:\"0123456789\"\n", 4), options).await;
        assert!(matches!(result, Err(DecodeError::Framing(_))));
    }

    #[tokio::test]
    async fn test_create_from_reader() {
        let bytes: &'static [u8] = b"J0:[\"$\",\"div\",null,{\"children\":[\"Hello world!\"]}]\n";
        let (root, reader) = create_from_reader(bytes, ClientOptions::new()).await.unwrap();
        let Node::Element(div) = root else { panic!("expected element") };
        assert_eq!(div.tag, "div");
        reader.run().await.unwrap();
    }
}
