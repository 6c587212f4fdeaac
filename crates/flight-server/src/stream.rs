//! 出力バイトストリーム

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::{self, FutureExt};
use futures::stream::{self, LocalBoxStream, Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::error;

use crate::error::RenderError;
use crate::node::Node;
use crate::options::RenderOptions;
use crate::walk::Scope;

/// エンコード済みチャンク（1 要素 = 改行付きの 1 行）のストリーム
///
/// エンコード自体はこのストリームをポーリングしたときに進む。
/// エラーは最後の要素として 1 度だけ流れ、その後ストリームは終わる。
pub struct RenderStream {
    inner: LocalBoxStream<'static, Result<Bytes, RenderError>>,
}

impl Stream for RenderStream {
    type Item = Result<Bytes, RenderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for RenderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStream").finish_non_exhaustive()
    }
}

/// ノード木をエンコードし、チャンクのストリームを返す
///
/// ルートの `J` チャンクはホールを待たずに送られ、
/// すべてのホールが埋まった時点でストリームが閉じる。
pub fn render_to_stream(root: Node, options: RenderOptions) -> RenderStream {
    let (sink, chunks) = mpsc::unbounded();
    let errors = sink.clone();

    let driver = async move {
        let scope = Scope::new(options, sink);
        if let Err(err) = scope.run(root).await {
            error!(error = %err, "render aborted");
            let _ = errors.unbounded_send(Err(err));
        }
    };
    // ドライバは値を出さず、チャンネル側と一緒にポーリングされるだけ
    let driver = driver
        .into_stream()
        .filter_map(|()| future::ready(None::<Result<Bytes, RenderError>>));

    RenderStream {
        inner: stream::select(chunks, driver).boxed_local(),
    }
}

/// ストリームを最後まで読み、1 つのバイト列にまとめる
pub async fn render_to_vec(root: Node, options: RenderOptions) -> Result<Vec<u8>, RenderError> {
    let mut stream = render_to_stream(root, options);
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// チャンクが揃うたびに書き込み、フラッシュする
pub async fn render_to_writer<W>(
    root: Node,
    options: RenderOptions,
    writer: &mut W,
) -> Result<(), RenderError>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = render_to_stream(root, options);
    while let Some(chunk) = stream.next().await {
        writer.write_all(&chunk?).await?;
        writer.flush().await?;
    }
    Ok(())
}
