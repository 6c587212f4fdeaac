//! 再試行可能な描画結果
//!
//! ホールやクライアント参照は、中身がまだ無いときに例外で中断する代わりに
//! `Render::Pending` を返す。呼び出し側は `Suspend` を待ってから再試行する。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture};

/// `try_render` の結果
#[derive(Debug)]
pub enum Render<T> {
    /// 値が揃っている
    Ready(T),
    /// まだ揃っていない。`Suspend` の完了後に再試行する
    Pending(Suspend),
}

impl<T> Render<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Render::Ready(_))
    }

    /// 揃っていれば値を返す
    pub fn ready(self) -> Option<T> {
        match self {
            Render::Ready(value) => Some(value),
            Render::Pending(_) => None,
        }
    }
}

/// 再試行のタイミングを知らせる Future
pub struct Suspend {
    inner: LocalBoxFuture<'static, ()>,
}

impl Suspend {
    pub(crate) fn new(wait: impl Future<Output = ()> + 'static) -> Self {
        Suspend {
            inner: wait.boxed_local(),
        }
    }
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Suspend")
    }
}
