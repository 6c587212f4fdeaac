//! デコーダの設定

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use flight_transport::DEFAULT_MAX_LINE_LEN;
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::error::ResolveError;
use crate::node::ClientComponent;

/// クライアント参照の解決結果
pub type ResolveFuture = LocalBoxFuture<'static, Result<Rc<dyn ClientComponent>, ResolveError>>;

/// `M` チャンクの記述子から実装を取り出すフック
pub(crate) type Resolver = Rc<dyn Fn(Value) -> ResolveFuture>;

/// `create_from_stream` の設定
#[derive(Clone)]
pub struct ClientOptions {
    pub(crate) resolver: Option<Resolver>,
    pub(crate) max_line_len: usize,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// クライアント参照のリゾルバを設定する
    ///
    /// 参照 ID ごとに、最初に描画されるときに一度だけ呼ばれる。
    pub fn with_client_reference<F, Fut>(mut self, resolve: F) -> Self
    where
        F: Fn(Value) -> Fut + 'static,
        Fut: Future<Output = Result<Rc<dyn ClientComponent>, ResolveError>> + 'static,
    {
        self.resolver = Some(Rc::new(move |descriptor: Value| resolve(descriptor).boxed_local()));
        self
    }

    /// 1 行の最大バイト数を設定する
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            resolver: None,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("resolver", &self.resolver.is_some())
            .field("max_line_len", &self.max_line_len)
            .finish()
    }
}
