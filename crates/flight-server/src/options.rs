//! エンコーダの設定

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// クライアント参照の識別子から、ワイヤに載せる記述子を作るフック
pub type ReferenceDataFn = dyn Fn(&str) -> Option<Value>;

/// `render_to_stream` の設定
///
/// ```ignore
/// let options = RenderOptions::new()
///     .with_client_reference_data(|identity| Some(json!({"id": identity})));
/// ```
#[derive(Clone, Default)]
pub struct RenderOptions {
    client_reference_data: Option<Rc<ReferenceDataFn>>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// クライアント参照の記述子フックを設定する
    ///
    /// フックが `None` を返した場合、その参照は設定エラーになる。
    pub fn with_client_reference_data(
        mut self,
        hook: impl Fn(&str) -> Option<Value> + 'static,
    ) -> Self {
        self.client_reference_data = Some(Rc::new(hook));
        self
    }

    pub(crate) fn client_reference_data(&self) -> Option<&ReferenceDataFn> {
        self.client_reference_data.as_deref()
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("client_reference_data", &self.client_reference_data.is_some())
            .finish()
    }
}
