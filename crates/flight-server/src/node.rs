//! エンコード対象のノード木
//!
//! ノードの種類は閉じた列挙型で表し、エンコーダは網羅的に `match` する。
//! コンポーネントはクロージャとして props を取り込んだ状態で渡す。

use std::borrow::Cow;
use std::fmt;
use std::future::Future;

use flight_proto::Primitive;
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::{Map, Value};

use crate::error::ComponentError;

/// 非同期ノードの計算（解決後のノードまたはコンポーネントのエラー）
pub type RenderFuture = LocalBoxFuture<'static, Result<Node, ComponentError>>;

/// エンコード対象のノード
pub enum Node {
    /// 文字列・数値・真偽値・null
    Primitive(Primitive),
    /// HTML 風の要素
    Element(Element),
    /// 透過的なグループ（`Fragment` 組み込み）
    Fragment(Vec<Node>),
    /// サスペンス境界
    Suspense(Suspense),
    /// クライアント側で実装されるコンポーネントへの参照
    Reference(Reference),
    /// サーバ側で評価されるコンポーネント
    Component(Component),
    /// まだ値のない計算。待つ前に直近の境界へサスペンドを要求する
    Future(RenderFuture),
}

impl Node {
    pub fn null() -> Self {
        Node::Primitive(Primitive::Null)
    }

    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Node::Fragment(children.into_iter().collect())
    }

    /// 非同期に解決されるノード
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Node, ComponentError>> + 'static,
    {
        Node::Future(future.boxed_local())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            Node::Element(e) => fmt::Debug::fmt(e, f),
            Node::Fragment(children) => f.debug_tuple("Fragment").field(children).finish(),
            Node::Suspense(s) => fmt::Debug::fmt(s, f),
            Node::Reference(r) => fmt::Debug::fmt(r, f),
            Node::Component(c) => fmt::Debug::fmt(c, f),
            Node::Future(_) => f.write_str("Future(..)"),
        }
    }
}

/// 要素のプロパティ値
#[derive(Debug)]
pub enum PropValue {
    /// そのまま書き出す JSON 値
    Json(Value),
    /// ノード（エンコードした形で埋め込む）
    Node(Node),
}

/// `<tag ...props>children</tag>`
#[derive(Debug)]
pub struct Element {
    pub tag: String,
    /// 出現順のプロパティ
    pub props: Vec<(String, PropValue)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.push((name.into(), PropValue::Json(value.into())));
        self
    }

    pub fn node_prop(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        self.props.push((name.into(), PropValue::Node(node.into())));
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }
}

/// サスペンス境界
///
/// 子が時間内に揃わない場合、`fallback` を表示しつつ子はホールとして後から送る。
#[derive(Debug, Default)]
pub struct Suspense {
    pub fallback: Vec<Node>,
    pub children: Vec<Node>,
}

impl Suspense {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, node: impl Into<Node>) -> Self {
        self.fallback.push(node.into());
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }
}

/// クライアントコンポーネントへの参照
#[derive(Debug)]
pub struct Reference {
    /// 外部識別子（記述子フックに渡す）
    pub identity: String,
    /// そのまま書き出すプロパティ
    pub props: Map<String, Value>,
    pub children: Vec<Node>,
}

impl Reference {
    pub fn new(identity: impl Into<String>) -> Self {
        Reference {
            identity: identity.into(),
            props: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// サーバコンポーネントの実体
pub enum ComponentKind {
    /// 一度呼ぶとノードを返す関数
    Function(Box<dyn FnOnce() -> Node>),
    /// 状態を持つコンポーネント（エンコード不可）
    Stateful,
}

/// サーバコンポーネント
pub struct Component {
    pub name: Cow<'static, str>,
    pub kind: ComponentKind,
}

impl Component {
    pub fn function(
        name: impl Into<Cow<'static, str>>,
        render: impl FnOnce() -> Node + 'static,
    ) -> Self {
        Component {
            name: name.into(),
            kind: ComponentKind::Function(Box::new(render)),
        }
    }

    pub fn stateful(name: impl Into<Cow<'static, str>>) -> Self {
        Component {
            name: name.into(),
            kind: ComponentKind::Stateful,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ComponentKind::Function(_) => "function",
            ComponentKind::Stateful => "stateful",
        };
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

impl From<Primitive> for Node {
    fn from(p: Primitive) -> Self {
        Node::Primitive(p)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Primitive(s.into())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Primitive(s.into())
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Primitive(b.into())
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Primitive(n.into())
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Node::Element(e)
    }
}

impl From<Suspense> for Node {
    fn from(s: Suspense) -> Self {
        Node::Suspense(s)
    }
}

impl From<Reference> for Node {
    fn from(r: Reference) -> Self {
        Node::Reference(r)
    }
}

impl From<Component> for Node {
    fn from(c: Component) -> Self {
        Node::Component(c)
    }
}
