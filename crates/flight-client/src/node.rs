//! デコード済みのノード木

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use flight_proto::{BuiltinKind, Primitive};
use flight_sync::Deferred;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DecodeError, HoleError, ResolveError};
use crate::options::{ResolveFuture, Resolver};
use crate::render::{Render, Suspend};

/// デコード済みのノード
///
/// `serde` でシリアライズすると `{"kind": ..., "value": ...}` 形式のスナップショットになる。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Node {
    Primitive(Primitive),
    Element(Element),
    Builtin(BuiltinElement),
    Reference(ClientElement),
    Hole(Hole),
}

/// タグ名を持つ要素
#[derive(Debug, Clone, Serialize)]
pub struct Element {
    pub tag: String,
    pub props: Map<String, Value>,
    pub children: Vec<Node>,
}

/// 組み込みコンテナ（`Fragment` / `Suspense`）
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinElement {
    pub kind: BuiltinKind,
    /// `Suspense` のフォールバック
    pub fallback: Option<Box<Node>>,
    pub props: Map<String, Value>,
    pub children: Vec<Node>,
}

/// クライアント側で実装されるコンポーネント
pub trait ClientComponent {
    fn render(&self, props: &Map<String, Value>, children: &[Node]) -> Node;
}

impl<F> ClientComponent for F
where
    F: Fn(&Map<String, Value>, &[Node]) -> Node,
{
    fn render(&self, props: &Map<String, Value>, children: &[Node]) -> Node {
        self(props, children)
    }
}

type SharedResolution = Shared<ResolveFuture>;

/// `M` チャンクで宣言された参照 1 つ分の解決状態（ID ごとに共有）
pub(crate) struct ReferenceEntry {
    id: u64,
    descriptor: Value,
    resolver: Resolver,
    resolution: RefCell<Option<SharedResolution>>,
}

impl ReferenceEntry {
    pub(crate) fn new(id: u64, descriptor: Value, resolver: Resolver) -> Self {
        ReferenceEntry {
            id,
            descriptor,
            resolver,
            resolution: RefCell::new(None),
        }
    }

    /// リゾルバは最初の呼び出しで一度だけ起動する
    fn resolution(&self) -> SharedResolution {
        self.resolution
            .borrow_mut()
            .get_or_insert_with(|| {
                debug!(id = self.id, "resolving client reference");
                (self.resolver)(self.descriptor.clone()).shared()
            })
            .clone()
    }
}

impl fmt::Debug for ReferenceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceEntry")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("started", &self.resolution.borrow().is_some())
            .finish()
    }
}

/// クライアント参照の要素
#[derive(Debug, Clone, Serialize)]
pub struct ClientElement {
    pub id: u64,
    pub props: Map<String, Value>,
    pub children: Vec<Node>,
    #[serde(skip)]
    pub(crate) entry: Rc<ReferenceEntry>,
}

impl ClientElement {
    /// `M` チャンクの記述子
    pub fn descriptor(&self) -> &Value {
        &self.entry.descriptor
    }

    /// 実装が解決済みなら props と children を渡して描画する
    ///
    /// 未解決なら `Render::Pending` を返し、その間にリゾルバを進める。
    pub fn try_render(&self) -> Result<Render<Node>, ResolveError> {
        let resolution = self.entry.resolution();
        if let Some(outcome) = resolution.peek() {
            return match outcome {
                Ok(component) => Ok(Render::Ready(component.render(&self.props, &self.children))),
                Err(err) => Err(err.clone()),
            };
        }
        Ok(Render::Pending(Suspend::new(resolution.map(|_| ()))))
    }
}

/// 後続の `J` チャンクで埋まる位置
#[derive(Debug, Clone)]
pub struct Hole {
    pub id: u64,
    pub(crate) slot: Deferred<Node, HoleError>,
}

impl Hole {
    /// 埋まっていれば中身を返す
    ///
    /// 一度埋まったホールは以後ずっと同じ中身を返す。
    pub fn try_render(&self) -> Result<Render<Node>, HoleError> {
        match self.slot.peek() {
            Some(Ok(node)) => Ok(Render::Ready(node)),
            Some(Err(err)) => Err(err),
            None => {
                let slot = self.slot.clone();
                Ok(Render::Pending(Suspend::new(async move { slot.settled().await })))
            }
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.slot.peek(), Some(Ok(_)))
    }
}

impl Serialize for Hole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let outcome = self.slot.peek();
        let mut state = serializer.serialize_struct("Hole", 3)?;
        state.serialize_field("id", &self.id)?;
        match &outcome {
            None => {
                state.serialize_field("state", "pending")?;
                state.skip_field("content")?;
            }
            Some(Ok(node)) => {
                state.serialize_field("state", "filled")?;
                state.serialize_field("content", node)?;
            }
            Some(Err(err)) => {
                state.serialize_field("state", "failed")?;
                state.serialize_field("content", &err.to_string())?;
            }
        }
        state.end()
    }
}

impl Node {
    /// すべてのホールとクライアント参照を待って解決した木を返す
    ///
    /// 並行してストリームを読み進める必要がある（`ChunkReader::run` など）。
    pub fn materialize(self) -> LocalBoxFuture<'static, Result<Node, DecodeError>> {
        async move {
            match self {
                node @ Node::Primitive(_) => Ok(node),
                Node::Element(mut element) => {
                    element.children = materialize_all(std::mem::take(&mut element.children)).await?;
                    Ok(Node::Element(element))
                }
                Node::Builtin(mut builtin) => {
                    if let Some(fallback) = builtin.fallback.take() {
                        builtin.fallback = Some(Box::new(fallback.materialize().await?));
                    }
                    builtin.children = materialize_all(std::mem::take(&mut builtin.children)).await?;
                    Ok(Node::Builtin(builtin))
                }
                Node::Reference(reference) => {
                    let rendered = loop {
                        let attempt = reference.try_render().map_err(|source| DecodeError::Reference {
                            id: reference.id,
                            source,
                        })?;
                        match attempt {
                            Render::Ready(node) => break node,
                            Render::Pending(suspend) => suspend.await,
                        }
                    };
                    rendered.materialize().await
                }
                Node::Hole(hole) => {
                    let content = loop {
                        let attempt = hole
                            .try_render()
                            .map_err(|source| DecodeError::Hole { id: hole.id, source })?;
                        match attempt {
                            Render::Ready(node) => break node,
                            Render::Pending(suspend) => suspend.await,
                        }
                    };
                    content.materialize().await
                }
            }
        }
        .boxed_local()
    }

    /// プリミティブなら JSON 値として返す
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Node::Primitive(p) => Some(p),
            _ => None,
        }
    }
}

async fn materialize_all(nodes: Vec<Node>) -> Result<Vec<Node>, DecodeError> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        out.push(node.materialize().await?);
    }
    Ok(out)
}
