//! ノード木の走査とサスペンス境界の競争
//!
//! `Scope` はストリーム全体の状態と、直近のサスペンス境界のシグナルを持つ。
//! 境界の内側を走査するときは、新しいシグナルを持つ `Scope` に差し替える。
//!
//! 各 `Scope` は、自分の出力を埋め込むチャンクの送出ゲートも持つ。
//! ホールを埋める `J` / `E` は、そのホールを含むチャンクが送られるまで出さない。

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use flight_proto::{BuiltinKind, Chunk, Encoded, EncodedNode, ProtoError};
use flight_sync::Deferred;
use flight_transport::encode_chunk;
use futures::channel::mpsc::UnboundedSender;
use futures::future::{self, Either, FutureExt, LocalBoxFuture};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::error::RenderError;
use crate::group::TaskGroup;
use crate::ids::{Allocation, IdTables};
use crate::node::{ComponentKind, Element, Node, PropValue, Reference, Suspense};
use crate::options::RenderOptions;

/// 出力チャンネルに流す 1 要素
pub(crate) type Output = Result<Bytes, RenderError>;

/// まだ終わっていない子ノード列のエンコード
type PendingChildren = LocalBoxFuture<'static, Result<Vec<Encoded>, RenderError>>;

/// フレームワーク流のプロパティ名 → マークアップ上の名前
const PROP_RENAMES: &[(&str, &str)] = &[
    ("className", "class"),
    ("htmlFor", "for"),
    ("httpEquiv", "http-equiv"),
    ("acceptCharset", "accept-charset"),
];

fn markup_name(name: &str) -> Option<&'static str> {
    PROP_RENAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
}

/// 1 ストリーム分の共有状態
struct StreamState {
    ids: RefCell<IdTables>,
    options: RenderOptions,
    sink: UnboundedSender<Output>,
    group: TaskGroup,
}

/// 外側のチャンクがエラーで終わり、内側の出力が捨てられた
#[derive(Debug, Clone, Copy)]
struct Abandoned;

/// 出力を埋め込むチャンクの送出ゲート
///
/// 送り終えたら resolve、チャンクごと捨てられたら reject。
type Gate = Deferred<(), Abandoned>;

/// サスペンス境界の競争結果
enum Race {
    /// サスペンド要求の前に子がすべて揃った
    Completed(Vec<Encoded>),
    /// サスペンドが要求された（子はバックグラウンドで続ける）
    Suspended(PendingChildren),
}

#[derive(Clone)]
pub(crate) struct Scope {
    state: Rc<StreamState>,
    /// 直近のサスペンス境界のシグナル（ルート直下では `None`）
    boundary: Option<Deferred<()>>,
    /// この Scope の出力を埋め込むチャンクのゲート
    emitted: Gate,
}

impl Scope {
    pub(crate) fn new(options: RenderOptions, sink: UnboundedSender<Output>) -> Self {
        Scope {
            state: Rc::new(StreamState {
                ids: RefCell::new(IdTables::new()),
                options,
                sink,
                group: TaskGroup::default(),
            }),
            boundary: None,
            emitted: Deferred::new(),
        }
    }

    /// ルートを走査して `J<最初の ID>` を送り、残りのホールがすべて埋まるまで待つ
    pub(crate) async fn run(self, root: Node) -> Result<(), RenderError> {
        let root_id = self.state.ids.borrow_mut().next_id();
        let scope = self.clone();
        let root_task = async move {
            let encoded = scope.walk(root).await?;
            scope.emit(Chunk::node(root_id, encoded))?;
            scope.emitted.resolve(());
            Ok::<(), RenderError>(())
        }
        .boxed_local();

        self.state.group.join(root_task).await
    }

    /// チャンクを 1 行にして出力へ送る
    fn emit(&self, chunk: Chunk) -> Result<(), RenderError> {
        let line = encode_chunk(&chunk)?;
        debug!(kind = %chunk.kind().tag(), id = chunk.id(), "emit chunk");
        if self.state.sink.unbounded_send(Ok(Bytes::from(line))).is_err() {
            trace!("output receiver dropped");
        }
        Ok(())
    }

    fn declare(&self, allocation: Allocation) -> Result<u64, RenderError> {
        if let Some(chunk) = allocation.declaration {
            self.emit(chunk)?;
        }
        Ok(allocation.id)
    }

    fn ensure_builtin(&self, kind: BuiltinKind) -> Result<u64, RenderError> {
        let allocation = self.state.ids.borrow_mut().ensure_builtin(kind);
        self.declare(allocation)
    }

    fn ensure_reference(&self, identity: &str) -> Result<u64, RenderError> {
        let allocation = self
            .state
            .ids
            .borrow_mut()
            .ensure_reference(identity, self.state.options.client_reference_data())?;
        self.declare(allocation)
    }

    /// 直近の境界にサスペンドを要求する
    fn request_suspense(&self) {
        if let Some(boundary) = &self.boundary {
            if boundary.resolve(()) {
                trace!("suspense requested");
            }
        }
    }

    /// 1 ノードをエンコードする
    pub(crate) fn walk(&self, node: Node) -> LocalBoxFuture<'static, Result<Encoded, RenderError>> {
        let scope = self.clone();
        async move {
            match node {
                Node::Primitive(p) => Ok(Encoded::Primitive(p)),
                Node::Element(element) => scope.walk_element(element).await,
                Node::Fragment(children) => {
                    let id = scope.ensure_builtin(BuiltinKind::Fragment)?;
                    let children = scope.walk_children(children).await?;
                    Ok(EncodedNode::builtin(id, None, children).into())
                }
                Node::Suspense(boundary) => scope.walk_suspense(boundary).await,
                Node::Reference(reference) => scope.walk_reference(reference).await,
                Node::Component(component) => match component.kind {
                    ComponentKind::Function(render) => scope.walk(render()).await,
                    ComponentKind::Stateful => Err(RenderError::UnsupportedNode(format!(
                        "stateful component '{}'",
                        component.name
                    ))),
                },
                Node::Future(pending) => {
                    scope.request_suspense();
                    let resolved = pending.await.map_err(RenderError::Component)?;
                    scope.walk(resolved).await
                }
            }
        }
        .boxed_local()
    }

    async fn walk_children(&self, children: Vec<Node>) -> Result<Vec<Encoded>, RenderError> {
        let mut encoded = Vec::with_capacity(children.len());
        for child in children {
            encoded.push(self.walk(child).await?);
        }
        Ok(encoded)
    }

    async fn walk_element(&self, element: Element) -> Result<Encoded, RenderError> {
        let Element { tag, props, children } = element;

        let mut kept = Map::new();
        let mut renamed: Vec<(String, Value)> = Vec::new();
        for (name, value) in props {
            if name == flight_proto::node::CHILDREN_KEY {
                continue;
            }
            let value = match value {
                PropValue::Json(value) => value,
                PropValue::Node(node) => {
                    let encoded = self.walk(node).await?;
                    serde_json::to_value(encoded).map_err(ProtoError::from)?
                }
            };
            match markup_name(&name) {
                Some(markup) => renamed.push((markup.to_owned(), value)),
                None => {
                    kept.insert(name, value);
                }
            }
        }
        kept.extend(renamed);

        let children = self.walk_children(children).await?;
        Ok(EncodedNode::element(tag, kept, children).into())
    }

    async fn walk_reference(&self, reference: Reference) -> Result<Encoded, RenderError> {
        let Reference { identity, props, children } = reference;
        let id = self.ensure_reference(&identity)?;
        let children = self.walk_children(children).await?;
        Ok(EncodedNode::reference(id, props, children).into())
    }

    /// サスペンス境界
    ///
    /// ID は「ホール → `Suspense` 宣言 → (競争・フォールバック) → `Fragment` 宣言」の順に払い出す。
    async fn walk_suspense(&self, boundary: Suspense) -> Result<Encoded, RenderError> {
        let Suspense { fallback, children } = boundary;
        let hole_id = self.state.ids.borrow_mut().next_id();
        let boundary_id = self.ensure_builtin(BuiltinKind::Suspense)?;

        let signal: Deferred<()> = Deferred::new();
        let inner_emitted: Gate = Deferred::new();
        let inner = Scope {
            state: Rc::clone(&self.state),
            boundary: Some(signal.clone()),
            emitted: inner_emitted.clone(),
        };
        let content: PendingChildren =
            async move { inner.walk_children(children).await }.boxed_local();
        let requested = signal.waiter().boxed_local();

        let race = match future::select(requested, content).await {
            Either::Left((_, pending)) => Race::Suspended(pending),
            // 完了と同時にサスペンドも要求されていたらホールとして送る
            Either::Right((outcome, _)) if signal.is_settled() => {
                Race::Suspended(future::ready(outcome).boxed_local())
            }
            Either::Right((outcome, _)) => Race::Completed(outcome?),
        };

        let fallback = self.walk_children(fallback).await?;
        let fragment_id = self.ensure_builtin(BuiltinKind::Fragment)?;
        let fallback = EncodedNode::builtin(fragment_id, None, fallback);

        let children = match race {
            Race::Completed(children) => {
                // 子はこの Scope と同じチャンクに埋め込まれる
                self.forward_gate(inner_emitted);
                children
            }
            Race::Suspended(pending) => {
                debug!(id = hole_id, "boundary suspended");
                self.fill_later(hole_id, pending, inner_emitted);
                vec![EncodedNode::hole(hole_id).into()]
            }
        };
        Ok(EncodedNode::builtin(boundary_id, Some(fallback.into()), children).into())
    }

    /// 保留中の子が揃ったら `J<id>` でホールを埋めるタスクを登録する
    ///
    /// `filled` は埋めた中身を含むチャンク（＝この `J<id>`）のゲート。
    fn fill_later(&self, id: u64, pending: PendingChildren, filled: Gate) {
        let scope = self.clone();
        self.state.group.spawn(
            async move {
                let outcome = pending.await;
                // ホール `@id` を含むチャンクより先に出さない
                if scope.emitted.wait().await.is_err() {
                    trace!(id, "containing chunk abandoned, dropping fill");
                    filled.reject(Abandoned);
                    return Ok::<(), RenderError>(());
                }
                match outcome {
                    Ok(children) => {
                        let fragment_id = scope.ensure_builtin(BuiltinKind::Fragment)?;
                        scope.emit(Chunk::node(
                            id,
                            EncodedNode::builtin(fragment_id, None, children),
                        ))?;
                        filled.resolve(());
                        Ok(())
                    }
                    Err(err) if err.is_isolated() => {
                        warn!(id, error = %err, "suspended subtree failed");
                        scope.emit(Chunk::Error {
                            id,
                            message: err.to_string(),
                        })?;
                        filled.reject(Abandoned);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            .boxed_local(),
        );
    }

    /// この Scope のゲートの結果を `inner` にそのまま引き継ぐ
    fn forward_gate(&self, inner: Gate) {
        let outer = self.emitted.clone();
        self.state.group.spawn(
            async move {
                match outer.wait().await {
                    Ok(()) => inner.resolve(()),
                    Err(abandoned) => inner.reject(abandoned),
                };
                Ok::<(), RenderError>(())
            }
            .boxed_local(),
        );
    }
}
