//! チャンク列からノード木を組み立てる（IO なし）
//!
//! 最初の `J` チャンクがルート。以降の `J` / `E` チャンクは、
//! それまでに出現した未解決のホール（`@<id>`）を 1 つずつ埋める。

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use flight_proto::{BuiltinKind, Chunk, Encoded, EncodedNode, ProtoError, TypeToken};
use flight_sync::Deferred;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{DecodeError, HoleError};
use crate::node::{BuiltinElement, ClientElement, Element, Hole, Node, ReferenceEntry};
use crate::options::{ClientOptions, Resolver};

/// 1 チャンクを適用した結果
#[derive(Debug)]
pub enum Event {
    /// `M` / `S` チャンクで ID が宣言された
    Declared { id: u64 },
    /// ルートが届いた
    Root(Node),
    /// ホールが埋まった
    Filled { id: u64 },
    /// ホールが `E` チャンクで失敗した
    Failed { id: u64 },
}

/// 1 ストリーム分のデコード状態
pub struct Reconstructor {
    builtins: HashMap<u64, BuiltinKind>,
    /// `M` チャンクの記述子（未解決のまま保持）
    descriptors: HashMap<u64, Value>,
    /// 一度でも描画対象になった参照
    references: HashMap<u64, Rc<ReferenceEntry>>,
    /// 未解決のホール
    holes: HashMap<u64, Deferred<Node, HoleError>>,
    /// 埋まった（または失敗した）ホール
    settled: HashSet<u64>,
    resolver: Option<Resolver>,
    root_seen: bool,
}

impl Reconstructor {
    pub fn new(options: &ClientOptions) -> Self {
        Reconstructor {
            builtins: HashMap::new(),
            descriptors: HashMap::new(),
            references: HashMap::new(),
            holes: HashMap::new(),
            settled: HashSet::new(),
            resolver: options.resolver.clone(),
            root_seen: false,
        }
    }

    /// 1 チャンクを適用する
    ///
    /// # エラー
    /// - `ProtoError::UnknownBuiltin` / `UndeclaredBuiltin`: 組み込みが不正
    /// - `ProtoError::UnexpectedChunk`: 未解決のホールがない ID への `J` / `E`
    /// - `DecodeError::Configuration`: リゾルバなしでクライアント参照が現れた
    pub fn apply(&mut self, chunk: Chunk) -> Result<Event, DecodeError> {
        debug!(kind = %chunk.kind().tag(), id = chunk.id(), "apply chunk");
        match chunk {
            Chunk::Meta { id, data } => {
                self.descriptors.insert(id, data);
                Ok(Event::Declared { id })
            }
            Chunk::Builtin { id, kind } => {
                self.builtins.insert(id, kind);
                Ok(Event::Declared { id })
            }
            Chunk::Node { id, node } => {
                if !self.root_seen {
                    let root = self.build(node)?;
                    self.root_seen = true;
                    return Ok(Event::Root(root));
                }
                // 中身を組み立てる前に解決済みにして、自分自身への参照を弾く
                let hole = self
                    .holes
                    .remove(&id)
                    .ok_or(ProtoError::UnexpectedChunk(id))?;
                self.settled.insert(id);
                match self.build(node) {
                    Ok(content) => {
                        hole.resolve(content);
                        Ok(Event::Filled { id })
                    }
                    Err(err) => {
                        hole.reject(HoleError::Aborted(err.to_string()));
                        Err(err)
                    }
                }
            }
            Chunk::Error { id, message } => {
                let hole = self
                    .holes
                    .remove(&id)
                    .ok_or(ProtoError::UnexpectedChunk(id))?;
                warn!(id, %message, "remote subtree failed");
                hole.reject(HoleError::Remote(message));
                self.settled.insert(id);
                Ok(Event::Failed { id })
            }
        }
    }

    /// 未解決のホール ID（昇順）
    pub fn outstanding(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.holes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn has_root(&self) -> bool {
        self.root_seen
    }

    /// 未解決のホールをすべて失敗させ、その ID を返す
    pub fn abort(&mut self, reason: HoleError) -> Vec<u64> {
        let ids = self.outstanding();
        if !ids.is_empty() {
            warn!(?ids, %reason, "aborting unresolved holes");
        }
        for (id, hole) in self.holes.drain() {
            hole.reject(reason.clone());
            self.settled.insert(id);
        }
        ids
    }

    /// ストリームの終端で呼ぶ
    ///
    /// # エラー
    /// - `DecodeError::MissingRoot`: ルートが届いていない
    /// - `DecodeError::Truncated`: 未解決のホールが残っている（それらは `Aborted` になる）
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        if !self.root_seen {
            return Err(DecodeError::MissingRoot);
        }
        let ids = self.abort(HoleError::Aborted("stream ended".into()));
        if !ids.is_empty() {
            return Err(DecodeError::Truncated(ids));
        }
        Ok(())
    }

    fn build(&mut self, encoded: Encoded) -> Result<Node, DecodeError> {
        let EncodedNode { ty, fallback, props, children } = match encoded {
            Encoded::Primitive(p) => return Ok(Node::Primitive(p)),
            Encoded::Node(node) => node,
        };

        match ty {
            TypeToken::Tag(tag) => Ok(Node::Element(Element {
                tag,
                props,
                children: self.build_all(children)?,
            })),
            TypeToken::Builtin(id) => {
                let kind = *self
                    .builtins
                    .get(&id)
                    .ok_or(ProtoError::UndeclaredBuiltin(id))?;
                let fallback = match fallback {
                    Some(fallback) if kind == BuiltinKind::Suspense => Some(Box::new(self.build(*fallback)?)),
                    _ => None,
                };
                Ok(Node::Builtin(BuiltinElement {
                    kind,
                    fallback,
                    props,
                    children: self.build_all(children)?,
                }))
            }
            TypeToken::Reference(id) if self.descriptors.contains_key(&id) => {
                let entry = self.reference(id)?;
                Ok(Node::Reference(ClientElement {
                    id,
                    props,
                    children: self.build_all(children)?,
                    entry,
                }))
            }
            TypeToken::Reference(id) => self.hole(id).map(Node::Hole),
        }
    }

    fn build_all(&mut self, children: Option<Vec<Encoded>>) -> Result<Vec<Node>, DecodeError> {
        children
            .unwrap_or_default()
            .into_iter()
            .map(|child| self.build(child))
            .collect()
    }

    fn reference(&mut self, id: u64) -> Result<Rc<ReferenceEntry>, DecodeError> {
        if let Some(entry) = self.references.get(&id) {
            return Ok(Rc::clone(entry));
        }
        let resolver = self.resolver.clone().ok_or_else(|| {
            DecodeError::Configuration(format!(
                "Missing client reference resolver for client reference @{id}"
            ))
        })?;
        let descriptor = self.descriptors.get(&id).cloned().unwrap_or(Value::Null);
        let entry = Rc::new(ReferenceEntry::new(id, descriptor, resolver));
        self.references.insert(id, Rc::clone(&entry));
        Ok(entry)
    }

    fn hole(&mut self, id: u64) -> Result<Hole, DecodeError> {
        if self.settled.contains(&id) {
            return Err(ProtoError::InvalidElement(format!("hole @{id} was already resolved")).into());
        }
        let slot = self
            .holes
            .entry(id)
            .or_insert_with(|| {
                trace!(id, "hole registered");
                Deferred::new()
            })
            .clone();
        Ok(Hole { id, slot })
    }
}
