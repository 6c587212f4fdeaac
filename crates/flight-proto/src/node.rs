//! ノードのワイヤ表現
//!
//! ## Encoded Node Format
//! ```text
//! ["$", typeToken, fallbackOrNull, { ...props, "children": [child, ...] }]
//!
//! typeToken:
//!   "div"   = 要素（タグ名そのまま）
//!   "$<id>" = 組み込みコンテナ（S チャンクで宣言された ID）
//!   "@<id>" = クライアント参照（M チャンク）または未到着のホール（後続の J チャンク）
//! ```
//!
//! プリミティブ（文字列・数値・真偽値・null）はそのまま JSON 値として書かれる。
//! ノードは必ず `"$"` で始まる 4 要素配列なので区別できる。

use core::fmt;

use serde::ser::{SerializeMap, SerializeTuple};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::ProtoError;
use crate::MAX_SAFE_ID;

/// エンコード済みノードの先頭マーカー
pub const ELEMENT_MARKER: &str = "$";

/// props 内で子ノード列を運ぶキー
pub const CHILDREN_KEY: &str = "children";

/// JSON スカラー値
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::String(s.into())
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::String(s)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

impl From<i64> for Primitive {
    fn from(n: i64) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<u64> for Primitive {
    fn from(n: u64) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<Primitive> for Value {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Null => Value::Null,
            Primitive::Bool(b) => Value::Bool(b),
            Primitive::Number(n) => Value::Number(n),
            Primitive::String(s) => Value::String(s),
        }
    }
}

/// 組み込みコンテナの種類
///
/// ストリームごとに一度だけ `S<id>:"<name>"` で宣言され、以降は `$<id>` で参照される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinKind {
    /// 透過的なグループ化コンテナ
    Fragment,
    /// フォールバックを持つサスペンス境界
    Suspense,
}

impl BuiltinKind {
    /// ワイヤ上の名前
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinKind::Fragment => "Fragment",
            BuiltinKind::Suspense => "Suspense",
        }
    }

    /// ワイヤ上の名前から種類を判定する
    ///
    /// # エラー
    /// - `ProtoError::UnknownBuiltin`: 既知の名前ではない
    pub fn from_name(name: &str) -> Result<Self, ProtoError> {
        match name {
            "Fragment" => Ok(BuiltinKind::Fragment),
            "Suspense" => Ok(BuiltinKind::Suspense),
            other => Err(ProtoError::UnknownBuiltin(other.into())),
        }
    }
}

/// エンコード済みノードの型トークン
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeToken {
    /// 要素のタグ名
    Tag(String),
    /// `$<id>`: 組み込みコンテナ
    Builtin(u64),
    /// `@<id>`: クライアント参照またはホール
    Reference(u64),
}

impl TypeToken {
    /// 文字列トークンを解析する
    pub fn parse(token: &str) -> Result<Self, ProtoError> {
        if let Some(id) = token.strip_prefix('$') {
            return parse_id(id).map(TypeToken::Builtin);
        }
        if let Some(id) = token.strip_prefix('@') {
            return parse_id(id).map(TypeToken::Reference);
        }
        if token.is_empty() {
            return Err(ProtoError::InvalidElement("empty type token".into()));
        }
        Ok(TypeToken::Tag(token.into()))
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeToken::Tag(tag) => f.write_str(tag),
            TypeToken::Builtin(id) => write!(f, "${}", id),
            TypeToken::Reference(id) => write!(f, "@{}", id),
        }
    }
}

impl Serialize for TypeToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 10 進の安全な整数 ID を解析する（符号・空白・指数表記は不可）
pub fn parse_id(digits: &str) -> Result<u64, ProtoError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtoError::InvalidId(digits.into()));
    }
    match digits.parse::<u64>() {
        Ok(id) if id <= MAX_SAFE_ID => Ok(id),
        _ => Err(ProtoError::InvalidId(digits.into())),
    }
}

/// ワイヤ上のノード値（プリミティブまたは 4 要素配列）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Encoded {
    Primitive(Primitive),
    Node(EncodedNode),
}

/// `["$", type, fallback, props]` 形式のノード
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedNode {
    /// 型トークン
    pub ty: TypeToken,
    /// サスペンス境界のフォールバック（それ以外は `None` = null）
    pub fallback: Option<Box<Encoded>>,
    /// `children` 以外のプロパティ（挿入順を保持）
    pub props: Map<String, Value>,
    /// 子ノード列。`None` の場合 `children` キー自体を出力しない（ホール用）
    pub children: Option<Vec<Encoded>>,
}

impl EncodedNode {
    /// 要素ノード
    pub fn element(tag: impl Into<String>, props: Map<String, Value>, children: Vec<Encoded>) -> Self {
        EncodedNode {
            ty: TypeToken::Tag(tag.into()),
            fallback: None,
            props,
            children: Some(children),
        }
    }

    /// 組み込みコンテナノード
    pub fn builtin(id: u64, fallback: Option<Encoded>, children: Vec<Encoded>) -> Self {
        EncodedNode {
            ty: TypeToken::Builtin(id),
            fallback: fallback.map(Box::new),
            props: Map::new(),
            children: Some(children),
        }
    }

    /// クライアント参照ノード
    pub fn reference(id: u64, props: Map<String, Value>, children: Vec<Encoded>) -> Self {
        EncodedNode {
            ty: TypeToken::Reference(id),
            fallback: None,
            props,
            children: Some(children),
        }
    }

    /// 後続チャンクで埋まるホール（`["$","@<id>",null,{}]`）
    pub fn hole(id: u64) -> Self {
        EncodedNode {
            ty: TypeToken::Reference(id),
            fallback: None,
            props: Map::new(),
            children: None,
        }
    }
}

impl From<EncodedNode> for Encoded {
    fn from(node: EncodedNode) -> Self {
        Encoded::Node(node)
    }
}

impl From<Primitive> for Encoded {
    fn from(p: Primitive) -> Self {
        Encoded::Primitive(p)
    }
}

impl Serialize for EncodedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(ELEMENT_MARKER)?;
        tuple.serialize_element(&self.ty)?;
        tuple.serialize_element(&self.fallback)?;
        tuple.serialize_element(&PropsWithChildren {
            props: &self.props,
            children: self.children.as_deref(),
        })?;
        tuple.end()
    }
}

/// props に children を最後に足して 1 つのオブジェクトとして書く
struct PropsWithChildren<'a> {
    props: &'a Map<String, Value>,
    children: Option<&'a [Encoded]>,
}

impl Serialize for PropsWithChildren<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in self.props.iter().filter(|(k, _)| k.as_str() != CHILDREN_KEY) {
            map.serialize_entry(key, value)?;
        }
        if let Some(children) = self.children {
            map.serialize_entry(CHILDREN_KEY, children)?;
        }
        map.end()
    }
}

impl Encoded {
    /// JSON 値からワイヤ上のノードを復元する
    ///
    /// # エラー
    /// - `ProtoError::InvalidElement`: 配列が 4 要素の `"$"` 形式でない、props がオブジェクトでない、
    ///   children が配列でない、または値が JSON オブジェクト
    pub fn from_value(value: Value) -> Result<Self, ProtoError> {
        match value {
            Value::Null => Ok(Encoded::Primitive(Primitive::Null)),
            Value::Bool(b) => Ok(Encoded::Primitive(Primitive::Bool(b))),
            Value::Number(n) => Ok(Encoded::Primitive(Primitive::Number(n))),
            Value::String(s) => Ok(Encoded::Primitive(Primitive::String(s))),
            Value::Array(items) => EncodedNode::from_items(items).map(Encoded::Node),
            // 子の位置でもオブジェクトは通さない
            Value::Object(_) => Err(ProtoError::InvalidElement("unexpected object".into())),
        }
    }
}

impl EncodedNode {
    fn from_items(items: Vec<Value>) -> Result<Self, ProtoError> {
        let [marker, ty, fallback, props]: [Value; 4] = items
            .try_into()
            .map_err(|items: Vec<Value>| {
                ProtoError::InvalidElement(format!("expected 4 items, got {}", items.len()))
            })?;

        if marker.as_str() != Some(ELEMENT_MARKER) {
            return Err(ProtoError::InvalidElement("missing \"$\" marker".into()));
        }

        let ty = match ty {
            Value::String(token) => TypeToken::parse(&token)?,
            _ => return Err(ProtoError::InvalidElement("type token is not a string".into())),
        };

        let fallback = match fallback {
            Value::Null => None,
            other => Some(Box::new(Encoded::from_value(other)?)),
        };

        let mut props = match props {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(ProtoError::InvalidElement("props is not an object".into())),
        };

        let children = match props.remove(CHILDREN_KEY) {
            None => None,
            Some(Value::Null) => Some(Vec::new()),
            Some(Value::Array(children)) => Some(
                children
                    .into_iter()
                    .map(Encoded::from_value)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(ProtoError::InvalidElement("children is not an array".into())),
        };

        Ok(EncodedNode { ty, fallback, props, children })
    }
}
