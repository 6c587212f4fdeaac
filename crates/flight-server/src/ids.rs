//! ID 割り当てと宣言の重複排除
//!
//! 1 ストリームにつき 1 つ。IO を持たず、新しく宣言が必要になったときは
//! 出力すべきチャンクを呼び出し側に返す。

use std::collections::HashMap;

use flight_proto::{BuiltinKind, Chunk};
use tracing::trace;

use crate::error::RenderError;
use crate::options::ReferenceDataFn;

/// ID 割り当ての結果
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// 組み込み・参照の ID
    pub id: u64,
    /// 初回のみ: 先に出力すべき宣言チャンク（`S` / `M`）
    pub declaration: Option<Chunk>,
}

impl Allocation {
    fn existing(id: u64) -> Self {
        Allocation { id, declaration: None }
    }
}

/// ストリーム内の ID カウンタと宣言済みテーブル
#[derive(Debug, Default)]
pub struct IdTables {
    next_id: u64,
    builtins: HashMap<BuiltinKind, u64>,
    references: HashMap<String, u64>,
}

impl IdTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しい ID を払い出す
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        trace!(id, "allocated id");
        id
    }

    /// 組み込みコンテナの ID を返す（初回は `S` チャンクを添える）
    pub fn ensure_builtin(&mut self, kind: BuiltinKind) -> Allocation {
        if let Some(&id) = self.builtins.get(&kind) {
            return Allocation::existing(id);
        }
        let id = self.next_id();
        self.builtins.insert(kind, id);
        Allocation {
            id,
            declaration: Some(Chunk::Builtin { id, kind }),
        }
    }

    /// クライアント参照の ID を返す（初回は `M` チャンクを添える）
    ///
    /// # エラー
    /// - `RenderError::Configuration`: フックがない、またはフックが記述子を返さない
    pub fn ensure_reference(
        &mut self,
        identity: &str,
        reference_data: Option<&ReferenceDataFn>,
    ) -> Result<Allocation, RenderError> {
        if let Some(&id) = self.references.get(identity) {
            return Ok(Allocation::existing(id));
        }
        let hook = reference_data.ok_or_else(|| {
            RenderError::Configuration(format!(
                "Missing client reference data hook for client reference '{identity}'"
            ))
        })?;
        let data = hook(identity).ok_or_else(|| {
            RenderError::Configuration(format!(
                "No client reference data for '{identity}'"
            ))
        })?;

        let id = self.next_id();
        self.references.insert(identity.to_owned(), id);
        Ok(Allocation {
            id,
            declaration: Some(Chunk::Meta { id, data }),
        })
    }

    /// これまでに払い出した ID の数
    pub fn allocated(&self) -> u64 {
        self.next_id
    }
}
