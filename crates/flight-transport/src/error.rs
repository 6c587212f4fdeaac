//! flight-transport エラー型

use thiserror::Error;

/// 行フレーミングのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 行終端が来ないまま上限を超えた
    #[error("Line exceeds {limit} bytes without a terminator")]
    LineTooLong { limit: usize },
    /// 完成した行が UTF-8 ではない
    #[error("Line is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
}
