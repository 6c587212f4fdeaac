//! 行の再組み立て
//!
//! 下位ストリームの読み取り単位は行境界と無関係なので、
//! 途中で切れた行（UTF-8 の途中で切れた場合も含む）をバッファに溜め、
//! 行が揃った時点で文字列として返す。
//!
//! 行終端は `\n`・`\r\n`・`\r` のいずれも受け付ける。
//! `\r` で読み取りが終わり次の読み取りが `\n` で始まる場合も 1 つの終端として扱う。

use crate::error::TransportError;

/// 1 行の最大バイト数の既定値（16 MiB）
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// バイト列を受け取り、行単位に分割するクラス
pub struct LineSplitter {
    /// 終端がまだ来ていない行のバイト列
    partial: Vec<u8>,
    /// 直前の読み取りが `\r` で終わった（次の先頭 `\n` は読み捨てる）
    after_cr: bool,
    /// 1 行の最大バイト数
    max_line_len: usize,
}

impl LineSplitter {
    /// 既定の上限で生成する
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// 1 行の最大バイト数を指定して生成する
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        LineSplitter {
            partial: Vec::new(),
            after_cr: false,
            max_line_len,
        }
    }

    /// 読み取ったバイト列を追加し、完成した行を返す
    ///
    /// 空行は返さない。
    ///
    /// # エラー
    /// - `TransportError::LineTooLong`: 終端なしで上限を超えた
    /// - `TransportError::InvalidUtf8`: 完成した行が UTF-8 ではない
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, TransportError> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        if self.after_cr && !rest.is_empty() {
            self.after_cr = false;
            if rest[0] == b'\n' {
                rest = &rest[1..];
            }
        }

        while let Some(pos) = rest.iter().position(|&b| b == b'\n' || b == b'\r') {
            self.extend_partial(&rest[..pos])?;
            self.complete_line(&mut lines)?;

            let terminator = rest[pos];
            rest = &rest[pos + 1..];
            if terminator == b'\r' {
                match rest.first() {
                    Some(b'\n') => rest = &rest[1..],
                    Some(_) => {}
                    None => self.after_cr = true,
                }
            }
        }

        self.extend_partial(rest)?;
        Ok(lines)
    }

    /// ストリーム終了時に、終端のない最後の行を返す
    pub fn finish(&mut self) -> Result<Option<String>, TransportError> {
        self.after_cr = false;
        let mut lines = Vec::new();
        self.complete_line(&mut lines)?;
        Ok(lines.pop())
    }

    /// 終端待ちのバイト数
    pub fn buffered_len(&self) -> usize {
        self.partial.len()
    }

    fn extend_partial(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.partial.len() + bytes.len() > self.max_line_len {
            return Err(TransportError::LineTooLong { limit: self.max_line_len });
        }
        self.partial.extend_from_slice(bytes);
        Ok(())
    }

    fn complete_line(&mut self, lines: &mut Vec<String>) -> Result<(), TransportError> {
        if self.partial.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.partial);
        let line = String::from_utf8(bytes).map_err(|e| TransportError::InvalidUtf8 {
            valid_up_to: e.utf8_error().valid_up_to(),
        })?;
        lines.push(line);
        Ok(())
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}
