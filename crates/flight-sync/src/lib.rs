//! # flight-sync
//!
//! エンコーダとデコーダが共有する協調プリミティブ。
//!
//! `Deferred` は「一度だけ確定し、何人でも待てる」値で、次の 3 か所で使う:
//!
//! ```text
//! エンコーダ:
//!   サスペンス境界の競争   children の完了  vs  Deferred<()> (サスペンス要求)
//!   チャンク送出ゲート     J<id> は @id を含むチャンクの Deferred<(), Abandoned> を待つ
//!
//! デコーダ:
//!   ホール                Deferred<Node, HoleError> を後続チャンクが確定させる
//! ```

pub mod deferred;

pub use deferred::Deferred;
