//! 一度だけ確定する非同期値

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use tokio::sync::watch;

/// 一度だけ値（またはエラー）で確定するハンドル
///
/// 生成直後は未確定。`resolve` / `reject` で一度だけ確定させられ、
/// 2 回目以降の確定は無視される。
/// 任意の数の観測者が `wait` で確定を待てる。
///
/// 用途:
/// - エンコーダ: サスペンス要求のシグナル、チャンク送出済みのゲート
/// - デコーダ: ホールごとの到着待ち
///
/// ## スレッド安全性
///
/// 協調的なシングルスレッド実行を前提にしており、ハンドルは `Rc` で共有する。
pub struct Deferred<T, E = Infallible> {
    slot: Rc<watch::Sender<Option<Result<T, E>>>>,
}

impl<T: Clone, E: Clone> Deferred<T, E> {
    /// 未確定の Deferred を生成する
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Deferred { slot: Rc::new(slot) }
    }

    /// 値で確定させる
    ///
    /// # 戻り値
    /// - `true`: この呼び出しで確定した
    /// - `false`: すでに確定済み（何もしない）
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// エラーで確定させる（確定済みなら何もしない）
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T, E>) -> bool {
        let mut outcome = Some(outcome);
        // 受信側がいなくても値は書き込まれる
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    /// 確定済みか
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// 確定済みなら結果を返す（待たない）
    pub fn peek(&self) -> Option<Result<T, E>> {
        (*self.slot.borrow()).clone()
    }

    /// 確定を待って結果を返す
    pub async fn wait(&self) -> Result<T, E> {
        let mut rx = self.slot.subscribe();
        loop {
            let current = (*rx.borrow_and_update()).clone();
            if let Some(outcome) = current {
                return outcome;
            }
            // 送信側は self が保持しているので閉じない
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// 確定を待つ所有型の Future（ハンドルを複製して保持する）
    pub fn waiter(&self) -> impl Future<Output = Result<T, E>> + 'static
    where
        T: 'static,
        E: 'static,
    {
        let this = self.clone();
        async move { this.wait().await }
    }

    /// 値を取り出さずに確定だけを待つ
    pub async fn settled(&self) {
        let mut rx = self.slot.subscribe();
        let _ = rx.wait_for(Option::is_some).await;
    }
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Deferred { slot: Rc::clone(&self.slot) }
    }
}

impl<T: Clone, E: Clone> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.slot.borrow() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}
