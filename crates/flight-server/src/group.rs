//! 動的に増えるタスク群の構造化 join
//!
//! ルートの走査中にも、バックグラウンドのタスク自身の中からも
//! 新しいタスクが追加される。`join` はルートが終わり、かつ
//! 追加済みのタスクがすべて終わった時点で完了する。

use std::cell::RefCell;
use std::task::Poll;

use futures::future::{poll_fn, FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::trace;

use crate::error::RenderError;

/// グループが実行する 1 タスク
pub(crate) type Task = LocalBoxFuture<'static, Result<(), RenderError>>;

/// シングルスレッドのタスクグループ
#[derive(Default)]
pub(crate) struct TaskGroup {
    /// 次のポーリングで実行集合へ移すタスク
    queued: RefCell<Vec<Task>>,
}

impl TaskGroup {
    /// タスクを追加する（`join` 中ならそのまま拾われる）
    pub(crate) fn spawn(&self, task: Task) {
        self.queued.borrow_mut().push(task);
    }

    fn take_queued(&self) -> Vec<Task> {
        std::mem::take(&mut *self.queued.borrow_mut())
    }

    fn has_queued(&self) -> bool {
        !self.queued.borrow().is_empty()
    }

    /// ルートとすべての追加タスクの完了を待つ
    ///
    /// どれか 1 つでもエラーを返したら、残りを破棄してそのエラーを返す。
    pub(crate) async fn join(&self, root: Task) -> Result<(), RenderError> {
        let mut root = Some(root);
        let mut running: FuturesUnordered<Task> = FuturesUnordered::new();

        let result = poll_fn(|cx| loop {
            let queued = self.take_queued();
            if !queued.is_empty() {
                trace!(count = queued.len(), "background tasks started");
                running.extend(queued);
            }

            if let Some(task) = root.as_mut() {
                if let Poll::Ready(outcome) = task.poll_unpin(cx) {
                    root = None;
                    if let Err(err) = outcome {
                        return Poll::Ready(Err(err));
                    }
                }
            }

            while let Poll::Ready(Some(outcome)) = running.poll_next_unpin(cx) {
                if let Err(err) = outcome {
                    return Poll::Ready(Err(err));
                }
            }

            // ポーリング中に追加されたタスクはすぐに拾う
            if self.has_queued() {
                continue;
            }
            if root.is_none() && running.is_empty() {
                return Poll::Ready(Ok(()));
            }
            return Poll::Pending;
        })
        .await;

        // 失敗時に残ったタスクを捨てる（タスクはストリームの状態を握っている）
        drop(self.take_queued());
        result
    }
}
