
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use portable_atomic::{AtomicBool, AtomicUsize};
use tokio::sync::{mpsc, oneshot};
use waitgroup::WaitGroup;

use crate::error::{Error, Result};

/// Operation is a function
pub struct Operation(
    pub Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = bool> + Send + 'static>>) + Send + Sync>,
    pub &'static str,
);

impl Operation {
    pub(crate) fn new(
        op: impl FnMut() -> Pin<Box<dyn Future<Output = bool> + Send + 'static>> + Send + Sync + 'static,
        description: &'static str,
    ) -> Self {
        Self(Box::new(op), description)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Operation")
            .field(&"_")
            .field(&self.1)
            .finish()
    }
}

/// Operations runs queued work one item at a time, in order, on its own
/// task. An operation returning `true` is queued again at the back.
#[derive(Default)]
pub(crate) struct Operations {
    length: Arc<AtomicUsize>,
    ops_tx: Option<Arc<mpsc::UnboundedSender<Operation>>>,
    close_tx: Option<mpsc::Sender<()>>,
    closed: AtomicBool,
}

impl Operations {
    pub(crate) fn new() -> Self {
        let length = Arc::new(AtomicUsize::new(0));
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::channel(1);
        let l = Arc::clone(&length);
        let ops_tx = Arc::new(ops_tx);
        let ops_tx2 = Arc::clone(&ops_tx);
        tokio::spawn(async move {
            Operations::start(l, ops_tx, ops_rx, close_rx).await;
        });

        Operations {
            length,
            ops_tx: Some(ops_tx2),
            close_tx: Some(close_tx),
            closed: AtomicBool::new(false),
        }
    }

    /// enqueue adds a new action to be executed. Fails with
    /// `ErrConnectionClosed` once the queue has been closed.
    pub(crate) async fn enqueue(&self, op: Operation) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        if let Some(ops_tx) = &self.ops_tx {
            return Operations::enqueue_inner(op, ops_tx, &self.length);
        }

        Ok(())
    }

    fn enqueue_inner(
        op: Operation,
        ops_tx: &Arc<mpsc::UnboundedSender<Operation>>,
        length: &Arc<AtomicUsize>,
    ) -> Result<()> {
        length.fetch_add(1, Ordering::SeqCst);
        if ops_tx.send(op).is_err() {
            length.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::ErrConnectionClosed);
        }

        Ok(())
    }

    /// is_empty checks if there are tasks in the queue
    pub(crate) async fn is_empty(&self) -> bool {
        self.length.load(Ordering::SeqCst) == 0
    }

    /// Done blocks until all currently enqueued operations are finished executing.
    /// Returns early when the queue is closed and pending work is discarded.
    pub(crate) async fn done(&self) {
        let wg = WaitGroup::new();
        let mut w = Some(wg.worker());
        let _ = self
            .enqueue(Operation::new(
                move || {
                    let _d = w.take();
                    Box::pin(async { false })
                },
                "Operation::done",
            ))
            .await;
        wg.wait().await;
    }

    /// reached resolves once every operation queued before it has run. It
    /// fails with `ErrConnectionClosed` when the queue is closed first and
    /// the pending work is discarded.
    pub(crate) async fn reached(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel::<()>();
        let mut tx = Some(tx);
        self.enqueue(Operation::new(
            move || {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(());
                }
                Box::pin(async { false })
            },
            "Operation::reached",
        ))
        .await?;

        rx.await.map_err(|_| Error::ErrConnectionClosed)
    }

    pub(crate) async fn start(
        length: Arc<AtomicUsize>,
        ops_tx: Arc<mpsc::UnboundedSender<Operation>>,
        mut ops_rx: mpsc::UnboundedReceiver<Operation>,
        mut close_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = close_rx.recv() => {
                    break;
                }
                result = ops_rx.recv() => {
                    if let Some(mut f) = result {
                        length.fetch_sub(1, Ordering::SeqCst);
                        if f.0().await {
                            // Requeue this operation
                            let _ = Operations::enqueue_inner(f, &ops_tx, &length);
                        }
                    }
                }
            }
        }

        // Whatever is still queued is dropped, releasing its waiters.
        ops_rx.close();
        while ops_rx.try_recv().is_ok() {
            length.fetch_sub(1, Ordering::SeqCst);
        }
        log::trace!("operations queue closed");
    }

    /// close stops the queue. The operation running now completes, the rest
    /// are discarded. Closing twice is a no-op.
    pub(crate) async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(close_tx) = &self.close_tx {
            // the worker may already be gone if the runtime is shutting down
            let _ = close_tx.send(()).await;
        }
        Ok(())
    }
}
