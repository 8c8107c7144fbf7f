use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{waker, ArcWake};
use futures_channel::oneshot;
use intmap::IntMap;
use queues::{IsQueue, Queue};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::TbError;
use crate::sim_if::SIM_IF;
use crate::TbResult;

// The simulation is single threaded: every task lives on the thread that runs the kernel.
thread_local! {
    static READY_QUEUE: RefCell<Queue<u64>> = RefCell::new(Queue::new());
    static TASKS: RefCell<IntMap<Task>> = RefCell::new(IntMap::new());
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

pub(crate) fn schedule_task(id: u64) {
    let queue = TASKS.with(|tasks| match tasks.borrow_mut().get_mut(id) {
        Some(task) if !task.scheduled => {
            task.scheduled = true;
            true
        }
        _ => false,
    });
    if queue {
        READY_QUEUE.with(|q| {
            let _ = q.borrow_mut().add(id);
        });
    }
}

fn next_task() -> Option<u64> {
    READY_QUEUE.with(|q| q.borrow_mut().remove().ok())
}

/// Polls every ready task until none is left.
#[inline]
pub fn run_once() {
    while let Some(id) = next_task() {
        process_task(id);
    }
}

#[inline]
fn process_task(id: u64) {
    let slot = TASKS.with(|tasks| {
        let mut tasks = tasks.borrow_mut();
        let task = tasks.get_mut(id)?;
        task.scheduled = false;
        task.future.take()
    });
    // cancelled tasks are gone from the map and are never polled again
    let Some(mut fut) = slot else { return };

    let waker = waker(Arc::new(TaskWaker(id)));
    let mut context = Context::from_waker(&waker);
    match fut.as_mut().poll(&mut context) {
        Poll::Pending => {
            let orphan = TASKS.with(|tasks| match tasks.borrow_mut().get_mut(id) {
                Some(task) => {
                    task.future = Some(fut);
                    None
                }
                None => Some(fut),
            });
            // dropping may wake other tasks, so it happens outside the borrow
            drop(orphan);
        }
        Poll::Ready(result) => {
            let finished = TASKS.with(|tasks| tasks.borrow_mut().remove(id));
            if let Some(mut task) = finished {
                if let Err(e) = &result {
                    if !matches!(e, TbError::Cancelled) {
                        SIM_IF.log(&format!("Task '{}' ended with error: {}", task.name, e));
                    }
                }
                if let Some(tx) = task.join_tx.take() {
                    let _ = tx.send(result);
                }
            }
        }
    }
}

/// Drops every task and empties the ready queue.
pub(crate) fn clear() {
    let tasks = TASKS.with(|tasks| std::mem::replace(&mut *tasks.borrow_mut(), IntMap::new()));
    drop(tasks);
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
}

#[cfg(test)]
pub(crate) fn task_count() -> usize {
    TASKS.with(|tasks| tasks.borrow().len())
}

pub struct Task {
    future: Option<LocalBoxFuture<'static, TbResult>>,
    name: String,
    scheduled: bool,
    join_tx: Option<oneshot::Sender<TbResult>>,
}

impl Task {
    pub fn fork(future: impl Future<Output = TbResult> + 'static) -> JoinHandle {
        Task::spawn_from_future(future, "forked")
    }

    pub fn spawn_from_future(
        future: impl Future<Output = TbResult> + 'static,
        name: &str,
    ) -> JoinHandle {
        let (tx, rx) = oneshot::channel::<TbResult>();
        let id = NEXT_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        let task = Task {
            future: Some(future.boxed_local()),
            name: name.to_string(),
            scheduled: false,
            join_tx: Some(tx),
        };
        TASKS.with(|tasks| {
            tasks.borrow_mut().insert(id, task);
        });
        schedule_task(id);
        JoinHandle { id, join_rx: rx }
    }
}

struct TaskWaker(u64);

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.0);
    }
}

pub struct JoinHandle {
    id: u64,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    /// Removes the task; awaiting this handle afterwards yields [`TbError::Cancelled`].
    pub fn cancel(&self) {
        let task = TASKS.with(|tasks| tasks.borrow_mut().remove(self.id));
        drop(task);
    }

    pub fn is_finished(&self) -> bool {
        !TASKS.with(|tasks| tasks.borrow().contains_key(self.id))
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TbError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
