//! First-come first-served lock for a shared DUT port.
//!
//! Releasing the lock hands it directly to the oldest waiter, so a task that asks for the
//! port again right after releasing it queues behind everyone already waiting.

use futures::FutureExt;
use futures_channel::oneshot;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

#[derive(Default)]
struct LockState {
    locked: bool,
    // a send hands over ownership; the lock stays `locked` across the handoff
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Clone, Default)]
pub struct PortLock(Rc<RefCell<LockState>>);

impl PortLock {
    pub fn new() -> Self {
        PortLock::default()
    }

    pub fn lock(&self) -> Acquire {
        Acquire {
            state: self.0.clone(),
            rx: None,
            acquired: false,
        }
    }

    #[cfg(test)]
    fn is_locked(&self) -> bool {
        self.0.borrow().locked
    }

    #[cfg(test)]
    fn waiting(&self) -> usize {
        self.0.borrow().waiters.len()
    }
}

fn release(state: &RefCell<LockState>) {
    loop {
        let next = state.borrow_mut().waiters.pop_front();
        match next {
            // fails only if the waiter was dropped
            Some(tx) => {
                if tx.send(()).is_ok() {
                    return;
                }
            }
            None => {
                state.borrow_mut().locked = false;
                return;
            }
        }
    }
}

/// Holds the port until dropped.
pub struct PortGuard {
    state: Rc<RefCell<LockState>>,
}

impl Drop for PortGuard {
    fn drop(&mut self) {
        release(&self.state);
    }
}

/// Future returned by [`PortLock::lock`].
pub struct Acquire {
    state: Rc<RefCell<LockState>>,
    rx: Option<oneshot::Receiver<()>>,
    acquired: bool,
}

impl Acquire {
    fn granted(&mut self) -> Poll<PortGuard> {
        self.acquired = true;
        Poll::Ready(PortGuard {
            state: self.state.clone(),
        })
    }
}

impl Future for Acquire {
    type Output = PortGuard;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<PortGuard> {
        let this = &mut *self;
        if this.rx.is_none() {
            let queued = {
                let mut state = this.state.borrow_mut();
                if state.locked {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Some(rx)
                } else {
                    state.locked = true;
                    None
                }
            };
            match queued {
                None => return this.granted(),
                Some(rx) => this.rx = Some(rx),
            }
        }
        let handed_over = match this.rx.as_mut() {
            Some(rx) => rx.poll_unpin(cx).is_ready(),
            None => false,
        };
        match handed_over {
            true => this.granted(),
            false => Poll::Pending,
        }
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        if self.acquired {
            return;
        }
        // a waiter cancelled after the handoff passes the lock on
        if let Some(rx) = self.rx.as_mut() {
            rx.close();
            if let Ok(Some(())) = rx.try_recv() {
                release(&self.state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{self, JoinHandle, Task};
    use crate::value::Val;

    fn queue_task(lock: &PortLock, log: &Rc<RefCell<Vec<u32>>>, id: u32) -> JoinHandle {
        let (lock, log) = (lock.clone(), log.clone());
        Task::fork(async move {
            let _port = lock.lock().await;
            log.borrow_mut().push(id);
            Ok(Val::None)
        })
    }

    #[test]
    fn hands_over_in_request_order() {
        executor::clear();
        let lock = PortLock::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let held = lock.lock().now_or_never().unwrap();
        for id in 1..=3 {
            queue_task(&lock, &log, id);
        }
        executor::run_once();
        assert_eq!(lock.waiting(), 3);

        drop(held);
        // asks after the release but still queues behind the earlier waiters
        queue_task(&lock, &log, 4);
        executor::run_once();
        assert_eq!(*log.borrow(), vec![1, 2, 3, 4]);
        assert!(!lock.is_locked());
    }

    #[test]
    fn cancelled_waiter_passes_the_lock_on() {
        executor::clear();
        let lock = PortLock::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let held = lock.lock().now_or_never().unwrap();
        let first = queue_task(&lock, &log, 1);
        queue_task(&lock, &log, 2);
        executor::run_once();

        // the handoff reaches the first waiter, which is cancelled before it runs
        drop(held);
        first.cancel();
        executor::run_once();
        assert_eq!(*log.borrow(), vec![2]);
        assert!(!lock.is_locked());
    }

    #[test]
    fn free_lock_is_taken_immediately() {
        let lock = PortLock::new();
        let guard = lock.lock().now_or_never();
        assert!(guard.is_some());
        assert!(lock.is_locked());
        assert!(lock.lock().now_or_never().is_none());
        drop(guard);
        assert!(!lock.is_locked());
    }
}
