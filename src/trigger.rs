use intmap::IntMap;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::thread::LocalKey;

use crate::error::TbError;
use crate::executor;
use crate::{
    signal::SimObject,
    sim_if::{SimCallback, SIM_IF},
    TbResult,
};

// One simulator callback per edge signal and per absolute timer time; the wakers of every
// trigger waiting on it are collected here.
thread_local! {
    // key is signal handle as u64
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    static READ_ONLY: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
    static READ_WRITE: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
    static NEXT_TIME_STEP: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

pub(crate) fn cancel_all_triggers() {
    let _ = READ_ONLY.with(|s| s.replace(CallbackHandles::default()));
    let _ = READ_WRITE.with(|s| s.replace(CallbackHandles::default()));
    let _ = NEXT_TIME_STEP.with(|s| s.replace(CallbackHandles::default()));
    let _ = TIMER_MAP.with(|m| std::mem::replace(&mut *m.borrow_mut(), IntMap::new()));
    let _ = EDGE_MAP.with(|m| std::mem::replace(&mut *m.borrow_mut(), IntMap::new()));
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    fired: Rc<Cell<bool>>,
    // If trigger is an edge, the react method needs to know if it is a rising or falling edge
    // so an existing callback does not have to be rescheduled.
    edge_kind: EdgeKind,
}

#[derive(Clone, Copy, Debug)]
enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
    NextTimeStep,
}

/// Future completing once the simulator reached the awaited event.
#[derive(Clone)]
pub struct Trigger {
    kind: TrigKind,
    // set once the trigger is registered; flips to true when the simulator fired it
    fired: Option<Rc<Cell<bool>>>,
    // high exec prio currently only implemented for ReadOnly
    high_exec_prio: bool,
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger {
            kind,
            fired: None,
            high_exec_prio: false,
        }
    }
    pub fn timer(time: u64, unit: &str) -> TbResult<Self> {
        let steps = SIM_IF.get_sim_steps(time as f64, unit)?;
        Trigger::timer_steps(steps)
    }
    pub fn timer_steps(steps: u64) -> TbResult<Self> {
        if steps == 0 {
            return Err(TbError::ZeroDelay);
        }
        Ok(Trigger::new(TrigKind::Timer(steps)))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }
    /// Fires once all signal updates of the current time step settled; writes are not allowed.
    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }
    pub(crate) fn read_only_prio() -> Self {
        Trigger {
            high_exec_prio: true,
            ..Trigger::read_only()
        }
    }
    /// Fires at the beginning of the next time step in which anything is scheduled.
    pub fn next_time_step() -> Self {
        Trigger::new(TrigKind::NextTimeStep)
    }

    fn register(&self, mut shared: TrigShared) -> TbResult<()> {
        match self.kind {
            TrigKind::ReadWrite => push_sync(&READ_WRITE, shared, false, SimCallback::ReadWrite),
            TrigKind::ReadOnly => {
                push_sync(&READ_ONLY, shared, self.high_exec_prio, SimCallback::ReadOnly)
            }
            TrigKind::NextTimeStep => {
                push_sync(&NEXT_TIME_STEP, shared, false, SimCallback::NextTimeStep)
            }
            TrigKind::Timer(t) => {
                // Add current time to key since since simulator will send back absolute time, not delta
                let abs_time = t + SIM_IF.get_sim_time_steps();
                push_keyed(&TIMER_MAP, abs_time, shared, SimCallback::Time(t))
            }
            TrigKind::Edge(sig_hdl, edge_kind) => {
                shared.edge_kind = edge_kind;
                push_keyed(&EDGE_MAP, sig_hdl as u64, shared, SimCallback::Edge(sig_hdl))
            }
        }
    }
}

fn push_sync(
    slot: &'static LocalKey<RefCell<CallbackHandles>>,
    shared: TrigShared,
    front: bool,
    cb: SimCallback,
) -> TbResult<()> {
    let needs_handle = slot.with(|s| {
        let mut s = s.borrow_mut();
        match front {
            false => s.callbacks.push_back(shared),
            true => s.callbacks.push_front(shared),
        }
        s.handle.is_none()
    });
    if needs_handle {
        let handle = SIM_IF.register_callback(cb)?;
        slot.with(|s| s.borrow_mut().handle = Some(handle));
    }
    Ok(())
}

fn push_keyed(
    map: &'static LocalKey<RefCell<IntMap<CallbackHandles>>>,
    key: u64,
    shared: TrigShared,
    cb: SimCallback,
) -> TbResult<()> {
    let unregistered = map.with(|m| match m.borrow_mut().get_mut(key) {
        Some(callbacks) => {
            callbacks.callbacks.push_back(shared);
            None
        }
        None => Some(shared),
    });
    if let Some(shared) = unregistered {
        let handle = SIM_IF.register_callback(cb)?;
        let callback = CallbackHandles {
            handle: Some(handle),
            callbacks: VecDeque::from([shared]),
        };
        map.with(|m| {
            m.borrow_mut().insert(key, callback);
        });
    }
    Ok(())
}

impl Future for Trigger {
    type Output = TbResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A registered trigger only completes after the simulator fired it; any other poll is spurious.
        if let Some(fired) = &self.fired {
            return match fired.get() {
                true => Poll::Ready(Ok(())),
                false => Poll::Pending,
            };
        }
        let fired = Rc::new(Cell::new(false));
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind: EdgeKind::Any,
        };
        if let Err(e) = self.register(shared) {
            return Poll::Ready(Err(e));
        }
        self.fired = Some(fired);
        Poll::Pending
    }
}

fn take_sync(slot: &'static LocalKey<RefCell<CallbackHandles>>) -> VecDeque<TrigShared> {
    slot.with(|s| {
        let mut s = s.borrow_mut();
        // remove handle, since CB is now done
        s.handle = None;
        std::mem::take(&mut s.callbacks)
    })
}

fn react_edge(sig_hdl: usize, edge: EdgeKind) -> TbResult<VecDeque<TrigShared>> {
    let Some(mut callbacks) = EDGE_MAP.with(|m| m.borrow_mut().remove(sig_hdl as u64)) else {
        return Ok(VecDeque::new());
    };
    let (wake, resched): (VecDeque<_>, VecDeque<_>) =
        callbacks.callbacks.drain(..).partition(|trig| {
            edge == EdgeKind::Any || trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge
        });
    if resched.is_empty() {
        // if no callbacks are remaining, cancel
        if let Some(handle) = callbacks.handle {
            SIM_IF.cancel_callback(handle)?;
        }
    } else {
        callbacks.callbacks = resched;
        EDGE_MAP.with(|m| {
            m.borrow_mut().insert(sig_hdl as u64, callbacks);
        });
    }
    Ok(wake)
}

/// Called by the simulator for every fired callback; wakes the waiting tasks and runs them.
#[inline]
pub(crate) fn react(cb: SimCallback, edge: Option<EdgeKind>) -> TbResult<()> {
    let wake = match cb {
        SimCallback::ReadWrite => take_sync(&READ_WRITE),
        SimCallback::ReadOnly => take_sync(&READ_ONLY),
        SimCallback::NextTimeStep => take_sync(&NEXT_TIME_STEP),
        SimCallback::Time(t) => TIMER_MAP
            .with(|m| m.borrow_mut().remove(t))
            .map(|c| c.callbacks)
            .unwrap_or_default(),
        SimCallback::Edge(sig_hdl) => react_edge(sig_hdl, edge.unwrap_or(EdgeKind::Any))?,
    };

    for shared in wake {
        shared.fired.set(true);
        shared.waker.wake();
    }
    // execute woken tasks
    executor::run_once();
    Ok(())
}
