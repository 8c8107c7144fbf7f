//! In-process event-driven simulator backing [`SIM_IF`](crate::sim_if::SIM_IF).
//!
//! Every time step runs NextTimeStep callbacks, Timer callbacks, then delta cycles
//! (commit scheduled writes, evaluate the model, fire edge callbacks) until nothing
//! changes, then ReadWrite callbacks (which may cause further deltas) and finally the
//! ReadOnly phase. Writes issued during ReadOnly are deferred to the next time step.
//!
//! The kernel is thread local: independent simulations may run on separate threads.

use intmap::IntMap;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::error::TbError;
use crate::model::{format_time_ps, Change, Model, ModelIo};
use crate::signal::{ObjectKind, SimObject};
use crate::sim_if::{SimCallback, SimIf};
use crate::trigger::{self, EdgeKind};
use crate::TbResult;

/// Simulation precision: one step is one picosecond.
pub const PRECISION: i8 = -12;

thread_local! {
    static STATE: RefCell<Option<KernelState>> = const { RefCell::new(None) };
}

#[derive(Clone, Copy, Debug)]
pub struct KernelOptions {
    /// Maximum delta cycles per time step.
    pub max_deltas: u32,
    /// Simulation aborts once this time is exceeded.
    pub time_limit_ns: Option<u64>,
}

impl Default for KernelOptions {
    fn default() -> Self {
        KernelOptions {
            max_deltas: 10_000,
            time_limit_ns: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Active,
    ReadOnly,
}

struct SignalMeta {
    name: String,
    width: u32,
}

struct KernelState {
    top: String,
    time: u64,
    phase: Phase,
    meta: Vec<SignalMeta>,
    values: Vec<u32>,
    by_name: HashMap<String, usize>,
    pending: Vec<(usize, u32)>,
    deferred: Vec<(usize, u32)>,
    model: Box<dyn Model>,
    callbacks: IntMap<SimCallback>,
    next_cb: usize,
    timers: BTreeMap<u64, Vec<usize>>,
    read_write: Vec<usize>,
    read_only: Vec<usize>,
    next_time_step: Vec<usize>,
    options: KernelOptions,
}

impl KernelState {
    fn new(model: Box<dyn Model>, options: KernelOptions) -> Self {
        let top = model.name().to_string();
        let ports = model.ports();
        let mut by_name = HashMap::new();
        let mut meta = Vec::with_capacity(ports.len());
        let mut values = Vec::with_capacity(ports.len());
        for (idx, port) in ports.iter().enumerate() {
            let name = format!("{}.{}", top, port.name);
            // handle 0 is the top scope, ports start at 1
            by_name.insert(name.clone(), idx + 1);
            meta.push(SignalMeta {
                name,
                width: port.width,
            });
            values.push(port.init & mask(port.width));
        }
        let mut state = KernelState {
            top,
            time: 0,
            phase: Phase::Active,
            meta,
            values,
            by_name,
            pending: Vec::new(),
            deferred: Vec::new(),
            model,
            callbacks: IntMap::new(),
            next_cb: 1,
            timers: BTreeMap::new(),
            read_write: Vec::new(),
            read_only: Vec::new(),
            next_time_step: Vec::new(),
            options,
        };
        // let the model drive its outputs from the initial input values
        state.evaluate(&[]);
        state
    }

    fn port(&self, handle: usize) -> TbResult<usize> {
        match handle {
            h if h >= 1 && h <= self.meta.len() => Ok(h - 1),
            h => Err(TbError::NoSuchObject(format!("<handle {}>", h))),
        }
    }

    fn evaluate(&mut self, changes: &[Change]) {
        let mut io = ModelIo {
            time_ps: self.time,
            values: &self.values,
            changes,
            writes: &mut self.pending,
        };
        self.model.evaluate(&mut io);
    }

    /// Applies scheduled writes, evaluates the model and returns the edges to report, or
    /// `None` once nothing changed anymore.
    fn delta(&mut self) -> Option<Vec<(usize, EdgeKind)>> {
        if self.pending.is_empty() {
            return None;
        }
        // the last write to a port within a delta wins
        let mut latest: Vec<(usize, u32)> = Vec::with_capacity(self.pending.len());
        for (port, value) in self.pending.drain(..) {
            match latest.iter_mut().find(|(p, _)| *p == port) {
                Some(slot) => slot.1 = value,
                None => latest.push((port, value)),
            }
        }
        let mut changes = Vec::new();
        for (port, value) in latest {
            let new = value & mask(self.meta[port].width);
            let old = self.values[port];
            if old != new {
                self.values[port] = new;
                changes.push(Change { port, old, new });
            }
        }
        if changes.is_empty() {
            return None;
        }
        self.evaluate(&changes);

        let watched: Vec<usize> = self
            .callbacks
            .values()
            .filter_map(|cb| match cb {
                SimCallback::Edge(handle) => Some(*handle),
                _ => None,
            })
            .collect();
        let edges = changes
            .iter()
            .filter(|c| watched.contains(&(c.port + 1)))
            .map(|c| {
                let edge = match self.meta[c.port].width {
                    1 if c.new != 0 => EdgeKind::Rising,
                    1 => EdgeKind::Falling,
                    _ => EdgeKind::Any,
                };
                (c.port + 1, edge)
            })
            .collect();
        Some(edges)
    }

    fn take_live(&mut self, handles: Vec<usize>) -> bool {
        let mut live = false;
        for handle in handles {
            live |= self.callbacks.remove(handle as u64).is_some();
        }
        live
    }

    fn next_event_time(&mut self) -> Option<u64> {
        loop {
            let (&time, handles) = self.timers.iter().next()?;
            if handles.iter().any(|h| self.callbacks.contains_key(*h as u64)) {
                return Some(time);
            }
            self.timers.remove(&time);
        }
    }
}

fn mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

fn with_state<R>(f: impl FnOnce(&mut KernelState) -> R) -> TbResult<R> {
    STATE.with(|s| s.borrow_mut().as_mut().map(f).ok_or(TbError::NoSimulation))
}

fn current_time() -> u64 {
    STATE.with(|s| {
        s.try_borrow()
            .ok()
            .and_then(|s| s.as_ref().map(|k| k.time))
            .unwrap_or(0)
    })
}

/// Installs a fresh simulation of `model` on this thread.
pub(crate) fn start(model: Box<dyn Model>, options: KernelOptions) {
    let state = KernelState::new(model, options);
    let old = STATE.with(|s| s.borrow_mut().replace(state));
    drop(old);
}

pub(crate) fn stop() {
    let old = STATE.with(|s| s.borrow_mut().take());
    drop(old);
}

/// Runs the simulation until `done` returns true.
///
/// Fails with [`TbError::Stalled`] once no further event is scheduled.
pub(crate) fn run_until(done: &dyn Fn() -> bool) -> TbResult<()> {
    crate::executor::run_once();
    loop {
        if done() {
            return Ok(());
        }
        settle(done)?;
        if done() {
            return Ok(());
        }

        let (next, limit) = with_state(|s| {
            (
                s.next_event_time(),
                s.options.time_limit_ns.map(|ns| ns * 1000),
            )
        })?;
        let Some(next) = next else {
            return Err(TbError::Stalled);
        };
        if let Some(limit) = limit {
            if next > limit {
                return Err(TbError::TimeLimitExceeded {
                    limit_ns: limit / 1000,
                });
            }
        }

        let (next_step, timers) = with_state(|s| {
            s.time = next;
            let deferred = std::mem::take(&mut s.deferred);
            s.pending.extend(deferred);
            let next_step = std::mem::take(&mut s.next_time_step);
            let timers = s.timers.remove(&next).unwrap_or_default();
            (s.take_live(next_step), s.take_live(timers))
        })?;
        if next_step {
            trigger::react(SimCallback::NextTimeStep, None)?;
        }
        if timers {
            trigger::react(SimCallback::Time(next), None)?;
        }
    }
}

fn settle(done: &dyn Fn() -> bool) -> TbResult<()> {
    let mut deltas = 0u32;
    loop {
        while let Some(edges) = with_state(|s| s.delta())? {
            deltas += 1;
            let max_deltas = with_state(|s| s.options.max_deltas)?;
            if deltas > max_deltas {
                return Err(TbError::DeltaCycleLimit {
                    time_ps: current_time(),
                    max_deltas,
                });
            }
            for (handle, edge) in edges {
                trigger::react(SimCallback::Edge(handle), Some(edge))?;
                if done() {
                    return Ok(());
                }
            }
        }
        let read_write = with_state(|s| {
            let handles = std::mem::take(&mut s.read_write);
            s.take_live(handles)
        })?;
        if !read_write {
            break;
        }
        trigger::react(SimCallback::ReadWrite, None)?;
        if done() {
            return Ok(());
        }
    }

    let read_only = with_state(|s| {
        s.phase = Phase::ReadOnly;
        let handles = std::mem::take(&mut s.read_only);
        s.take_live(handles)
    })?;
    if read_only {
        trigger::react(SimCallback::ReadOnly, None)?;
    }
    with_state(|s| s.phase = Phase::Active)?;
    Ok(())
}

/// [`SimIf`] implementation forwarding to the kernel of the calling thread.
pub(crate) struct Kernel;

impl SimIf for Kernel {
    fn set_value(&self, obj: &SimObject, value: u32) -> TbResult<()> {
        let deferred = with_state(|s| -> TbResult<Option<String>> {
            let port = s.port(obj.handle)?;
            match s.phase {
                Phase::Active => {
                    s.pending.push((port, value));
                    Ok(None)
                }
                Phase::ReadOnly => {
                    s.deferred.push((port, value));
                    Ok(Some(s.meta[port].name.clone()))
                }
            }
        })??;
        if let Some(name) = deferred {
            self.log(&format!(
                "Warning: write to {} during ReadOnly phase deferred to next time step",
                name
            ));
        }
        Ok(())
    }

    fn get_value(&self, obj: &SimObject) -> TbResult<u32> {
        with_state(|s| -> TbResult<u32> {
            let port = s.port(obj.handle)?;
            Ok(s.values[port])
        })?
    }

    fn get_object_by_name(&self, name: &str) -> TbResult<SimObject> {
        with_state(|s| {
            if name == s.top {
                return Ok(SimObject {
                    handle: 0,
                    kind: ObjectKind::Hier,
                });
            }
            match s.by_name.get(name) {
                Some(&handle) => Ok(SimObject {
                    handle,
                    kind: ObjectKind::Int(s.meta[handle - 1].width as i32),
                }),
                None => Err(TbError::NoSuchObject(name.to_string())),
            }
        })?
    }

    fn get_root_object(&self) -> TbResult<SimObject> {
        with_state(|_| SimObject {
            handle: 0,
            kind: ObjectKind::Hier,
        })
    }

    fn get_full_name(&self, obj: &SimObject) -> TbResult<String> {
        with_state(|s| -> TbResult<String> {
            match obj.handle {
                0 => Ok(s.top.clone()),
                h => Ok(s.meta[s.port(h)?].name.clone()),
            }
        })?
    }

    fn get_sim_time_steps(&self) -> u64 {
        current_time()
    }

    fn get_sim_precision(&self) -> i8 {
        PRECISION
    }

    fn log(&self, msg: &str) {
        println!("{} {}", format_time_ps(current_time()), msg);
    }

    fn register_callback(&self, cb: SimCallback) -> TbResult<usize> {
        with_state(|s| -> TbResult<usize> {
            let handle = s.next_cb;
            match cb {
                SimCallback::Time(delay) => {
                    s.timers.entry(s.time + delay).or_default().push(handle);
                }
                SimCallback::Edge(sig) => {
                    s.port(sig)?;
                }
                SimCallback::ReadWrite => s.read_write.push(handle),
                SimCallback::ReadOnly => s.read_only.push(handle),
                SimCallback::NextTimeStep => s.next_time_step.push(handle),
            }
            s.next_cb += 1;
            s.callbacks.insert(handle as u64, cb);
            Ok(handle)
        })?
    }

    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()> {
        with_state(|s| match s.callbacks.remove(cb_hdl as u64) {
            Some(_) => Ok(()),
            None => Err(TbError::NoSuchCallback(cb_hdl)),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Port;
    use crate::sim_if::SIM_IF;
    use crate::trigger::Trigger;
    use crate::value::Val;
    use std::rc::Rc;

    // q follows d on every rising clk edge
    struct Dff;

    impl Model for Dff {
        fn name(&self) -> &str {
            "dff"
        }
        fn ports(&self) -> Vec<Port> {
            vec![
                Port::input("clk", 1, 0),
                Port::input("d", 1, 0),
                Port::output("q", 1),
                Port::input("bus", 4, 0),
            ]
        }
        fn evaluate(&mut self, io: &mut ModelIo<'_>) {
            if io.rose(0) {
                io.set(2, io.get(1));
            }
        }
    }

    #[test]
    fn resolves_names_and_masks_values() {
        start(Box::new(Dff), KernelOptions::default());
        let bus = SIM_IF.get_object_by_name("dff.bus").unwrap();
        assert_eq!(bus.kind(), ObjectKind::Int(4));
        assert_eq!(SIM_IF.get_full_name(&bus).unwrap(), "dff.bus");
        SIM_IF.set_value(&bus, 0x1f).unwrap();
        // writes are scheduled, not immediate
        assert_eq!(SIM_IF.get_value(&bus).unwrap(), 0);
        with_state(|s| s.delta()).unwrap();
        assert_eq!(SIM_IF.get_value(&bus).unwrap(), 0xf);
        assert!(matches!(
            SIM_IF.get_object_by_name("dff.nope"),
            Err(TbError::NoSuchObject(_))
        ));
        stop();
    }

    #[test]
    fn model_samples_pre_edge_values() {
        start(Box::new(Dff), KernelOptions::default());
        let clk = SIM_IF.get_object_by_name("dff.clk").unwrap();
        let d = SIM_IF.get_object_by_name("dff.d").unwrap();
        let q = SIM_IF.get_object_by_name("dff.q").unwrap();
        SIM_IF.set_value(&d, 1).unwrap();
        with_state(|s| s.delta()).unwrap();
        // d changes one delta after the edge: q keeps what was sampled at the edge
        SIM_IF.set_value(&clk, 1).unwrap();
        with_state(|s| s.delta()).unwrap();
        SIM_IF.set_value(&d, 0).unwrap();
        with_state(|s| s.delta()).unwrap();
        assert_eq!(SIM_IF.get_value(&q).unwrap(), 1);
        stop();
    }

    #[test]
    fn cancelled_timers_are_skipped() {
        start(Box::new(Dff), KernelOptions::default());
        let first = SIM_IF.register_callback(SimCallback::Time(10)).unwrap();
        SIM_IF.register_callback(SimCallback::Time(20)).unwrap();
        SIM_IF.cancel_callback(first).unwrap();
        assert_eq!(with_state(|s| s.next_event_time()).unwrap(), Some(20));
        assert!(matches!(
            SIM_IF.cancel_callback(first),
            Err(TbError::NoSuchCallback(_))
        ));
        stop();
    }

    // counts up by one per delta cycle while go is high, stopping at the given value
    struct Chain(u32);

    impl Model for Chain {
        fn name(&self) -> &str {
            "chain"
        }
        fn ports(&self) -> Vec<Port> {
            vec![Port::input("go", 1, 0), Port::output("count", 8)]
        }
        fn evaluate(&mut self, io: &mut ModelIo<'_>) {
            if io.is_high(0) && io.get(1) < self.0 {
                io.set(1, io.get(1) + 1);
            }
        }
    }

    fn run_chain(steps: u32, max_deltas: u32) -> TbResult {
        crate::simulate(
            Box::new(Chain(steps)),
            KernelOptions {
                max_deltas,
                ..KernelOptions::default()
            },
            "chain",
            |top| async move {
                top.child("go")?.set(1)?;
                Trigger::timer(1, "ns")?.await?;
                Ok(Val::Int(top.child("count")?.u32()? as i64))
            },
        )
    }

    #[test]
    fn delta_limit_is_inclusive() {
        // committing go plus four increments takes five deltas
        assert_eq!(run_chain(4, 5).unwrap(), Val::Int(4));
        assert!(matches!(
            run_chain(4, 4),
            Err(TbError::DeltaCycleLimit {
                time_ps: 0,
                max_deltas: 4
            })
        ));
    }

    #[test]
    fn read_only_writes_land_in_next_step() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let result = crate::simulate(
            Box::new(Dff),
            KernelOptions::default(),
            "deferred",
            move |top| async move {
                let d = top.child("d")?;
                Trigger::timer(1, "ns")?.await?;
                Trigger::read_only().await?;
                d.set(1)?;
                log.borrow_mut().push(d.u32()?);
                Trigger::timer(1, "ns")?.await?;
                // committed in the delta after the timer callbacks
                log.borrow_mut().push(d.u32()?);
                Trigger::read_only().await?;
                log.borrow_mut().push(d.u32()?);
                Ok(Val::None)
            },
        );
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(*seen.borrow(), vec![0, 0, 1]);
    }

    #[test]
    fn read_write_region_follows_settled_deltas() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let result = crate::simulate(
            Box::new(Dff),
            KernelOptions::default(),
            "read_write",
            move |top| async move {
                let d = top.child("d")?;
                let bus = top.child("bus")?;
                Trigger::timer(1, "ns")?.await?;
                d.set(1)?;
                Trigger::read_write().await?;
                log.borrow_mut().push(d.u32()? as u64);
                log.borrow_mut().push(SIM_IF.get_sim_time_steps());
                // writes are still allowed here and settle before ReadOnly
                bus.set(5)?;
                Trigger::read_only().await?;
                log.borrow_mut().push(bus.u32()? as u64);
                log.borrow_mut().push(SIM_IF.get_sim_time_steps());
                Ok(Val::None)
            },
        );
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(*seen.borrow(), vec![1, 1000, 5, 1000]);
    }

    #[test]
    fn timers_reject_unrepresentable_delays() {
        assert!(matches!(
            Trigger::timer(1500, "fs"),
            Err(TbError::InexactTime { .. })
        ));
        assert!(matches!(Trigger::timer(0, "ns"), Err(TbError::ZeroDelay)));
        assert!(matches!(
            Trigger::timer(1, "hours"),
            Err(TbError::InvalidTimeUnit(_))
        ));
        assert!(Trigger::timer(2000, "fs").is_ok());
    }

    #[test]
    fn no_simulation_outside_start() {
        stop();
        assert!(matches!(SIM_IF.get_root_object(), Err(TbError::NoSimulation)));
        assert_eq!(SIM_IF.get_sim_time_steps(), 0);
    }
}
