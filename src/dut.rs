//! Behavioral model of the OR unit: operand FIFOs `a_ff`/`b_ff`, a combine stage and the
//! result FIFO `y_ff`, behind a register-mapped read/write port.

use std::collections::VecDeque;

use crate::model::{Model, ModelIo, Port};

pub const CLK: usize = 0;
pub const RST_N: usize = 1;
pub const WRITE_EN: usize = 2;
pub const WRITE_ADDRESS: usize = 3;
pub const WRITE_DATA: usize = 4;
pub const WRITE_RDY: usize = 5;
pub const READ_EN: usize = 6;
pub const READ_ADDRESS: usize = 7;
pub const READ_DATA: usize = 8;
pub const READ_RDY: usize = 9;

pub const ADDR_A_FULL_N: u32 = 0;
pub const ADDR_B_FULL_N: u32 = 1;
pub const ADDR_Y_EMPTY_N: u32 = 2;
pub const ADDR_Y: u32 = 3;
pub const ADDR_A: u32 = 4;
pub const ADDR_B: u32 = 5;

/// Defects that can be injected to check that the testbench catches them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// `write_rdy` never asserts.
    StuckNotReady,
    /// The combine stage computes `a ^ b`.
    Xor,
}

#[derive(Clone, Copy, Debug)]
pub struct OrFifoConfig {
    pub depth: usize,
    /// Cycles between the combine stage firing and the result entering `y_ff`.
    pub latency: u32,
    pub fault: Option<Fault>,
}

impl Default for OrFifoConfig {
    fn default() -> Self {
        OrFifoConfig {
            depth: 2,
            latency: 0,
            fault: None,
        }
    }
}

pub struct OrFifoDut {
    cfg: OrFifoConfig,
    a_ff: VecDeque<u32>,
    b_ff: VecDeque<u32>,
    y_ff: VecDeque<u32>,
    // (value, cycles left) of results still in flight
    pipeline: VecDeque<(u32, u32)>,
}

impl OrFifoDut {
    pub fn new(cfg: OrFifoConfig) -> Self {
        OrFifoDut {
            cfg,
            a_ff: VecDeque::new(),
            b_ff: VecDeque::new(),
            y_ff: VecDeque::new(),
            pipeline: VecDeque::new(),
        }
    }

    pub fn boxed(cfg: OrFifoConfig) -> Box<dyn Model> {
        Box::new(OrFifoDut::new(cfg))
    }

    fn ready(&self, io: &ModelIo<'_>) -> (bool, bool) {
        let out_of_reset = io.is_high(RST_N);
        let write_rdy = out_of_reset && self.cfg.fault != Some(Fault::StuckNotReady);
        (write_rdy, out_of_reset)
    }

    fn combine(&self, a: u32, b: u32) -> u32 {
        match self.cfg.fault {
            Some(Fault::Xor) => (a ^ b) & 1,
            _ => (a | b) & 1,
        }
    }

    fn clock(&mut self, io: &ModelIo<'_>) {
        if !io.is_high(RST_N) {
            self.a_ff.clear();
            self.b_ff.clear();
            self.y_ff.clear();
            self.pipeline.clear();
            return;
        }
        // all inputs are the values sampled at the edge
        let (write_rdy, read_rdy) = self.ready(io);
        let write = io.is_high(WRITE_EN) && write_rdy;
        let read = io.is_high(READ_EN) && read_rdy;

        if read && io.get(READ_ADDRESS) == ADDR_Y {
            self.y_ff.pop_front();
        }

        for stage in self.pipeline.iter_mut() {
            stage.1 = stage.1.saturating_sub(1);
        }
        while let Some(&(value, 0)) = self.pipeline.front() {
            if self.y_ff.len() >= self.cfg.depth {
                break;
            }
            self.y_ff.push_back(value);
            self.pipeline.pop_front();
        }

        let room = self.y_ff.len() + self.pipeline.len() < self.cfg.depth;
        if room && !self.a_ff.is_empty() && !self.b_ff.is_empty() {
            if let (Some(a), Some(b)) = (self.a_ff.pop_front(), self.b_ff.pop_front()) {
                let y = self.combine(a, b);
                match self.cfg.latency {
                    0 => self.y_ff.push_back(y),
                    n => self.pipeline.push_back((y, n)),
                }
            }
        }

        if write {
            let data = io.get(WRITE_DATA) & 1;
            let depth = self.cfg.depth;
            let (fifo, name) = match io.get(WRITE_ADDRESS) {
                ADDR_A => (&mut self.a_ff, "a_ff"),
                ADDR_B => (&mut self.b_ff, "b_ff"),
                other => {
                    io.log(&format!("Warning: write to unmapped address {} ignored", other));
                    return;
                }
            };
            if fifo.len() < depth {
                fifo.push_back(data);
            } else {
                io.log(&format!("Warning: write to full {} dropped", name));
            }
        }
    }

    fn read_data(&self, address: u32) -> u32 {
        match address {
            ADDR_A_FULL_N => (self.a_ff.len() < self.cfg.depth) as u32,
            ADDR_B_FULL_N => (self.b_ff.len() < self.cfg.depth) as u32,
            ADDR_Y_EMPTY_N => (!self.y_ff.is_empty()) as u32,
            ADDR_Y => self.y_ff.front().copied().unwrap_or(0),
            _ => 0,
        }
    }
}

impl Model for OrFifoDut {
    fn name(&self) -> &str {
        "or_fifo"
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::input("CLK", 1, 0),
            Port::input("RST_N", 1, 1),
            Port::input("write_en", 1, 0),
            Port::input("write_address", 3, 0),
            Port::input("write_data", 1, 0),
            Port::output("write_rdy", 1),
            Port::input("read_en", 1, 0),
            Port::input("read_address", 3, 0),
            Port::output("read_data", 1),
            Port::output("read_rdy", 1),
        ]
    }

    fn evaluate(&mut self, io: &mut ModelIo<'_>) {
        if io.rose(CLK) {
            self.clock(io);
        }
        let (write_rdy, read_rdy) = self.ready(io);
        let read_data = self.read_data(io.get(READ_ADDRESS));
        io.set(WRITE_RDY, write_rdy as u32);
        io.set(READ_RDY, read_rdy as u32);
        io.set(READ_DATA, read_data);
    }
}
