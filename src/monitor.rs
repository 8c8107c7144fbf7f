use crate::bus::Bus;
use crate::coverage::{Bin, CoverDb};
use crate::prelude::*;
use crate::tb_obj::TbObj;

/// Handshake phase of a port, derived from its enable and ready flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Txn,
}

// code = (en << 1) | rdy; codes without an entry are not sampled
const PHASES: [(u32, Phase); 2] = [(1, Phase::Idle), (3, Phase::Txn)];

pub fn classify(en: bool, rdy: bool) -> Option<Phase> {
    let code = ((en as u32) << 1) | rdy as u32;
    PHASES.iter().find(|(c, _)| *c == code).map(|(_, p)| *p)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortSide {
    Input,
    Output,
}

impl PortSide {
    pub fn label(self, phase: Phase) -> &'static str {
        match (self, phase) {
            (PortSide::Input, Phase::Idle) => "Idle_w",
            (PortSide::Input, Phase::Txn) => "Txn_w",
            (PortSide::Output, Phase::Idle) => "Idle_r",
            (PortSide::Output, Phase::Txn) => "Txn_r",
        }
    }

    /// Cover point names for the previous and current phase.
    pub fn points(self) -> (&'static str, &'static str) {
        match self {
            PortSide::Input => ("top.inputport.previous_w", "top.inputport.current_w"),
            PortSide::Output => ("top.outputport.previous_r", "top.outputport.current_r"),
        }
    }

    pub fn cross(self) -> &'static str {
        match self {
            PortSide::Input => "top.cross.input",
            PortSide::Output => "top.cross.output",
        }
    }

    pub fn bins(self) -> [Bin; 2] {
        [
            Bin::Label(self.label(Phase::Idle)),
            Bin::Label(self.label(Phase::Txn)),
        ]
    }

    fn prefix(self) -> &'static str {
        match self {
            PortSide::Input => "write",
            PortSide::Output => "read",
        }
    }
}

/// Samples a port on every falling clock edge and records phase transitions as coverage.
pub struct PortMonitor {
    clk: SimObject,
    bus: Bus,
    side: PortSide,
    coverage: TbObj<CoverDb>,
}

impl PortMonitor {
    pub fn new(
        dut: SimObject,
        clk: SimObject,
        side: PortSide,
        coverage: TbObj<CoverDb>,
    ) -> TbResult<Self> {
        let bus = Bus::new(dut, side.prefix(), &["en"], &["rdy"])?;
        Ok(PortMonitor {
            clk,
            bus,
            side,
            coverage,
        })
    }

    pub fn start(self) -> JoinHandle {
        let name = format!("{}_monitor", self.side.prefix());
        Task::spawn_from_future(self.run(), &name)
    }

    async fn run(self) -> TbResult {
        let (previous, current) = self.side.points();
        let mut prev = Phase::Idle;
        loop {
            self.clk.falling_edge().await?;
            Trigger::read_only_prio().await?;
            let en = self.bus.read("en")? != 0;
            let rdy = match self.bus.has("rdy") {
                true => self.bus.read("rdy")? != 0,
                false => true,
            };
            if let Some(phase) = classify(en, rdy) {
                self.coverage.get_mut().sample(&[
                    (previous, Bin::Label(self.side.label(prev))),
                    (current, Bin::Label(self.side.label(phase))),
                ])?;
                prev = phase;
            }
        }
    }
}
