//! Bus drivers for the register-mapped write and read ports.
//!
//! Both drivers issue one transaction per `send`: wait a pre-transaction delay, wait for
//! the port's ready flag, assert enable for exactly one active clock edge, deassert in
//! the following time step.

use std::rc::Rc;

use crate::bus::Bus;
use crate::dut;
use crate::port_lock::{PortGuard, PortLock};
use crate::prelude::*;
use crate::utils::{clock_cycles, Delay};

/// Write port targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteTarget {
    A,
    B,
}

impl WriteTarget {
    pub fn address(self) -> u32 {
        match self {
            WriteTarget::A => dut::ADDR_A,
            WriteTarget::B => dut::ADDR_B,
        }
    }
}

impl TryFrom<u32> for WriteTarget {
    type Error = TbError;

    fn try_from(address: u32) -> Result<Self, Self::Error> {
        match address {
            dut::ADDR_A => Ok(WriteTarget::A),
            dut::ADDR_B => Ok(WriteTarget::B),
            other => Err(TbError::InvalidAddress(other, "write")),
        }
    }
}

/// Read port targets: three status flags and the result register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadTarget {
    AFullN,
    BFullN,
    YEmptyN,
    Y,
}

impl ReadTarget {
    pub const ALL: [ReadTarget; 4] = [
        ReadTarget::AFullN,
        ReadTarget::BFullN,
        ReadTarget::YEmptyN,
        ReadTarget::Y,
    ];
    pub const STATUS: [ReadTarget; 3] = [ReadTarget::AFullN, ReadTarget::BFullN, ReadTarget::YEmptyN];

    pub fn address(self) -> u32 {
        match self {
            ReadTarget::AFullN => dut::ADDR_A_FULL_N,
            ReadTarget::BFullN => dut::ADDR_B_FULL_N,
            ReadTarget::YEmptyN => dut::ADDR_Y_EMPTY_N,
            ReadTarget::Y => dut::ADDR_Y,
        }
    }
}

impl TryFrom<u32> for ReadTarget {
    type Error = TbError;

    fn try_from(address: u32) -> Result<Self, Self::Error> {
        ReadTarget::ALL
            .into_iter()
            .find(|t| t.address() == address)
            .ok_or(TbError::InvalidAddress(address, "read"))
    }
}

/// Receives every value sampled from the result register.
pub trait SampleSink {
    fn on_sample(&self, value: u32);
}

#[derive(Clone, Copy, Debug)]
pub struct DriverConfig {
    pub pre_delay: Delay,
    /// Clock cycles to wait for the ready flag; `None` waits forever.
    pub retry_limit: Option<u32>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            pre_delay: Delay::Random { min: 1, max: 200 },
            retry_limit: Some(1000),
        }
    }
}

async fn wait_ready(clk: SimObject, bus: &Bus, cfg: &DriverConfig) -> TbResult<()> {
    // ports without a ready flag accept every cycle
    if !bus.has("rdy") {
        return Ok(());
    }
    let mut retries = 0;
    while !bus.get("rdy")?.is_high()? {
        if let Some(limit) = cfg.retry_limit {
            if retries >= limit {
                return Err(TbError::HandshakeTimeout {
                    signal: format!("{}_rdy", bus.name()),
                    retries: limit,
                });
            }
        }
        clk.rising_edge().await?;
        retries += 1;
    }
    Ok(())
}

/// Drives `write_en`/`write_address`/`write_data` against `write_rdy`.
#[derive(Clone)]
pub struct InputDriver {
    clk: SimObject,
    bus: Bus,
    cfg: DriverConfig,
    lock: PortLock,
}

impl InputDriver {
    pub fn new(dut: SimObject, clk: SimObject, cfg: DriverConfig) -> TbResult<Self> {
        let bus = Bus::new(dut, "write", &["en", "address", "data"], &["rdy"])?;
        bus.write("en", 0)?;
        bus.write("address", 0)?;
        bus.write("data", 0)?;
        Ok(InputDriver {
            clk,
            bus,
            cfg,
            lock: PortLock::new(),
        })
    }

    /// Exclusive access to the write port for concurrent producers, granted in request order.
    pub async fn acquire(&self) -> PortGuard {
        self.lock.lock().await
    }

    pub async fn send(&self, target: WriteTarget, data: u32) -> TbResult<()> {
        clock_cycles(self.clk, self.cfg.pre_delay.cycles()).await?;
        wait_ready(self.clk, &self.bus, &self.cfg).await?;
        self.bus.write("en", 1)?;
        self.bus.write("address", target.address())?;
        self.bus.write("data", data)?;
        Trigger::read_only().await?;
        self.clk.rising_edge().await?;
        Trigger::next_time_step().await?;
        self.bus.write("en", 0)
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}

/// Drives `read_en`/`read_address` against `read_rdy` and samples `read_data`.
#[derive(Clone)]
pub struct OutputDriver {
    clk: SimObject,
    bus: Bus,
    cfg: DriverConfig,
    sink: Option<Rc<dyn SampleSink>>,
    lock: PortLock,
}

impl OutputDriver {
    pub fn new(
        dut: SimObject,
        clk: SimObject,
        cfg: DriverConfig,
        sink: Option<Rc<dyn SampleSink>>,
    ) -> TbResult<Self> {
        let bus = Bus::new(dut, "read", &["en", "address", "data"], &["rdy"])?;
        bus.write("en", 0)?;
        bus.write("address", 0)?;
        Ok(OutputDriver {
            clk,
            bus,
            cfg,
            sink,
            lock: PortLock::new(),
        })
    }

    pub async fn acquire(&self) -> PortGuard {
        self.lock.lock().await
    }

    /// Reads `target` and returns the sampled value. Samples of [`ReadTarget::Y`] go to
    /// the sink, status flags are logged.
    pub async fn send(&self, target: ReadTarget) -> TbResult<u32> {
        clock_cycles(self.clk, self.cfg.pre_delay.cycles()).await?;
        wait_ready(self.clk, &self.bus, &self.cfg).await?;
        self.bus.write("en", 1)?;
        self.bus.write("address", target.address())?;
        Trigger::read_only().await?;

        let value = self.bus.read("data")?;
        match (target, &self.sink) {
            (ReadTarget::Y, Some(sink)) => sink.on_sample(value),
            (ReadTarget::Y, None) => {}
            _ => SIM_IF.log(&format!("address={}, value={}", target.address(), value)),
        }

        self.clk.rising_edge().await?;
        Trigger::next_time_step().await?;
        self.bus.write("en", 0)?;
        Ok(value)
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_map_to_addresses() {
        assert_eq!(WriteTarget::try_from(4).unwrap(), WriteTarget::A);
        assert_eq!(WriteTarget::B.address(), 5);
        assert!(matches!(
            WriteTarget::try_from(3),
            Err(TbError::InvalidAddress(3, "write"))
        ));
        for (address, target) in ReadTarget::ALL.into_iter().enumerate() {
            assert_eq!(ReadTarget::try_from(address as u32).unwrap(), target);
        }
        assert!(ReadTarget::try_from(4).is_err());
    }
}
