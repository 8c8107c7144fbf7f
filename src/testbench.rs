use std::path::PathBuf;
use std::rc::Rc;

use crate::config::Config;
use crate::coverage::{Bin, CoverDb};
use crate::driver::{DriverConfig, InputDriver, OutputDriver, ReadTarget, WriteTarget};
use crate::monitor::{PortMonitor, PortSide};
use crate::prelude::*;
use crate::scoreboard::Scoreboard;
use crate::tb_obj::TbObj;
use crate::utils::Delay;

/*
 * CLOCK
 */
pub async fn clock(clk: SimObject, period: u32, unit: &'static str) -> TbResult {
    let high_t = period / 2;
    let low_t = period - high_t;
    if period % 2 != 0 {
        SIM_IF.log(&format!("Warning: Clock period {period}{unit} not dividable by 2. High time will be {high}{unit}; low time will be {low}{unit}.", period=period, unit=unit, high=high_t, low=low_t));
    }
    loop {
        clk.set(0)?;
        Trigger::timer(low_t as u64, unit)?.await?;
        clk.set(1)?;
        Trigger::timer(high_t as u64, unit)?.await?;
    }
}

/*
 * RESET
 */
/// Pulses the active-low reset: high, low for `duration_ns`, high again after `duration_ns`.
pub async fn reset(rst_n: SimObject, duration_ns: u64) -> TbResult<()> {
    rst_n.set(1)?;
    Trigger::timer(duration_ns, "ns")?.await?;
    rst_n.set(0)?;
    Trigger::timer(duration_ns, "ns")?.await?;
    rst_n.set(1)
}

/// Knobs shared by all scenarios.
#[derive(Clone, Debug)]
pub struct TestContext {
    pub result_path: PathBuf,
    pub vectors: u32,
    pub driver: DriverConfig,
    /// Clock cycles between writing an operand pair and reading the result.
    pub settle: Delay,
    pub clk_period_ns: u32,
    pub reset_ns: u64,
    /// Concurrent variant only: read the status flags after every result, inside the port lock.
    pub status_after_read: bool,
}

impl Default for TestContext {
    fn default() -> Self {
        TestContext {
            result_path: PathBuf::from("./"),
            vectors: 50,
            driver: DriverConfig::default(),
            settle: Delay::Fixed(200),
            clk_period_ns: 10,
            reset_ns: 50,
            status_after_read: false,
        }
    }
}

impl TestContext {
    pub fn from_config(cfg: &Config) -> Self {
        TestContext {
            result_path: cfg.result_path.clone(),
            vectors: cfg.vectors,
            ..TestContext::default()
        }
    }

    pub fn coverage_file(&self) -> PathBuf {
        self.result_path.join("coverage.xml")
    }
}

pub fn declare_coverage(db: &mut CoverDb) -> TbResult<()> {
    let bits = [Bin::Int(0), Bin::Int(1)];
    db.cover_point("top.a", &bits);
    db.cover_point("top.b", &bits);
    db.cover_cross("top.cross.ab", &["top.a", "top.b"])?;
    for side in [PortSide::Input, PortSide::Output] {
        let (previous, current) = side.points();
        db.cover_point(current, &side.bins());
        db.cover_point(previous, &side.bins());
        db.cover_cross(side.cross(), &[previous, current])?;
    }
    db.cover_point("top.read_address", &[0, 1, 2, 3].map(Bin::Int));
    Ok(())
}

/// The OR unit environment: clock, drivers, scoreboard and coverage around one DUT.
#[derive(Clone)]
pub struct OrTb {
    pub dut: SimObject,
    pub clk: SimObject,
    pub rst_n: SimObject,
    pub input: InputDriver,
    pub output: OutputDriver,
    pub scoreboard: Scoreboard,
    pub coverage: TbObj<CoverDb>,
    ctx: TestContext,
    clock: Rc<JoinHandle>,
}

impl OrTb {
    /// Starts the clock and builds the drivers; monitors are started separately.
    pub fn new(dut: SimObject, ctx: TestContext) -> TbResult<Self> {
        let clk = dut.child("CLK")?;
        let rst_n = dut.child("RST_N")?;
        let coverage = TbObj::new(CoverDb::new());
        declare_coverage(&mut coverage.get_mut())?;
        let clock = Task::spawn_from_future(clock(clk, ctx.clk_period_ns, "ns"), "clock");

        let scoreboard = Scoreboard::new();
        let input = InputDriver::new(dut, clk, ctx.driver)?;
        let output = OutputDriver::new(dut, clk, ctx.driver, Some(Rc::new(scoreboard.clone())))?;
        Ok(OrTb {
            dut,
            clk,
            rst_n,
            input,
            output,
            scoreboard,
            coverage,
            ctx,
            clock: Rc::new(clock),
        })
    }

    pub fn ctx(&self) -> &TestContext {
        &self.ctx
    }

    pub async fn reset(&self) -> TbResult<()> {
        reset(self.rst_n, self.ctx.reset_ns).await
    }

    pub fn start_monitors(&self) -> TbResult<()> {
        for side in [PortSide::Input, PortSide::Output] {
            PortMonitor::new(self.dut, self.clk, side, self.coverage.clone())?.start();
        }
        Ok(())
    }

    pub fn sample_ab(&self, a: u32, b: u32) -> TbResult<()> {
        self.coverage
            .get_mut()
            .sample(&[("top.a", Bin::Int(a)), ("top.b", Bin::Int(b))])
    }

    /// Writes one operand pair without registering an expectation.
    pub async fn write_ab(&self, a: u32, b: u32) -> TbResult<()> {
        self.input.send(WriteTarget::A, a).await?;
        self.input.send(WriteTarget::B, b).await?;
        self.sample_ab(a, b)
    }

    /// Expects `a | b`, then writes the pair.
    pub async fn drive_vector(&self, a: u32, b: u32) -> TbResult<()> {
        self.scoreboard.expect(a | b);
        self.write_ab(a, b).await
    }

    pub async fn read(&self, target: ReadTarget) -> TbResult<u32> {
        self.coverage
            .get_mut()
            .sample(&[("top.read_address", Bin::Int(target.address()))])?;
        self.output.send(target).await
    }

    pub async fn read_all(&self, targets: &[ReadTarget]) -> TbResult<()> {
        for &target in targets {
            self.read(target).await?;
        }
        Ok(())
    }

    /// Waits the configured settle window, one clock cycle at a time.
    pub async fn settle(&self) -> TbResult<()> {
        for _ in 0..self.ctx.settle.cycles() {
            self.clk.rising_edge().await?;
            Trigger::next_time_step().await?;
        }
        Ok(())
    }

    /// Polls the status flag at `target` until it reads 1. The output port is locked only
    /// for each single poll, so other tasks waiting for it get their turn in between.
    pub async fn wait_flag(&self, target: ReadTarget, signal: &str) -> TbResult<()> {
        let limit = self.ctx.driver.retry_limit;
        let mut polls = 0;
        loop {
            let flag = {
                let _port = self.output.acquire().await;
                self.read(target).await?
            };
            if flag != 0 {
                return Ok(());
            }
            polls += 1;
            if let Some(limit) = limit {
                if polls >= limit {
                    return Err(TbError::HandshakeTimeout {
                        signal: signal.to_string(),
                        retries: limit,
                    });
                }
            }
        }
    }

    pub async fn wait_result(&self) -> TbResult<()> {
        self.wait_flag(ReadTarget::YEmptyN, "y_empty_n").await
    }

    /// Reports and exports coverage, stops the clock and returns the scoreboard verdict.
    pub fn finish(&self) -> TbResult {
        let report = self.coverage.get().report(true);
        SIM_IF.log(&format!("Coverage report:\n{}", report));
        let file = self.ctx.coverage_file();
        self.coverage.get().export_to_xml(&file)?;
        SIM_IF.log(&format!("Coverage written to {}", file.display()));
        self.clock.cancel();

        let verdict = self.scoreboard.finish();
        if verdict.is_ok() {
            SIM_IF.log("All test vectors passed successfully!");
        }
        verdict
    }
}
