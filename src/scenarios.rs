//! Test scenarios for the OR unit and the suite registry used by the runner.

use crate::config::Config;
use crate::driver::{ReadTarget, WriteTarget};
use crate::dut::OrFifoConfig;
use crate::junit;
use crate::prelude::*;
use crate::test::{Test, TestSuite};
use crate::testbench::{OrTb, TestContext};
use crate::utils::{self, rand_int, Delay};

/// Operand pairs of the directed test, with OR semantics expecting `[0, 1, 1, 1]`.
pub const DIRECTED_VECTORS: [(u32, u32); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

async fn setup(dut: SimObject, ctx: TestContext) -> TbResult<OrTb> {
    let tb = OrTb::new(dut, ctx)?;
    tb.reset().await?;
    tb.start_monitors()?;
    Ok(tb)
}

fn random_bit() -> u32 {
    rand_int(2)
}

/// Writes `value` to `target` `times` times in a row, then reads the status flags.
async fn fill(tb: &OrTb, target: WriteTarget, value: u32, times: u32) -> TbResult<()> {
    for _ in 0..times {
        tb.input.send(target, value).await?;
    }
    tb.read_all(&ReadTarget::STATUS).await
}

fn check_flag(name: &str, actual: u32, expected: u32) -> TbResult<()> {
    match actual == expected {
        true => Ok(()),
        false => Err(TbError::CheckFailed(format!(
            "{} read {}, expected {}",
            name, actual, expected
        ))),
    }
}

/// Random vectors with a settle window and a read of every address after each one,
/// followed by filling both operand FIFOs past capacity.
pub async fn random_or(dut: SimObject, ctx: TestContext) -> TbResult {
    let tb = setup(dut, ctx).await?;
    tb.read_all(&ReadTarget::STATUS).await?;

    let (mut a, mut b) = (0, 0);
    for _ in 0..tb.ctx().vectors {
        a = random_bit();
        b = random_bit();
        tb.drive_vector(a, b).await?;
        tb.settle().await?;
        tb.read_all(&ReadTarget::ALL).await?;
    }
    fill(&tb, WriteTarget::A, a, 3).await?;
    fill(&tb, WriteTarget::B, b, 3).await?;
    tb.finish()
}

/// Fixed operand pairs, each followed by the settle window and a result read.
pub async fn directed_or(dut: SimObject, ctx: TestContext) -> TbResult {
    directed_expect(dut, ctx, vec![0, 1, 1, 1]).await
}

/// Drives [`DIRECTED_VECTORS`] and checks the results against `expected`.
pub async fn directed_expect(dut: SimObject, ctx: TestContext, expected: Vec<u32>) -> TbResult {
    let tb = setup(dut, ctx).await?;
    for value in expected {
        tb.scoreboard.expect(value);
    }
    for (a, b) in DIRECTED_VECTORS {
        tb.write_ab(a, b).await?;
        tb.settle().await?;
        tb.read(ReadTarget::Y).await?;
    }
    tb.finish()
}

/// Random vectors against a pipelined DUT with a randomized settle window.
pub async fn delayed_or(dut: SimObject, ctx: TestContext) -> TbResult {
    let tb = setup(dut, ctx).await?;
    for _ in 0..tb.ctx().vectors {
        tb.drive_vector(random_bit(), random_bit()).await?;
        tb.settle().await?;
        tb.read_all(&ReadTarget::ALL).await?;
    }
    tb.finish()
}

async fn drive_operand(tb: OrTb, target: WriteTarget, values: Vec<u32>) -> TbResult {
    let (flag, name) = match target {
        WriteTarget::A => (ReadTarget::AFullN, "a_full_n"),
        WriteTarget::B => (ReadTarget::BFullN, "b_full_n"),
    };
    for value in values {
        // only this task writes the FIFO, so a free slot stays free until the write
        tb.wait_flag(flag, name).await?;
        let _port = tb.input.acquire().await;
        tb.input.send(target, value).await?;
    }
    Ok(Val::None)
}

async fn collect_results(tb: OrTb, count: usize) -> TbResult {
    for _ in 0..count {
        tb.wait_result().await?;
        let _port = tb.output.acquire().await;
        tb.read(ReadTarget::Y).await?;
        if tb.ctx().status_after_read {
            tb.read_all(&ReadTarget::STATUS).await?;
        }
    }
    Ok(Val::None)
}

/// Two producers feed A and B independently while a consumer drains results; both
/// ports are shared under locks.
pub async fn concurrent_or(dut: SimObject, ctx: TestContext) -> TbResult {
    let tb = setup(dut, ctx).await?;
    let vectors: Vec<(u32, u32)> = (0..tb.ctx().vectors)
        .map(|_| (random_bit(), random_bit()))
        .collect();
    for &(a, b) in &vectors {
        tb.scoreboard.expect(a | b);
        tb.sample_ab(a, b)?;
    }
    let a_values = vectors.iter().map(|v| v.0).collect();
    let b_values = vectors.iter().map(|v| v.1).collect();

    let drive_a = Task::spawn_from_future(
        drive_operand(tb.clone(), WriteTarget::A, a_values),
        "drive_a",
    );
    let drive_b = Task::spawn_from_future(
        drive_operand(tb.clone(), WriteTarget::B, b_values),
        "drive_b",
    );
    let read_y = Task::spawn_from_future(collect_results(tb.clone(), vectors.len()), "read_y");
    drive_a.await?;
    drive_b.await?;
    read_y.await?;
    let verdict = tb.finish()?;
    match tb.scoreboard.unexpected() {
        0 => Ok(verdict),
        n => Err(TbError::CheckFailed(format!(
            "{} result(s) read beyond the expected sequence",
            n
        ))),
    }
}

async fn fifo_full(dut: SimObject, ctx: TestContext, target: WriteTarget) -> TbResult {
    let tb = setup(dut, ctx).await?;
    let (flag, name, other) = match target {
        WriteTarget::A => (ReadTarget::AFullN, "a_full_n", WriteTarget::B),
        WriteTarget::B => (ReadTarget::BFullN, "b_full_n", WriteTarget::A),
    };
    check_flag(name, tb.read(flag).await?, 1)?;
    for _ in 0..3 {
        tb.input.send(target, 1).await?;
    }
    check_flag(name, tb.read(flag).await?, 0)?;
    tb.read_all(&ReadTarget::STATUS).await?;

    // pairing one entry drains the FIFO below capacity
    tb.scoreboard.expect(1);
    tb.input.send(other, 0).await?;
    tb.settle().await?;
    tb.read(ReadTarget::Y).await?;
    check_flag(name, tb.read(flag).await?, 1)?;
    tb.finish()
}

/// Fills `a_ff` past capacity: `a_full_n` reads 0, and 1 again after a result drained it.
pub async fn fifo_a_full(dut: SimObject, ctx: TestContext) -> TbResult {
    fifo_full(dut, ctx, WriteTarget::A).await
}

pub async fn fifo_b_full(dut: SimObject, ctx: TestContext) -> TbResult {
    fifo_full(dut, ctx, WriteTarget::B).await
}

/// Every scenario with the DUT and context it runs against.
pub fn suite(cfg: &Config) -> TestSuite {
    let ctx = TestContext::from_config(cfg);
    let dut = OrFifoConfig {
        latency: cfg.dut_latency,
        ..OrFifoConfig::default()
    };
    let delayed_latency = match cfg.dut_latency {
        0 => 4,
        n => n,
    };
    let delayed = OrFifoConfig {
        latency: delayed_latency,
        ..OrFifoConfig::default()
    };
    let delayed_ctx = TestContext {
        settle: Delay::Random {
            min: delayed_latency + 2,
            max: delayed_latency + 40,
        },
        ..ctx.clone()
    };

    let mut suite = TestSuite::new("orfifo_tb");
    suite.push(Test::new("random_or", dut, ctx.clone(), |dut, ctx| {
        random_or(dut, ctx).boxed_local()
    }));
    suite.push(Test::new("directed_or", dut, ctx.clone(), |dut, ctx| {
        directed_or(dut, ctx).boxed_local()
    }));
    suite.push(Test::new("delayed_or", delayed, delayed_ctx, |dut, ctx| {
        delayed_or(dut, ctx).boxed_local()
    }));
    suite.push(Test::new("concurrent_or", dut, ctx.clone(), |dut, ctx| {
        concurrent_or(dut, ctx).boxed_local()
    }));
    suite.push(Test::new("fifo_a_full", dut, ctx.clone(), |dut, ctx| {
        fifo_a_full(dut, ctx).boxed_local()
    }));
    suite.push(Test::new("fifo_b_full", dut, ctx, |dut, ctx| {
        fifo_b_full(dut, ctx).boxed_local()
    }));
    suite
}

/// Runs the tests selected by `cfg`, prints a summary and writes `results.xml`.
/// Returns whether every test passed.
pub fn run_suite(cfg: &Config) -> TbResult<bool> {
    let mut suite = suite(cfg);
    suite.retain(|t| cfg.selects(&t.name));
    if suite.is_empty() {
        SIM_IF.log("Warning: TESTCASE selects no known test");
        return Err(TbError::InvalidConfig {
            var: "TESTCASE",
            value: cfg.testcases.as_deref().unwrap_or_default().join(","),
        });
    }
    let options = KernelOptions {
        time_limit_ns: cfg.sim_time_limit_ns,
        ..KernelOptions::default()
    };
    SIM_IF.log(&format!(
        "Running {} test(s) with RANDOM_SEED={}",
        suite.len(),
        cfg.seed
    ));
    for test in suite.iter_mut() {
        utils::seed(cfg.seed);
        test.run(options);
    }
    SIM_IF.log(&format!("Test summary:\n{}", suite.summary()));
    junit::write_junit_xml(&suite, &cfg.results_file())?;
    Ok(suite.passed())
}
