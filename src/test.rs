use futures::future::LocalBoxFuture;
use prettytable::{row, Table};
use std::time;

use crate::dut::{OrFifoConfig, OrFifoDut};
use crate::kernel::KernelOptions;
use crate::signal::SimObject;
use crate::testbench::TestContext;
use crate::TbResult;

pub type TestFn = fn(SimObject, TestContext) -> LocalBoxFuture<'static, TbResult>;

pub struct TestSuite {
    name: String,
    tests: Vec<Test>,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn len(&self) -> usize {
        self.tests.len()
    }
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
    pub fn iter(&self) -> core::slice::Iter<'_, Test> {
        self.tests.iter()
    }
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Test> {
        self.tests.iter_mut()
    }
    pub fn push(&mut self, test: Test) {
        self.tests.push(test);
    }
    pub fn retain(&mut self, f: impl FnMut(&Test) -> bool) {
        self.tests.retain(f);
    }
    pub fn get(&self, name: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// True once every test ran and passed.
    pub fn passed(&self) -> bool {
        self.tests.iter().all(Test::passed)
    }

    pub fn summary(&self) -> String {
        let mut table = Table::new();
        table.set_titles(row!["Test", "Result", "Time [s]", "SimTime [ns]", "SimSpeed [ns/s]", "Message"]);
        let (mut time, mut sim_time) = (0.0, 0.0);
        for t in self.tests.iter() {
            let (result, msg) = match &t.result {
                Some(Ok(v)) => ("passed", v.to_string()),
                Some(Err(e)) => ("failed", e.to_string()),
                None => ("not run", String::new()),
            };
            table.add_row(row![
                t.name,
                result,
                format!("{:.3}", t.time_secs),
                format!("{:.0}", t.sim_time_ns),
                format!("{:.0}", t.sim_speed()),
                msg
            ]);
            time += t.time_secs;
            sim_time += t.sim_time_ns;
        }
        table.add_row(row![
            "TOTAL",
            match self.passed() {
                true => "passed",
                false => "failed",
            },
            format!("{:.3}", time),
            format!("{:.0}", sim_time),
            "",
            ""
        ]);
        table.to_string()
    }
}

pub struct Test {
    pub name: String,
    pub generator: TestFn,
    pub dut: OrFifoConfig,
    pub ctx: TestContext,
    pub result: Option<TbResult>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl Test {
    pub fn new(name: &str, dut: OrFifoConfig, ctx: TestContext, generator: TestFn) -> Self {
        Self {
            name: name.to_string(),
            generator,
            dut,
            ctx,
            result: None,
            time_secs: 0.0,
            sim_time_ns: 0.0,
        }
    }

    /// Runs the test in a fresh simulation and records result, wall time and simulated time.
    pub fn run(&mut self, options: KernelOptions) {
        let time_start = time::Instant::now();
        let generator = self.generator;
        let ctx = self.ctx.clone();
        let (result, sim_time_ps) = crate::run_test(
            OrFifoDut::boxed(self.dut),
            options,
            &self.name,
            move |dut| generator(dut, ctx),
        );
        self.time_secs = time_start.elapsed().as_secs_f64();
        self.sim_time_ns = sim_time_ps as f64 / 1000.0;
        self.result = Some(result);
    }

    pub fn passed(&self) -> bool {
        matches!(self.result, Some(Ok(_)))
    }

    pub fn sim_speed(&self) -> f64 {
        match self.time_secs > 0.0 {
            true => self.sim_time_ns / self.time_secs,
            false => 0.0,
        }
    }
}
