//! Async testbench for an OR unit with register-mapped operand and result FIFOs.
//!
//! Tests are `async` functions receiving the DUT's top-level [`SimObject`]. They run on a
//! single-threaded cooperative executor whose suspension points are simulator triggers
//! (timers, signal edges, ReadWrite/ReadOnly phases), driven by an in-process event-driven
//! simulation kernel and a behavioral model of the design.

pub mod bus;
pub mod config;
pub mod coverage;
pub mod driver;
pub mod dut;
pub mod error;
mod executor;
mod junit;
pub mod kernel;
pub mod model;
pub mod monitor;
pub mod port_lock;
pub mod prelude;
pub mod scenarios;
pub mod scoreboard;
pub mod signal;
pub mod sim_if;
pub mod tb_obj;
mod test;
pub mod testbench;
mod trigger;
pub mod utils;
mod value;

use std::cell::RefCell;
use std::future::Future;

use error::TbError;
use executor::Task;
use kernel::KernelOptions;
use model::Model;
use signal::SimObject;
use sim_if::SIM_IF;
use value::Val;

pub use test::{Test, TestFn, TestSuite};

pub type TbResult<T = Val> = Result<T, TbError>;

thread_local! {
    // result of the test running on this thread; the first one set wins
    static TEST_RESULT: RefCell<Option<TbResult>> = const { RefCell::new(None) };
}

fn set_result(result: TbResult) {
    TEST_RESULT.with(|r| {
        let mut r = r.borrow_mut();
        if r.is_none() {
            *r = Some(result);
        }
    });
}

fn has_result() -> bool {
    TEST_RESULT.with(|r| r.borrow().is_some())
}

/// Passes the running test, unless it already passed or failed.
pub fn pass_test(msg: &str) {
    set_result(Ok(Val::String(msg.to_string())));
}

/// Fails the running test, unless it already passed or failed.
pub fn fail_test(msg: &str) {
    set_result(Err(TbError::Failed(msg.to_string())));
}

fn tear_down() {
    executor::clear();
    trigger::cancel_all_triggers();
    kernel::stop();
}

/// Runs `test` against a fresh simulation of `model` and returns its result.
pub fn simulate<F, Fut>(model: Box<dyn Model>, options: KernelOptions, name: &str, test: F) -> TbResult
where
    F: FnOnce(SimObject) -> Fut,
    Fut: Future<Output = TbResult> + 'static,
{
    run_test(model, options, name, test).0
}

/// Like [`simulate`], also returning the simulated time in picoseconds.
pub(crate) fn run_test<F, Fut>(
    model: Box<dyn Model>,
    options: KernelOptions,
    name: &str,
    test: F,
) -> (TbResult, u64)
where
    F: FnOnce(SimObject) -> Fut,
    Fut: Future<Output = TbResult> + 'static,
{
    tear_down();
    TEST_RESULT.with(|r| r.borrow_mut().take());
    kernel::start(model, options);
    SIM_IF.log(&format!("Starting test {}", name));

    let outcome = SimObject::get_root().and_then(|root| {
        let test = test(root);
        Task::spawn_from_future(
            async move {
                set_result(test.await);
                Ok(Val::None)
            },
            name,
        );
        kernel::run_until(&has_result)
    });
    if let Err(e) = outcome {
        set_result(Err(e));
    }

    let sim_time = SIM_IF.get_sim_time_steps();
    let result = TEST_RESULT
        .with(|r| r.borrow_mut().take())
        .unwrap_or(Err(TbError::Stalled));
    match &result {
        Ok(_) => SIM_IF.log(&format!("Test {} passed", name)),
        Err(e) => SIM_IF.log(&format!("Test {} failed: {}", name, e)),
    }
    tear_down();
    (result, sim_time)
}
