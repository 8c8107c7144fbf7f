use std::path::Path;

use orfifo_tb::config::Config;
use orfifo_tb::driver::DriverConfig;
use orfifo_tb::dut::{Fault, OrFifoConfig, OrFifoDut};
use orfifo_tb::prelude::*;
use orfifo_tb::scenarios;
use orfifo_tb::testbench::TestContext;
use orfifo_tb::utils::{self, Delay};

fn quick_ctx(result_path: &Path) -> TestContext {
    TestContext {
        result_path: result_path.to_path_buf(),
        vectors: 6,
        driver: DriverConfig {
            pre_delay: Delay::Random { min: 1, max: 5 },
            retry_limit: Some(1000),
        },
        settle: Delay::Fixed(10),
        ..TestContext::default()
    }
}

fn dut(cfg: OrFifoConfig) -> Box<dyn orfifo_tb::model::Model> {
    OrFifoDut::boxed(cfg)
}

#[test]
fn random_or_passes_and_exports_coverage() {
    utils::seed(1);
    let dir = tempfile::tempdir().unwrap();
    let ctx = quick_ctx(dir.path());
    let result = simulate(
        dut(OrFifoConfig::default()),
        KernelOptions::default(),
        "random_or",
        move |dut| scenarios::random_or(dut, ctx),
    );
    assert!(result.is_ok(), "{:?}", result);

    let xml = std::fs::read_to_string(dir.path().join("coverage.xml")).unwrap();
    assert!(xml.contains(r#"abs_name="top.read_address""#));
    assert!(xml.contains(r#"abs_name="top.cross.input""#));
    // every read address was hit
    assert!(xml.contains(r#"<read_address abs_name="top.read_address" size="4" coverage="4""#));
}

#[test]
fn directed_or_expects_or_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = quick_ctx(dir.path());
    let result = simulate(
        dut(OrFifoConfig::default()),
        KernelOptions::default(),
        "directed_or",
        move |dut| scenarios::directed_or(dut, ctx),
    );
    assert!(result.is_ok(), "{:?}", result);
}

#[test]
fn alternative_sequence_only_matches_xor_dut() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = quick_ctx(dir.path());
    let result = simulate(
        dut(OrFifoConfig::default()),
        KernelOptions::default(),
        "directed_0110",
        move |dut| scenarios::directed_expect(dut, ctx, vec![0, 1, 1, 0]),
    );
    assert!(matches!(result, Err(TbError::Mismatch { failures: 1 })));

    let ctx = quick_ctx(dir.path());
    let result = simulate(
        dut(OrFifoConfig {
            fault: Some(Fault::Xor),
            ..OrFifoConfig::default()
        }),
        KernelOptions::default(),
        "directed_0110_xor",
        move |dut| scenarios::directed_expect(dut, ctx, vec![0, 1, 1, 0]),
    );
    assert!(result.is_ok(), "{:?}", result);
}

#[test]
fn delayed_or_waits_for_pipeline() {
    utils::seed(2);
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext {
        settle: Delay::Random { min: 6, max: 20 },
        ..quick_ctx(dir.path())
    };
    let result = simulate(
        dut(OrFifoConfig {
            latency: 4,
            ..OrFifoConfig::default()
        }),
        KernelOptions::default(),
        "delayed_or",
        move |dut| scenarios::delayed_or(dut, ctx),
    );
    assert!(result.is_ok(), "{:?}", result);
}

#[test]
fn too_short_settle_window_is_caught() {
    utils::seed(3);
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext {
        vectors: 4,
        settle: Delay::Fixed(1),
        driver: DriverConfig {
            pre_delay: Delay::Fixed(1),
            retry_limit: Some(1000),
        },
        ..quick_ctx(dir.path())
    };
    // results are still in the pipeline when y is read, so every read returns 0
    let result = simulate(
        dut(OrFifoConfig {
            latency: 50,
            ..OrFifoConfig::default()
        }),
        KernelOptions::default(),
        "delayed_short",
        move |dut| scenarios::directed_expect(dut, ctx, vec![0, 1, 1, 1]),
    );
    assert!(matches!(result, Err(TbError::Mismatch { .. })));
}

#[test]
fn concurrent_or_keeps_order() {
    utils::seed(4);
    let dir = tempfile::tempdir().unwrap();
    for status_after_read in [false, true] {
        let ctx = TestContext {
            vectors: 8,
            status_after_read,
            ..quick_ctx(dir.path())
        };
        let result = simulate(
            dut(OrFifoConfig::default()),
            KernelOptions::default(),
            "concurrent_or",
            move |dut| scenarios::concurrent_or(dut, ctx),
        );
        assert!(result.is_ok(), "{:?}", result);
    }
}

#[test]
fn concurrent_or_shares_ports_fairly_across_seeds() {
    let dir = tempfile::tempdir().unwrap();
    for seed in 0..10 {
        utils::seed(seed);
        let ctx = TestContext {
            result_path: dir.path().to_path_buf(),
            vectors: 20,
            ..TestContext::default()
        };
        let result = simulate(
            dut(OrFifoConfig::default()),
            KernelOptions::default(),
            "concurrent_or",
            move |dut| scenarios::concurrent_or(dut, ctx),
        );
        match result {
            Ok(Val::String(stats)) => {
                assert!(stats.contains("matched=20"), "seed {}: {}", seed, stats);
                assert!(stats.contains("unexpected=0"), "seed {}: {}", seed, stats);
            }
            other => panic!("seed {}: {:?}", seed, other),
        }
    }
}

#[test]
fn fifo_full_flags_assert_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = quick_ctx(dir.path());
    let result = simulate(
        dut(OrFifoConfig::default()),
        KernelOptions::default(),
        "fifo_a_full",
        move |dut| scenarios::fifo_a_full(dut, ctx),
    );
    assert!(result.is_ok(), "{:?}", result);

    let ctx = quick_ctx(dir.path());
    let result = simulate(
        dut(OrFifoConfig::default()),
        KernelOptions::default(),
        "fifo_b_full",
        move |dut| scenarios::fifo_b_full(dut, ctx),
    );
    assert!(result.is_ok(), "{:?}", result);
}

#[test]
fn stuck_ready_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext {
        driver: DriverConfig {
            pre_delay: Delay::Fixed(1),
            retry_limit: Some(20),
        },
        ..quick_ctx(dir.path())
    };
    let result = simulate(
        dut(OrFifoConfig {
            fault: Some(Fault::StuckNotReady),
            ..OrFifoConfig::default()
        }),
        KernelOptions::default(),
        "stuck",
        move |dut| scenarios::directed_or(dut, ctx),
    );
    match result {
        Err(TbError::HandshakeTimeout { signal, retries }) => {
            assert_eq!(signal, "write_rdy");
            assert_eq!(retries, 20);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn runner_writes_junit_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_string_lossy().to_string();
    let cfg = Config::from_lookup(|var| match var {
        "RESULT_PATH" => Some(path.clone()),
        "TESTCASE" => Some("directed_or,fifo_b_full".to_string()),
        "RANDOM_SEED" => Some("5".to_string()),
        "VECTORS" => Some("2".to_string()),
        _ => None,
    })
    .unwrap();
    assert!(scenarios::run_suite(&cfg).unwrap());

    let xml = std::fs::read_to_string(cfg.results_file()).unwrap();
    assert!(xml.contains("directed_or"));
    assert!(xml.contains("fifo_b_full"));
    assert!(!xml.contains("concurrent_or"));
}

#[test]
fn runner_rejects_selection_without_known_tests() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_string_lossy().to_string();
    let cfg = Config::from_lookup(|var| match var {
        "RESULT_PATH" => Some(path.clone()),
        "TESTCASE" => Some("no_such_test".to_string()),
        _ => None,
    })
    .unwrap();
    assert!(matches!(
        scenarios::run_suite(&cfg),
        Err(TbError::InvalidConfig { var: "TESTCASE", .. })
    ));
    assert!(!cfg.results_file().exists());
}
