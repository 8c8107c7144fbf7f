//! Error type shared by the simulation kernel, the testbench components and the runner.

use std::io;

/// Everything that can end a test or a simulation early.
#[derive(Debug, thiserror::Error)]
pub enum TbError {
    /// A handshake flag never asserted within the retry ceiling.
    #[error("{signal} did not assert within {retries} clock cycles")]
    HandshakeTimeout { signal: String, retries: u32 },

    /// The scoreboard saw outputs that differed from the expected values.
    #[error("Tests failed: {failures}")]
    Mismatch { failures: u32 },

    /// The test ended with expected values that were never compared.
    #[error("Test completed but {remaining} expected values weren't checked")]
    UncheckedOutputs { remaining: usize },

    /// A directed check inside a test did not hold.
    #[error("check failed: {0}")]
    CheckFailed(String),

    #[error("no object named '{0}' in design")]
    NoSuchObject(String),

    #[error("object '{0}' carries no value")]
    NotAValue(String),

    #[error("address {0} is not a recognised {1} target")]
    InvalidAddress(u32, &'static str),

    #[error("unknown time unit '{0}'")]
    InvalidTimeUnit(String),

    #[error("can't convert {time} {unit} to simulation steps without rounding")]
    InexactTime { time: f64, unit: String },

    #[error("timer delay must be at least one simulation step")]
    ZeroDelay,

    #[error("no simulation is running on this thread")]
    NoSimulation,

    #[error("unknown callback handle {0}")]
    NoSuchCallback(usize),

    /// Too many delta cycles at a single time step, indicating a combinational loop.
    #[error("delta cycle limit exceeded at {time_ps} ps (max {max_deltas} deltas)")]
    DeltaCycleLimit { time_ps: u64, max_deltas: u32 },

    #[error("simulation time limit of {limit_ns} ns exceeded")]
    TimeLimitExceeded { limit_ns: u64 },

    /// The simulation ran out of events before the test finished.
    #[error("simulation ended before the test completed")]
    Stalled,

    #[error("task was cancelled")]
    Cancelled,

    #[error("coverage item '{0}' is not declared")]
    UnknownCoverItem(String),

    /// Failure raised explicitly through `fail_test`.
    #[error("{0}")]
    Failed(String),

    #[error("invalid value '{value}' for {var}")]
    InvalidConfig { var: &'static str, value: String },

    #[error("report error: {0}")]
    Report(String),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_timeout_display() {
        let e = TbError::HandshakeTimeout {
            signal: "write_rdy".into(),
            retries: 1000,
        };
        assert_eq!(e.to_string(), "write_rdy did not assert within 1000 clock cycles");
    }

    #[test]
    fn scoreboard_errors_are_distinct() {
        let mismatch = TbError::Mismatch { failures: 2 };
        let unchecked = TbError::UncheckedOutputs { remaining: 3 };
        assert_eq!(mismatch.to_string(), "Tests failed: 2");
        assert_eq!(
            unchecked.to_string(),
            "Test completed but 3 expected values weren't checked"
        );
    }

    #[test]
    fn io_error_converts() {
        let e: TbError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(e.to_string().contains("I/O error"));
    }
}
