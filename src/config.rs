//! Run configuration read from the environment.
//!
//! | variable            | default            |
//! |---------------------|--------------------|
//! | `RESULT_PATH`       | `./`               |
//! | `TESTCASE`          | all tests          |
//! | `RANDOM_SEED`       | derived from clock |
//! | `SIM_TIME_LIMIT_NS` | none               |
//! | `DUT_LATENCY`       | `0`                |
//! | `VECTORS`           | `50`               |

use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TbError;
use crate::TbResult;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub result_path: PathBuf,
    /// Names of the tests to run; `None` runs every test.
    pub testcases: Option<Vec<String>>,
    pub seed: u64,
    pub sim_time_limit_ns: Option<u64>,
    pub dut_latency: u32,
    pub vectors: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            result_path: PathBuf::from("./"),
            testcases: None,
            seed: clock_seed(),
            sim_time_limit_ns: None,
            dut_latency: 0,
            vectors: 50,
        }
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn parse<T: FromStr>(var: &'static str, value: Option<String>) -> TbResult<Option<T>> {
    match value {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TbError::InvalidConfig { var, value: v }),
    }
}

impl Config {
    pub fn from_env() -> TbResult<Self> {
        Config::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TbResult<Self> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();
        let testcases = get("TESTCASE").map(|list| {
            list.split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        });
        Ok(Config {
            result_path: get("RESULT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.result_path),
            testcases,
            seed: parse("RANDOM_SEED", get("RANDOM_SEED"))?.unwrap_or(defaults.seed),
            sim_time_limit_ns: parse("SIM_TIME_LIMIT_NS", get("SIM_TIME_LIMIT_NS"))?,
            dut_latency: parse("DUT_LATENCY", get("DUT_LATENCY"))?.unwrap_or(defaults.dut_latency),
            vectors: parse("VECTORS", get("VECTORS"))?.unwrap_or(defaults.vectors),
        })
    }

    /// Process wide configuration, read from the environment on first use.
    pub fn global() -> TbResult<&'static Config> {
        CONFIG.get_or_try_init(Config::from_env)
    }

    pub fn selects(&self, test: &str) -> bool {
        match &self.testcases {
            None => true,
            Some(names) => names.iter().any(|n| n == test),
        }
    }

    pub fn results_file(&self) -> PathBuf {
        self.result_path.join("results.xml")
    }
}
