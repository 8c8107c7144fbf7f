use std::collections::VecDeque;

use crate::driver::SampleSink;
use crate::prelude::*;
use crate::tb_obj::TbObj;

/// Ordered queue of expected results; every sample is compared against its head.
#[derive(Clone, Default)]
pub struct Scoreboard(TbObj<ScoreboardInner>);

#[derive(Default)]
struct ScoreboardInner {
    exp_q: VecDeque<u32>,
    failures: u32,
    expected: u32,
    checked: u32,
    matched: u32,
    unexpected: u32,
}

impl Scoreboard {
    pub fn new() -> Self {
        Scoreboard::default()
    }

    pub fn expect(&self, value: u32) {
        self.0.with_mut(|s| {
            s.exp_q.push_back(value);
            s.expected += 1;
        });
    }

    /// Compares `actual` against the oldest expected value. A sample with nothing
    /// expected is logged and counted, but is not a failure.
    pub fn check(&self, actual: u32) {
        let expected = self.0.with_mut(|s| {
            let expected = s.exp_q.pop_front();
            match expected {
                None => s.unexpected += 1,
                Some(e) => {
                    s.checked += 1;
                    match e == actual {
                        true => s.matched += 1,
                        false => s.failures += 1,
                    }
                }
            }
            expected
        });
        let Some(expected) = expected else {
            SIM_IF.log("Warning: Unexpected output received");
            return;
        };
        SIM_IF.log(&format!("Expected: {}, Actual: {}", expected, actual));
        if expected != actual {
            SIM_IF.log("  -> Mismatch detected!");
        }
    }

    pub fn pending(&self) -> usize {
        self.0.get().exp_q.len()
    }

    pub fn failures(&self) -> u32 {
        self.0.get().failures
    }

    pub fn unexpected(&self) -> u32 {
        self.0.get().unexpected
    }

    pub fn result_str(&self) -> String {
        let inner = self.0.get();
        format!(
            "expected={}, checked={}, matched={}, failures={}, unexpected={}, expQ: {}",
            inner.expected,
            inner.checked,
            inner.matched,
            inner.failures,
            inner.unexpected,
            inner.exp_q.len()
        )
    }

    /// End-of-test verdict: mismatches take precedence over unchecked expectations.
    pub fn finish(&self) -> TbResult {
        let (failures, remaining) = {
            let inner = self.0.get();
            (inner.failures, inner.exp_q.len())
        };
        if failures > 0 {
            return Err(TbError::Mismatch { failures });
        }
        if remaining > 0 {
            return Err(TbError::UncheckedOutputs { remaining });
        }
        Ok(Val::String(self.result_str()))
    }
}

impl SampleSink for Scoreboard {
    fn on_sample(&self, value: u32) {
        self.check(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_in_order() {
        let sb = Scoreboard::new();
        for v in [0, 1, 1] {
            sb.expect(v);
        }
        for v in [0, 1, 1] {
            sb.on_sample(v);
        }
        assert_eq!(sb.pending(), 0);
        assert!(sb.finish().is_ok());
    }

    #[test]
    fn mismatch_wins_over_leftovers() {
        let sb = Scoreboard::new();
        for v in [1, 1, 0] {
            sb.expect(v);
        }
        sb.check(0);
        assert!(matches!(sb.finish(), Err(TbError::Mismatch { failures: 1 })));
    }

    #[test]
    fn leftovers_fail_separately() {
        let sb = Scoreboard::new();
        sb.expect(1);
        sb.expect(0);
        sb.check(1);
        assert!(matches!(
            sb.finish(),
            Err(TbError::UncheckedOutputs { remaining: 1 })
        ));
    }

    #[test]
    fn extra_samples_only_warn() {
        let sb = Scoreboard::new();
        sb.check(1);
        assert_eq!(sb.unexpected(), 1);
        assert_eq!(sb.failures(), 0);
        assert!(sb.finish().is_ok());
    }
}
