use crate::error::TbError;
use crate::signal::SimObject;
use crate::TbResult;

/// Named group of DUT signals, e.g. the write port `write_en`/`write_address`/`write_data`.
#[derive(Clone, Debug)]
pub struct Bus {
    name: String,
    signals: Vec<(&'static str, SimObject)>,
}

impl Bus {
    /// Resolves `signals` below `dut` as `<prefix>_<signal>` (or plain `<signal>` without
    /// prefix). Missing entries of `optional` are skipped, missing `signals` are an error.
    pub fn new(
        dut: SimObject,
        prefix: &str,
        signals: &[&'static str],
        optional: &[&'static str],
    ) -> TbResult<Self> {
        let full = |sig: &str| match prefix {
            "" => sig.to_string(),
            p => format!("{}_{}", p, sig),
        };
        let mut resolved = Vec::with_capacity(signals.len() + optional.len());
        for &sig in signals {
            resolved.push((sig, dut.child(&full(sig))?));
        }
        for &sig in optional {
            match dut.child(&full(sig)) {
                Ok(obj) => resolved.push((sig, obj)),
                Err(TbError::NoSuchObject(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Bus {
            name: prefix.to_string(),
            signals: resolved,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has(&self, signal: &str) -> bool {
        self.signals.iter().any(|(n, _)| *n == signal)
    }

    pub fn get(&self, signal: &str) -> TbResult<SimObject> {
        self.signals
            .iter()
            .find(|(n, _)| *n == signal)
            .map(|(_, obj)| *obj)
            .ok_or_else(|| TbError::NoSuchObject(format!("{}.{}", self.name, signal)))
    }

    pub fn read(&self, signal: &str) -> TbResult<u32> {
        self.get(signal)?.u32()
    }

    pub fn write(&self, signal: &str, value: u32) -> TbResult<()> {
        self.get(signal)?.set(value)
    }
}
