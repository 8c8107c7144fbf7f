use crate::error::TbError;
use crate::kernel;
use crate::signal::SimObject;
use crate::TbResult;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref SIM_IF: Box<dyn SimIf + Sync> = new_interface();
}

fn new_interface() -> Box<dyn SimIf + Sync> {
    Box::new(kernel::Kernel)
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    /// Relative delay in simulation steps when registering, absolute time when fired.
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
    NextTimeStep,
}

pub trait SimIf {
    fn set_value(&self, obj: &SimObject, value: u32) -> TbResult<()>;
    fn get_value(&self, obj: &SimObject) -> TbResult<u32>;
    fn get_object_by_name(&self, name: &str) -> TbResult<SimObject>;
    fn get_root_object(&self) -> TbResult<SimObject>;
    fn get_full_name(&self, obj: &SimObject) -> TbResult<String>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn log(&self, msg: &str);
    fn register_callback(&self, cb: SimCallback) -> TbResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()>;
    fn get_sim_steps(&self, time: f64, unit: &str) -> TbResult<u64> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time, time_scale(unit)? - precision);
        if steps % 1.0 == 0.0 {
            Ok(steps as u64)
        } else {
            Err(TbError::InexactTime {
                time,
                unit: unit.to_string(),
            })
        }
    }
}

pub(crate) fn time_scale(unit: &str) -> TbResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(TbError::InvalidTimeUnit(unit.to_string())),
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_units() {
        assert_eq!(time_scale("ns").unwrap(), -9);
        assert_eq!(time_scale("sec").unwrap(), 0);
        assert!(matches!(time_scale("hours"), Err(TbError::InvalidTimeUnit(_))));
    }

    #[test]
    fn ldexp10_both_directions() {
        assert_eq!(ldexp10(50.0, 3), 50_000.0);
        assert_eq!(ldexp10(50_000.0, -3), 50.0);
    }
}
