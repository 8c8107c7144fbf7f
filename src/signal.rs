use crate::error::TbError;
use crate::sim_if::SIM_IF;
use crate::trigger::Trigger;
use crate::TbResult;

/// Handle to an object of the simulated design, either a scope or a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Integer signal of the given width in bits.
    Int(i32),
    Hier,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> TbResult<String> {
        SIM_IF.get_full_name(self)
    }

    pub fn size(&self) -> Option<i32> {
        match self.kind {
            ObjectKind::Int(size) => Some(size),
            _ => None,
        }
    }

    pub fn has_value(&self) -> bool {
        matches!(self.kind, ObjectKind::Int(_))
    }

    pub fn get_root() -> TbResult<Self> {
        SIM_IF.get_root_object()
    }

    pub fn from_name(full_name: &str) -> TbResult<Self> {
        SIM_IF.get_object_by_name(full_name)
    }

    /// Looks up `name` below this scope.
    pub fn child(&self, name: &str) -> TbResult<Self> {
        let mut child_name = self.name()?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn u32(&self) -> TbResult<u32> {
        self.check_value()?;
        SIM_IF.get_value(self)
    }

    pub fn is_high(&self) -> TbResult<bool> {
        Ok(self.u32()? != 0)
    }

    /// Schedules `val` on this signal; it becomes visible in the next delta cycle.
    pub fn set(&self, val: u32) -> TbResult<()> {
        self.check_value()?;
        SIM_IF.set_value(self, val)
    }

    fn check_value(&self) -> TbResult<()> {
        if self.has_value() {
            Ok(())
        } else {
            Err(TbError::NotAValue(self.name()?))
        }
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
}
