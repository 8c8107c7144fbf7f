//! Behavioral stand-in for the design under test.
//!
//! A [`Model`] declares its ports once and is evaluated by the kernel in every delta cycle
//! in which one of its ports changed. Outputs written through [`ModelIo::set`] are
//! non-blocking: they become visible in the next delta cycle, so anything triggered by
//! the same edge still reads the pre-update values.

use num_format::{Locale, ToFormattedString};

#[derive(Clone, Copy, Debug)]
pub struct Port {
    pub name: &'static str,
    pub width: u32,
    pub init: u32,
}

impl Port {
    pub const fn input(name: &'static str, width: u32, init: u32) -> Self {
        Port {
            name,
            width,
            init,
        }
    }
    pub const fn output(name: &'static str, width: u32) -> Self {
        Port {
            name,
            width,
            init: 0,
        }
    }
}

/// Committed value change of a single port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Change {
    pub port: usize,
    pub old: u32,
    pub new: u32,
}

pub trait Model {
    /// Name of the top-level scope the ports live in.
    fn name(&self) -> &str;
    /// Ports in handle order; [`ModelIo`] addresses them by index into this list.
    fn ports(&self) -> Vec<Port>;
    /// Called once at time zero with no changes, then on every delta cycle touching a port.
    fn evaluate(&mut self, io: &mut ModelIo<'_>);
}

pub struct ModelIo<'a> {
    pub(crate) time_ps: u64,
    pub(crate) values: &'a [u32],
    pub(crate) changes: &'a [Change],
    pub(crate) writes: &'a mut Vec<(usize, u32)>,
}

impl<'a> ModelIo<'a> {
    pub fn get(&self, port: usize) -> u32 {
        self.values[port]
    }

    pub fn is_high(&self, port: usize) -> bool {
        self.values[port] != 0
    }

    pub fn rose(&self, port: usize) -> bool {
        self.changes
            .iter()
            .any(|c| c.port == port && c.old == 0 && c.new != 0)
    }

    pub fn fell(&self, port: usize) -> bool {
        self.changes
            .iter()
            .any(|c| c.port == port && c.old != 0 && c.new == 0)
    }

    /// Schedules `value` on `port` for the next delta cycle.
    pub fn set(&mut self, port: usize, value: u32) {
        self.writes.push((port, value));
    }

    pub fn log(&self, msg: &str) {
        println!("{} {}", format_time_ps(self.time_ps), msg);
    }
}

/// Formats a time in picoseconds as `1,234.500ns`.
pub(crate) fn format_time_ps(time_ps: u64) -> String {
    format!(
        "{}.{:03}ns",
        (time_ps / 1000).to_formatted_string(&Locale::en),
        time_ps % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_helpers_follow_changes() {
        let values = [1, 0];
        let changes = [
            Change {
                port: 0,
                old: 0,
                new: 1,
            },
            Change {
                port: 1,
                old: 1,
                new: 0,
            },
        ];
        let mut writes = Vec::new();
        let mut io = ModelIo {
            time_ps: 0,
            values: &values,
            changes: &changes,
            writes: &mut writes,
        };
        assert!(io.rose(0));
        assert!(!io.fell(0));
        assert!(io.fell(1));
        io.set(1, 1);
        assert_eq!(writes, vec![(1, 1)]);
    }

    #[test]
    fn formats_time_with_separators() {
        assert_eq!(format_time_ps(1_234_500), "1,234.500ns");
        assert_eq!(format_time_ps(5_000), "5.000ns");
    }
}
