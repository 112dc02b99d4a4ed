use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegType {
    /// Single entry, bubble between back-to-back beats.
    Simple,
    /// Two entries, full throughput with a registered ready.
    #[default]
    Skid,
}

/// Elastic register stage shared by every component with a registered output. Both `ready` and
/// the output are registers, so nothing here depends combinationally on the other side.
#[derive(Debug, Clone)]
pub struct RegisterSlice<T> {
    reg_type: RegType,
    out: Option<T>,
    temp: Option<T>,
    ready: bool,
}

impl<T> RegisterSlice<T> {
    pub fn new(reg_type: RegType) -> Self {
        Self {
            reg_type,
            out: None,
            temp: None,
            ready: true,
        }
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn output(&self) -> Option<&T> {
        self.out.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_none() && self.temp.is_none()
    }

    pub fn occupancy(&self) -> usize {
        self.out.is_some() as usize + self.temp.is_some() as usize
    }

    /// Commit one edge. `input` is what upstream offers this cycle; it is taken only if `ready()`
    /// was asserted. `out_ready` is the downstream ready for the current output.
    /// Returns true if the input was accepted.
    pub fn tick(&mut self, input: Option<T>, out_ready: bool) -> bool {
        let accepted = if self.ready { input } else { None };
        let took = accepted.is_some();
        let out_free = self.out.is_none() || out_ready;

        match self.reg_type {
            RegType::Skid => {
                if out_free {
                    self.out = self.temp.take();
                }
                if let Some(value) = accepted {
                    if self.out.is_none() {
                        self.out = Some(value);
                    } else {
                        debug_assert!(self.temp.is_none(), "skid slot overwritten");
                        self.temp = Some(value);
                    }
                }
                self.ready = self.temp.is_none();
            }
            RegType::Simple => {
                if out_free {
                    self.out = None;
                }
                if let Some(value) = accepted {
                    self.out = Some(value);
                }
                self.ready = self.out.is_none();
            }
        }
        took
    }

    pub fn reset(&mut self) {
        self.out = None;
        self.temp = None;
        self.ready = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skid_sustains_full_rate() {
        let mut slice = RegisterSlice::new(RegType::Skid);
        for i in 0..10u32 {
            assert!(slice.ready());
            let downstream = slice.output().is_some();
            assert!(slice.tick(Some(i), downstream));
            assert_eq!(Some(&i), slice.output());
        }
    }

    #[test]
    fn skid_holds_two_under_backpressure() {
        let mut slice = RegisterSlice::new(RegType::Skid);
        assert!(slice.tick(Some(1), false));
        assert!(slice.tick(Some(2), false));
        assert!(!slice.ready());
        assert!(!slice.tick(Some(3), false));
        assert_eq!(2, slice.occupancy());
        assert_eq!(Some(&1), slice.output());

        slice.tick(Some(3), true);
        assert_eq!(Some(&2), slice.output());
        assert!(slice.ready());
        slice.tick(Some(3), true);
        assert_eq!(Some(&3), slice.output());
    }

    #[test]
    fn simple_inserts_bubble() {
        let mut slice = RegisterSlice::new(RegType::Simple);
        let mut accepted = 0;
        for _ in 0..10 {
            let downstream = slice.output().is_some();
            if slice.tick(Some(0u8), downstream) {
                accepted += 1;
            }
        }
        assert_eq!(5, accepted);
    }
}
