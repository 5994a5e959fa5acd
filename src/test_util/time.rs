use std::cell::Cell;
use std::ops::Range;
use std::rc::Rc;
use crate::time::{Clock, TimeMilli};
use crate::util::random::Random;

/// A [Clock] that only moves when it is told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}
impl ManualClock {
    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get() + millis);
    }

    pub fn set(&self, millis: u64) {
        self.now.set(millis);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeMilli {
        TimeMilli::from_millis(self.now.get())
    }
}

/// Deterministic [Random]: message ids start at a fixed value, ranges always yield their lower
///  bound (i.e. the initial retransmission timeout is exactly ACK_TIMEOUT), and random bytes
///  count up.
pub struct FixedRandom {
    next: u16,
    counter: u8,
}
impl FixedRandom {
    pub fn new(first_message_id: u16) -> FixedRandom {
        FixedRandom {
            next: first_message_id,
            counter: 0,
        }
    }
}

impl Random for FixedRandom {
    fn next_u16(&mut self) -> u16 {
        self.next
    }

    fn gen_u32_range(&mut self, range: Range<u32>) -> u32 {
        range.start
    }

    fn fill_bytes(&mut self, buf: &mut [u8]) {
        for b in buf {
            self.counter = self.counter.wrapping_add(1);
            *b = self.counter;
        }
    }
}
