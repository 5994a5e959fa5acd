use rand::{Rng, RngCore};
use std::ops::Range;


/// Source of randomness for the engine: message-id seeding, token generation and the randomized
///  initial retransmission timeout. Abstracted to make tests deterministic.
#[cfg_attr(test, mockall::automock)]
pub trait Random {
    fn next_u16(&mut self) -> u16;
    fn gen_u32_range(&mut self, range: Range<u32>) -> u32;
    fn fill_bytes(&mut self, buf: &mut [u8]);
}

pub struct RngRandom {}
impl Random for RngRandom {
    fn next_u16(&mut self) -> u16 {
        rand::thread_rng().gen()
    }

    fn gen_u32_range(&mut self, range: Range<u32>) -> u32 {
        if range.is_empty() {
            return range.start;
        }
        rand::thread_rng().gen_range(range)
    }

    fn fill_bytes(&mut self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::single(5..6)]
    #[case::wide(2000..3001)]
    #[case::empty(7..7)]
    fn test_gen_u32_range(#[case] range: Range<u32>) {
        let mut random = RngRandom {};
        for _ in 0..100 {
            let value = random.gen_u32_range(range.clone());
            if range.is_empty() {
                assert_eq!(value, range.start);
            }
            else {
                assert!(range.contains(&value));
            }
        }
    }
}
