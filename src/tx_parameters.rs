use std::ops::Range;
use crate::util::random::Random;

/// Transmission parameters governing retransmission of confirmable messages and the lifetime of
///  cached responses. All derived values are in milliseconds.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TxParameters {
    pub ack_timeout: u32,
    pub ack_random_factor_numerator: u8,
    pub ack_random_factor_denominator: u8,
    pub max_retransmit: u8,
}

impl Default for TxParameters {
    fn default() -> Self {
        TxParameters {
            ack_timeout: Self::DEFAULT_ACK_TIMEOUT,
            ack_random_factor_numerator: 3,
            ack_random_factor_denominator: 2,
            max_retransmit: Self::DEFAULT_MAX_RETRANSMIT,
        }
    }
}

impl TxParameters {
    pub const DEFAULT_ACK_TIMEOUT: u32 = 2000;
    pub const DEFAULT_MAX_RETRANSMIT: u8 = 4;

    pub const MIN_ACK_TIMEOUT: u32 = 1000;
    pub const MAX_RETRANSMIT: u8 = 20;
    pub const DEFAULT_MAX_LATENCY: u32 = 100_000;

    /// NB: The exchange lifetime is checked for overflow with one retransmission more than
    ///      configured, which is what [TxParameters::max_transmit_wait] needs.
    pub fn is_valid(&self) -> bool {
        if self.ack_random_factor_denominator == 0
            || self.ack_random_factor_numerator < self.ack_random_factor_denominator
            || self.ack_timeout < Self::MIN_ACK_TIMEOUT
            || self.max_retransmit > Self::MAX_RETRANSMIT
        {
            return false;
        }

        let span = self.ack_timeout
            .checked_mul((1u32 << (self.max_retransmit + 1)) - 1)
            .and_then(|t| t.checked_mul(self.ack_random_factor_numerator.into()))
            .map(|t| t / u32::from(self.ack_random_factor_denominator));

        match span {
            Some(span) if span != 0 => span
                .checked_add(self.ack_timeout)
                .and_then(|t| t.checked_add(2 * Self::DEFAULT_MAX_LATENCY))
                .is_some(),
            _ => false,
        }
    }

    fn initial_timeout_range(&self) -> Range<u32> {
        let upper = u64::from(self.ack_timeout) * u64::from(self.ack_random_factor_numerator)
            / u64::from(self.ack_random_factor_denominator.max(1));
        let upper = u32::try_from(upper).unwrap_or(u32::MAX - 1);
        self.ack_timeout..upper + 1
    }

    /// uniformly distributed in `[ack_timeout, ack_timeout * random_factor]`
    pub fn initial_retransmission_timeout(&self, random: &mut dyn Random) -> u32 {
        random.gen_u32_range(self.initial_timeout_range())
    }

    /// `ack_timeout * (2^n - 1) * random_factor`, the time it takes for `n` transmissions with
    ///  the maximum randomized initial timeout
    pub fn span(&self, n: u8) -> u32 {
        let factor = (1u64 << n.min(32)) - 1;
        let span = u64::from(self.ack_timeout)
            .saturating_mul(factor)
            .saturating_mul(self.ack_random_factor_numerator.into())
            / u64::from(self.ack_random_factor_denominator.max(1));
        u32::try_from(span).unwrap_or(u32::MAX)
    }

    /// time from the first transmission of a confirmable message until the sender gives up,
    ///  plus round trip latency and processing delay
    pub fn exchange_lifetime(&self) -> u32 {
        self.span(self.max_retransmit)
            .saturating_add(2 * Self::DEFAULT_MAX_LATENCY)
            .saturating_add(self.ack_timeout)
    }

    pub fn max_transmit_wait(&self) -> u32 {
        self.span(self.max_retransmit.saturating_add(1))
    }
}
