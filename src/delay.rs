use embedded_hal::delay::DelayNs;

/// A free-running hardware cycle counter.
///
/// The counter must be monotonic apart from wrapping at `u32::MAX`, and readable with
/// interrupts disabled.
pub trait CycleCounter {
    /// The current counter value.
    fn now(&self) -> u32;

    /// How many counts pass per microsecond.
    fn cycles_per_us(&self) -> u32;
}

/// Counts spent between reading the counter and entering the wait loop.
///
/// Subtracted from every target so short waits don't overshoot.
const CALL_OVERHEAD_CYCLES: u32 = 5;

/// Longest single wait. Elapsed counts are only unambiguous up to half the counter range.
const MAX_CHUNK_CYCLES: u32 = u32::MAX / 2;

/// Busy-waits against a [`CycleCounter`], without relying on a scheduler tick.
#[derive(Debug)]
pub struct CycleDelay<C> {
    counter: C,
}

impl<C: CycleCounter> CycleDelay<C> {
    pub fn new(counter: C) -> CycleDelay<C> {
        CycleDelay { counter }
    }

    pub fn into_inner(self) -> C {
        self.counter
    }

    /// Blocks for at least `us` microseconds.
    #[inline(always)]
    pub fn wait_microseconds(&mut self, us: u32) {
        let target = us as u64 * self.counter.cycles_per_us() as u64;
        self.wait_long(target.saturating_sub(CALL_OVERHEAD_CYCLES as u64));
    }

    /// Waits for any number of cycles, in chunks the wrap check can see.
    fn wait_long(&mut self, cycles: u64) {
        let mut remaining = cycles;
        loop {
            let chunk = remaining.min(MAX_CHUNK_CYCLES as u64);
            self.wait_cycles(chunk as u32);
            remaining -= chunk;
            if remaining == 0 {
                break;
            }
        }
    }

    /// Blocks until `cycles` counts have passed since the call.
    ///
    /// Only the distance from the start is compared, so a counter wrap in the middle of the
    /// wait is harmless.
    #[inline(always)]
    pub fn wait_cycles(&mut self, cycles: u32) {
        let start = self.counter.now();
        while self.counter.now().wrapping_sub(start) < cycles {
            core::hint::spin_loop();
        }
    }
}

impl<C: CycleCounter> DelayNs for CycleDelay<C> {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * self.counter.cycles_per_us() as u64).div_ceil(1000);
        self.wait_long(cycles);
    }

    fn delay_us(&mut self, us: u32) {
        self.wait_microseconds(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.wait_microseconds(1000);
        }
    }
}

/// Cycle counter backed by the DWT unit of ARMv7-M and later cores.
///
/// Not available on Cortex-M0/M0+, which have no CYCCNT register.
#[cfg(feature = "cortex-m")]
#[derive(Debug)]
pub struct DwtCounter {
    cycles_per_us: u32,
}

#[cfg(feature = "cortex-m")]
impl DwtCounter {
    /// Enables tracing and the cycle counter. `sysclk_hz` is the core clock frequency.
    pub fn new(
        dcb: &mut cortex_m::peripheral::DCB,
        dwt: &mut cortex_m::peripheral::DWT,
        sysclk_hz: u32,
    ) -> DwtCounter {
        dcb.enable_trace();
        dwt.enable_cycle_counter();
        DwtCounter {
            cycles_per_us: sysclk_hz / 1_000_000,
        }
    }
}

#[cfg(feature = "cortex-m")]
impl CycleCounter for DwtCounter {
    #[inline(always)]
    fn now(&self) -> u32 {
        cortex_m::peripheral::DWT::cycle_count()
    }

    #[inline(always)]
    fn cycles_per_us(&self) -> u32 {
        self.cycles_per_us
    }
}

/// Polls `poll` until it stops returning [`nb::Error::WouldBlock`], at most `limit` times.
///
/// On success, returns how many polls it took. The count starts at 1, so it can be used as a
/// relative duration where 0 means "never happened". Returns [`nb::Error::WouldBlock`] if the
/// condition was still pending after `limit` polls.
#[inline(always)]
pub fn spin_until<E, F>(limit: u32, mut poll: F) -> nb::Result<u32, E>
where
    F: FnMut() -> nb::Result<(), E>,
{
    for spins in 1..=limit {
        match poll() {
            Ok(()) => return Ok(spins),
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(err)) => return Err(nb::Error::Other(err)),
        }
    }
    Err(nb::Error::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Advances by `step` every time it is read.
    struct SteppingCounter {
        value: Cell<u32>,
        step: u32,
        reads: Cell<u32>,
    }

    impl SteppingCounter {
        fn starting_at(value: u32, step: u32) -> SteppingCounter {
            SteppingCounter {
                value: Cell::new(value),
                step,
                reads: Cell::new(0),
            }
        }
    }

    impl CycleCounter for SteppingCounter {
        fn now(&self) -> u32 {
            let value = self.value.get();
            self.value.set(value.wrapping_add(self.step));
            self.reads.set(self.reads.get() + 1);
            value
        }

        fn cycles_per_us(&self) -> u32 {
            80
        }
    }

    #[test]
    fn wait_microseconds_waits_for_target() {
        let mut delay = CycleDelay::new(SteppingCounter::starting_at(0, 1));

        delay.wait_microseconds(10);

        let counter = delay.into_inner();
        // 800 cycles less the call overhead, plus the initial read.
        assert_eq!(counter.reads.get(), 10 * 80 - CALL_OVERHEAD_CYCLES + 1);
    }

    #[test]
    fn wait_microseconds_survives_wraparound() {
        let mut delay = CycleDelay::new(SteppingCounter::starting_at(u32::MAX - 100, 1));

        delay.wait_microseconds(10);

        let counter = delay.into_inner();
        assert_eq!(counter.reads.get(), 10 * 80 - CALL_OVERHEAD_CYCLES + 1);
        assert!(counter.value.get() < 1000);
    }

    #[test]
    fn wait_microseconds_zero_returns_immediately() {
        let mut delay = CycleDelay::new(SteppingCounter::starting_at(7, 1));

        delay.wait_microseconds(0);

        assert_eq!(delay.into_inner().reads.get(), 2);
    }

    #[test]
    fn delay_ms_waits_at_least_a_millisecond_per_ms() {
        let mut delay = CycleDelay::new(SteppingCounter::starting_at(0, 40));

        delay.delay_ms(3);

        let counter = delay.into_inner();
        let elapsed = counter.value.get();
        assert!(elapsed >= 3 * (1000 * 80 - CALL_OVERHEAD_CYCLES));
    }

    #[test]
    fn delay_ns_rounds_up_to_a_cycle() {
        let mut delay = CycleDelay::new(SteppingCounter::starting_at(0, 1));

        delay.delay_ns(1);

        // One cycle to wait, one read to start, one read to see it passed.
        assert_eq!(delay.into_inner().reads.get(), 2);
    }

    #[test]
    fn wait_microseconds_beyond_counter_range() {
        let step = 1 << 20;
        let mut delay = CycleDelay::new(SteppingCounter::starting_at(0, step));

        delay.wait_microseconds(u32::MAX);

        let counter = delay.into_inner();
        let elapsed = counter.reads.get() as u64 * step as u64;
        assert!(elapsed >= u32::MAX as u64 * 80 - CALL_OVERHEAD_CYCLES as u64);
    }

    #[test]
    fn spin_until_counts_polls() {
        let mut remaining = 3;
        let result: nb::Result<u32, ()> = spin_until(10, || {
            if remaining == 0 {
                Ok(())
            } else {
                remaining -= 1;
                Err(nb::Error::WouldBlock)
            }
        });

        assert_eq!(result, Ok(4));
    }

    #[test]
    fn spin_until_gives_up_after_limit() {
        let mut polls = 0;
        let result: nb::Result<u32, ()> = spin_until(5, || {
            polls += 1;
            Err(nb::Error::WouldBlock)
        });

        assert_eq!(result, Err(nb::Error::WouldBlock));
        assert_eq!(polls, 5);
    }

    #[test]
    fn spin_until_forwards_errors() {
        let result: nb::Result<u32, &str> = spin_until(5, || Err(nb::Error::Other("broken")));

        assert_eq!(result, Err(nb::Error::Other("broken")));
    }
}
