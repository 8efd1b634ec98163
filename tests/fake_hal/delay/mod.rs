use super::concurrent;
use super::Event;
use embedded_hal::delay::DelayNs;

/// Returns immediately, but logs how long it was asked to wait.
#[derive(Debug)]
pub struct Delay {
    name: &'static str,
}

impl Delay {
    /// Logs into the same stream as the line called `name`.
    pub fn new(name: &'static str) -> Delay {
        Delay { name }
    }
}

impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        concurrent::push_event(self.name, Event::DelayUs(ns.div_ceil(1000)));
    }

    fn delay_us(&mut self, us: u32) {
        concurrent::push_event(self.name, Event::DelayUs(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        concurrent::push_event(self.name, Event::DelayUs(ms * 1000));
    }
}
