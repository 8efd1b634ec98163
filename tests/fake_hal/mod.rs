#![allow(dead_code)]

use bitbang_sensors::gpio::{Direction, Level};

pub mod concurrent;
pub mod delay;
pub mod digital;

/// Everything the fakes observe, in the order it happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Direction(Direction),
    Write(Level),
    Read(Level),
    DelayUs(u32),
}
