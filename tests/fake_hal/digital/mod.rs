use super::concurrent;
use super::Event;
use bitbang_sensors::gpio::{Direction, GpioLine, Level};

#[derive(Debug, PartialEq)]
pub enum Error {
    ReleaseFailed,
}

/// A line that plays back scripted samples, one per read.
///
/// Once the script runs out, every read returns the default level. With nothing scripted the
/// line reads high, like a pulled-up line with no device attached.
#[derive(Debug)]
pub struct Line {
    data_to_read: Vec<u8>,
    data_index: usize,
    default_level: Level,
    release_failures: usize,
    driving: bool,
    name: &'static str,
}

impl Line {
    pub fn new(name: &'static str) -> Line {
        concurrent::reset_events(name);
        Line {
            data_to_read: Vec::new(),
            data_index: 0,
            default_level: Level::High,
            release_failures: 0,
            driving: false,
            name,
        }
    }

    pub fn set_default_level(&mut self, level: Level) {
        self.default_level = level;
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data_to_read = data;
        self.data_index = 0;
    }

    /// Makes the next `count` attempts to release a driven line fail, leaving it driven.
    pub fn fail_next_releases(&mut self, count: usize) {
        self.release_failures = count;
    }

    /// How many scripted samples have been consumed.
    pub fn samples_read(&self) -> usize {
        self.data_index.min(self.data_to_read.len())
    }
}

impl GpioLine for Line {
    type Error = Error;

    fn set_direction(&mut self, direction: Direction) -> Result<(), Error> {
        if direction == Direction::Input && self.driving && self.release_failures > 0 {
            self.release_failures -= 1;
            return Err(Error::ReleaseFailed);
        }
        self.driving = direction == Direction::Output;
        concurrent::push_event(self.name, Event::Direction(direction));
        Ok(())
    }

    fn write_level(&mut self, level: Level) -> Result<(), Error> {
        concurrent::push_event(self.name, Event::Write(level));
        Ok(())
    }

    fn read_level(&mut self) -> Result<Level, Error> {
        let level = match self.data_to_read.get(self.data_index) {
            Some(&sample) => Level::from(sample > 0),
            None => self.default_level,
        };
        self.data_index += 1;
        concurrent::push_event(self.name, Event::Read(level));
        Ok(level)
    }
}
