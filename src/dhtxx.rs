use core::marker::PhantomData;
use embedded_hal::delay::DelayNs;

use crate::delay::spin_until;
use crate::error::Error;
use crate::gpio::{Direction, GpioLine, Level};
use crate::Measurement;

/// Number of data bits in one frame.
pub const FRAME_BITS: usize = 40;

/// Number of bytes in one frame: humidity (2), temperature (2), checksum.
pub const FRAME_BYTES: usize = FRAME_BITS / 8;

pub type Frame = [u8; FRAME_BYTES];

/// Humidity readings above this (in tenths) can only come from a DHT11.
const MAX_HUMIDITY_X10: u16 = 1000;

/// Temperature readings above this (in tenths) can only come from a DHT11.
const MAX_TEMPERATURE_X10: u16 = 1250;

/// Timing of the start sequence and the bounds on each edge wait.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// How long the line is held high before the start signal, so the sensor settles.
    pub settle_ms: u32,
    /// How long the host holds the line low to request a reading.
    pub start_low_us: u32,
    /// Upper bound on polls while waiting for any single edge.
    pub max_spins: u32,
}

/// The DHT11 needs at least 18ms of start signal, the DHT22 at least 1ms. 5ms has proven to
/// work for both.
pub const DEFAULT_TIMING: Timing = Timing {
    settle_ms: 250,
    start_low_us: 5_000,
    max_spins: 1_000_000,
};

/// The shortest start signal any sensor of this family accepts.
pub const MIN_START_LOW_US: u32 = 1_000;

impl Default for Timing {
    fn default() -> Timing {
        DEFAULT_TIMING
    }
}

/// How long the line stayed low, then high, for one bit.
///
/// Durations are in polls of the line, so they are only meaningful relative to each other. A
/// zero means the edge never came.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PulsePair {
    pub low: u32,
    pub high: u32,
}

impl PulsePair {
    /// A bit is a one if its high phase outlasted its low phase.
    ///
    /// Returns `None` if either phase timed out.
    pub fn decode(&self) -> Option<bool> {
        if self.low == 0 || self.high == 0 {
            return None;
        }
        Some(self.high > self.low)
    }
}

/// Where captured pulses go during the timing-critical window.
///
/// Implementations are called once per bit, in order, from inside the critical section, so
/// `record` must be cheap.
pub trait CaptureMode: Sized {
    fn new() -> Self;

    fn record(&mut self, index: usize, pulse: PulsePair);

    /// Assembles the frame, most-significant bit first. Fails if any pulse was invalid.
    fn frame<TError>(&self) -> Result<Frame, Error<TError>>;
}

/// Keeps every pulse duration, for diagnosing marginal wiring or timing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullCapture {
    pulses: [PulsePair; FRAME_BITS],
}

impl FullCapture {
    pub fn pulses(&self) -> &[PulsePair; FRAME_BITS] {
        &self.pulses
    }
}

impl CaptureMode for FullCapture {
    fn new() -> FullCapture {
        FullCapture {
            pulses: [PulsePair::default(); FRAME_BITS],
        }
    }

    #[inline(always)]
    fn record(&mut self, index: usize, pulse: PulsePair) {
        self.pulses[index] = pulse;
    }

    fn frame<TError>(&self) -> Result<Frame, Error<TError>> {
        decode_pulses(&self.pulses)
    }
}

/// Decodes each bit as it arrives and keeps only the frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedCapture {
    frame: Frame,
    invalid: bool,
}

impl CaptureMode for CompressedCapture {
    fn new() -> CompressedCapture {
        CompressedCapture {
            frame: [0u8; FRAME_BYTES],
            invalid: false,
        }
    }

    #[inline(always)]
    fn record(&mut self, index: usize, pulse: PulsePair) {
        match pulse.decode() {
            Some(bit) => {
                let byte = &mut self.frame[index / 8];
                *byte = (*byte << 1) | bit as u8;
            }
            None => self.invalid = true,
        }
    }

    fn frame<TError>(&self) -> Result<Frame, Error<TError>> {
        if self.invalid {
            return Err(Error::FrameTimeout);
        }
        Ok(self.frame)
    }
}

/// Packs 40 pulse pairs into 5 bytes, most-significant bit first.
///
/// Any pulse with a zero-length phase invalidates the whole frame.
pub fn decode_pulses<TError>(pulses: &[PulsePair; FRAME_BITS]) -> Result<Frame, Error<TError>> {
    let mut frame = [0u8; FRAME_BYTES];
    for (i, pulse) in pulses.iter().enumerate() {
        let bit = pulse.decode().ok_or(Error::FrameTimeout)?;
        frame[i / 8] = (frame[i / 8] << 1) | bit as u8;
    }
    Ok(frame)
}

/// The last byte must be the truncated sum of the first four.
pub fn checksum_matches(frame: &Frame) -> bool {
    let sum = frame[..4]
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    sum == frame[4]
}

/// Data read from a DHT11 or DHT22, in tenths.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reading {
    pub humidity_x10: u16,
    pub temperature_x10: i16,
}

impl Reading {
    /// Decodes a checked frame.
    ///
    /// DHT22 frames carry tenths in two bytes. A DHT11 sends whole units in the first byte and
    /// a fraction in the second, which reads as an implausibly large DHT22 value; in that case
    /// only the first byte is used.
    pub fn from_frame(frame: &Frame) -> Reading {
        let mut humidity_x10 = u16::from_be_bytes([frame[0], frame[1]]);
        if humidity_x10 > MAX_HUMIDITY_X10 {
            humidity_x10 = frame[0] as u16 * 10;
        }

        let mut temperature_x10 = u16::from_be_bytes([frame[2] & 0x7F, frame[3]]);
        if temperature_x10 > MAX_TEMPERATURE_X10 {
            temperature_x10 = frame[2] as u16 * 10;
        }
        let mut temperature_x10 = temperature_x10 as i16;
        if frame[2] & 0x80 != 0 {
            temperature_x10 = -temperature_x10;
        }

        Reading {
            humidity_x10,
            temperature_x10,
        }
    }

    pub fn get_humidity(&self) -> f32 {
        self.humidity_x10 as f32 * 0.1
    }

    pub fn get_temperature(&self) -> f32 {
        self.temperature_x10 as f32 * 0.1
    }

    /// Relative humidity in thousandths of a percent.
    pub fn humidity_milli(&self) -> i32 {
        self.humidity_x10 as i32 * 100
    }

    /// Temperature in thousandths of a degree Celsius.
    pub fn temperature_milli(&self) -> i32 {
        self.temperature_x10 as i32 * 100
    }
}

impl Measurement for Reading {
    fn temperature(&self) -> f32 {
        self.get_temperature()
    }

    fn humidity(&self) -> Option<f32> {
        Some(self.get_humidity())
    }
}

/// A DHT11 or DHT22 humidity and temperature sensor.
///
/// `TMode` decides how much of each capture is kept: [`FullCapture`] (the default) keeps every
/// pulse, [`CompressedCapture`] only the decoded bits.
#[derive(Debug)]
pub struct Dht<TLine, TDelay, TMode = FullCapture> {
    line: TLine,
    delay: TDelay,
    timing: Timing,
    mode: PhantomData<TMode>,
}

impl<TLine, TError, TDelay, TMode> Dht<TLine, TDelay, TMode>
where
    TLine: GpioLine<Error = TError>,
    TDelay: DelayNs,
    TMode: CaptureMode,
{
    /// Constructs a DHT sensor that reads from the given line, and releases it.
    ///
    /// If `timing` is `None`, [`DEFAULT_TIMING`] is used.
    pub fn new(
        mut line: TLine,
        delay: TDelay,
        timing: Option<Timing>,
    ) -> Result<Dht<TLine, TDelay, TMode>, Error<TError>> {
        let timing = timing.unwrap_or(DEFAULT_TIMING);
        if timing.start_low_us < MIN_START_LOW_US || timing.max_spins == 0 {
            return Err(Error::InvalidArgument);
        }
        line.set_direction(Direction::Input)?;
        Ok(Dht {
            line,
            delay,
            timing,
            mode: PhantomData,
        })
    }

    /// Gives back the line and delay.
    pub fn release(self) -> (TLine, TDelay) {
        (self.line, self.delay)
    }

    /// Reads data from the sensor.
    ///
    /// This blocks for the settle time and start signal, then captures the response with
    /// interrupts disabled. The capture takes about 4ms (full range: 3200-4800us, depending on
    /// the data). Reading more often than once every 1-2 seconds (depending on the sensor)
    /// returns stale or bad data.
    pub fn read(&mut self) -> Result<Reading, Error<TError>> {
        let capture = self.capture()?;
        let frame = capture.frame()?;
        if !checksum_matches(&frame) {
            #[cfg(feature = "defmt")]
            defmt::warn!("dht: checksum mismatch {:02x}", frame);
            return Err(Error::ChecksumMismatch);
        }
        Ok(Reading::from_frame(&frame))
    }

    /// Sends the start signal and captures the raw response, without decoding it.
    pub fn capture(&mut self) -> Result<TMode, Error<TError>> {
        self.line.set_direction(Direction::Output)?;
        self.line.write_level(Level::High)?;
        self.delay.delay_ms(self.timing.settle_ms);
        self.line.write_level(Level::Low)?;
        self.delay.delay_us(self.timing.start_low_us);

        let max_spins = self.timing.max_spins;
        let line = &mut self.line;
        let result = critical_section::with(|_cs| -> Result<TMode, Error<TError>> {
            line.set_direction(Direction::Input)?;
            receive(line, max_spins)
        });
        if result.is_err() {
            #[cfg(feature = "defmt")]
            defmt::debug!("dht: capture failed");
            // The start signal may still be holding the line low.
            let _ = self.line.set_direction(Direction::Input);
        }
        result
    }
}

/// Waits for `level` and returns how many polls it took.
#[inline(always)]
fn expect_level<TLine, TError>(
    line: &mut TLine,
    level: Level,
    max_spins: u32,
) -> nb::Result<u32, TError>
where
    TLine: GpioLine<Error = TError>,
{
    spin_until(max_spins, || line.poll_level(level))
}

fn receive<TLine, TError, TMode>(line: &mut TLine, max_spins: u32) -> Result<TMode, Error<TError>>
where
    TLine: GpioLine<Error = TError>,
    TMode: CaptureMode,
{
    // The line floats up once released, then the sensor answers low and high before the
    // first bit's low phase.
    for level in [Level::High, Level::Low, Level::High, Level::Low] {
        expect_level(line, level, max_spins).map_err(|err: nb::Error<TError>| match err {
            nb::Error::WouldBlock => Error::DeviceAbsent,
            nb::Error::Other(err) => Error::Line(err),
        })?;
    }

    let to_frame_error = |err: nb::Error<TError>| match err {
        nb::Error::WouldBlock => Error::FrameTimeout,
        nb::Error::Other(err) => Error::Line(err),
    };
    let mut capture = TMode::new();
    for index in 0..FRAME_BITS {
        let low = expect_level(line, Level::High, max_spins).map_err(to_frame_error)?;
        let high = expect_level(line, Level::Low, max_spins).map_err(to_frame_error)?;
        capture.record(index, PulsePair { low, high });
    }
    Ok(capture)
}
