use embedded_hal::delay::DelayNs;

use crate::error::Error;
use crate::gpio::{Direction, GpioLine, Level};

/// Time slot durations, in microseconds.
///
/// The defaults are tuned against real sensors on short wires rather than taken straight from
/// a datasheet. Long or heavily loaded lines may need longer recovery times.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// How long the host holds the line low to reset all devices.
    pub reset_low_us: u32,
    /// Delay between releasing the reset pulse and sampling for the presence pulse.
    pub presence_sample_us: u32,
    /// Wait after the presence sample, before the first time slot.
    pub reset_recovery_us: u32,
    /// Low phase of a "1" write slot.
    pub write_one_low_us: u32,
    /// Released phase of a "1" write slot.
    pub write_one_high_us: u32,
    /// Low phase of a "0" write slot.
    pub write_zero_low_us: u32,
    /// Released phase of a "0" write slot.
    pub write_zero_high_us: u32,
    /// Low pulse that starts a read slot.
    pub read_start_low_us: u32,
    /// Delay between releasing the line and sampling it.
    pub read_sample_us: u32,
    /// Rest of the read slot after sampling.
    pub read_recovery_us: u32,
}

pub const DEFAULT_TIMING: Timing = Timing {
    reset_low_us: 480,
    presence_sample_us: 70,
    reset_recovery_us: 410,
    write_one_low_us: 10,
    write_one_high_us: 55,
    write_zero_low_us: 65,
    write_zero_high_us: 5,
    read_start_low_us: 3,
    read_sample_us: 10,
    read_recovery_us: 53,
};

impl Default for Timing {
    fn default() -> Timing {
        DEFAULT_TIMING
    }
}

impl Timing {
    fn is_valid(&self) -> bool {
        self.reset_low_us > 0
            && self.presence_sample_us > 0
            && self.write_one_low_us > 0
            && self.write_one_low_us < self.write_zero_low_us
            && self.read_start_low_us > 0
    }
}

/// Administrative commands for operating the 1-bit data line.
///
/// These are used to retrieve information about devices on the line, or to request those devices
/// to perform more specific operations (see [`FunctionCommand`]).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RomCommand {
    /// Searches for all devices on the line.
    ///
    /// Not supported by this transport, which assumes a single device.
    Search = 0xF0,
    /// Reads the peripheral device's 64-bit ROM code.
    ///
    /// Only possible when there is a single device on the line.
    Read = 0x33,
    /// Selects a specific peripheral device by it's 64-bit ROM code.
    Match = 0x55,
    /// Addresses all devices simultaneously.
    ///
    /// With a single device on the line, this can be used instead of `Match` for all function
    /// commands.
    Skip = 0xCC,
    /// Identical to `Search`, except only devices whose alarm flag is set will respond.
    AlarmSearch = 0xEC,
}

/// Requests the sensor perform some operation.
///
/// These commands can only be sent after a `Read`, `Match`, or `Skip` [`RomCommand`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionCommand {
    /// Stores the current temperature in the 2-byte temperature register in the scratchpad memory.
    ///
    /// If in parasitic power mode, the line must be pulled-up within 10us of sending this command
    /// and held high while the conversion happens.
    ConvertTemperature = 0x44,
    /// Write three bytes of data to the sensor's scratchpad, starting at byte 2
    /// (T<sub>H</sub>, T<sub>L</sub>, configuration).
    WriteScratchpad = 0x4E,
    /// Reads the 9 bytes of the sensor's scratchpad, CRC last.
    ReadScratchpad = 0xBE,
    /// Copies the T<sub>H</sub>, T<sub>L</sub>, and configuration bytes from the scratchpad to
    /// EEPROM.
    ///
    /// If in parasitic power mode, the line must be pulled high within 10us after this command, and
    /// held for 10ms to power the device during the operation.
    CopyScratchpad = 0x48,
    /// Copies the T<sub>H</sub>, T<sub>L</sub>, and configuration bytes from EEPROM to the
    /// scratchpad.
    RecallEeprom = 0xB8,
    /// Issued to determine if any devices are using parasitic power.
    ReadPowerSupply = 0xB4,
}

/// Bit-banged 1-Wire master for a single device on one data line.
///
/// Each bit slot runs inside its own critical section. Gaps between bits and bytes are fine for
/// the device, but a slot stretched by an interrupt is not.
///
/// If the sensor runs on parasitic power, the data line's pull-up must be strong enough to
/// carry the conversion current; a separate power pin, if wired, is expected to be driven high
/// by the platform before the first transfer.
#[derive(Debug)]
pub struct OneWire<TLine, TDelay> {
    line: TLine,
    delay: TDelay,
    timing: Timing,
}

impl<TLine, TError, TDelay> OneWire<TLine, TDelay>
where
    TLine: GpioLine<Error = TError>,
    TDelay: DelayNs,
{
    /// Takes ownership of the line and releases it.
    ///
    /// If `timing` is `None`, [`DEFAULT_TIMING`] is used.
    pub fn new(
        mut line: TLine,
        delay: TDelay,
        timing: Option<Timing>,
    ) -> Result<OneWire<TLine, TDelay>, Error<TError>> {
        let timing = timing.unwrap_or(DEFAULT_TIMING);
        if !timing.is_valid() {
            return Err(Error::InvalidArgument);
        }
        line.set_direction(Direction::Input)?;
        Ok(OneWire {
            line,
            delay,
            timing,
        })
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Gives back the line and delay.
    pub fn release(self) -> (TLine, TDelay) {
        (self.line, self.delay)
    }

    /// Blocking delay on the transport's clock, outside of any time slot.
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Resets the line and reports whether a device answered with a presence pulse.
    ///
    /// Always takes the full reset + recovery time, whether or not a device is present.
    pub fn reset_and_detect_presence(&mut self) -> Result<bool, Error<TError>> {
        let timing = self.timing;
        let line = &mut self.line;
        let delay = &mut self.delay;
        let level = critical_section::with(|_cs| -> Result<Level, TError> {
            line.set_direction(Direction::Output)?;
            line.write_level(Level::Low)?;
            delay.delay_us(timing.reset_low_us);
            line.set_direction(Direction::Input)?;
            delay.delay_us(timing.presence_sample_us);
            line.read_level()
        });
        let level = self.release_on_error(level)?;
        self.delay.delay_us(timing.reset_recovery_us);
        Ok(level == Level::Low)
    }

    /// Like [`OneWire::reset_and_detect_presence`], but fails with [`Error::DeviceAbsent`] if
    /// nothing answered.
    pub fn reset(&mut self) -> Result<(), Error<TError>> {
        if !self.reset_and_detect_presence()? {
            #[cfg(feature = "defmt")]
            defmt::debug!("onewire: no presence pulse");
            return Err(Error::DeviceAbsent);
        }
        Ok(())
    }

    /// Writes a single bit in one time slot.
    pub fn write_bit(&mut self, bit: bool) -> Result<(), Error<TError>> {
        let (low_us, high_us) = if bit {
            (self.timing.write_one_low_us, self.timing.write_one_high_us)
        } else {
            (self.timing.write_zero_low_us, self.timing.write_zero_high_us)
        };
        let line = &mut self.line;
        let delay = &mut self.delay;
        let result = critical_section::with(|_cs| -> Result<(), TError> {
            line.set_direction(Direction::Output)?;
            line.write_level(Level::Low)?;
            delay.delay_us(low_us);
            line.set_direction(Direction::Input)?;
            delay.delay_us(high_us);
            Ok(())
        });
        self.release_on_error(result)
    }

    /// Reads a single bit in one time slot.
    pub fn read_bit(&mut self) -> Result<bool, Error<TError>> {
        let timing = self.timing;
        let line = &mut self.line;
        let delay = &mut self.delay;
        let level = critical_section::with(|_cs| -> Result<Level, TError> {
            line.set_direction(Direction::Output)?;
            line.write_level(Level::Low)?;
            delay.delay_us(timing.read_start_low_us);
            line.set_direction(Direction::Input)?;
            delay.delay_us(timing.read_sample_us);
            let level = line.read_level()?;
            delay.delay_us(timing.read_recovery_us);
            Ok(level)
        });
        Ok(self.release_on_error(level)? == Level::High)
    }

    /// A slot that failed part-way may have left the line driven low. Try to let it go before
    /// reporting the error.
    fn release_on_error<T>(&mut self, result: Result<T, TError>) -> Result<T, Error<TError>> {
        if result.is_err() {
            let _ = self.line.set_direction(Direction::Input);
        }
        Ok(result?)
    }

    /// Writes a byte, least-significant bit first.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error<TError>> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(byte & 1 != 0)?;
            byte >>= 1;
        }
        Ok(())
    }

    /// Reads a byte, least-significant bit first.
    pub fn read_byte(&mut self) -> Result<u8, Error<TError>> {
        let mut byte = 0u8;
        for bit in 0..8 {
            if self.read_bit()? {
                byte |= 1 << bit;
            }
        }
        Ok(byte)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error<TError>> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Fills `output` with bytes read from the line.
    pub fn read_bytes(&mut self, output: &mut [u8]) -> Result<(), Error<TError>> {
        for byte in output.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    pub fn send_rom_command(&mut self, command: RomCommand) -> Result<(), Error<TError>> {
        self.write_byte(command as u8)
    }

    /// Resets the line, skips ROM selection, and sends `command` to the only device.
    pub fn send_function_command(&mut self, command: FunctionCommand) -> Result<(), Error<TError>> {
        self.reset()?;
        self.send_rom_command(RomCommand::Skip)?;
        self.write_byte(command as u8)
    }
}
