use core::future::Future;
use core::time::Duration;
use embedded_hal::delay::DelayNs;

use crate::crc::check_crc8;
use crate::error::Error;
use crate::gpio::GpioLine;
use crate::onewire::{FunctionCommand, OneWire, RomCommand, Timing};
use crate::Measurement;

/// The maximum resolution of the sensor when in 12-bit mode.
pub const MAX_RESOLUTION_F32: f32 = 0.0625;

/// Family code of the DS18S20 and DS1820, which report half degrees plus a remainder count.
pub const FAMILY_DS18S20: u8 = 0x10;
pub const FAMILY_DS1822: u8 = 0x22;
pub const FAMILY_DS18B20: u8 = 0x28;

/// Count of the DS18S20 remainder register per degree.
const COUNT_PER_C: i16 = 16;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Nine-bit resolution reads the temperature in 0.5 degree increments.
    NineBit = 0b00,
    /// Ten-bit resolution reads the temperature in 0.25 degree increments.
    TenBit = 0b01,
    /// Eleven-bit resolution reads the temperature in 0.125 degree increments.
    ElevenBit = 0b10,
    /// Twelve-bit resolution reads the temperature in 0.0625 degree increments.
    TwelveBit = 0b11,
}

impl ResolutionMode {
    /// Reads the mode from the R0/R1 bits of the configuration register.
    pub fn from_configuration_byte(config: u8) -> ResolutionMode {
        match (config >> 5) & 0b11 {
            0b00 => ResolutionMode::NineBit,
            0b01 => ResolutionMode::TenBit,
            0b10 => ResolutionMode::ElevenBit,
            _ => ResolutionMode::TwelveBit,
        }
    }

    pub fn get_configuration_byte(self) -> u8 {
        ((self as u8) << 5) | 0b1_1111
    }

    /// The undefined low bits of the temperature LSB are cleared by this mask.
    fn lsb_mask(self) -> u8 {
        match self {
            ResolutionMode::NineBit => 0xF8,
            ResolutionMode::TenBit => 0xFC,
            ResolutionMode::ElevenBit => 0xFE,
            ResolutionMode::TwelveBit => 0xFF,
        }
    }
}

/// The device's 64-bit ROM code: family code, 48-bit serial, CRC.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RomCode(pub [u8; 8]);

impl RomCode {
    pub fn family_code(&self) -> u8 {
        self.0[0]
    }

    pub fn serial(&self) -> u64 {
        let mut copy = [0u8; 8];
        copy[..6].copy_from_slice(&self.0[1..7]);
        u64::from_le_bytes(copy)
    }

    pub fn crc(&self) -> u8 {
        self.0[7]
    }

    pub fn is_valid(&self) -> bool {
        check_crc8(&self.0)
    }
}

/// The 9-byte scratchpad, CRC last.
///
/// 1. Byte 0: Temperature least-significant byte.
/// 2. Byte 1: Temperature most-significant byte.
/// 3. Byte 2: High temperature threshold for the alarm (T<sub>H</sub>).
/// 4. Byte 3: Low temperature threshold for the alarm (T<sub>L</sub>).
/// 5. Byte 4: Configuration (i.e. [`ResolutionMode`]). Reserved on the DS18S20.
/// 6. Byte 5: Reserved (0xFF)
/// 7. Byte 6: Reserved, or COUNT REMAIN on the DS18S20.
/// 8. Byte 7: Reserved (0x10), or COUNT PER °C on the DS18S20.
/// 9. Byte 8: The CRC byte.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scratchpad(pub [u8; 9]);

impl Scratchpad {
    pub fn resolution(&self) -> ResolutionMode {
        ResolutionMode::from_configuration_byte(self.0[4])
    }

    pub fn count_remain(&self) -> u8 {
        self.0[6]
    }

    pub fn is_valid(&self) -> bool {
        check_crc8(&self.0)
    }
}

/// Represents a temperature reading from the sensor, in sixteenths of a degree Celsius.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Temperature {
    sixteenths: i16,
}

impl Temperature {
    pub fn from_sixteenths(sixteenths: i16) -> Temperature {
        Temperature { sixteenths }
    }

    /// Decodes the two's complement temperature register of a DS18B20 or DS1822.
    pub fn from_bytes(low_sig: u8, high_sig: u8) -> Temperature {
        Temperature::from_sixteenths(i16::from_le_bytes([low_sig, high_sig]))
    }

    pub fn sixteenths(&self) -> i16 {
        self.sixteenths
    }

    /// The integer part of the temperature measurement, rounded towards zero.
    pub fn integer_part(&self) -> i16 {
        self.sixteenths / 16
    }

    /// The decimal part of the temperature measurement, in sixteenths.
    ///
    /// Has the same sign as the temperature. Can be multiplied by [`MAX_RESOLUTION_F32`] to
    /// convert it to a floating point value.
    pub fn decimal_part(&self) -> i8 {
        (self.sixteenths % 16) as i8
    }

    /// The nearest integer of the temperature measurement, with halves rounded away from zero.
    ///
    /// Calculated without performing floating-point operations.
    pub fn nearest_integer(&self) -> i16 {
        let decimal = self.decimal_part();
        self.integer_part() + (decimal.signum() * (decimal.abs() >> 3)) as i16
    }

    /// The temperature in thousandths of a degree, truncated towards zero.
    pub fn millidegrees(&self) -> i32 {
        self.sixteenths as i32 * 1000 / 16
    }
}

impl From<Temperature> for f32 {
    fn from(temp: Temperature) -> Self {
        temp.sixteenths as f32 * MAX_RESOLUTION_F32
    }
}

impl From<Temperature> for f64 {
    fn from(temp: Temperature) -> Self {
        temp.sixteenths as f64 * MAX_RESOLUTION_F32 as f64
    }
}

impl Measurement for Temperature {
    fn temperature(&self) -> f32 {
        f32::from(*self)
    }

    fn humidity(&self) -> Option<f32> {
        None
    }
}

/// Converts a CRC-checked scratchpad into a temperature, based on the device family.
pub fn decode_temperature(family_code: u8, scratchpad: &Scratchpad) -> Temperature {
    let bytes = &scratchpad.0;
    if family_code == FAMILY_DS18S20 {
        // Half degrees, sign in the MSB. Drop the half bit, then refine with the remainder:
        // T = whole - 0.25 + (COUNT_PER_C - COUNT_REMAIN) / COUNT_PER_C
        // A frame can pass its CRC with a sign byte other than 0x00 or 0xFF, so the result is
        // saturated into range.
        let whole = (i16::from_le_bytes([bytes[0], bytes[1]]) >> 1) as i32;
        let sixteenths =
            whole * 16 - 4 + (COUNT_PER_C as i32 - scratchpad.count_remain() as i32);
        let sixteenths = sixteenths.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        return Temperature::from_sixteenths(sixteenths);
    }
    let mask = scratchpad.resolution().lsb_mask();
    Temperature::from_bytes(bytes[0] & mask, bytes[1])
}

/// Options to modify the behavior of the DS18B20 driver.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// How long to wait for the temperature conversion to complete.
    ///
    /// A 12-bit conversion takes up to 750ms.
    pub conversion_time: Duration,
    /// How long to hold the line idle after copying the scratchpad to EEPROM.
    pub eeprom_write_time: Duration,
    /// Whether to reconfigure devices running below 12-bit resolution.
    ///
    /// The configuration is written to the device's EEPROM, so it only happens once per device.
    pub fix_resolution: bool,
}

pub const DEFAULT_OPTIONS: Options = Options {
    conversion_time: Duration::from_millis(1000),
    eeprom_write_time: Duration::from_millis(30),
    fix_resolution: true,
};

/// The minimum time a conversion can be given, at 9-bit resolution.
pub const MIN_CONVERSION_TIME: Duration = Duration::from_micros(93_750);

/// The EEPROM copy takes up to 10ms, during which the line must stay high.
pub const MIN_EEPROM_WRITE_TIME: Duration = Duration::from_millis(10);

/// A DS18B20-family temperature sensor, alone on a 1-Wire line.
#[derive(Debug)]
pub struct Ds18b20<TLine, TDelay> {
    bus: OneWire<TLine, TDelay>,
    options: Options,
}

impl<TLine, TError, TDelay> Ds18b20<TLine, TDelay>
where
    TLine: GpioLine<Error = TError>,
    TDelay: DelayNs,
{
    /// Constructs a sensor that reads from the given line.
    ///
    /// If `timing` or `options` are `None`, the defaults are used (see
    /// [`crate::onewire::DEFAULT_TIMING`] and [`DEFAULT_OPTIONS`]).
    pub fn new(
        line: TLine,
        delay: TDelay,
        timing: Option<Timing>,
        options: Option<Options>,
    ) -> Result<Ds18b20<TLine, TDelay>, Error<TError>> {
        let options = options.unwrap_or(DEFAULT_OPTIONS);
        if options.conversion_time < MIN_CONVERSION_TIME
            || options.eeprom_write_time < MIN_EEPROM_WRITE_TIME
        {
            return Err(Error::InvalidArgument);
        }
        Ok(Ds18b20 {
            bus: OneWire::new(line, delay, timing)?,
            options,
        })
    }

    pub fn into_bus(self) -> OneWire<TLine, TDelay> {
        self.bus
    }

    /// Reads the temperature.
    ///
    /// Reads the ROM to learn the device family, starts a conversion, and waits for it using
    /// the provided `delay_fn`. This is the only point where other work can run; every time slot
    /// is blocking and runs with interrupts disabled. The provided function needs to be capable
    /// of millisecond precision or better.
    ///
    /// If the device reports less than 12-bit resolution and [`Options::fix_resolution`] is set,
    /// the device is reconfigured after the read, so the returned value still has the coarser
    /// resolution. A failed reconfiguration does not fail the read.
    pub async fn read<DelayFn, EmptyFuture>(
        &mut self,
        delay_fn: DelayFn,
    ) -> Result<Temperature, Error<TError>>
    where
        DelayFn: Fn(Duration) -> EmptyFuture,
        EmptyFuture: Future<Output = ()>,
    {
        let rom = self.read_rom()?;
        self.start_conversion()?;
        delay_fn(self.options.conversion_time).await;
        let scratchpad = self.read_scratchpad()?;
        let temperature = decode_temperature(rom.family_code(), &scratchpad);

        if rom.family_code() != FAMILY_DS18S20
            && self.options.fix_resolution
            && scratchpad.resolution() != ResolutionMode::TwelveBit
        {
            #[cfg(feature = "defmt")]
            defmt::info!(
                "ds18b20: raising resolution from {}",
                scratchpad.resolution()
            );
            // The reading is already checked, so a failed fix is retried on the next read.
            if self.set_resolution(ResolutionMode::TwelveBit).is_err() {
                #[cfg(feature = "defmt")]
                defmt::warn!("ds18b20: failed to raise resolution");
            }
        }
        Ok(temperature)
    }

    /// Reads and checks the ROM code of the only device on the line.
    pub fn read_rom(&mut self) -> Result<RomCode, Error<TError>> {
        self.bus.reset()?;
        self.bus.send_rom_command(RomCommand::Read)?;
        let mut rom = RomCode([0u8; 8]);
        self.bus.read_bytes(&mut rom.0)?;
        if !rom.is_valid() {
            #[cfg(feature = "defmt")]
            defmt::warn!("ds18b20: ROM CRC mismatch {}", rom);
            return Err(Error::ChecksumMismatch);
        }
        Ok(rom)
    }

    /// Asks the device to start a temperature conversion. Returns immediately.
    pub fn start_conversion(&mut self) -> Result<(), Error<TError>> {
        self.bus
            .send_function_command(FunctionCommand::ConvertTemperature)
    }

    /// Reads and checks the scratchpad.
    pub fn read_scratchpad(&mut self) -> Result<Scratchpad, Error<TError>> {
        self.bus
            .send_function_command(FunctionCommand::ReadScratchpad)?;
        let mut scratchpad = Scratchpad([0u8; 9]);
        self.bus.read_bytes(&mut scratchpad.0)?;
        if !scratchpad.is_valid() {
            #[cfg(feature = "defmt")]
            defmt::warn!("ds18b20: scratchpad CRC mismatch {}", scratchpad);
            return Err(Error::ChecksumMismatch);
        }
        Ok(scratchpad)
    }

    /// Writes a new resolution to the scratchpad and persists it to EEPROM.
    ///
    /// The alarm thresholds are cleared.
    pub fn set_resolution(&mut self, mode: ResolutionMode) -> Result<(), Error<TError>> {
        self.bus
            .send_function_command(FunctionCommand::WriteScratchpad)?;
        // T_H and T_L alarm placeholders, then the configuration register.
        self.bus
            .write_bytes(&[0x00, 0x00, mode.get_configuration_byte()])?;
        self.bus
            .send_function_command(FunctionCommand::CopyScratchpad)?;
        self.bus
            .delay_ms(self.options.eeprom_write_time.as_millis() as u32);
        Ok(())
    }
}
