//! Bit-banged drivers for single-wire environmental sensors.
//!
//! Everything runs on one GPIO line with busy-wait timing: no timer peripheral, no
//! interrupt-driven capture. Two sensor families are supported:
//!
//! - DHT11/DHT22 humidity and temperature sensors ([`dhtxx`]);
//! - DS18B20-family 1-Wire temperature sensors ([`ds18b20`] on top of [`onewire`]), with a
//!   single device on the line.
//!
//! Time slots run inside [`critical_section::with`], so the platform must provide a
//! `critical-section` implementation that masks interrupts.
#![no_std]

/// Dallas/Maxim CRC-8, as used by 1-Wire devices.
pub mod crc;
/// Cycle-counter delays and bounded spin-waits.
pub mod delay;
/// Universal drivers for reading from DHT11 or DHT22 sensors.
pub mod dhtxx;
/// Reading temperatures from DS18B20, DS1822 and DS18S20 sensors.
///
/// Refer to [this datasheet](https://datasheets.maximintegrated.com/en/ds/DS18B20.pdf) for more
/// information about these devices.
pub mod ds18b20;
pub mod error;
/// The single pin the transports talk over.
pub mod gpio;
/// Bit-banged 1-Wire transport.
pub mod onewire;

pub use error::Error;

/// A physical reading from any of the supported sensors.
pub trait Measurement {
    /// Temperature in degrees Celsius.
    fn temperature(&self) -> f32;

    /// Relative humidity in percent, if the sensor measures it.
    fn humidity(&self) -> Option<f32>;
}
