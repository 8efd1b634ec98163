use embedded_hal::digital::{InputPin, OutputPin};

/// Whether the line is driven by the host or left floating for the device to drive.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// High-impedance. The pull-up (or the device) decides the level.
    Input,
    /// Driven by the host.
    Output,
}

/// The electrical level of the line.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(is_high: bool) -> Level {
        if is_high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// A single data pin that can be switched between driving and sampling the line.
///
/// Implementations should be as close to a register write as the platform allows: the
/// transports call these methods inside microsecond-scale time slots. Writing while the
/// direction is [`Direction::Input`], or reading while it is [`Direction::Output`], is a caller
/// bug and the result is unspecified.
pub trait GpioLine {
    type Error;

    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error>;

    fn write_level(&mut self, level: Level) -> Result<(), Self::Error>;

    fn read_level(&mut self) -> Result<Level, Self::Error>;

    /// Non-blocking check for `level`, for use with [`crate::delay::spin_until`].
    #[inline]
    fn poll_level(&mut self, level: Level) -> nb::Result<(), Self::Error> {
        if self.read_level().map_err(nb::Error::Other)? == level {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<L: GpioLine + ?Sized> GpioLine for &mut L {
    type Error = L::Error;

    #[inline]
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error> {
        (**self).set_direction(direction)
    }

    #[inline]
    fn write_level(&mut self, level: Level) -> Result<(), Self::Error> {
        (**self).write_level(level)
    }

    #[inline]
    fn read_level(&mut self) -> Result<Level, Self::Error> {
        (**self).read_level()
    }
}

/// Adapts an `embedded-hal` open-drain pin into a [`GpioLine`].
///
/// An open-drain output that is set high stops sinking current, so switching to
/// [`Direction::Input`] releases the line by setting the pin high. The pin must be configured
/// as open-drain with a pull-up (internal or external) before it is handed over.
#[derive(Debug)]
pub struct OpenDrainLine<P> {
    pin: P,
    direction: Direction,
}

impl<P, E> OpenDrainLine<P>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
{
    /// Wraps `pin` and releases the line.
    pub fn new(mut pin: P) -> Result<OpenDrainLine<P>, E> {
        pin.set_high()?;
        Ok(OpenDrainLine {
            pin,
            direction: Direction::Input,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P, E> GpioLine for OpenDrainLine<P>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
{
    type Error = E;

    #[inline]
    fn set_direction(&mut self, direction: Direction) -> Result<(), E> {
        if direction == Direction::Input {
            self.pin.set_high()?;
        }
        self.direction = direction;
        Ok(())
    }

    #[inline]
    fn write_level(&mut self, level: Level) -> Result<(), E> {
        match level {
            Level::Low => self.pin.set_low(),
            Level::High => self.pin.set_high(),
        }
    }

    #[inline]
    fn read_level(&mut self) -> Result<Level, E> {
        Ok(Level::from(self.pin.is_high()?))
    }
}
