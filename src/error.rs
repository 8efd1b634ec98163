use core::fmt;

/// Errors returned by the transports and sensor drivers.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error<TLineError> {
    /// Wrapped error from the GPIO line.
    Line(TLineError),
    /// Invalid timing or options were provided.
    InvalidArgument,
    /// No presence pulse or handshake was seen. The sensor is disconnected or not powered.
    DeviceAbsent,
    /// An expected edge did not arrive while the data frame was being captured.
    FrameTimeout,
    /// The captured frame did not match its trailing checksum.
    ChecksumMismatch,
}

impl<TLineError> Error<TLineError> {
    /// Whether the failure is likely to go away on the next attempt.
    ///
    /// Absent devices and missed edges are usually caused by timing jitter or a sensor that is
    /// still busy. A checksum mismatch that repeats points at wiring or a damaged device.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::DeviceAbsent | Error::FrameTimeout)
    }
}

impl<TLineError> From<TLineError> for Error<TLineError> {
    fn from(error: TLineError) -> Error<TLineError> {
        Error::Line(error)
    }
}

impl<TLineError> fmt::Display for Error<TLineError>
where
    TLineError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Line(err) => write!(f, "GPIO line error: {:?}", err),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::DeviceAbsent => write!(f, "no device responded on the line"),
            Error::FrameTimeout => write!(f, "timed out while capturing the data frame"),
            Error::ChecksumMismatch => write!(f, "checksum mismatch"),
        }
    }
}
