use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Electrical access to the data line
///
/// The line is open-drain: `set_high` releases it to the pull-up resistor and
/// `set_low` actively pulls it down.
pub trait IoWire {
    type Error: Error;

    /// Is the line high?
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Is the line low?
    fn is_low(&mut self) -> Result<bool, Self::Error>;

    /// Pulls the line low
    fn set_low(&mut self) -> Result<(), Self::Error>;

    /// Releases the line
    ///
    /// *NOTE* the line reads high only when no device keeps pulling it down
    fn set_high(&mut self) -> Result<(), Self::Error>;
}

/// Single open-drain pin config wrapper
impl<IO> IoWire for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

/// Separate input and output pins config wrapper
impl<E, I, O> IoWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }
}

/// Inverted pin wrapper, for level shifters and transistor drivers
pub struct Inverted<P>(pub P);

impl<I: ErrorType> ErrorType for Inverted<I> {
    type Error = I::Error;
}

impl<I> InputPin for Inverted<I>
where
    I: InputPin,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

impl<O> OutputPin for Inverted<O>
where
    O: OutputPin,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }
}

#[cfg(test)]
mod tests {
    use super::{Inverted, IoWire};
    use core::convert::Infallible;
    use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

    #[derive(Default)]
    struct Pin {
        high: bool,
    }

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl InputPin for Pin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.high)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.high)
        }
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    #[test]
    fn single_pin_follows_output() {
        let mut wire = (Pin::default(),);
        wire.set_high().unwrap();
        assert!(wire.is_high().unwrap());
        wire.set_low().unwrap();
        assert!(wire.is_low().unwrap());
    }

    #[test]
    fn inverted_pin_flips_levels() {
        let mut wire = (Inverted(Pin::default()),);
        wire.set_high().unwrap();
        assert!(!wire.0 .0.high);
        assert!(wire.is_high().unwrap());
        wire.set_low().unwrap();
        assert!(wire.0 .0.high);
        assert!(wire.is_low().unwrap());
    }
}
