use crate::{Address, Command, DeviceSearch, Error, IoWire, OpCode};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Bit-banged OneWire bus master
///
/// Owns the data line, the delay used for slot timing and the state of the
/// ongoing device enumeration.
pub struct OneWire<W: IoWire, D: DelayNs> {
    io_wire: W,
    delay: D,
    pub(crate) search: DeviceSearch,
}

impl<E: Debug, W: IoWire<Error = E>, D: DelayNs> OneWire<W, D> {
    pub fn new(io_wire: W, delay: D) -> Self {
        OneWire {
            io_wire,
            delay,
            search: DeviceSearch::new(),
        }
    }

    /// Gives back the wire and the delay
    pub fn release(self) -> (W, D) {
        (self.io_wire, self.delay)
    }

    pub fn skip(&mut self) -> Result<(), Error<E>> {
        self.write_command(Command::SkipRom)?; // skip
        Ok(())
    }

    pub fn select(&mut self, addr: &Address) -> Result<(), Error<E>> {
        self.write_command(Command::MatchRom)?; // select
        self.write_bytes(addr.as_ref())?;
        Ok(())
    }

    /// Performs a reset and listens for a presence pulse
    /// Returns Err(WireFault) if the wire seems to be shortened,
    /// Err(NoPresence) if no device answered but the wire seems to be ok
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        self.set_high()?;
        self.ensure_wire_high()?;
        self.set_low()?;

        self.delay.delay_us(480);
        self.set_high()?;

        let mut presence = false;
        for _ in 0..7 {
            self.delay.delay_us(10);
            presence |= self.is_low()?;
        }
        self.delay.delay_us(410);
        if presence {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    /// Like [`OneWire::reset`], but reports a missing presence pulse as `Ok(false)`
    pub fn reset_presence(&mut self) -> Result<bool, Error<E>> {
        self.reset().map(|_| true).or_else(|error| {
            if matches!(error, Error::NoPresence) {
                Ok(false)
            } else {
                Err(error)
            }
        })
    }

    fn ensure_wire_high(&mut self) -> Result<(), Error<E>> {
        for _ in 0..125 {
            if self.is_high()? {
                return Ok(());
            }
            self.delay.delay_us(2);
        }
        Err(Error::WireFault)
    }

    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte()?;
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit()? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub fn read_bit(&mut self) -> Result<bool, E> {
        self.set_low()?;
        self.delay.delay_us(3);
        self.set_high()?;
        self.delay.delay_us(2);
        let val = self.is_high();
        self.delay.delay_us(61);
        val
    }

    pub fn write_command(&mut self, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(cmd.op_code())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(*b)?;
        }
        Ok(())
    }

    /// Writes a byte, LSB first
    pub fn write_byte(&mut self, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit((byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub fn write_bit(&mut self, high: bool) -> Result<(), E> {
        self.set_low()?;
        self.delay.delay_us(if high { 10 } else { 65 });
        self.set_high()?;
        self.delay.delay_us(if high { 55 } else { 5 });
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn set_high(&mut self) -> Result<(), E> {
        self.io_wire.set_high()
    }

    #[inline(always)]
    pub(crate) fn set_low(&mut self) -> Result<(), E> {
        self.io_wire.set_low()
    }

    #[inline(always)]
    pub(crate) fn is_high(&mut self) -> Result<bool, E> {
        self.io_wire.is_high()
    }

    #[inline(always)]
    pub(crate) fn is_low(&mut self) -> Result<bool, E> {
        self.io_wire.is_low()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::OneWire;
    use crate::{Error, IoWire};
    use core::convert::Infallible;
    use embedded_hal::delay::DelayNs;

    pub struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    /// Line with a fixed level, as seen on an empty or shorted bus
    pub struct StuckWire(pub bool);

    impl IoWire for StuckWire {
        type Error = Infallible;

        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0)
        }

        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    /// Line with a device that answers a reset with a presence pulse and then
    /// pulls every read slot low
    #[derive(Default)]
    pub struct ZeroDevice {
        driven_low: bool,
        answering: bool,
        pub falling_edges: usize,
    }

    impl IoWire for ZeroDevice {
        type Error = Infallible;

        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(!self.driven_low && !self.answering)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.driven_low = true;
            self.falling_edges += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.answering = self.driven_low;
            self.driven_low = false;
            Ok(())
        }
    }

    #[test]
    fn reset_on_shorted_wire_is_a_fault() {
        let mut wire = OneWire::new(StuckWire(false), NoDelay);
        assert!(matches!(wire.reset(), Err(Error::WireFault)));
        assert!(matches!(wire.reset_presence(), Err(Error::WireFault)));
    }

    #[test]
    fn reset_on_empty_wire_has_no_presence() {
        let mut wire = OneWire::new(StuckWire(true), NoDelay);
        assert!(matches!(wire.reset(), Err(Error::NoPresence)));
        assert!(!wire.reset_presence().unwrap());
    }

    #[test]
    fn reset_detects_presence_pulse() {
        let mut wire = OneWire::new(ZeroDevice::default(), NoDelay);
        assert!(wire.reset_presence().unwrap());
    }

    #[test]
    fn reads_from_idle_wire_are_ones() {
        let mut wire = OneWire::new(StuckWire(true), NoDelay);
        assert!(wire.read_bit().unwrap());
        assert_eq!(wire.read_byte().unwrap(), 0xFF);
    }

    #[test]
    fn reads_while_device_pulls_low_are_zeros() {
        let mut wire = OneWire::new(ZeroDevice::default(), NoDelay);
        let mut buf = [0xAA; 2];
        wire.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x00]);
    }

    #[test]
    fn select_writes_command_and_address() {
        let mut wire = OneWire::new(ZeroDevice::default(), NoDelay);
        wire.select(&crate::Address::default()).unwrap();
        // one slot per bit of the command byte and the eight address bytes
        let (wire, _) = wire.release();
        assert_eq!(wire.falling_edges, 9 * 8);
    }
}
