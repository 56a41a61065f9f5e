use crate::{compute_crc8, Address, Error, IoWire, OneWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Transactions a OneWire bus master offers to device drivers
///
/// Every call is blocking. Electrical faults come back as `Err`; whether a
/// device answered is reported in the `Ok` value.
pub trait Bus {
    type Error: Sized + Debug;

    /// Issues a reset pulse, returns whether any device answered with a presence pulse
    fn reset(&mut self) -> Result<bool, Error<Self::Error>>;

    /// Restarts device enumeration
    fn reset_search(&mut self);

    /// Advances the enumeration, filling `address` when a device was found
    fn search(&mut self, address: &mut Address) -> Result<bool, Error<Self::Error>>;

    fn crc8(&self, data: &[u8]) -> u8 {
        compute_crc8(data)
    }

    /// Addresses a single device for the following commands
    fn select(&mut self, address: &Address) -> Result<(), Error<Self::Error>>;

    /// Addresses every device on the wire for the following commands
    fn skip(&mut self) -> Result<(), Error<Self::Error>>;

    /// Sends a byte, `hold_power` keeps feeding a parasite powered device afterwards
    fn write(&mut self, byte: u8, hold_power: bool) -> Result<(), Error<Self::Error>>;

    fn read(&mut self) -> Result<u8, Error<Self::Error>>;

    fn read_bit(&mut self) -> Result<bool, Error<Self::Error>>;
}

impl<E: Debug, W: IoWire<Error = E>, D: DelayNs> Bus for OneWire<W, D> {
    type Error = E;

    fn reset(&mut self) -> Result<bool, Error<E>> {
        self.reset_presence()
    }

    fn reset_search(&mut self) {
        OneWire::reset_search(self)
    }

    fn search(&mut self, address: &mut Address) -> Result<bool, Error<E>> {
        Ok(match self.search_next()? {
            Some(found) => {
                *address = found;
                true
            }
            None => false,
        })
    }

    fn select(&mut self, address: &Address) -> Result<(), Error<E>> {
        OneWire::select(self, address)
    }

    fn skip(&mut self) -> Result<(), Error<E>> {
        OneWire::skip(self)
    }

    fn write(&mut self, byte: u8, _hold_power: bool) -> Result<(), Error<E>> {
        // every slot ends with the line released to the pull-up
        Ok(self.write_byte(byte)?)
    }

    fn read(&mut self) -> Result<u8, Error<E>> {
        Ok(self.read_byte()?)
    }

    fn read_bit(&mut self) -> Result<bool, Error<E>> {
        Ok(OneWire::read_bit(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::Bus;
    use crate::driver::tests::{NoDelay, StuckWire, ZeroDevice};
    use crate::{Address, OneWire};

    #[test]
    fn reset_reports_presence() {
        let mut empty = OneWire::new(StuckWire(true), NoDelay);
        assert!(!Bus::reset(&mut empty).unwrap());

        let mut occupied = OneWire::new(ZeroDevice::default(), NoDelay);
        assert!(Bus::reset(&mut occupied).unwrap());
    }

    #[test]
    fn search_leaves_address_alone_when_nothing_answers() {
        let mut wire = OneWire::new(StuckWire(true), NoDelay);
        let mut address = Address::from([0x28, 1, 2, 3, 4, 5, 6, 7]);
        Bus::reset_search(&mut wire);
        assert!(!Bus::search(&mut wire, &mut address).unwrap());
        assert_eq!(address.family_code(), 0x28);
    }

    #[test]
    fn read_bit_polls_the_line() {
        let mut idle = OneWire::new(StuckWire(true), NoDelay);
        assert!(Bus::read_bit(&mut idle).unwrap());
        assert_eq!(Bus::read(&mut idle).unwrap(), 0xFF);

        let mut busy = OneWire::new(ZeroDevice::default(), NoDelay);
        assert!(!Bus::read_bit(&mut busy).unwrap());
    }

    #[test]
    fn default_crc8_matches_rom_codes() {
        let wire = OneWire::new(StuckWire(true), NoDelay);
        assert_eq!(
            wire.crc8(&[0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00]),
            0xA2
        );
    }
}
