use crate::{Address, Command, Error, IoWire, OneWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum SearchState {
    #[default]
    Initialized,
    DeviceFound,
    End,
}

/// State of a ROM search, kept between calls to walk the device tree
#[derive(Clone, Default)]
pub struct DeviceSearch {
    address: [u8; 8],
    discrepancies: [u8; 8],
    state: SearchState,
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch::default()
    }

    /// Whether every device on the wire has already been reported
    pub fn is_finished(&self) -> bool {
        self.state == SearchState::End
    }

    fn is_bit_set_in_address(&self, bit: u8) -> bool {
        DeviceSearch::is_bit_set(&self.address, bit)
    }

    fn set_bit_in_address(&mut self, bit: u8) {
        DeviceSearch::set_bit(&mut self.address, bit);
    }

    fn reset_bit_in_address(&mut self, bit: u8) {
        DeviceSearch::reset_bit(&mut self.address, bit);
    }

    fn write_bit_in_address(&mut self, bit: u8, value: bool) {
        if value {
            self.set_bit_in_address(bit);
        } else {
            self.reset_bit_in_address(bit);
        }
    }

    fn is_bit_set_in_discrepancies(&self, bit: u8) -> bool {
        DeviceSearch::is_bit_set(&self.discrepancies, bit)
    }

    fn set_bit_in_discrepancy(&mut self, bit: u8) {
        DeviceSearch::set_bit(&mut self.discrepancies, bit);
    }

    fn reset_bit_in_discrepancy(&mut self, bit: u8) {
        DeviceSearch::reset_bit(&mut self.discrepancies, bit);
    }

    fn is_bit_set(array: &[u8], bit: u8) -> bool {
        if bit / 8 >= array.len() as u8 {
            return false;
        }
        let index = bit / 8;
        let offset = bit % 8;
        array[index as usize] & (0x01 << offset) != 0x00
    }

    fn set_bit(array: &mut [u8], bit: u8) {
        if bit / 8 >= array.len() as u8 {
            return;
        }
        let index = bit / 8;
        let offset = bit % 8;
        array[index as usize] |= 0x01 << offset
    }

    fn reset_bit(array: &mut [u8], bit: u8) {
        if bit / 8 >= array.len() as u8 {
            return;
        }
        let index = bit / 8;
        let offset = bit % 8;
        array[index as usize] &= !(0x01 << offset)
    }

    pub fn last_discrepancy(&self) -> Option<u8> {
        (0..Address::BITS)
            .rev()
            .find(|&i| self.is_bit_set_in_discrepancies(i))
    }
}

impl<E: Debug, W: IoWire<Error = E>, D: DelayNs> OneWire<W, D> {
    /// Restarts device enumeration from the first device
    pub fn reset_search(&mut self) {
        self.search = DeviceSearch::new();
    }

    /// Reports the next device of the enumeration started by [`OneWire::reset_search`]
    pub fn search_next(&mut self) -> Result<Option<Address>, Error<E>> {
        let mut rom = core::mem::take(&mut self.search);
        let result = self.search(&mut rom);
        self.search = rom;
        result
    }

    /// Heavily inspired by https://github.com/ntruchsess/arduino-OneWire/blob/85d1aae63ea4919c64151e03f7e24c2efbc40198/OneWire.cpp#L362
    pub(crate) fn search(&mut self, rom: &mut DeviceSearch) -> Result<Option<Address>, Error<E>> {
        if SearchState::End == rom.state {
            return Ok(None);
        }

        let mut discrepancy_found = false;
        let last_discrepancy = rom.last_discrepancy();

        if !self.reset_presence()? {
            return Ok(None);
        }

        self.write_command(Command::SearchRom)?;

        if let Some(last_discrepancy) = last_discrepancy {
            // walk previous path
            for i in 0..last_discrepancy {
                let bit0 = self.read_bit()?;
                let bit1 = self.read_bit()?;

                if bit0 && bit1 {
                    // no device responded
                    return Ok(None);
                } else {
                    let bit = rom.is_bit_set_in_address(i);
                    self.write_bit(bit)?;
                }
            }
        } else {
            // no discrepancy and device found, meaning the one found is the only one
            if rom.state == SearchState::DeviceFound {
                rom.state = SearchState::End;
                return Ok(None);
            }
        }

        for i in last_discrepancy.unwrap_or(0)..Address::BITS {
            let bit0 = self.read_bit()?; // normal bit
            let bit1 = self.read_bit()?; // complementary bit

            if last_discrepancy.eq(&Some(i)) {
                // be sure to go different path from before (go second path, thus writing 1)
                rom.reset_bit_in_discrepancy(i);
                rom.set_bit_in_address(i);
                self.write_bit(true)?;
            } else {
                if bit0 && bit1 {
                    // no response received
                    return Ok(None);
                }

                if !bit0 && !bit1 {
                    // addresses with 0 and 1
                    // found new path, go first path by default (thus writing 0)
                    discrepancy_found = true;
                    rom.set_bit_in_discrepancy(i);
                    rom.reset_bit_in_address(i);
                    self.write_bit(false)?;
                } else {
                    // addresses only with bit0
                    rom.write_bit_in_address(i, bit0);
                    self.write_bit(bit0)?;
                }
            }
        }

        if !discrepancy_found && rom.last_discrepancy().is_none() {
            rom.state = SearchState::End;
        } else {
            rom.state = SearchState::DeviceFound;
        }
        Ok(Some(Address::from(rom.address)))
    }
}

#[cfg(test)]
mod tests {
    use super::DeviceSearch;
    use crate::driver::tests::{NoDelay, StuckWire, ZeroDevice};
    use crate::{Address, OneWire};

    #[test]
    fn bit_helpers() {
        let mut search = DeviceSearch::new();
        search.set_bit_in_address(9);
        assert!(search.is_bit_set_in_address(9));
        assert_eq!(search.address[1], 0x02);
        search.write_bit_in_address(9, false);
        assert!(!search.is_bit_set_in_address(9));
        // out of range bits are ignored
        search.set_bit_in_address(Address::BITS);
        assert_eq!(search.address, [0; 8]);
    }

    #[test]
    fn last_discrepancy_is_highest_marked_bit() {
        let mut search = DeviceSearch::new();
        assert_eq!(search.last_discrepancy(), None);
        search.set_bit_in_discrepancy(3);
        search.set_bit_in_discrepancy(40);
        assert_eq!(search.last_discrepancy(), Some(40));
        search.reset_bit_in_discrepancy(40);
        assert_eq!(search.last_discrepancy(), Some(3));
    }

    #[test]
    fn search_on_empty_wire_finds_nothing() {
        let mut wire = OneWire::new(StuckWire(true), NoDelay);
        wire.reset_search();
        assert_eq!(wire.search_next().unwrap(), None);
    }

    #[test]
    fn search_walks_conflicting_bits() {
        // every id and complement bit reads 0, so each bit is a discrepancy
        let mut wire = OneWire::new(ZeroDevice::default(), NoDelay);
        wire.reset_search();
        assert_eq!(wire.search_next().unwrap(), Some(Address::default()));
        assert_eq!(wire.search.last_discrepancy(), Some(Address::BITS - 1));
        assert!(!wire.search.is_finished());

        let next = wire.search_next().unwrap().unwrap();
        assert_eq!(next[7], 0x80);

        wire.reset_search();
        assert_eq!(wire.search.last_discrepancy(), None);
    }
}
