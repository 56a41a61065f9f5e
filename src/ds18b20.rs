//! Integer-only driver for a single DS18B20 on the bus

use byteorder::{BigEndian, ByteOrder};

use crate::{Address, Bus, Error, OpCode};

/// Returned by [`Ds18b20Int::temp_c`] when the reading points to a lost device
pub const DEVICE_DISCONNECTED: i16 = -127;

/// Discovery attempts used when the resolution is changed
pub const DEFAULT_RETRIES: u8 = 3;

/// Lowest temperature the sensor is rated for, in °C
pub const MIN_TEMPERATURE_C: i16 = -55;

/// Alarm thresholds written along with the configuration, not used otherwise
const ALARM_LOW: u8 = 0;
const ALARM_HIGH: u8 = 100;

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Conversion resolution, stored as the configuration register value
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Resolution {
    #[default]
    Bits9 = 0b0001_1111,
    Bits10 = 0b0011_1111,
    Bits11 = 0b0101_1111,
    Bits12 = 0b0111_1111,
}

impl Resolution {
    /// Maps a bit width to a resolution, anything unknown falls back to 9 bits
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            12 => Resolution::Bits12,
            11 => Resolution::Bits11,
            10 => Resolution::Bits10,
            _ => Resolution::Bits9,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Resolution::Bits9 => 9,
            Resolution::Bits10 => 10,
            Resolution::Bits11 => 11,
            Resolution::Bits12 => 12,
        }
    }

    pub fn config_register(&self) -> u8 {
        *self as _
    }

    pub fn from_config_register(reg: u8) -> Option<Self> {
        match reg {
            0b0001_1111 => Some(Resolution::Bits9),
            0b0011_1111 => Some(Resolution::Bits10),
            0b0101_1111 => Some(Resolution::Bits11),
            0b0111_1111 => Some(Resolution::Bits12),
            _ => None,
        }
    }

    /// Worst case conversion time
    pub fn conversion_time_ms(&self) -> u16 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }
}

/// Whole degrees Celsius, or [`DEVICE_DISCONNECTED`] below the rated minimum
pub fn raw_to_celsius(raw: i16) -> i16 {
    let celsius = raw >> 4;
    if celsius < MIN_TEMPERATURE_C {
        DEVICE_DISCONNECTED
    } else {
        celsius
    }
}

/// Hundredths of a degree Celsius, `raw * 100 / 16` rounded towards negative infinity
pub fn raw_to_centi_celsius(raw: i16) -> i32 {
    (i32::from(raw) * 25) >> 2
}

/// Driver for the first DS18B20 found on the bus
///
/// Call [`Ds18b20Int::begin`] once, then alternate
/// [`Ds18b20Int::request_temperatures`] with one of the temperature getters,
/// leaving [`Resolution::conversion_time_ms`] in between or polling
/// [`Ds18b20Int::is_conversion_complete`].
pub struct Ds18b20Int<B: Bus> {
    bus: B,
    address: Address,
    address_found: bool,
    resolution: Resolution,
}

impl<B: Bus> Ds18b20Int<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            address: Address::default(),
            address_found: false,
            resolution: Resolution::default(),
        }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn release(self) -> B {
        self.bus
    }

    /// Looks for a device up to `retries` times and writes the configuration to it
    ///
    /// Returns whether a device with a valid address was found.
    pub fn begin(&mut self, retries: u8) -> Result<bool, Error<B::Error>> {
        self.address_found = false;
        for attempt in 0..retries {
            // a faulty attempt counts as not found, the next one may succeed
            self.address_found = match self.discover() {
                Ok(found) => found,
                Err(error) => {
                    log::debug!("discovery attempt {} failed: {}", attempt + 1, error);
                    false
                }
            };
            if self.address_found {
                break;
            }
        }

        if self.address_found {
            log::debug!("found device {}", self.address);
            self.bus.reset()?;
            self.bus.select(&self.address)?;
            self.bus.write(Command::WriteScratchpad.op_code(), false)?;
            self.bus.write(ALARM_LOW, false)?;
            self.bus.write(ALARM_HIGH, false)?;
            self.bus.write(self.resolution.config_register(), false)?;
            self.bus.reset()?;
            log::debug!("configured {}-bit resolution", self.resolution.bits());
        } else {
            log::debug!("no device found after {} attempts", retries);
        }
        Ok(self.address_found)
    }

    fn discover(&mut self) -> Result<bool, Error<B::Error>> {
        self.bus.reset()?;
        self.bus.reset_search();
        self.address[0] = 0x00;
        self.bus.search(&mut self.address)?;
        Ok(self.address.family_code() != 0x00
            && self.bus.crc8(self.address.crc_data()) == self.address.crc())
    }

    /// Liveness probe, runs the same discovery as [`Ds18b20Int::begin`]
    pub fn is_connected(&mut self, retries: u8) -> Result<bool, Error<B::Error>> {
        self.begin(retries)
    }

    /// Starts a conversion on every device on the bus without waiting for it
    pub fn request_temperatures(&mut self) -> Result<(), Error<B::Error>> {
        self.bus.reset()?;
        self.bus.skip()?;
        self.bus.write(Command::Convert.op_code(), false)?;
        log::trace!("conversion started");
        Ok(())
    }

    /// The device holds the line low until its conversion is done
    pub fn is_conversion_complete(&mut self) -> Result<bool, Error<B::Error>> {
        self.bus.read_bit()
    }

    /// Reads the raw temperature register, 1/16 °C per bit
    pub fn read_raw(&mut self) -> Result<i16, Error<B::Error>> {
        let mut raw = [0u8; 2];
        self.bus.reset()?;
        self.bus.select(&self.address)?;
        self.bus.write(Command::ReadScratchpad.op_code(), false)?;
        raw[0] = self.bus.read()?;
        raw[1] = self.bus.read()?;
        self.bus.reset()?;
        Ok(BigEndian::read_i16(&raw))
    }

    /// Temperature in whole degrees Celsius, [`DEVICE_DISCONNECTED`] if implausibly low
    pub fn temp_c(&mut self) -> Result<i16, Error<B::Error>> {
        let celsius = raw_to_celsius(self.read_raw()?);
        if celsius == DEVICE_DISCONNECTED {
            log::warn!("reading below {} °C, device disconnected?", MIN_TEMPERATURE_C);
        }
        Ok(celsius)
    }

    /// Temperature in hundredths of a degree Celsius
    ///
    /// Unlike [`Ds18b20Int::temp_c`] this does not detect a disconnected
    /// device, check [`Ds18b20Int::is_connected`] separately.
    pub fn temp_centi_c(&mut self) -> Result<i32, Error<B::Error>> {
        Ok(raw_to_centi_celsius(self.read_raw()?))
    }

    /// Copies the device address into `buf` if one was found, buffer is left alone otherwise
    pub fn get_address(&self, buf: &mut [u8; Address::BYTES as usize]) -> bool {
        if self.address_found {
            buf.copy_from_slice(self.address.as_ref());
        }
        self.address_found
    }

    pub fn address(&self) -> Option<&Address> {
        self.address_found.then_some(&self.address)
    }

    /// Sets the resolution from a bit width, 9 to 12, anything else means 9
    ///
    /// A changed resolution is written to the device by running
    /// [`Ds18b20Int::begin`] again, the result of which is returned.
    pub fn set_resolution(&mut self, bits: u8) -> Result<bool, Error<B::Error>> {
        let resolution = Resolution::from_bits(bits);
        if resolution == self.resolution {
            return Ok(true);
        }
        self.resolution = resolution;
        self.begin(DEFAULT_RETRIES)
    }

    /// The cached resolution in bits, no bus traffic
    pub fn resolution(&self) -> u8 {
        self.resolution.bits()
    }

    pub fn resolution_setting(&self) -> Resolution {
        self.resolution
    }
}
