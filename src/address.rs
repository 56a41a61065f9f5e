use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};

/// 64-bit ROM code: family code, 48-bit serial and CRC-8 of the first seven bytes
#[derive(Debug, Clone, Copy, PartialOrd, PartialEq, Eq)]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for Address {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    /// The unique serial number, bytes 1 to 6
    pub fn serial(&self) -> &[u8] {
        &self[1..7]
    }

    /// The checksum stored in the last byte
    pub fn crc(&self) -> u8 {
        self[7]
    }

    /// Bytes covered by [`Address::crc`]
    pub fn crc_data(&self) -> &[u8] {
        &self[..7]
    }
}

/// Error type
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address has fewer than 8 bytes")]
    NotEnough,
    #[error("address contains a non-hex digit")]
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = Address::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        addr[i] = (h << 4) | l;
                    }
                    _ => return Err(AddressError::Invalid),
                },
                _ => return Err(AddressError::NotEnough),
            }
        }

        Ok(addr)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{:x}", self.raw);
    }
}
