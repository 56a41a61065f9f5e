#![no_std]
#![doc = include_str!("../README.md")]

mod address;
mod bus;
mod command;
mod driver;
pub mod ds18b20;
mod iowire;
mod result;
mod search;

pub use address::{Address, AddressError};
pub use bus::Bus;
pub use command::{Command, OpCode};
pub use driver::OneWire;
pub use ds18b20::{Ds18b20Int, Resolution, DEFAULT_RETRIES, DEVICE_DISCONNECTED};
pub use iowire::{Inverted, IoWire};
pub use result::Error;
pub use search::DeviceSearch;

pub fn compute_partial_crc8(crc: u8, data: &[u8]) -> u8 {
    let mut crc = crc;
    for byte in data.iter() {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0x00 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Dallas/Maxim CRC-8 over `data`, as used for ROM codes and scratchpads
pub fn compute_crc8(data: &[u8]) -> u8 {
    compute_partial_crc8(0, data)
}
