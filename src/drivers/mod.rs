//! Blocking I2C drivers for the board peripherals.
//!
//! Every driver owns its bus handle and hands it back with `release()`, so a
//! single bus can be passed from one device to the next during bring-up.

pub mod at24c32;
pub mod ds3231;
pub mod pcf8574;

pub use at24c32::At24c32;
pub use ds3231::Ds3231;
pub use pcf8574::Pcf8574;

use embedded_hal::blocking::i2c::Read;

#[derive(thiserror::Error, defmt::Format, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error<E> {
    #[error("I2C bus error: {0:?}")]
    Bus(E),
    #[error("address {0:#06x} is past the end of the device")]
    OutOfRange(u16),
    #[error("pin {0} does not exist")]
    InvalidPin(u8),
}

pub type Result<T, E> = core::result::Result<T, Error<E>>;

pub fn to_bcd(val: u8) -> u8 {
    (val / 10) << 4 | (val % 10)
}

pub fn from_bcd(val: u8) -> u8 {
    (val >> 4) * 10 + (val & 0x0f)
}

/// Probes every 7-bit address with a one-byte read. Bit `n` of the result is
/// set when a device acknowledged address `n`.
pub fn scan<I2C: Read>(i2c: &mut I2C) -> u128 {
    let mut found = 0_u128;
    for addr in 0..0x80_u8 {
        let mut byte = 0;
        if i2c.read(addr, core::slice::from_mut(&mut byte)).is_ok() {
            found |= 1 << addr;
        }
    }
    defmt::debug!("I2C scan: {=u128:x}", found);
    found
}
