use embedded_hal::blocking::i2c::{Read, Write};

use super::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x38;

/// Keypad legend, row by row
pub const KEYMAP_4X4: &[u8; 16] = b"123A456B789C*0#D";

/// PCF8574 8-bit quasi-bidirectional I/O expander.
///
/// The chip has no readable output latch, so the last value written is kept
/// here for read-modify-write of single bits. A pin reads back the external
/// level only while its latch bit is high.
pub struct Pcf8574<I2C> {
    i2c: I2C,
    address: u8,
    out: u8,
}

impl<I2C, E> Pcf8574<I2C>
where
    I2C: Write<Error = E> + Read<Error = E>,
{
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            // Power-on state, all pins weakly high
            out: 0xff,
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn probe(&mut self) -> bool {
        let mut byte = 0;
        self.i2c
            .read(self.address, core::slice::from_mut(&mut byte))
            .is_ok()
    }

    /// Last value written to the output latch
    pub fn output(&self) -> u8 {
        self.out
    }

    pub fn write(&mut self, val: u8) -> Result<(), E> {
        self.i2c.write(self.address, &[val]).map_err(Error::Bus)?;
        self.out = val;
        Ok(())
    }

    pub fn read(&mut self) -> Result<u8, E> {
        let mut val = 0;
        self.i2c
            .read(self.address, core::slice::from_mut(&mut val))
            .map_err(Error::Bus)?;
        Ok(val)
    }

    pub fn set_bit(&mut self, bit: u8, high: bool) -> Result<(), E> {
        if bit >= 8 {
            return Err(Error::InvalidPin(bit));
        }
        let out = if high {
            self.out | 1 << bit
        } else {
            self.out & !(1 << bit)
        };
        self.write(out)
    }

    pub fn bit(&mut self, bit: u8) -> Result<bool, E> {
        if bit >= 8 {
            return Err(Error::InvalidPin(bit));
        }
        Ok(self.read()? & 1 << bit != 0)
    }

    /// Scans a 4x4 matrix keypad with rows on P7..P4 and columns on P3..P0.
    /// Returns the key index `row * 4 + column`, or `None` when no single key
    /// is down.
    pub fn key_4x4(&mut self) -> Result<Option<u8>, E> {
        self.write(0xf0)?;
        let row = match self.read()? {
            0x70 => 0,
            0xb0 => 1,
            0xd0 => 2,
            0xe0 => 3,
            _ => return self.write(0x0f).map(|_| None),
        };

        self.write(0x0f)?;
        let col = match self.read()? {
            0x07 => 0,
            0x0b => 1,
            0x0d => 2,
            0x0e => 3,
            _ => return Ok(None),
        };

        defmt::trace!("key row {=u8} col {=u8}", row, col);
        Ok(Some(row * 4 + col))
    }

    /// Same as [`key_4x4`](Self::key_4x4), mapped through [`KEYMAP_4X4`].
    pub fn char_key_4x4(&mut self) -> Result<Option<char>, E> {
        Ok(self
            .key_4x4()?
            .and_then(|k| KEYMAP_4X4.get(k as usize))
            .map(|&c| c as char))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::{FakeBus, Model, Nack, Op};

    fn expander() -> Pcf8574<FakeBus> {
        Pcf8574::new(FakeBus::with(DEFAULT_ADDRESS, Model::port()))
    }

    fn press(pcf: &mut Pcf8574<FakeBus>, key: Option<(u8, u8)>) {
        if let Some(Model::Port { key: held, .. }) = pcf.i2c.device(DEFAULT_ADDRESS) {
            *held = key;
        }
    }

    #[test]
    fn write_updates_shadow() {
        let mut pcf = expander();
        assert_eq!(pcf.output(), 0xff);
        pcf.write(0x5a).unwrap();
        assert_eq!(pcf.output(), 0x5a);
        assert_eq!(pcf.read(), Ok(0x5a));
    }

    #[test]
    fn set_bit_is_read_modify_write() {
        let mut pcf = expander();
        pcf.set_bit(0, false).unwrap();
        pcf.set_bit(7, false).unwrap();
        pcf.set_bit(0, true).unwrap();
        assert_eq!(pcf.output(), 0x7f);
        assert_eq!(pcf.bit(7), Ok(false));
        assert_eq!(pcf.bit(0), Ok(true));

        let bus = pcf.release();
        assert_eq!(
            bus.log[..3],
            [
                Op::Write(0x38, vec![0xfe]),
                Op::Write(0x38, vec![0x7e]),
                Op::Write(0x38, vec![0x7f]),
            ]
        );
    }

    #[test]
    fn pins_past_seven_are_rejected() {
        let mut pcf = expander();
        assert_eq!(pcf.set_bit(8, true), Err(Error::InvalidPin(8)));
        assert_eq!(pcf.bit(200), Err(Error::InvalidPin(200)));
        assert!(pcf.release().log.is_empty());
    }

    #[test]
    fn no_key_pressed() {
        let mut pcf = expander();
        assert_eq!(pcf.key_4x4(), Ok(None));
        assert_eq!(pcf.char_key_4x4(), Ok(None));
    }

    #[test]
    fn every_key_scans() {
        let mut pcf = expander();
        for row in 0..4 {
            for col in 0..4 {
                press(&mut pcf, Some((row, col)));
                let index = row * 4 + col;
                assert_eq!(pcf.key_4x4(), Ok(Some(index)));
                assert_eq!(
                    pcf.char_key_4x4(),
                    Ok(Some(KEYMAP_4X4[index as usize] as char))
                );
            }
        }
    }

    #[test]
    fn key_legend() {
        let mut pcf = expander();
        press(&mut pcf, Some((3, 1)));
        assert_eq!(pcf.char_key_4x4(), Ok(Some('0')));
        press(&mut pcf, Some((2, 3)));
        assert_eq!(pcf.char_key_4x4(), Ok(Some('C')));
        press(&mut pcf, Some((0, 0)));
        assert_eq!(pcf.char_key_4x4(), Ok(Some('1')));
    }

    #[test]
    fn missing_device() {
        let mut pcf = Pcf8574::new(FakeBus::default());
        assert!(!pcf.probe());
        assert_eq!(pcf.write(0), Err(Error::Bus(Nack(0x38))));
        assert_eq!(pcf.output(), 0xff);
        assert_eq!(pcf.key_4x4(), Err(Error::Bus(Nack(0x38))));
    }
}
