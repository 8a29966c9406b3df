use defmt::trace;
use embedded_hal::blocking::i2c::{Read, Write, WriteRead};

use super::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x57;
/// Bytes of storage (32 kbit)
pub const CAPACITY: u16 = 4096;

/// AT24C32 serial EEPROM.
///
/// Keeps a running XOR of every byte written or read so a caller can check a
/// block it wrote against what comes back.
pub struct At24c32<I2C> {
    i2c: I2C,
    address: u8,
    checksum: u8,
}

impl<I2C, E> At24c32<I2C>
where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            checksum: 0,
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    /// True when the device acknowledges a one-byte read.
    pub fn probe(&mut self) -> bool {
        let mut byte = 0;
        self.i2c
            .read(self.address, core::slice::from_mut(&mut byte))
            .is_ok()
    }

    fn pointer(addr: u16) -> Result<[u8; 2], E> {
        if addr >= CAPACITY {
            return Err(Error::OutOfRange(addr));
        }
        Ok(addr.to_be_bytes())
    }

    pub fn write_byte(&mut self, addr: u16, data: u8) -> Result<(), E> {
        let [msb, lsb] = Self::pointer(addr)?;
        trace!("EEPROM write {=u16:x} <- {=u8:x}", addr, data);
        self.i2c
            .write(self.address, &[msb, lsb, data])
            .map_err(Error::Bus)?;
        self.checksum ^= data;
        Ok(())
    }

    pub fn read_byte(&mut self, addr: u16) -> Result<u8, E> {
        let mut data = 0;
        self.read(addr, core::slice::from_mut(&mut data))?;
        Ok(data)
    }

    /// Sequential read starting at `addr`. The whole range must fit on the
    /// device.
    pub fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), E> {
        let pointer = Self::pointer(addr)?;
        let end = addr as usize + buf.len();
        if end > CAPACITY as usize {
            return Err(Error::OutOfRange(end.min(u16::MAX as usize) as u16));
        }
        self.i2c
            .write_read(self.address, &pointer, buf)
            .map_err(Error::Bus)?;
        self.checksum = buf.iter().fold(self.checksum, |c, &b| c ^ b);
        Ok(())
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    pub fn clear_checksum(&mut self) {
        self.checksum = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::{FakeBus, Model, Nack, Op};

    fn eeprom() -> At24c32<FakeBus> {
        At24c32::new(FakeBus::with(DEFAULT_ADDRESS, Model::registers(CAPACITY as usize, 2)))
    }

    #[test]
    fn write_sends_address_msb_first() {
        let mut rom = eeprom();
        rom.write_byte(0x0123, 0xab).unwrap();
        let mut bus = rom.release();
        assert_eq!(bus.log, [Op::Write(0x57, vec![0x01, 0x23, 0xab])]);
        assert_eq!(bus.regs(0x57)[0x0123], 0xab);
    }

    #[test]
    fn reads_back_written_bytes() {
        let mut rom = eeprom();
        for (i, b) in b"memtest".iter().enumerate() {
            rom.write_byte(0x0f00 + i as u16, *b).unwrap();
        }
        assert_eq!(rom.read_byte(0x0f02).unwrap(), b'm');

        let mut buf = [0; 7];
        rom.read(0x0f00, &mut buf).unwrap();
        assert_eq!(&buf, b"memtest");
    }

    #[test]
    fn checksum_covers_writes_and_reads() {
        let mut rom = eeprom();
        for addr in 0..16 {
            rom.write_byte(addr, addr as u8 * 3).unwrap();
        }
        let written = rom.checksum();
        assert_eq!(written, (0..16).fold(0, |c, a| c ^ (a * 3)));

        rom.clear_checksum();
        assert_eq!(rom.checksum(), 0);
        let mut buf = [0; 16];
        rom.read(0, &mut buf).unwrap();
        assert_eq!(rom.checksum(), written);

        // Writing then reading the same block cancels out
        rom.clear_checksum();
        rom.write_byte(5, 0x5a).unwrap();
        rom.read_byte(5).unwrap();
        assert_eq!(rom.checksum(), 0);
    }

    #[test]
    fn last_byte_is_reachable() {
        let mut rom = eeprom();
        rom.write_byte(CAPACITY - 1, 0x7e).unwrap();
        assert_eq!(rom.read_byte(CAPACITY - 1), Ok(0x7e));
    }

    #[test]
    fn rejects_addresses_past_the_end() {
        let mut rom = eeprom();
        assert_eq!(rom.write_byte(CAPACITY, 1), Err(Error::OutOfRange(CAPACITY)));
        assert_eq!(rom.read_byte(0xffff), Err(Error::OutOfRange(0xffff)));
        let mut buf = [0; 4];
        assert_eq!(rom.read(CAPACITY - 2, &mut buf), Err(Error::OutOfRange(CAPACITY + 2)));
        assert!(rom.release().log.is_empty());
    }

    #[test]
    fn missing_device() {
        let mut rom = At24c32::new(FakeBus::default());
        assert!(!rom.probe());
        assert_eq!(rom.write_byte(0, 0), Err(Error::Bus(Nack(0x57))));
        assert_eq!(rom.checksum(), 0);
    }

    #[test]
    fn probe_present_device() {
        assert!(eeprom().probe());
    }
}
