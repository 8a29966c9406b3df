use defmt::{debug, trace};
use embedded_hal::blocking::i2c::{Write, WriteRead};

use super::{from_bcd, to_bcd, Error, Result};
use crate::calendar::{drift, DateTime};

pub const DEFAULT_ADDRESS: u8 = 0x68;

pub mod reg {
    pub const SECONDS: u8 = 0x00;
    pub const MINUTES: u8 = 0x01;
    pub const HOURS: u8 = 0x02;
    pub const WEEKDAY: u8 = 0x03;
    pub const DATE: u8 = 0x04;
    pub const MONTH: u8 = 0x05;
    pub const YEAR: u8 = 0x06;
    pub const ALARM1_SECONDS: u8 = 0x07;
    pub const ALARM1_MINUTES: u8 = 0x08;
    pub const ALARM1_HOURS: u8 = 0x09;
    pub const ALARM1_DAY: u8 = 0x0a;
    pub const ALARM2_MINUTES: u8 = 0x0b;
    pub const ALARM2_HOURS: u8 = 0x0c;
    pub const ALARM2_DAY: u8 = 0x0d;
    pub const CONTROL: u8 = 0x0e;
    pub const STATUS: u8 = 0x0f;
    pub const AGING: u8 = 0x10;
    pub const TEMP_MSB: u8 = 0x11;
    pub const TEMP_LSB: u8 = 0x12;
}

const HOURS_12H: u8 = 0b0100_0000;
const HOURS_PM: u8 = 0b0010_0000;
const MONTH_CENTURY: u8 = 0b1000_0000;
const STATUS_OSF: u8 = 0b1000_0000;

fn decode_hours(val: u8) -> u8 {
    if val & HOURS_12H != 0 {
        let hour = from_bcd(val & 0x1f) % 12;
        if val & HOURS_PM != 0 {
            hour + 12
        } else {
            hour
        }
    } else {
        from_bcd(val & 0x3f)
    }
}

/// Encodes a 0..=23 hour in the mode `current` is in.
fn encode_hours(hour: u8, current: u8) -> u8 {
    if current & HOURS_12H != 0 {
        let h12 = match hour % 12 {
            0 => 12,
            h => h,
        };
        let pm = if hour >= 12 { HOURS_PM } else { 0 };
        HOURS_12H | pm | to_bcd(h12)
    } else {
        to_bcd(hour)
    }
}

/// Outcome of [`Ds3231::sync_to`]
#[derive(defmt::Format, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RtcSync {
    /// The reference time is not a real date, nothing was written
    Rejected,
    /// Clock already within tolerance
    InStep,
    /// Clock was rewritten
    Updated,
}

/// DS3231 real-time clock.
///
/// Hours always come back on a 24 hour clock, whichever mode the chip is
/// running in. Weekdays are 0 = Sunday here and 1 = Sunday on the chip.
pub struct Ds3231<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> Ds3231<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn probe(&mut self) -> bool {
        self.read_register(reg::SECONDS).is_ok()
    }

    pub fn read_register(&mut self, reg: u8) -> Result<u8, E> {
        let mut val = 0;
        self.i2c
            .write_read(self.address, &[reg], core::slice::from_mut(&mut val))
            .map_err(Error::Bus)?;
        Ok(val)
    }

    pub fn write_register(&mut self, reg: u8, val: u8) -> Result<(), E> {
        trace!("RTC write {=u8:x} <- {=u8:x}", reg, val);
        self.i2c.write(self.address, &[reg, val]).map_err(Error::Bus)
    }

    pub fn year(&mut self) -> Result<u16, E> {
        Ok(2000 + from_bcd(self.read_register(reg::YEAR)?) as u16)
    }

    pub fn month(&mut self) -> Result<u8, E> {
        Ok(from_bcd(self.read_register(reg::MONTH)? & !MONTH_CENTURY))
    }

    pub fn day(&mut self) -> Result<u8, E> {
        Ok(from_bcd(self.read_register(reg::DATE)?))
    }

    pub fn weekday(&mut self) -> Result<u8, E> {
        Ok((self.read_register(reg::WEEKDAY)? & 0x07).saturating_sub(1))
    }

    pub fn hour(&mut self) -> Result<u8, E> {
        Ok(decode_hours(self.read_register(reg::HOURS)?))
    }

    pub fn minute(&mut self) -> Result<u8, E> {
        Ok(from_bcd(self.read_register(reg::MINUTES)?))
    }

    pub fn second(&mut self) -> Result<u8, E> {
        Ok(from_bcd(self.read_register(reg::SECONDS)?))
    }

    /// Accepts either a two-digit year or 2000..=2099.
    pub fn set_year(&mut self, year: u16) -> Result<(), E> {
        self.write_register(reg::YEAR, to_bcd((year % 100) as u8))
    }

    pub fn set_month(&mut self, month: u8) -> Result<(), E> {
        self.write_register(reg::MONTH, to_bcd(month))
    }

    pub fn set_day(&mut self, day: u8) -> Result<(), E> {
        self.write_register(reg::DATE, to_bcd(day))
    }

    pub fn set_weekday(&mut self, weekday: u8) -> Result<(), E> {
        self.write_register(reg::WEEKDAY, weekday % 7 + 1)
    }

    /// Keeps the chip in whichever 12/24 hour mode it is already in.
    pub fn set_hour(&mut self, hour: u8) -> Result<(), E> {
        let current = self.read_register(reg::HOURS)?;
        self.write_register(reg::HOURS, encode_hours(hour, current))
    }

    pub fn set_minute(&mut self, minute: u8) -> Result<(), E> {
        self.write_register(reg::MINUTES, to_bcd(minute))
    }

    pub fn set_second(&mut self, second: u8) -> Result<(), E> {
        self.write_register(reg::SECONDS, to_bcd(second))
    }

    /// Die temperature in °C, in quarter degree steps.
    pub fn temperature(&mut self) -> Result<f32, E> {
        let msb = self.read_register(reg::TEMP_MSB)? as i8;
        let lsb = self.read_register(reg::TEMP_LSB)?;
        Ok(msb as f32 + (lsb >> 6) as f32 * 0.25)
    }

    pub fn control(&mut self) -> Result<u8, E> {
        self.read_register(reg::CONTROL)
    }

    pub fn set_control(&mut self, val: u8) -> Result<(), E> {
        self.write_register(reg::CONTROL, val)
    }

    pub fn status(&mut self) -> Result<u8, E> {
        self.read_register(reg::STATUS)
    }

    pub fn set_status(&mut self, val: u8) -> Result<(), E> {
        self.write_register(reg::STATUS, val)
    }

    /// False when the oscillator has stopped at some point since the flag was
    /// last cleared, which means the time registers can't be trusted.
    pub fn oscillator_ok(&mut self) -> Result<bool, E> {
        Ok(self.status()? & STATUS_OSF == 0)
    }

    pub fn clear_oscillator_stop_flag(&mut self) -> Result<(), E> {
        let status = self.status()?;
        self.set_status(status & !STATUS_OSF)
    }

    /// Reads all time registers in one transfer so they can't roll over
    /// between fields.
    pub fn datetime(&mut self) -> Result<DateTime, E> {
        let mut regs = [0; 7];
        self.i2c
            .write_read(self.address, &[reg::SECONDS], &mut regs)
            .map_err(Error::Bus)?;
        let [second, minute, hour, weekday, day, month, year] = regs;
        Ok(DateTime {
            year: 2000 + from_bcd(year) as u16,
            month: from_bcd(month & !MONTH_CENTURY),
            day: from_bcd(day),
            weekday: (weekday & 0x07).saturating_sub(1),
            hour: decode_hours(hour),
            minute: from_bcd(minute),
            second: from_bcd(second),
        })
    }

    /// Writes all time registers in one transfer, in 24 hour mode, then
    /// clears the oscillator stop flag.
    pub fn set_datetime(&mut self, dt: &DateTime) -> Result<(), E> {
        debug!("RTC set {}", dt);
        self.i2c
            .write(
                self.address,
                &[
                    reg::SECONDS,
                    to_bcd(dt.second),
                    to_bcd(dt.minute),
                    to_bcd(dt.hour),
                    dt.weekday % 7 + 1,
                    to_bcd(dt.day),
                    to_bcd(dt.month),
                    to_bcd((dt.year % 100) as u8),
                ],
            )
            .map_err(Error::Bus)?;
        self.clear_oscillator_stop_flag()
    }

    /// Brings the clock to `reference` when it is off by more than
    /// `max_drift` seconds or can't be read. A reference that is not a valid
    /// date, such as the all-zero time of a receiver without a fix, is never
    /// written.
    pub fn sync_to(&mut self, reference: &DateTime, max_drift: u32) -> Result<RtcSync, E> {
        if !reference.is_valid() {
            debug!("RTC sync rejected {}", reference);
            return Ok(RtcSync::Rejected);
        }
        match self.datetime() {
            Ok(now) if drift(&now, reference) <= max_drift => Ok(RtcSync::InStep),
            _ => self.set_datetime(reference).map(|_| RtcSync::Updated),
        }
    }
}
