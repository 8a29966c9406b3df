//! Board configuration.

use crate::calendar::TimeZone;

pub const GPS_BAUD_RATE: u32 = 9600;
pub const I2C_FREQUENCY_KHZ: u32 = 100;

pub const EEPROM_ADDRESS: u8 = crate::drivers::at24c32::DEFAULT_ADDRESS;
pub const RTC_ADDRESS: u8 = crate::drivers::ds3231::DEFAULT_ADDRESS;
pub const KEYPAD_ADDRESS: u8 = crate::drivers::pcf8574::DEFAULT_ADDRESS;

pub const UART_RX_BUFSIZE: usize = 256;

/// Bytes shown by the EEPROM self test at startup
pub const EEPROM_TEST_LEN: u16 = 16;

/// Zone the clock displays
pub const LOCAL_TIME_ZONE: TimeZone = TimeZone::CENTRAL_EUROPE;

/// Seconds of RTC drift tolerated before a GPS time is written back
pub const RTC_MAX_DRIFT: u32 = 2;
