//! Text renderings for the serial diagnostics: EEPROM hex dumps, I2C bus
//! maps, clock readouts and positions.

use core::fmt::Write as _;

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};

use crate::{calendar::DateTime, drivers::At24c32, Abs as _, FmtBuf, Position};

pub const MEMDUMP_HEADER: &str =
    "      0   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F";
pub const SCAN_HEADER: &str = "    0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F";

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// One hex dump row: the address of the first byte, then up to 16 bytes.
pub fn memdump_row(addr: u16, bytes: &[u8]) -> FmtBuf<80> {
    let mut line = FmtBuf::new();
    let _ = write!(line, "{:04x}:", addr);
    for b in bytes.iter().take(16) {
        let _ = write!(line, "  {:02X}", b);
    }
    line
}

/// Reads `len` bytes from `from` and hands each rendered row to `emit`,
/// header first. The EEPROM checksum picks up every byte read.
pub fn memdump<I2C, E>(
    rom: &mut At24c32<I2C>,
    from: u16,
    len: u16,
    mut emit: impl FnMut(&str),
) -> crate::drivers::Result<(), E>
where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
    emit(MEMDUMP_HEADER);
    let mut addr = from;
    let end = from.saturating_add(len);
    while addr < end {
        let mut row = [0; 16];
        let n = (end - addr).min(16) as usize;
        rom.read(addr, &mut row[..n])?;
        emit(memdump_row(addr, &row[..n]).as_str().unwrap_or(""));
        addr += n as u16;
    }
    Ok(())
}

/// One row of the bus map for addresses `row * 16 ..`: `*` where a device
/// answered, `.` elsewhere.
pub fn scan_row(row: u8, found: u128) -> FmtBuf<64> {
    let mut line = FmtBuf::new();
    let base = (row & 0x07) * 16;
    let _ = write!(line, "{:02x}:", base);
    for addr in base..base + 16 {
        let mark = if found & 1 << addr != 0 { '*' } else { '.' };
        let _ = write!(line, "  {}", mark);
    }
    line
}

/// Renders the result of [`drivers::scan`](crate::drivers::scan) as a header
/// and eight rows.
pub fn scan_map(found: u128, mut emit: impl FnMut(&str)) {
    emit(SCAN_HEADER);
    for row in 0..8 {
        emit(scan_row(row, found).as_str().unwrap_or(""));
    }
}

/// `hh:mm:ss  dd/mm/yyyy [Day]`
pub fn datetime_line(dt: &DateTime) -> FmtBuf<32> {
    let mut line = FmtBuf::new();
    let _ = write!(
        line,
        "{:02}:{:02}:{:02}  {:02}/{:02}/{:04} [{}]",
        dt.hour,
        dt.minute,
        dt.second,
        dt.day,
        dt.month,
        dt.year,
        WEEKDAYS.get(dt.weekday as usize).unwrap_or(&"Err"),
    );
    line
}

pub fn position_line(pos: &Position) -> FmtBuf<48> {
    let mut line = FmtBuf::new();
    let _ = write!(
        line,
        "{:.4}°{}  {:.4}°{}",
        pos.lat.abs(),
        if pos.lat >= 0.0 { 'N' } else { 'S' },
        pos.lon.abs(),
        if pos.lon >= 0.0 { 'E' } else { 'W' }
    );
    line
}
