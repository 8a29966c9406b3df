use tinyvec::ArrayVec;

pub mod fields;
pub mod parser;

pub use parser::{Fix, NmeaParser, RmcField};

/// Longest field the parser will assemble before giving up on a sentence
pub const FIELD_CAPACITY: usize = 14;

#[derive(Default, Debug, Copy, Clone)]
pub struct FieldBuf(pub ArrayVec<[u8; FIELD_CAPACITY]>);

impl defmt::Format for FieldBuf {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=[u8]:a}", self.0.as_slice())
    }
}

impl core::ops::Deref for FieldBuf {
    type Target = ArrayVec<[u8; FIELD_CAPACITY]>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for FieldBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FieldBuf {
    pub fn is_full(&self) -> bool {
        self.0.len() == FIELD_CAPACITY
    }

    pub fn first(&self) -> Option<u8> {
        self.0.first().copied()
    }
}

/// Running XOR of every byte between `$` and `*`
#[derive(defmt::Format, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NmeaChecksum(pub u8);

impl NmeaChecksum {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next(self, byte: u8) -> Self {
        Self(self.0 ^ byte)
    }
}

impl PartialEq<i64> for NmeaChecksum {
    fn eq(&self, other: &i64) -> bool {
        self.0 as i64 == *other
    }
}
