#![cfg_attr(not(test), no_std)]

use core::fmt::{self, Write};
use tinyvec::ArrayVec; // memory layout

pub mod calendar;
pub mod config;
pub mod drivers;
pub mod dump;
pub mod nmea;
pub mod rb;

#[cfg(target_os = "none")]
mod firmware {
    use core::sync::atomic::{AtomicUsize, Ordering};
    use defmt_brtt as _; // global logger

    use panic_probe as _;

    use stm32l4xx_hal as _;

    // same panicking *behavior* as `panic-probe` but doesn't print a panic message
    // this prevents the panic message being printed *twice* when `defmt::panic` is invoked
    #[defmt::panic_handler]
    fn panic() -> ! {
        cortex_m::asm::udf()
    }

    static COUNT: AtomicUsize = AtomicUsize::new(0);
    defmt::timestamp!("{=usize}", {
        // NOTE(no-CAS) `timestamps` runs with interrupts disabled
        let n = COUNT.load(Ordering::Relaxed);
        COUNT.store(n + 1, Ordering::Relaxed);
        n
    });
}

/// Terminates the application and makes `probe-rs` exit with exit-code = 0
#[cfg(target_os = "none")]
pub fn exit() -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}

/// Fixed-capacity text buffer for `write!`. Output past the capacity is
/// dropped.
pub struct FmtBuf<const N: usize = 256>(pub ArrayVec<[u8; N]>);

impl<const N: usize> Write for FmtBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.0.try_push(b);
        }
        Ok(())
    }
}

impl<const N: usize> Default for FmtBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FmtBuf<N> {
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.0.as_slice()).ok()
    }

    pub fn new() -> Self {
        Self(Default::default())
    }
}

// This isn't in core for some reason, so do this to avoid pulling in a dependency
pub trait Abs {
    fn abs(self) -> Self;
}

impl Abs for f64 {
    fn abs(self) -> Self {
        f64::from_bits(self.to_bits() & 0x7fff_ffff_ffff_ffff)
    }
}

/// Decimal degrees, north and east positive
#[derive(defmt::Format, Debug, Default, Copy, Clone, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}
