//! Lenient numeric conversions for NMEA field text.
//!
//! None of these reject input. Garbage yields whatever digits could be read,
//! which for an empty or non-numeric field is zero. Receivers send partial and
//! noisy fields routinely, and the checksum is what decides whether a sentence
//! is used at all.

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn skip_space(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&b| !is_space(b)).unwrap_or(s.len());
    &s[start..]
}

fn split_sign(s: &[u8]) -> (bool, &[u8]) {
    match s.first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    }
}

fn leading_digits(s: &[u8]) -> usize {
    s.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Integer value of the leading decimal digits, like C `atol`.
pub fn parse_int(s: &[u8]) -> i32 {
    let (negative, s) = split_sign(skip_space(s));
    let n = s[..leading_digits(s)]
        .iter()
        .fold(0_i32, |n, &d| n.wrapping_mul(10).wrapping_add((d - b'0') as i32));
    if negative {
        n.wrapping_neg()
    } else {
        n
    }
}

/// Fixed-point value scaled by 100: `"173.8"` is 17380, `"220516"` is 22051600.
///
/// Only the first two fractional digits count. A leading minus negates the
/// integer part alone.
pub fn parse_centi(s: &[u8]) -> i32 {
    let (sign, s) = match s.first() {
        Some(b'-') => (-1_i32, &s[1..]),
        _ => (1, s),
    };

    let mut n = sign.wrapping_mul(100_i32.wrapping_mul(parse_int(s)));

    let rest = &s[leading_digits(s)..];
    if let [b'.', d1, tail @ ..] = rest {
        if d1.is_ascii_digit() {
            n = n.wrapping_add(10 * (d1 - b'0') as i32);
            if let Some(d2) = tail.first().filter(|d| d.is_ascii_digit()) {
                n = n.wrapping_add((d2 - b'0') as i32);
            }
        }
    }
    n
}

/// Decimal value of the leading sign, digits and fraction, like a C `atof`
/// that stops before any exponent.
pub fn parse_float(s: &[u8]) -> f64 {
    let (negative, s) = split_sign(skip_space(s));

    let int_len = leading_digits(s);
    let mut value = s[..int_len]
        .iter()
        .fold(0.0, |v, &d| v * 10.0 + (d - b'0') as f64);

    if let Some((&b'.', frac)) = s[int_len..].split_first() {
        let mut scale = 0.1;
        for &d in &frac[..leading_digits(frac)] {
            value += (d - b'0') as f64 * scale;
            scale /= 10.0;
        }
    }

    if negative {
        -value
    } else {
        value
    }
}

fn floor(x: f64) -> f64 {
    let t = x as i64 as f64;
    if t > x {
        t - 1.0
    } else {
        t
    }
}

/// Converts `DDDmm.mmmm` to decimal degrees.
pub fn parse_degrees(s: &[u8]) -> f64 {
    let num = parse_float(s);
    let deg = floor(num / 100.0);
    let min = num - deg * 100.0;
    deg + min / 60.0
}

/// Base-16 value of the leading hex digits, like C `strtol(s, NULL, 16)`.
pub fn parse_hex(s: &[u8]) -> i64 {
    let (negative, s) = split_sign(skip_space(s));
    let s = match s {
        [b'0', b'x' | b'X', d, ..] if d.is_ascii_hexdigit() => &s[2..],
        _ => s,
    };

    let n = s
        .iter()
        .map_while(|&b| (b as char).to_digit(16))
        .fold(0_i64, |n, d| n.wrapping_mul(16).wrapping_add(d as i64));
    if negative {
        n.wrapping_neg()
    } else {
        n
    }
}
