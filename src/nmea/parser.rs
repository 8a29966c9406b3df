use chrono::{DateTime as ChronoDateTime, NaiveDateTime, Utc};
use defmt::{debug, trace};

use super::{
    fields::{parse_centi, parse_degrees, parse_hex, parse_int},
    FieldBuf, NmeaChecksum,
};
use crate::{
    calendar::{day_of_week, DateTime},
    Position,
};

const RMC_TAG: &[u8] = b"GPRMC";
const KNOTS_TO_KMH: f64 = 1.852;

/// Fields of a `$GPRMC` sentence, in the order they arrive.
#[derive(defmt::Format, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RmcField {
    Timestamp,
    PositionStatus,
    Latitude,
    LatitudeHemisphere,
    Longitude,
    LongitudeHemisphere,
    SpeedOverGround,
    TrackAngle,
    Date,
    MagneticVariation,
    MagneticVariationHemisphere,
    ModeIndicator,
    Checksum,
}

impl RmcField {
    fn next(self) -> Self {
        use RmcField::*;
        match self {
            Timestamp => PositionStatus,
            PositionStatus => Latitude,
            Latitude => LatitudeHemisphere,
            LatitudeHemisphere => Longitude,
            Longitude => LongitudeHemisphere,
            LongitudeHemisphere => SpeedOverGround,
            SpeedOverGround => TrackAngle,
            TrackAngle => Date,
            Date => MagneticVariation,
            MagneticVariation => MagneticVariationHemisphere,
            MagneticVariationHemisphere => ModeIndicator,
            ModeIndicator => Checksum,
            Checksum => Checksum,
        }
    }
}

// States are named for the field the *buffer is collecting*
#[derive(defmt::Format, Debug, Copy, Clone, PartialEq, Eq)]
enum ParserState {
    Unknown,
    Rmc(RmcField),
}
use ParserState::*;

/// A decoded fix. `time` is `hhmmsscc` and `date` is `ddmmyy`, both as
/// decimal integers; the accessors split them up.
#[derive(defmt::Format, Debug, Default, Copy, Clone, PartialEq)]
pub struct Fix {
    pub time: i32,
    pub date: u32,
    /// Degrees, north positive
    pub latitude: f64,
    /// Degrees, east positive
    pub longitude: f64,
    /// Kilometres per hour
    pub speed: f64,
}

impl Fix {
    pub fn year(&self) -> u16 {
        (self.date % 100) as u16 + 2000
    }

    pub fn month(&self) -> u8 {
        ((self.date / 100) % 100) as u8
    }

    pub fn day(&self) -> u8 {
        (self.date / 10_000) as u8
    }

    /// 0 = Sunday
    pub fn weekday(&self) -> u8 {
        day_of_week(self.year(), self.month(), self.day())
    }

    pub fn hour(&self) -> u8 {
        (self.time / 1_000_000) as u8
    }

    pub fn minute(&self) -> u8 {
        ((self.time / 10_000) % 100) as u8
    }

    pub fn second(&self) -> u8 {
        ((self.time / 100) % 100) as u8
    }

    pub fn centisecond(&self) -> u8 {
        (self.time % 100) as u8
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn position(&self) -> Position {
        Position {
            lat: self.latitude,
            lon: self.longitude,
        }
    }

    pub fn datetime(&self) -> DateTime {
        DateTime {
            year: self.year(),
            month: self.month(),
            day: self.day(),
            weekday: self.weekday(),
            hour: self.hour(),
            minute: self.minute(),
            second: self.second(),
        }
    }

    pub fn datetime_utc(&self) -> Option<ChronoDateTime<Utc>> {
        NaiveDateTime::try_from(self.datetime())
            .ok()
            .map(|naive| ChronoDateTime::from_naive_utc_and_offset(naive, Utc))
    }
}

/// Incremental `$GPRMC` decoder, fed one received byte at a time.
///
/// Malformed input never produces an error: a sentence with an unknown tag,
/// an over-long field or a wrong checksum is dropped and the parser waits for
/// the next `$`. The last confirmed fix is only replaced by a sentence whose
/// checksum matched.
pub struct NmeaParser {
    state: ParserState,
    buf: FieldBuf,
    checksum: NmeaChecksum,
    in_checksum: bool,

    pending: Fix,
    pending_usable: bool,

    fix: Fix,
    valid_position: bool,
    valid_time: bool,
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaParser {
    pub fn new() -> Self {
        Self {
            state: Unknown,
            buf: FieldBuf::default(),
            checksum: NmeaChecksum::new(),
            in_checksum: false,
            pending: Fix::default(),
            pending_usable: false,
            fix: Fix::default(),
            valid_position: false,
            valid_time: false,
        }
    }

    /// Last confirmed fix
    pub fn fix(&self) -> &Fix {
        &self.fix
    }

    pub fn is_valid_time(&self) -> bool {
        self.valid_time
    }

    pub fn is_valid_position(&self) -> bool {
        self.valid_position
    }

    /// Marks the confirmed time as consumed.
    pub fn reset_valid_time(&mut self) {
        self.valid_time = false;
        self.fix.time = 0;
        self.fix.date = 0;
    }

    pub fn reset_position(&mut self) {
        self.valid_position = false;
        self.fix.latitude = 0.0;
        self.fix.longitude = 0.0;
        self.fix.speed = 0.0;
    }

    /// Drops the sentence in progress and waits for the next start marker.
    fn reset(&mut self) {
        self.state = Unknown;
        self.buf.clear();
        self.checksum = NmeaChecksum::new();
        self.in_checksum = false;
        self.pending = Fix::default();
        self.pending_usable = false;
    }

    /// Feeds one byte. Returns the new fix when this byte completed a
    /// sentence with a matching checksum.
    pub fn process_byte(&mut self, b: u8) -> Option<Fix> {
        match b {
            b'$' => {
                self.reset();
                None
            }
            b',' => {
                self.checksum = self.checksum.next(b);
                self.finish_field()
            }
            b'\r' | b'\n' => self.finish_field(),
            b'*' => {
                let committed = self.finish_field();
                self.start_checksum();
                committed
            }
            _ => {
                if self.buf.is_full() {
                    debug!("NMEA field overflow: {}", self.buf);
                    self.reset();
                }
                if !self.in_checksum {
                    self.checksum = self.checksum.next(b);
                }
                self.buf.push(b);
                None
            }
        }
    }

    fn start_checksum(&mut self) {
        match self.state {
            // Mode indicator only exists from NMEA 2.3 on
            Rmc(RmcField::ModeIndicator) => self.state = Rmc(RmcField::Checksum),
            Rmc(RmcField::Checksum) => (),
            Rmc(field) => {
                debug!("NMEA sentence truncated before {}", field);
                self.reset();
                return;
            }
            Unknown => (),
        }
        self.in_checksum = true;
    }

    fn finish_field(&mut self) -> Option<Fix> {
        match self.state {
            Unknown => {
                if self.buf.as_slice() == RMC_TAG {
                    self.state = Rmc(RmcField::Timestamp);
                    self.buf.clear();
                } else {
                    if !self.buf.is_empty() {
                        trace!("ignoring NMEA sentence {}", self.buf);
                    }
                    self.reset();
                }
                None
            }
            Rmc(field) => {
                let committed = self.process_field(field);
                self.buf.clear();
                committed
            }
        }
    }

    fn process_field(&mut self, field: RmcField) -> Option<Fix> {
        let text = self.buf.as_slice();
        match field {
            RmcField::Timestamp => self.pending.time = parse_centi(text),
            RmcField::PositionStatus => self.pending_usable = self.buf.first() == Some(b'A'),
            RmcField::Latitude => self.pending.latitude = parse_degrees(text),
            RmcField::LatitudeHemisphere => {
                if self.buf.first() == Some(b'S') {
                    self.pending.latitude = -self.pending.latitude;
                }
            }
            RmcField::Longitude => self.pending.longitude = parse_degrees(text),
            RmcField::LongitudeHemisphere => {
                if self.buf.first() == Some(b'W') {
                    self.pending.longitude = -self.pending.longitude;
                }
            }
            RmcField::SpeedOverGround => {
                self.pending.speed = KNOTS_TO_KMH * parse_centi(text) as f64 / 100.0
            }
            // Track angle lands in the date slot and is overwritten by the
            // date field that follows.
            RmcField::TrackAngle => self.pending.date = parse_int(text) as u32,
            RmcField::Date => self.pending.date = parse_int(text) as u32,
            RmcField::MagneticVariation
            | RmcField::MagneticVariationHemisphere
            | RmcField::ModeIndicator => (),
            RmcField::Checksum => return self.finish_sentence(),
        }
        self.state = Rmc(field.next());
        None
    }

    fn finish_sentence(&mut self) -> Option<Fix> {
        let found = parse_hex(self.buf.as_slice());
        let committed = if self.checksum == found {
            self.fix.time = self.pending.time;
            self.fix.date = self.pending.date;
            self.fix.speed = self.pending.speed;
            self.valid_time = true;

            if self.pending_usable {
                self.fix.latitude = self.pending.latitude;
                self.fix.longitude = self.pending.longitude;
                self.valid_position = true;
            } else {
                self.reset_position();
            }
            trace!("NMEA fix {}", self.fix);
            Some(self.fix)
        } else {
            debug!(
                "NMEA checksum mismatch: expect {=u8:x}, saw {=i64:x}",
                self.checksum.0,
                found
            );
            None
        };

        self.reset();
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMC: &[u8] = b"$GPRMC,220516,A,5133.82,N,00042.24,W,173.8,231.8,130694,004.2,W*70\r\n";
    const RMC_23: &[u8] =
        b"$GPRMC,220516,A,5133.82,N,00042.24,W,173.8,231.8,130694,004.2,W,A*1D\r\n";
    const RMC_NO_FIX: &[u8] = b"$GPRMC,050251.00,V,,,,,,,201222,,,N*7F\r\n";

    fn feed(parser: &mut NmeaParser, bytes: &[u8]) -> Option<Fix> {
        let mut last = None;
        for &b in bytes {
            if let Some(fix) = parser.process_byte(b) {
                last = Some(fix);
            }
        }
        last
    }

    fn close(a: f64, b: f64, eps: f64) -> bool {
        let d = a - b;
        d < eps && -d < eps
    }

    #[test]
    fn decodes_example_sentence() {
        let mut parser = NmeaParser::new();
        let fix = feed(&mut parser, RMC).expect("sentence should commit");

        assert!(parser.is_valid_time());
        assert!(parser.is_valid_position());
        assert_eq!(parser.fix(), &fix);

        assert_eq!((fix.hour(), fix.minute(), fix.second()), (22, 5, 16));
        assert_eq!(fix.centisecond(), 0);
        // Two-digit years are taken as 20yy
        assert_eq!((fix.day(), fix.month(), fix.year()), (13, 6, 2094));
        assert!(close(fix.latitude(), 51.5637, 1e-4));
        assert!(close(fix.longitude(), -0.7040, 1e-4));
        assert!(close(fix.speed(), 321.8776, 1e-4));
        // 2094-06-13 is a Sunday
        assert_eq!(fix.weekday(), 0);
    }

    #[test]
    fn decodes_sentence_with_mode_indicator() {
        let mut parser = NmeaParser::new();
        let fix = feed(&mut parser, RMC_23).expect("sentence should commit");
        assert_eq!(fix.date, 130694);
        assert_eq!(fix.time, 22_051_600);
        assert!(parser.is_valid_position());
    }

    #[test]
    fn returns_fix_on_terminating_byte() {
        let mut parser = NmeaParser::new();
        let (body, tail) = RMC.split_at(RMC.len() - 2);
        assert_eq!(feed(&mut parser, body), None);
        assert!(!parser.is_valid_time());
        assert!(parser.process_byte(tail[0]).is_some());
        assert_eq!(parser.process_byte(tail[1]), None);
        assert!(parser.is_valid_time());
    }

    #[test]
    fn altered_checksum_keeps_previous_fix() {
        let mut parser = NmeaParser::new();
        feed(&mut parser, RMC);
        let before = *parser.fix();
        parser.reset_valid_time();
        let before = Fix {
            time: 0,
            date: 0,
            ..before
        };

        let mut bad = RMC.to_vec();
        let star = bad.iter().position(|&b| b == b'*').unwrap();
        bad[star + 2] = b'1';
        let other = b"$GPRMC,101010,A,1000.00,S,01000.00,E,1.0,0.0,010101,,,A*";
        let mut other = other.to_vec();
        other.extend_from_slice(b"00\r\n");

        assert_eq!(feed(&mut parser, &bad), None);
        assert_eq!(feed(&mut parser, &other), None);
        assert!(!parser.is_valid_time());
        assert!(parser.is_valid_position());
        assert_eq!(parser.fix(), &before);
    }

    #[test]
    fn void_status_clears_position_but_keeps_time() {
        let mut parser = NmeaParser::new();
        feed(&mut parser, RMC);
        assert!(parser.is_valid_position());

        let fix = feed(&mut parser, RMC_NO_FIX).expect("sentence should commit");
        assert!(parser.is_valid_time());
        assert!(!parser.is_valid_position());
        assert_eq!(fix.latitude(), 0.0);
        assert_eq!(fix.longitude(), 0.0);
        assert_eq!(fix.speed(), 0.0);
        assert_eq!((fix.hour(), fix.minute(), fix.second()), (5, 2, 51));
        assert_eq!((fix.day(), fix.month(), fix.year()), (20, 12, 2022));
    }

    #[test]
    fn void_status_with_position_fields_is_not_used() {
        let mut parser = NmeaParser::new();
        let fix = feed(
            &mut parser,
            b"$GPRMC,220516,V,5133.82,N,00042.24,W,173.8,231.8,130694,004.2,W,N*05\r\n",
        )
        .expect("sentence should commit");
        assert!(!parser.is_valid_position());
        assert_eq!(fix.latitude(), 0.0);
        assert_eq!(fix.hour(), 22);
    }

    #[test]
    fn empty_sentence_commits_zero_time() {
        let mut parser = NmeaParser::new();
        let fix = feed(&mut parser, b"$GPRMC,,V,,,,,,,,,,N*53\r\n").expect("should commit");
        assert_eq!(fix.time, 0);
        assert_eq!(fix.date, 0);
        assert!(parser.is_valid_time());
        assert!(!parser.is_valid_position());
        // Accessors on an empty date must not panic
        assert!(fix.weekday() < 7);
        assert_eq!(fix.datetime_utc(), None);
    }

    #[test]
    fn unknown_sentences_are_ignored() {
        let mut parser = NmeaParser::new();
        let gga = b"$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76\r\n";
        assert_eq!(feed(&mut parser, gga), None);
        assert!(!parser.is_valid_time());

        // And do not disturb the next sentence
        assert!(feed(&mut parser, RMC).is_some());
    }

    #[test]
    fn overflowing_field_recovers() {
        let mut parser = NmeaParser::new();
        let mut noisy = b"$GPRMC,".to_vec();
        noisy.extend_from_slice(&[b'9'; 40]);
        noisy.extend_from_slice(b",A,5133.82,N,00042.24,W,173.8,231.8,130694,004.2,W*70\r\n");

        assert_eq!(feed(&mut parser, &noisy), None);
        assert!(!parser.is_valid_time());
        assert_eq!(parser.state, Unknown);
        assert!(parser.buf.len() <= crate::nmea::FIELD_CAPACITY);

        assert!(feed(&mut parser, RMC).is_some());
    }

    #[test]
    fn field_at_capacity_is_accepted() {
        let mut parser = NmeaParser::new();
        // Fourteen characters fit exactly
        let sentence = b"GPRMC,220516.0000000,A,5133.82,N,00042.24,W,173.8,231.8,130694,004.2,W";
        let sum = sentence
            .iter()
            .fold(NmeaChecksum::new(), |c, &b| c.next(b));
        assert_eq!(sentence.split(|&b| b == b',').nth(1).unwrap().len(), 14);

        let mut bytes = b"$".to_vec();
        bytes.extend_from_slice(sentence);
        bytes.push(b'*');
        bytes.extend_from_slice(&hex(sum.0));
        bytes.extend_from_slice(b"\r\n");
        assert!(feed(&mut parser, &bytes).is_some());
    }

    #[test]
    fn truncated_sentence_is_dropped() {
        let mut parser = NmeaParser::new();
        assert_eq!(feed(&mut parser, b"$GPRMC,220516,A*08\r\n"), None);
        assert!(!parser.is_valid_time());
        assert_eq!(parser.state, Unknown);
    }

    #[test]
    fn start_marker_restarts_sentence() {
        let mut parser = NmeaParser::new();
        let mut bytes = b"$GPRMC,220516,A,51".to_vec();
        bytes.extend_from_slice(RMC);
        assert!(feed(&mut parser, &bytes).is_some());
    }

    #[test]
    fn consumed_time_is_reported_once() {
        let mut parser = NmeaParser::new();
        feed(&mut parser, RMC);
        assert!(parser.is_valid_time());
        parser.reset_valid_time();
        assert!(!parser.is_valid_time());
        assert_eq!(parser.fix().time, 0);
        assert_eq!(parser.fix().date, 0);
        // Position survives until explicitly reset
        assert!(parser.is_valid_position());
        parser.reset_position();
        assert!(!parser.is_valid_position());
        assert_eq!(parser.fix().latitude(), 0.0);
    }

    #[test]
    fn builds_datetime_records() {
        let mut parser = NmeaParser::new();
        let fix = feed(&mut parser, RMC).unwrap();
        let dt = fix.datetime();
        assert_eq!(
            dt,
            DateTime {
                year: 2094,
                month: 6,
                day: 13,
                weekday: 0,
                hour: 22,
                minute: 5,
                second: 16,
            }
        );
        assert_eq!(
            fix.datetime_utc().map(|t| t.timestamp()),
            Some(dt.unix_time() as i64)
        );
    }

    #[test]
    fn latitude_south_is_negative() {
        let mut parser = NmeaParser::new();
        let body = b"GPRMC,000001,A,3351.00,S,15112.00,E,0.0,0.0,010124,,,A";
        let sum = body.iter().fold(NmeaChecksum::new(), |c, &b| c.next(b));
        let mut bytes = b"$".to_vec();
        bytes.extend_from_slice(body);
        bytes.push(b'*');
        bytes.extend_from_slice(&hex(sum.0));
        bytes.push(b'\n');

        let fix = feed(&mut parser, &bytes).expect("sentence should commit");
        assert!(close(fix.latitude(), -33.85, 1e-9));
        assert!(close(fix.longitude(), 151.2, 1e-9));
        assert_eq!(fix.year(), 2024);
    }

    fn hex(b: u8) -> [u8; 2] {
        const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
        [DIGITS[(b >> 4) as usize], DIGITS[(b & 0xf) as usize]]
    }
}
