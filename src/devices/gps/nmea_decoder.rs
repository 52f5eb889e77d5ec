use chrono::{NaiveDate, NaiveTime, Utc};
use log::{debug, warn};
use nmea::{Nmea, SentenceType};

use super::gps_data::{parse_coordinate, LocationSample, KNOTS_TO_MPS};

/// Assumed user equivalent range error; HDOP x UERE approximates the
/// horizontal accuracy radius in meters.
pub const UERE_METERS: f32 = 5.0;

/// Accuracy reported when the receiver gave no HDOP at all.
pub const UNKNOWN_ACCURACY_METERS: f32 = 99.0;

const KMH_TO_MPS: f32 = 1.0 / 3.6;

/// Longest partial line kept while waiting for a newline. NMEA sentences are
/// at most 82 characters; anything far past that is line noise.
const MAX_LINE_LENGTH: usize = 1024;

/// Turns a stream of NMEA 0183 sentences and Quectel `+QGPSLOC:` replies
/// into location samples.
///
/// GGA and RMC sentences of the same epoch describe the same fix, so a
/// sample is only emitted once `min_interval_ms` has passed since the last
/// emitted one.
pub struct NmeaDecoder {
    parser: Nmea,
    provider: String,
    min_interval_ms: i64,
    last_emitted: Option<i64>,
    line_buffer: String,
}

impl NmeaDecoder {
    pub fn new(provider: impl Into<String>, min_interval_ms: u64) -> Self {
        Self {
            parser: Nmea::default(),
            provider: provider.into(),
            min_interval_ms: i64::try_from(min_interval_ms).unwrap_or(i64::MAX),
            last_emitted: None,
            line_buffer: String::new(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Buffers raw bytes and decodes every complete line received so far.
    pub fn push_bytes(&mut self, data: &[u8]) -> Vec<LocationSample> {
        self.line_buffer.push_str(&String::from_utf8_lossy(data));

        let mut samples = Vec::new();
        while let Some(newline_pos) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=newline_pos).collect();
            if let Some(sample) = self.decode_line(&line) {
                samples.push(sample);
            }
        }

        if self.line_buffer.len() > MAX_LINE_LENGTH {
            warn!(
                "⚠️ Discarding {} bytes without a line break, check the baud rate",
                self.line_buffer.len()
            );
            self.line_buffer.clear();
        }
        samples
    }

    pub fn decode_line(&mut self, line: &str) -> Option<LocationSample> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        if line.is_empty() {
            return None;
        }

        let sample = if line.starts_with("+QGPSLOC:") {
            parse_qgpsloc(line, &self.provider)
        } else if line.starts_with('$') {
            self.decode_sentence(line)
        } else {
            debug!("📥 Ignoring non-NMEA line: {}", line);
            None
        }?;

        self.admit(sample)
    }

    fn decode_sentence(&mut self, line: &str) -> Option<LocationSample> {
        match self.parser.parse(line) {
            Ok(SentenceType::GGA) | Ok(SentenceType::RMC) => self.sample_from_parser(),
            Ok(sentence_type) => {
                debug!("📥 NMEA {:?} sentence updates state only", sentence_type);
                None
            }
            Err(e) => {
                debug!("⚠️ Failed to parse NMEA sentence: {} - Error: {:?}", line, e);
                None
            }
        }
    }

    fn sample_from_parser(&self) -> Option<LocationSample> {
        let latitude = self.parser.latitude?;
        let longitude = self.parser.longitude?;

        let accuracy = self
            .parser
            .hdop
            .map(|hdop| hdop * UERE_METERS)
            .unwrap_or(UNKNOWN_ACCURACY_METERS);

        let timestamp = match self.parser.fix_time {
            Some(time) => epoch_millis(self.parser.fix_date, time),
            None => Utc::now().timestamp_millis(),
        };

        Some(LocationSample::new(
            accuracy,
            timestamp,
            latitude,
            longitude,
            self.parser.true_course.unwrap_or(0.0),
            self.parser.speed_over_ground.unwrap_or(0.0) * KNOTS_TO_MPS,
            self.provider.clone(),
        ))
    }

    fn admit(&mut self, sample: LocationSample) -> Option<LocationSample> {
        if let Some(last) = self.last_emitted {
            let elapsed = sample.timestamp - last;
            // A clock that moved backwards starts a new sequence.
            if elapsed >= 0 && elapsed < self.min_interval_ms {
                debug!("⏱️ Dropping sample {}ms after the previous one", elapsed);
                return None;
            }
        }
        self.last_emitted = Some(sample.timestamp);
        Some(sample)
    }
}

fn epoch_millis(date: Option<NaiveDate>, time: NaiveTime) -> i64 {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    date.and_time(time).and_utc().timestamp_millis()
}

/// Parses `+QGPSLOC: <utc>,<lat>,<lon>,<hdop>,<alt>,<fix>,<cog>,<spkm>,<spkn>,<date>,<nsat>`.
pub fn parse_qgpsloc(line: &str, provider: &str) -> Option<LocationSample> {
    let data_part = line.strip_prefix("+QGPSLOC:")?.trim();
    let parts: Vec<&str> = data_part.split(',').map(str::trim).collect();

    if parts.len() < 11 {
        warn!("⚠️ Invalid QGPSLOC format: {}", line);
        return None;
    }

    let latitude = parse_coordinate(parts[1])?;
    let longitude = parse_coordinate(parts[2])?;

    let accuracy = parts[3]
        .parse::<f32>()
        .map(|hdop| hdop * UERE_METERS)
        .unwrap_or(UNKNOWN_ACCURACY_METERS);

    let date = NaiveDate::parse_from_str(parts[9], "%d%m%y").ok();
    let timestamp = match NaiveTime::parse_from_str(parts[0], "%H%M%S%.f") {
        Ok(time) => epoch_millis(date, time),
        Err(_) => Utc::now().timestamp_millis(),
    };

    let bearing = parts[6].parse::<f32>().unwrap_or(0.0);
    let speed = parts[7].parse::<f32>().map(|kmh| kmh * KMH_TO_MPS).unwrap_or(0.0);

    debug!(
        "🧭 Parsed QGPSLOC: lat={:.6}, lon={:.6}, accuracy={:.1}m, timestamp={}",
        latitude, longitude, accuracy, timestamp
    );

    Some(LocationSample::new(
        accuracy, timestamp, latitude, longitude, bearing, speed, provider,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230324,003.1,W*61";
    const RMC_NEXT: &str = "$GPRMC,123520,A,4807.038,N,01131.000,E,022.4,084.4,230324,003.1,W*6B";
    const QGPSLOC: &str =
        "+QGPSLOC: 022903.000,3150.7233N,11711.9272E,1.2,63.3,3,90.00,36.0,19.4,100119,07";

    #[test]
    fn test_rmc_then_gga_yields_one_sample_per_epoch() {
        let mut decoder = NmeaDecoder::new("gps", 1000);

        let first = decoder.decode_line(RMC).expect("RMC with a fix produces a sample");
        assert!((first.latitude - 48.1173).abs() < 1e-4);
        assert!((first.longitude - 11.516667).abs() < 1e-4);
        assert!((first.bearing - 84.4).abs() < 1e-3);
        assert!((first.speed - 22.4 * KNOTS_TO_MPS).abs() < 1e-3);
        assert_eq!(first.provider, "gps");

        let expected = NaiveDate::from_ymd_opt(2024, 3, 23)
            .unwrap()
            .and_hms_opt(12, 35, 19)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(first.timestamp, expected);

        // Same epoch, suppressed by the cadence limit.
        assert!(decoder.decode_line(GGA).is_none());

        let next = decoder.decode_line(RMC_NEXT).expect("next epoch is admitted");
        assert_eq!(next.timestamp, expected + 1000);
    }

    #[test]
    fn test_accuracy_comes_from_hdop() {
        let mut decoder = NmeaDecoder::new("gps", 1000);
        let sample = decoder.decode_line(GGA).unwrap();
        assert!((sample.accuracy - 0.9 * UERE_METERS).abs() < 1e-4);
    }

    #[test]
    fn test_rmc_alone_has_unknown_accuracy() {
        let mut decoder = NmeaDecoder::new("gps", 1000);
        let sample = decoder.decode_line(RMC).unwrap();
        assert_eq!(sample.accuracy, UNKNOWN_ACCURACY_METERS);
    }

    #[test]
    fn test_push_bytes_handles_split_lines() {
        let mut decoder = NmeaDecoder::new("gps", 1000);
        let stream = format!("{}\r\n{}\r\n", RMC, RMC_NEXT);
        let (head, tail) = stream.as_bytes().split_at(30);

        assert!(decoder.push_bytes(head).is_empty());
        let samples = decoder.push_bytes(tail);
        assert_eq!(samples.len(), 2);
        assert!(samples[0].timestamp < samples[1].timestamp);
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        let mut decoder = NmeaDecoder::new("gps", 1000);
        assert!(decoder.decode_line("").is_none());
        assert!(decoder.decode_line("OK").is_none());
        assert!(decoder.decode_line("$GPGGA,garbage*00").is_none());
    }

    #[test]
    fn test_parse_qgpsloc() {
        let sample = parse_qgpsloc(QGPSLOC, "quectel").unwrap();
        assert!((sample.latitude - 31.845388).abs() < 1e-5);
        assert!((sample.longitude - 117.198787).abs() < 1e-5);
        assert!((sample.accuracy - 6.0).abs() < 1e-4);
        assert!((sample.speed - 10.0).abs() < 1e-4);
        assert!((sample.bearing - 90.0).abs() < 1e-4);
        assert_eq!(sample.provider, "quectel");

        let expected = NaiveDate::from_ymd_opt(2019, 1, 10)
            .unwrap()
            .and_hms_opt(2, 29, 3)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(sample.timestamp, expected);
    }

    #[test]
    fn test_short_qgpsloc_rejected() {
        assert!(parse_qgpsloc("+QGPSLOC: 022903.000,3150.7233N", "gps").is_none());
    }

    #[test]
    fn test_clock_going_backwards_restarts_cadence() {
        let mut decoder = NmeaDecoder::new("gps", 1000);
        assert!(decoder.decode_line(RMC_NEXT).is_some());
        assert!(decoder.decode_line(RMC).is_some());
    }

    #[test]
    fn test_corrupt_byte_in_qgpsloc_is_skipped() {
        let mut decoder = NmeaDecoder::new("quectel", 1000);
        let mut stream = QGPSLOC.replacen("3150.7233N", "3150.7233\u{0}", 1).into_bytes();
        // Replace the hemisphere with a byte that is not valid UTF-8.
        let pos = stream.iter().position(|&b| b == 0).unwrap();
        stream[pos] = 0xff;
        stream.extend_from_slice(b"\r\n");
        stream.extend_from_slice(format!("{}\r\n", QGPSLOC).as_bytes());

        let samples = decoder.push_bytes(&stream);
        assert_eq!(samples.len(), 1);
        assert!((samples[0].latitude - 31.845388).abs() < 1e-5);
    }

    #[test]
    fn test_line_buffer_is_capped_without_newlines() {
        let mut decoder = NmeaDecoder::new("gps", 1000);
        for _ in 0..20 {
            assert!(decoder.push_bytes(&[0x55; 512]).is_empty());
            assert!(decoder.line_buffer.len() <= MAX_LINE_LENGTH);
        }

        let samples = decoder.push_bytes(format!("\r\n{}\r\n", RMC).as_bytes());
        assert_eq!(samples.len(), 1);
    }
}
