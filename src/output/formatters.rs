use chrono::Utc;
use serde_json::json;

use crate::devices::gps::LocationSample;

pub trait DataFormatter: Send + Sync {
    fn format_locations(&self, locations: &[LocationSample]) -> String;
    fn format_header(&self) -> String;
    fn format_type(&self) -> &str;

    fn format(&self, locations: &[LocationSample]) -> String {
        let mut output = self.format_header();
        output.push_str(&self.format_locations(locations));
        output
    }
}

/// Picks the formatter for a `display.format` value.
pub fn formatter_for(format: &str) -> Option<Box<dyn DataFormatter>> {
    match format {
        "console" => Some(Box::new(ConsoleFormatter)),
        "json" => Some(Box::new(JsonFormatter)),
        "csv" => Some(Box::new(CsvFormatter)),
        _ => None,
    }
}

fn one_decimal(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}

fn date_and_time(sample: &LocationSample) -> (String, String) {
    match sample.datetime() {
        Some(dt) => (dt.format("%Y-%m-%d").to_string(), dt.format("%H:%M:%S").to_string()),
        None => ("-".to_string(), "-".to_string()),
    }
}

/// Fixed-width table, one row per location.
pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_locations(&self, locations: &[LocationSample]) -> String {
        if locations.is_empty() {
            return "(no accurate locations yet)\n".to_string();
        }

        let mut output = format!(
            "{:<10} {:<8} {:>8} {:>8} {:>7} {:>9} {:<8}\n",
            "Date", "Time", "Lat", "Long", "Bearing", "Speed", "Provider"
        );
        output.push_str(&"─".repeat(64));
        output.push('\n');

        for location in locations {
            let (date, time) = date_and_time(location);
            output.push_str(&format!(
                "{:<10} {:<8} {:>8} {:>8} {:>7} {:>9} {:<8}\n",
                date,
                time,
                one_decimal(location.latitude),
                one_decimal(location.longitude),
                one_decimal(f64::from(location.bearing)),
                format!("{:.2}mph", location.speed_mph()),
                location.provider
            ));
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🛰️  GPS Locations - {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }

    fn format_type(&self) -> &str {
        "console"
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_locations(&self, locations: &[LocationSample]) -> String {
        let result = json!({
            "timestamp": Utc::now().timestamp(),
            "count": locations.len(),
            "locations": locations,
        });

        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }

    fn format_type(&self) -> &str {
        "json"
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_locations(&self, locations: &[LocationSample]) -> String {
        let mut csv = String::new();
        for location in locations {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                location.timestamp,
                location.accuracy,
                location.latitude,
                location.longitude,
                location.bearing,
                location.speed,
                location.provider
            ));
        }
        csv
    }

    fn format_header(&self) -> String {
        "Timestamp,Accuracy,Latitude,Longitude,Bearing,Speed,Provider\n".to_string()
    }

    fn format_type(&self) -> &str {
        "csv"
    }
}
