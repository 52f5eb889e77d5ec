use log::{debug, info, warn};
use serialport::SerialPort;
use std::io::{BufRead, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::gps_data::LocationSample;
use super::nmea_decoder::NmeaDecoder;
use crate::config::GpsConfig;
use crate::devices::traits::LocationSource;
use crate::utils::error::GpsError;

/// How often a Quectel modem is asked for `+QGPSLOC`.
const LOCATION_REQUEST_INTERVAL: Duration = Duration::from_secs(5);

/// Summary of a serial port found on this machine.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSummary {
    pub port_name: String,
    pub description: String,
}

/// Reads location fixes from a GNSS receiver attached to a serial port.
pub struct GpsReader {
    port: Box<dyn SerialPort>,
    decoder: NmeaDecoder,
    poll_quectel: bool,
}

impl GpsReader {
    pub fn new(
        port_name: &str,
        baud_rate: u32,
        timeout_ms: u64,
        decoder: NmeaDecoder,
    ) -> Result<Self, GpsError> {
        info!("🧭 Initializing GPS on port {} at {} baud", port_name, baud_rate);

        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(timeout_ms))
            .open()
            .map_err(|e| {
                GpsError::ConnectionError(format!("Failed to open GPS port {}: {}", port_name, e))
            })?;

        Ok(Self {
            port,
            decoder,
            poll_quectel: false,
        })
    }

    /// Opens the receiver described by `config`, running the Quectel setup
    /// when asked to.
    pub fn open(config: &GpsConfig) -> Result<Self, GpsError> {
        let decoder = NmeaDecoder::new(config.provider.clone(), config.sample_interval_ms);
        let mut reader =
            Self::new(&config.serial_port, config.baud_rate, config.timeout_ms, decoder)?;
        if config.configure_quectel {
            reader.configure_quectel_gps()?;
        }
        Ok(reader)
    }

    pub fn list_ports() -> Result<Vec<PortSummary>, GpsError> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| {
                let description = match port.port_type {
                    serialport::SerialPortType::UsbPort(usb) => format!(
                        "USB {:04x}:{:04x} {}",
                        usb.vid,
                        usb.pid,
                        usb.product.or(usb.manufacturer).unwrap_or_default()
                    ),
                    serialport::SerialPortType::PciPort => "PCI".to_string(),
                    serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    serialport::SerialPortType::Unknown => "Unknown".to_string(),
                };
                PortSummary {
                    port_name: port.port_name,
                    description,
                }
            })
            .collect())
    }

    pub fn configure_quectel_gps(&mut self) -> Result<(), GpsError> {
        info!("🔧 Configuring Quectel GPS module...");

        // NMEA output type, then power cycle the GNSS engine
        for (command, settle_ms) in [
            ("AT+QGPSCFG=\"gpsnmeatype\",1", 500),
            ("AT+CFUN=1", 500),
            ("AT+QGPSEND", 500),
            ("AT+QGPS=1", 1000),
        ] {
            self.send_at_command(command)?;
            std::thread::sleep(Duration::from_millis(settle_ms));
        }

        self.poll_quectel = true;
        info!("✅ GPS module configured successfully");
        Ok(())
    }

    fn send_at_command(&mut self, command: &str) -> Result<String, GpsError> {
        debug!("📤 Sending GPS command: {}", command);

        self.port
            .write_all(format!("{}\r\n", command).as_bytes())
            .map_err(|e| {
                GpsError::CommunicationError(format!("Failed to send GPS command: {}", e))
            })?;
        self.port
            .flush()
            .map_err(|e| GpsError::CommunicationError(format!("Failed to flush GPS port: {}", e)))?;

        let mut response = String::new();
        let start_time = Instant::now();
        let timeout = Duration::from_secs(5);

        while start_time.elapsed() < timeout {
            let mut buffer = [0u8; 256];
            match self.port.read(&mut buffer) {
                Ok(0) => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(n) => {
                    response.push_str(&String::from_utf8_lossy(&buffer[..n]));
                    if response.contains("OK") || response.contains("ERROR") {
                        break;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    warn!("⚠️ Error reading GPS response: {}", e);
                    break;
                }
            }
        }

        for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!("📥 GPS Response: {}", line);
        }

        if response.contains("ERROR") {
            warn!("⚠️ GPS command {} answered with ERROR", command);
        }

        Ok(response)
    }
}

impl LocationSource for GpsReader {
    fn provider(&self) -> &str {
        self.decoder.provider()
    }

    fn source_type(&self) -> &str {
        "serial"
    }

    fn read_locations(
        &mut self,
        keep_running: &AtomicBool,
        callback: &mut dyn FnMut(LocationSample) -> bool,
    ) -> Result<(), GpsError> {
        let mut last_location_request: Option<Instant> = None;

        info!("📡 Starting continuous GPS monitoring...");

        // Each read returns within the port timeout, fix or not.
        while keep_running.load(Ordering::SeqCst) {
            if self.poll_quectel
                && last_location_request.map_or(true, |at| at.elapsed() > LOCATION_REQUEST_INTERVAL)
            {
                if let Err(e) = self.port.write_all(b"AT+QGPSLOC=0\r\n") {
                    warn!("⚠️ Failed to send GPS location request: {}", e);
                } else if let Err(e) = self.port.flush() {
                    debug!("⚠️ Failed to flush GPS location request: {}", e);
                }
                last_location_request = Some(Instant::now());
            }

            let mut buffer = [0u8; 1024];
            match self.port.read(&mut buffer) {
                Ok(0) => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(n) => {
                    for sample in self.decoder.push_bytes(&buffer[..n]) {
                        debug!("📍 GPS fix: {}", sample);
                        if !callback(sample) {
                            return Ok(());
                        }
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    return Err(GpsError::CommunicationError(format!("GPS read error: {}", e)));
                }
            }
        }

        info!("📡 GPS monitoring stopped");
        Ok(())
    }
}

/// Replays NMEA text, e.g. a log captured from a receiver.
pub struct NmeaReplay<R: BufRead + Send> {
    input: R,
    decoder: NmeaDecoder,
    pacing: Option<Duration>,
}

impl<R: BufRead + Send> NmeaReplay<R> {
    pub fn new(input: R, decoder: NmeaDecoder) -> Self {
        Self {
            input,
            decoder,
            pacing: None,
        }
    }

    /// Sleeps between emitted samples to imitate a live receiver.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }
}

impl<R: BufRead + Send> LocationSource for NmeaReplay<R> {
    fn provider(&self) -> &str {
        self.decoder.provider()
    }

    fn source_type(&self) -> &str {
        "replay"
    }

    fn read_locations(
        &mut self,
        keep_running: &AtomicBool,
        callback: &mut dyn FnMut(LocationSample) -> bool,
    ) -> Result<(), GpsError> {
        let mut line = String::new();
        while keep_running.load(Ordering::SeqCst) {
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                debug!("📼 End of NMEA replay");
                return Ok(());
            }

            if let Some(sample) = self.decoder.decode_line(&line) {
                if !callback(sample) {
                    return Ok(());
                }
                if let Some(pacing) = self.pacing {
                    std::thread::sleep(pacing);
                }
            }
        }
        Ok(())
    }
}
