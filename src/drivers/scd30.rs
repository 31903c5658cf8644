//! Sensirion SCD30 CO2 / temperature / humidity sensor over I2C.
//!
//! Every 16-bit word on the bus is followed by a CRC-8 (poly 0x31,
//! init 0xFF). Measurements are three big-endian IEEE-754 floats, each
//! split across two CRC-protected words.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};
use log::{debug, warn};

use crate::app::ports::SensorPort;
use crate::app::store::Sample;
use crate::config::{SENSOR_INTERVAL_MAX_SECS, SENSOR_INTERVAL_MIN_SECS};
use crate::error::SensorError;

pub const ADDRESS: u8 = 0x61;

const CMD_START_CONTINUOUS: u16 = 0x0010;
const CMD_SET_INTERVAL: u16 = 0x4600;
const CMD_DATA_READY: u16 = 0x0202;
const CMD_READ_MEASUREMENT: u16 = 0x0300;

/// Minimum gap between a command write and the following read.
const READ_DELAY_US: u32 = 3_000;

/// Sensirion CRC-8 over one word.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x31 } else { crc << 1 };
        }
    }
    crc
}

/// Strip and check the CRC bytes of `N` received words.
pub fn decode_words<const N: usize>(raw: &[u8]) -> Result<[u16; N], SensorError> {
    if raw.len() != N * 3 {
        return Err(SensorError::BusFailed);
    }
    let mut words = [0u16; N];
    for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(3)) {
        if crc8(&chunk[..2]) != chunk[2] {
            return Err(SensorError::Checksum);
        }
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(words)
}

fn float(hi: u16, lo: u16) -> f32 {
    f32::from_bits((u32::from(hi) << 16) | u32::from(lo))
}

/// Parse the 18-byte measurement frame.
pub fn parse_measurement(raw: &[u8; 18]) -> Result<Sample, SensorError> {
    let w = decode_words::<6>(raw)?;
    let sample = Sample {
        co2_ppm: float(w[0], w[1]),
        temperature_c: float(w[2], w[3]),
        humidity_pct: float(w[4], w[5]),
    };
    if sample.is_finite() {
        Ok(sample)
    } else {
        Err(SensorError::NotFinite)
    }
}

pub struct Scd30<I: I2c, D: DelayNs> {
    i2c: I,
    delay: D,
}

impl<I: I2c, D: DelayNs> Scd30<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self { i2c, delay }
    }

    /// Start continuous measurement without ambient pressure compensation.
    pub fn start(&mut self) -> Result<(), SensorError> {
        self.command_with_arg(CMD_START_CONTINUOUS, 0)
    }

    fn command(&mut self, cmd: u16) -> Result<(), SensorError> {
        self.i2c.write(ADDRESS, &cmd.to_be_bytes()).map_err(|e| {
            warn!("SCD30: command {:#06x} failed: {:?}", cmd, e.kind());
            SensorError::BusFailed
        })
    }

    fn command_with_arg(&mut self, cmd: u16, arg: u16) -> Result<(), SensorError> {
        let [c0, c1] = cmd.to_be_bytes();
        let [a0, a1] = arg.to_be_bytes();
        let frame = [c0, c1, a0, a1, crc8(&[a0, a1])];
        self.i2c.write(ADDRESS, &frame).map_err(|e| {
            warn!("SCD30: command {:#06x} failed: {:?}", cmd, e.kind());
            SensorError::BusFailed
        })
    }

    fn query(&mut self, cmd: u16, buf: &mut [u8]) -> Result<(), SensorError> {
        self.command(cmd)?;
        self.delay.delay_us(READ_DELAY_US);
        self.i2c.read(ADDRESS, buf).map_err(|e| {
            warn!("SCD30: read after {:#06x} failed: {:?}", cmd, e.kind());
            SensorError::BusFailed
        })
    }
}

impl<I: I2c, D: DelayNs> SensorPort for Scd30<I, D> {
    fn configure_interval(&mut self, secs: u16) -> Result<(), SensorError> {
        if !(SENSOR_INTERVAL_MIN_SECS..=SENSOR_INTERVAL_MAX_SECS).contains(&secs) {
            return Err(SensorError::IntervalOutOfRange);
        }
        self.command_with_arg(CMD_SET_INTERVAL, secs)?;
        debug!("SCD30: measurement interval {} s", secs);
        Ok(())
    }

    fn poll_ready(&mut self) -> bool {
        let mut raw = [0u8; 3];
        self.query(CMD_DATA_READY, &mut raw)
            .and_then(|()| decode_words::<1>(&raw))
            .is_ok_and(|[ready]| ready == 1)
    }

    fn read_sample(&mut self) -> Result<Sample, SensorError> {
        let mut raw = [0u8; 18];
        self.query(CMD_READ_MEASUREMENT, &mut raw)?;
        parse_measurement(&raw)
    }
}
