//! Analog Input (Group 30/31/32) and Analog Output (Group 40/41/42) objects.

use crate::error::{Dnp3Error, Result};

bitflags::bitflags! {
    /// Flags byte carried with most analog object variations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnalogFlags: u8 {
        const ONLINE = 0x01;
        const RESTART = 0x02;
        const COMM_LOST = 0x04;
        const REMOTE_FORCED = 0x08;
        const LOCAL_FORCED = 0x10;
        const OVER_RANGE = 0x20;
        const REFERENCE_ERR = 0x40;
        const RESERVED = 0x80;
    }
}

/// Group 30 (static) / Group 32 (event) analog input point. The value is
/// widened to `f64` regardless of wire representation (i32/i16/f32/f64).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogInput {
    pub index: u32,
    pub value: f64,
    pub flags: AnalogFlags,
}

impl AnalogInput {
    pub fn is_online(&self) -> bool {
        self.flags.contains(AnalogFlags::ONLINE)
    }

    pub fn is_over_range(&self) -> bool {
        self.flags.contains(AnalogFlags::OVER_RANGE)
    }

    pub fn comm_lost(&self) -> bool {
        self.flags.contains(AnalogFlags::COMM_LOST)
    }

    fn from_bytes(data: &[u8], index: u32, variation: u8) -> Result<Self> {
        let (flags, value) = match variation {
            1 => (
                AnalogFlags::from_bits_truncate(data[0]),
                i32::from_le_bytes([data[1], data[2], data[3], data[4]]) as f64,
            ),
            2 => (
                AnalogFlags::from_bits_truncate(data[0]),
                i16::from_le_bytes([data[1], data[2]]) as f64,
            ),
            3 => (AnalogFlags::ONLINE, i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64),
            4 => (AnalogFlags::ONLINE, i16::from_le_bytes([data[0], data[1]]) as f64),
            5 => (
                AnalogFlags::from_bits_truncate(data[0]),
                f32::from_le_bytes([data[1], data[2], data[3], data[4]]) as f64,
            ),
            6 => (
                AnalogFlags::from_bits_truncate(data[0]),
                f64::from_le_bytes([data[1], data[2], data[3], data[4], data[5], data[6], data[7], data[8]]),
            ),
            other => {
                return Err(Dnp3Error::object(format!("unsupported analog input variation: {other}"), Some(30), Some(other)));
            }
        };
        Ok(AnalogInput { index, value, flags })
    }
}

/// Group 40 (static) analog output status point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogOutput {
    pub index: u32,
    pub value: f64,
    pub flags: AnalogFlags,
}

impl AnalogOutput {
    fn from_bytes(data: &[u8], index: u32, variation: u8) -> Result<Self> {
        let (flags, value) = match variation {
            1 => (
                AnalogFlags::from_bits_truncate(data[0]),
                i32::from_le_bytes([data[1], data[2], data[3], data[4]]) as f64,
            ),
            2 => (
                AnalogFlags::from_bits_truncate(data[0]),
                i16::from_le_bytes([data[1], data[2]]) as f64,
            ),
            3 => (
                AnalogFlags::from_bits_truncate(data[0]),
                f32::from_le_bytes([data[1], data[2], data[3], data[4]]) as f64,
            ),
            4 => (
                AnalogFlags::from_bits_truncate(data[0]),
                f64::from_le_bytes([data[1], data[2], data[3], data[4], data[5], data[6], data[7], data[8]]),
            ),
            other => {
                return Err(Dnp3Error::object(format!("unsupported analog output variation: {other}"), Some(40), Some(other)));
            }
        };
        Ok(AnalogOutput { index, value, flags })
    }
}

/// Analog Output Block (Group 41): a control command echoed back by the
/// outstation with an execution status byte, no flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogOutputCommand {
    pub index: u32,
    pub value: f64,
    pub status: u8,
}

impl AnalogOutputCommand {
    pub fn new(index: u32, value: f64) -> Self {
        AnalogOutputCommand { index, value, status: 0 }
    }

    /// Serialize as Group 41, the given variation (1=i32, 2=i16, 3=f32, 4=f64).
    pub fn to_bytes(&self, variation: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(9);
        match variation {
            1 => out.extend_from_slice(&(self.value as i32).to_le_bytes()),
            2 => out.extend_from_slice(&(self.value as i16).to_le_bytes()),
            3 => out.extend_from_slice(&(self.value as f32).to_le_bytes()),
            4 => out.extend_from_slice(&self.value.to_le_bytes()),
            other => {
                return Err(Dnp3Error::object(format!("unsupported analog output block variation: {other}"), Some(41), Some(other)));
            }
        }
        out.push(self.status);
        Ok(out)
    }

    pub fn from_bytes(data: &[u8], index: u32, variation: u8) -> Result<Self> {
        let (value, status) = match variation {
            1 => {
                if data.len() < 5 {
                    return Err(Dnp3Error::object(format!("analog output command data too short: {} < 5", data.len()), Some(41), Some(1)));
                }
                (i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64, data[4])
            }
            2 => {
                if data.len() < 3 {
                    return Err(Dnp3Error::object(format!("analog output command data too short: {} < 3", data.len()), Some(41), Some(2)));
                }
                (i16::from_le_bytes([data[0], data[1]]) as f64, data[2])
            }
            3 => {
                if data.len() < 5 {
                    return Err(Dnp3Error::object(format!("analog output command data too short: {} < 5", data.len()), Some(41), Some(3)));
                }
                (f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64, data[4])
            }
            4 => {
                if data.len() < 9 {
                    return Err(Dnp3Error::object(format!("analog output command data too short: {} < 9", data.len()), Some(41), Some(4)));
                }
                (
                    f64::from_le_bytes([data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7]]),
                    data[8],
                )
            }
            other => {
                return Err(Dnp3Error::object(format!("unsupported analog output block variation: {other}"), Some(41), Some(other)));
            }
        };
        Ok(AnalogOutputCommand { index, value, status })
    }
}

fn variation_size(variation: u8) -> Option<usize> {
    match variation {
        1 => Some(5),
        2 => Some(3),
        3 => Some(4),
        4 => Some(2),
        5 => Some(5),
        6 => Some(9),
        _ => None,
    }
}

/// Parse `count` analog inputs starting at `start_index` from `data`.
pub fn parse_analog_inputs(data: &[u8], start_index: u32, count: u32, variation: u8) -> Result<Vec<AnalogInput>> {
    let obj_size = variation_size(variation)
        .ok_or_else(|| Dnp3Error::object(format!("unsupported analog input variation: {variation}"), Some(30), Some(variation)))?;

    let mut inputs = Vec::with_capacity(count as usize);
    let mut offset = 0usize;
    for i in 0..count {
        if offset + obj_size > data.len() {
            break;
        }
        inputs.push(AnalogInput::from_bytes(&data[offset..offset + obj_size], start_index + i, variation)?);
        offset += obj_size;
    }
    Ok(inputs)
}

/// Parse `count` analog outputs starting at `start_index` from `data`.
pub fn parse_analog_outputs(data: &[u8], start_index: u32, count: u32, variation: u8) -> Result<Vec<AnalogOutput>> {
    let obj_size = match variation {
        1 => 5,
        2 => 3,
        3 => 5,
        4 => 9,
        other => {
            return Err(Dnp3Error::object(format!("unsupported analog output variation: {other}"), Some(40), Some(other)));
        }
    };

    let mut outputs = Vec::with_capacity(count as usize);
    let mut offset = 0usize;
    for i in 0..count {
        if offset + obj_size > data.len() {
            break;
        }
        outputs.push(AnalogOutput::from_bytes(&data[offset..offset + obj_size], start_index + i, variation)?);
        offset += obj_size;
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variation_5_decodes_ieee754_float() {
        let mut data = vec![AnalogFlags::ONLINE.bits()];
        data.extend_from_slice(&123.5f32.to_le_bytes());
        let inputs = parse_analog_inputs(&data, 0, 1, 5).unwrap();
        assert!((inputs[0].value - 123.5).abs() < 1e-6);
    }

    #[test]
    fn aob_round_trips_through_bytes() {
        let cmd = AnalogOutputCommand::new(2, 42.0);
        let bytes = cmd.to_bytes(1).unwrap();
        let parsed = AnalogOutputCommand::from_bytes(&bytes, 2, 1).unwrap();
        assert_eq!(parsed.value, 42.0);
        assert_eq!(parsed.status, 0);
    }

    #[test]
    fn aob_variation_4_is_64_bit_float_plus_status() {
        let cmd = AnalogOutputCommand::new(0, 3.14159);
        let bytes = cmd.to_bytes(4).unwrap();
        assert_eq!(bytes.len(), 9);
        let parsed = AnalogOutputCommand::from_bytes(&bytes, 0, 4).unwrap();
        assert!((parsed.value - 3.14159).abs() < 1e-9);
    }

    #[test]
    fn truncated_aob_data_is_rejected() {
        assert!(AnalogOutputCommand::from_bytes(&[0, 0], 0, 1).is_err());
    }
}
