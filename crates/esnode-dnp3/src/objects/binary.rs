//! Binary Input (Group 1/2) and Binary Output (Group 10/11/12) objects.

use crate::error::{Dnp3Error, Result};

bitflags::bitflags! {
    /// Flags byte carried with most binary object variations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BinaryFlags: u8 {
        const ONLINE = 0x01;
        const RESTART = 0x02;
        const COMM_LOST = 0x04;
        const REMOTE_FORCED = 0x08;
        const LOCAL_FORCED = 0x10;
        const CHATTER_FILTER = 0x20;
        const RESERVED = 0x40;
        const STATE = 0x80;
    }
}

/// Group 1 (static) / Group 2 (event) binary input point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryInput {
    pub index: u32,
    pub value: bool,
    pub flags: BinaryFlags,
    pub timestamp: Option<u64>,
}

impl BinaryInput {
    pub fn is_online(&self) -> bool {
        self.flags.contains(BinaryFlags::ONLINE)
    }

    pub fn comm_lost(&self) -> bool {
        self.flags.contains(BinaryFlags::COMM_LOST)
    }

    fn from_bytes(data: &[u8], index: u32, variation: u8) -> Result<Self> {
        let (flags, value, timestamp) = match variation {
            1 => {
                if data.is_empty() {
                    return Err(Dnp3Error::object("insufficient data for binary input variation 1", Some(1), Some(1)));
                }
                (BinaryFlags::ONLINE, data[0] & 0x01 != 0, None)
            }
            2 => {
                if data.is_empty() {
                    return Err(Dnp3Error::object("insufficient data for binary input variation 2", Some(2), Some(2)));
                }
                let flags = BinaryFlags::from_bits_truncate(data[0]);
                let value = flags.contains(BinaryFlags::STATE);
                let timestamp = if data.len() >= 7 {
                    Some(u48_from_le(&data[1..7]))
                } else {
                    None
                };
                (flags, value, timestamp)
            }
            3 => {
                if data.len() < 3 {
                    return Err(Dnp3Error::object("insufficient data for binary input event variation 3", Some(2), Some(3)));
                }
                let flags = BinaryFlags::from_bits_truncate(data[0]);
                let value = flags.contains(BinaryFlags::STATE);
                let timestamp = Some(u16::from_le_bytes([data[1], data[2]]) as u64);
                (flags, value, timestamp)
            }
            other => {
                return Err(Dnp3Error::object(
                    format!("unsupported binary input variation: {other}"),
                    None,
                    Some(other),
                ));
            }
        };

        Ok(BinaryInput {
            index,
            value,
            flags,
            timestamp,
        })
    }
}

/// Group 10 (static) binary output point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOutput {
    pub index: u32,
    pub value: bool,
    pub flags: BinaryFlags,
}

impl BinaryOutput {
    fn from_bytes(data: &[u8], index: u32, variation: u8) -> Result<Self> {
        let (flags, value) = match variation {
            1 => {
                if data.is_empty() {
                    return Err(Dnp3Error::object("insufficient data for binary output variation 1", Some(10), Some(1)));
                }
                (BinaryFlags::ONLINE, data[0] & 0x01 != 0)
            }
            2 => {
                if data.is_empty() {
                    return Err(Dnp3Error::object("insufficient data for binary output variation 2", Some(10), Some(2)));
                }
                let flags = BinaryFlags::from_bits_truncate(data[0]);
                (flags, flags.contains(BinaryFlags::STATE))
            }
            other => {
                return Err(Dnp3Error::object(format!("unsupported binary output variation: {other}"), None, Some(other)));
            }
        };
        Ok(BinaryOutput { index, value, flags })
    }
}

/// Control Relay Output Block (Group 12, Variation 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crob {
    pub index: u32,
    pub control_code: u8,
    pub count: u8,
    pub on_time_ms: u32,
    pub off_time_ms: u32,
    pub status: u8,
}

pub mod control_code {
    pub const NUL: u8 = 0x00;
    pub const PULSE_ON: u8 = 0x01;
    pub const PULSE_OFF: u8 = 0x02;
    pub const LATCH_ON: u8 = 0x03;
    pub const LATCH_OFF: u8 = 0x04;
    pub const QUEUE: u8 = 0x10;
    pub const CLEAR: u8 = 0x20;
    pub const TRIP: u8 = 0x40;
    pub const CLOSE: u8 = 0x80;
}

impl Crob {
    pub fn latch_on(index: u32) -> Self {
        Crob {
            index,
            control_code: control_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        }
    }

    pub fn latch_off(index: u32) -> Self {
        Crob {
            index,
            control_code: control_code::LATCH_OFF,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        }
    }

    pub fn pulse_on(index: u32, on_time_ms: u32, off_time_ms: u32) -> Self {
        Crob {
            index,
            control_code: control_code::PULSE_ON,
            count: 1,
            on_time_ms,
            off_time_ms,
            status: 0,
        }
    }

    pub fn trip(index: u32) -> Self {
        Crob {
            index,
            control_code: control_code::TRIP | control_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        }
    }

    pub fn close(index: u32) -> Self {
        Crob {
            index,
            control_code: control_code::CLOSE | control_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let base_op = self.control_code & 0x0F;
        let allowed_base = [
            control_code::NUL,
            control_code::PULSE_ON,
            control_code::PULSE_OFF,
            control_code::LATCH_ON,
            control_code::LATCH_OFF,
        ];
        if !allowed_base.contains(&base_op) {
            return Err(Dnp3Error::object(format!("invalid CROB base control code: {base_op:#04x}"), Some(12), Some(1)));
        }
        if self.control_code & 0xC0 == 0xC0 {
            return Err(Dnp3Error::object("invalid CROB control code: TRIP and CLOSE both set", Some(12), Some(1)));
        }
        Ok(())
    }

    /// Serialize as Group 12 Variation 1 (11 bytes).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = Vec::with_capacity(11);
        out.push(self.control_code);
        out.push(self.count);
        out.extend_from_slice(&self.on_time_ms.to_le_bytes());
        out.extend_from_slice(&self.off_time_ms.to_le_bytes());
        out.push(self.status);
        Ok(out)
    }

    pub fn from_bytes(data: &[u8], index: u32) -> Result<Self> {
        if data.len() < 11 {
            return Err(Dnp3Error::object(format!("CROB data too short: {} < 11", data.len()), Some(12), Some(1)));
        }
        Ok(Crob {
            index,
            control_code: data[0],
            count: data[1],
            on_time_ms: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            off_time_ms: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
            status: data[10],
        })
    }
}

fn u48_from_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..6].copy_from_slice(&bytes[..6]);
    u64::from_le_bytes(buf)
}

/// Parse `count` binary inputs starting at `start_index` from `data`.
pub fn parse_binary_inputs(data: &[u8], start_index: u32, count: u32, variation: u8) -> Result<Vec<BinaryInput>> {
    let mut inputs = Vec::with_capacity(count as usize);

    if variation == 1 {
        for i in 0..count {
            let byte_idx = (i / 8) as usize;
            let bit_idx = i % 8;
            if byte_idx >= data.len() {
                break;
            }
            let value = data[byte_idx] & (1 << bit_idx) != 0;
            inputs.push(BinaryInput {
                index: start_index + i,
                value,
                flags: BinaryFlags::ONLINE,
                timestamp: None,
            });
        }
        return Ok(inputs);
    }

    let obj_size: usize = match variation {
        2 => {
            if data.len() as u64 >= count as u64 * 7 {
                7
            } else {
                1
            }
        }
        3 => 3,
        other => {
            return Err(Dnp3Error::object(format!("unsupported binary input variation: {other}"), None, Some(other)));
        }
    };

    let mut offset = 0usize;
    for i in 0..count {
        if offset + obj_size > data.len() {
            break;
        }
        inputs.push(BinaryInput::from_bytes(&data[offset..offset + obj_size], start_index + i, variation)?);
        offset += obj_size;
    }
    Ok(inputs)
}

/// Parse `count` binary outputs starting at `start_index` from `data`.
pub fn parse_binary_outputs(data: &[u8], start_index: u32, count: u32, variation: u8) -> Result<Vec<BinaryOutput>> {
    let mut outputs = Vec::with_capacity(count as usize);

    if variation == 1 {
        for i in 0..count {
            let byte_idx = (i / 8) as usize;
            let bit_idx = i % 8;
            if byte_idx >= data.len() {
                break;
            }
            let value = data[byte_idx] & (1 << bit_idx) != 0;
            outputs.push(BinaryOutput {
                index: start_index + i,
                value,
                flags: BinaryFlags::ONLINE,
            });
        }
        return Ok(outputs);
    }

    if variation != 2 {
        return Err(Dnp3Error::object(format!("unsupported binary output variation: {variation}"), None, Some(variation)));
    }

    let mut offset = 0usize;
    for i in 0..count {
        if offset >= data.len() {
            break;
        }
        outputs.push(BinaryOutput::from_bytes(&data[offset..offset + 1], start_index + i, variation)?);
        offset += 1;
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_binary_inputs_unpack_lsb_first() {
        let data = [0b0000_0101];
        let inputs = parse_binary_inputs(&data, 0, 3, 1).unwrap();
        assert_eq!(inputs.iter().map(|p| p.value).collect::<Vec<_>>(), vec![true, false, true]);
    }

    #[test]
    fn flagged_binary_inputs_decode_state_bit() {
        let data = [BinaryFlags::ONLINE.bits() | BinaryFlags::STATE.bits()];
        let inputs = parse_binary_inputs(&data, 5, 1, 2).unwrap();
        assert_eq!(inputs[0].index, 5);
        assert!(inputs[0].value);
        assert!(inputs[0].is_online());
    }

    #[test]
    fn crob_round_trips_through_bytes() {
        let crob = Crob::pulse_on(3, 1000, 500);
        let bytes = crob.to_bytes().unwrap();
        assert_eq!(bytes.len(), 11);
        let parsed = Crob::from_bytes(&bytes, 3).unwrap();
        assert_eq!(parsed.control_code, control_code::PULSE_ON);
        assert_eq!(parsed.on_time_ms, 1000);
        assert_eq!(parsed.off_time_ms, 500);
    }

    #[test]
    fn crob_rejects_trip_and_close_together() {
        let crob = Crob {
            index: 0,
            control_code: control_code::TRIP | control_code::CLOSE | control_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        };
        assert!(crob.validate().is_err());
    }
}
