//! Counter (Group 20) and Frozen Counter (Group 21/22) objects.

use crate::error::{Dnp3Error, Result};

bitflags::bitflags! {
    /// Flags byte carried with most counter object variations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CounterFlags: u8 {
        const ONLINE = 0x01;
        const RESTART = 0x02;
        const COMM_LOST = 0x04;
        const REMOTE_FORCED = 0x08;
        const LOCAL_FORCED = 0x10;
        const ROLLOVER = 0x20;
        const DISCONTINUITY = 0x40;
        const RESERVED = 0x80;
    }
}

/// Group 20 (static counter) / Group 21 (frozen counter) / Group 22
/// (counter event) point. Variations 3/4/7/8 carry a signed delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub index: u32,
    pub value: i64,
    pub flags: CounterFlags,
}

impl Counter {
    pub fn is_online(&self) -> bool {
        self.flags.contains(CounterFlags::ONLINE)
    }

    pub fn has_rollover(&self) -> bool {
        self.flags.contains(CounterFlags::ROLLOVER)
    }

    fn variation_size(variation: u8) -> Option<usize> {
        match variation {
            1 => Some(5),
            2 => Some(3),
            3 => Some(5),
            4 => Some(3),
            5 => Some(4),
            6 => Some(2),
            7 => Some(4),
            8 => Some(2),
            _ => None,
        }
    }

    fn from_bytes(data: &[u8], index: u32, variation: u8) -> Result<Self> {
        let required = Self::variation_size(variation)
            .ok_or_else(|| Dnp3Error::object(format!("unsupported counter variation: {variation}"), Some(20), Some(variation)))?;
        if data.len() < required {
            return Err(Dnp3Error::object(
                format!("insufficient data for counter variation {variation}: need {required} bytes, got {}", data.len()),
                Some(20),
                Some(variation),
            ));
        }

        let (flags, value) = match variation {
            1 => (CounterFlags::from_bits_truncate(data[0]), u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as i64),
            2 => (CounterFlags::from_bits_truncate(data[0]), u16::from_le_bytes([data[1], data[2]]) as i64),
            3 => (CounterFlags::from_bits_truncate(data[0]), i32::from_le_bytes([data[1], data[2], data[3], data[4]]) as i64),
            4 => (CounterFlags::from_bits_truncate(data[0]), i16::from_le_bytes([data[1], data[2]]) as i64),
            5 => (CounterFlags::ONLINE, u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as i64),
            6 => (CounterFlags::ONLINE, u16::from_le_bytes([data[0], data[1]]) as i64),
            7 => (CounterFlags::ONLINE, i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as i64),
            8 => (CounterFlags::ONLINE, i16::from_le_bytes([data[0], data[1]]) as i64),
            _ => unreachable!(),
        };

        Ok(Counter { index, value, flags })
    }
}

/// Parse `count` counters starting at `start_index` from `data`.
pub fn parse_counters(data: &[u8], start_index: u32, count: u32, variation: u8) -> Result<Vec<Counter>> {
    let obj_size = Counter::variation_size(variation)
        .ok_or_else(|| Dnp3Error::object(format!("unsupported counter variation: {variation}"), Some(20), Some(variation)))?;

    let mut counters = Vec::with_capacity(count as usize);
    let mut offset = 0usize;
    for i in 0..count {
        if offset + obj_size > data.len() {
            break;
        }
        counters.push(Counter::from_bytes(&data[offset..offset + obj_size], start_index + i, variation)?);
        offset += obj_size;
    }
    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variation_1_decodes_32_bit_unsigned_with_flag() {
        let mut data = vec![CounterFlags::ONLINE.bits()];
        data.extend_from_slice(&42u32.to_le_bytes());
        let counters = parse_counters(&data, 0, 1, 1).unwrap();
        assert_eq!(counters[0].value, 42);
        assert!(counters[0].is_online());
    }

    #[test]
    fn variation_3_decodes_signed_delta() {
        let mut data = vec![CounterFlags::ONLINE.bits()];
        data.extend_from_slice(&(-7i32).to_le_bytes());
        let counters = parse_counters(&data, 0, 1, 3).unwrap();
        assert_eq!(counters[0].value, -7);
    }

    #[test]
    fn truncated_buffer_stops_early_without_error() {
        let data = vec![CounterFlags::ONLINE.bits(), 1, 2, 3, 4];
        let counters = parse_counters(&data, 0, 3, 1).unwrap();
        assert_eq!(counters.len(), 1);
    }
}
