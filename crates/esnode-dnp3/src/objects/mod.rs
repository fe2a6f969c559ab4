//! DNP3 object group/variation codecs.
//!
//! Response parsing decodes each object section directly into typed
//! points; there is deliberately no `raw_data`/`data_offset` bookkeeping
//! here, unlike implementations that keep a shared backing buffer and
//! rebase offsets into it.

pub mod analog;
pub mod binary;
pub mod counter;

use crate::application::{ObjectHeader, QualifierCode};
use crate::error::{Dnp3Error, Result};

/// Fixed object size in bytes for (group, variation), or `None` for
/// variable-size/packed objects (handled separately).
fn fixed_object_size(group: u8, variation: u8) -> Option<usize> {
    match (group, variation) {
        (1, 2) => Some(1),
        (2, 1) => Some(1),
        (2, 2) => Some(7),
        (2, 3) => Some(3),
        (10, 2) => Some(1),
        (11, 1) => Some(1),
        (11, 2) => Some(7),
        (12, 1) => Some(11),
        (20, 1) => Some(5),
        (20, 2) => Some(3),
        (20, 3) => Some(5),
        (20, 4) => Some(3),
        (20, 5) => Some(4),
        (20, 6) => Some(2),
        (20, 7) => Some(4),
        (20, 8) => Some(2),
        (21, 1) => Some(5),
        (21, 2) => Some(3),
        (21, 3) => Some(5),
        (21, 4) => Some(3),
        (21, 5) => Some(4),
        (21, 6) => Some(2),
        (21, 7) => Some(4),
        (21, 8) => Some(2),
        (21, 9) => Some(11),
        (21, 10) => Some(9),
        (21, 11) => Some(11),
        (21, 12) => Some(9),
        (22, 1) => Some(5),
        (22, 2) => Some(3),
        (22, 3) => Some(5),
        (22, 4) => Some(3),
        (22, 5) => Some(11),
        (22, 6) => Some(9),
        (22, 7) => Some(11),
        (22, 8) => Some(9),
        (30, 1) => Some(5),
        (30, 2) => Some(3),
        (30, 3) => Some(4),
        (30, 4) => Some(2),
        (30, 5) => Some(5),
        (30, 6) => Some(9),
        (31, 1) => Some(5),
        (31, 2) => Some(3),
        (31, 3) => Some(11),
        (31, 4) => Some(9),
        (31, 5) => Some(4),
        (31, 6) => Some(2),
        (31, 7) => Some(5),
        (31, 8) => Some(9),
        (32, 1) => Some(5),
        (32, 2) => Some(3),
        (32, 3) => Some(11),
        (32, 4) => Some(9),
        (32, 5) => Some(5),
        (32, 6) => Some(9),
        (32, 7) => Some(11),
        (32, 8) => Some(15),
        (40, 1) => Some(5),
        (40, 2) => Some(3),
        (40, 3) => Some(5),
        (40, 4) => Some(9),
        (41, 1) => Some(5),
        (41, 2) => Some(3),
        (41, 3) => Some(5),
        (41, 4) => Some(9),
        (42, 1) => Some(5),
        (42, 2) => Some(3),
        (42, 3) => Some(11),
        (42, 4) => Some(9),
        (42, 5) => Some(5),
        (42, 6) => Some(9),
        (42, 7) => Some(11),
        (42, 8) => Some(15),
        (50, 1) => Some(6),
        (50, 2) => Some(10),
        (50, 3) => Some(6),
        (50, 4) => Some(6),
        _ => None,
    }
}

fn index_prefix_size(qualifier: u8) -> usize {
    if qualifier == QualifierCode::Uint8CountUint8Index as u8 {
        1
    } else if qualifier == QualifierCode::Uint8CountUint16Index as u8
        || qualifier == QualifierCode::Uint16CountUint16Index as u8
    {
        2
    } else {
        0
    }
}

/// Total object-data byte span (excluding the header itself) implied by
/// `group`/`variation`/`qualifier`/`count`.
pub fn object_data_size(group: u8, variation: u8, qualifier: u8, count: u32) -> Result<usize> {
    if count == 0 {
        return Ok(0);
    }

    let prefix = index_prefix_size(qualifier);

    if let Some(size) = fixed_object_size(group, variation) {
        return Ok((prefix + size) * count as usize);
    }

    if (group == 1 || group == 10) && variation == 1 {
        if prefix != 0 {
            return Err(Dnp3Error::object(
                "packed binary objects cannot use an indexed qualifier",
                Some(group),
                Some(variation),
            ));
        }
        return Ok((count as usize + 7) / 8);
    }

    Err(Dnp3Error::object(
        format!("unknown or variable object size without parser support: group={group}, variation={variation}, qualifier={qualifier:#04x}"),
        Some(group),
        Some(variation),
    ))
}

/// Points decoded from one object header/data section.
#[derive(Debug, Clone)]
pub enum DecodedObjects {
    BinaryInputs(Vec<binary::BinaryInput>),
    BinaryOutputs(Vec<binary::BinaryOutput>),
    Crobs(Vec<binary::Crob>),
    AnalogInputs(Vec<analog::AnalogInput>),
    AnalogOutputs(Vec<analog::AnalogOutput>),
    AnalogOutputCommands(Vec<analog::AnalogOutputCommand>),
    Counters(Vec<counter::Counter>),
}

/// Decode one object section. `data` is exactly the bytes the header's
/// qualifier/count imply (no header bytes, no trailing objects).
pub fn decode_object(header: &ObjectHeader, data: &[u8]) -> Result<DecodedObjects> {
    let group = header.group;
    let variation = header.variation;
    let count = header.count;

    let prefix = index_prefix_size(header.qualifier);
    if prefix > 0 {
        return decode_indexed(header, data, prefix);
    }

    match group {
        1 | 2 => Ok(DecodedObjects::BinaryInputs(binary::parse_binary_inputs(
            data,
            header.range_start,
            count,
            variation,
        )?)),
        10 | 11 => Ok(DecodedObjects::BinaryOutputs(binary::parse_binary_outputs(
            data,
            header.range_start,
            count,
            variation,
        )?)),
        12 => {
            let obj_size = fixed_object_size(12, variation)
                .ok_or_else(|| Dnp3Error::object("unknown CROB size", Some(12), Some(variation)))?;
            let mut crobs = Vec::with_capacity(count as usize);
            for i in 0..count {
                let start = i as usize * obj_size;
                if start + obj_size > data.len() {
                    break;
                }
                crobs.push(binary::Crob::from_bytes(&data[start..start + obj_size], header.range_start + i)?);
            }
            Ok(DecodedObjects::Crobs(crobs))
        }
        20 | 21 | 22 => Ok(DecodedObjects::Counters(counter::parse_counters(
            data,
            header.range_start,
            count,
            variation,
        )?)),
        30 | 31 | 32 => Ok(DecodedObjects::AnalogInputs(analog::parse_analog_inputs(
            data,
            header.range_start,
            count,
            variation,
        )?)),
        40 => Ok(DecodedObjects::AnalogOutputs(analog::parse_analog_outputs(
            data,
            header.range_start,
            count,
            variation,
        )?)),
        41 => {
            let obj_size = fixed_object_size(41, variation)
                .ok_or_else(|| Dnp3Error::object("unknown AOB size", Some(41), Some(variation)))?;
            let mut commands = Vec::with_capacity(count as usize);
            for i in 0..count {
                let start = i as usize * obj_size;
                if start + obj_size > data.len() {
                    break;
                }
                commands.push(analog::AnalogOutputCommand::from_bytes(
                    &data[start..start + obj_size],
                    header.range_start + i,
                    variation,
                )?);
            }
            Ok(DecodedObjects::AnalogOutputCommands(commands))
        }
        other => Err(Dnp3Error::object(format!("unsupported object group: {other}"), Some(other), Some(variation))),
    }
}

fn decode_indexed(header: &ObjectHeader, data: &[u8], prefix: usize) -> Result<DecodedObjects> {
    let group = header.group;
    let variation = header.variation;
    let obj_size = fixed_object_size(group, variation)
        .ok_or_else(|| Dnp3Error::object("unknown object size for indexed qualifier", Some(group), Some(variation)))?;
    let stride = prefix + obj_size;

    let read_index = |slice: &[u8]| -> u32 {
        if prefix == 1 {
            slice[0] as u32
        } else {
            u16::from_le_bytes([slice[0], slice[1]]) as u32
        }
    };

    macro_rules! collect {
        ($parse:expr) => {{
            let mut out = Vec::with_capacity(header.count as usize);
            for i in 0..header.count {
                let start = i as usize * stride;
                let end = start + stride;
                if end > data.len() {
                    break;
                }
                let index = read_index(&data[start..start + prefix]);
                out.push($parse(&data[start + prefix..end], index)?);
            }
            out
        }};
    }

    match group {
        1 | 2 => Ok(DecodedObjects::BinaryInputs(collect!(|d: &[u8], idx| binary::parse_binary_inputs(d, idx, 1, variation)
            .map(|mut v| v.pop().unwrap())))),
        10 | 11 => Ok(DecodedObjects::BinaryOutputs(collect!(|d: &[u8], idx| binary::parse_binary_outputs(d, idx, 1, variation)
            .map(|mut v| v.pop().unwrap())))),
        20 | 21 | 22 => Ok(DecodedObjects::Counters(collect!(|d: &[u8], idx| counter::parse_counters(d, idx, 1, variation)
            .map(|mut v| v.pop().unwrap())))),
        30 | 31 | 32 => Ok(DecodedObjects::AnalogInputs(collect!(|d: &[u8], idx| analog::parse_analog_inputs(d, idx, 1, variation)
            .map(|mut v| v.pop().unwrap())))),
        40 => Ok(DecodedObjects::AnalogOutputs(collect!(|d: &[u8], idx| analog::parse_analog_outputs(d, idx, 1, variation)
            .map(|mut v| v.pop().unwrap())))),
        12 => Ok(DecodedObjects::Crobs(collect!(|d: &[u8], idx| binary::Crob::from_bytes(d, idx)))),
        41 => Ok(DecodedObjects::AnalogOutputCommands(collect!(|d: &[u8], idx| analog::AnalogOutputCommand::from_bytes(
            d, idx, variation
        )))),
        other => Err(Dnp3Error::object(format!("unsupported indexed object group: {other}"), Some(other), Some(variation))),
    }
}
