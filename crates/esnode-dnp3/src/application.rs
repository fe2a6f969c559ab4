//! DNP3 Application Layer: request/response framing, object headers, IIN.
//!
//! Application control byte: bit 7 FIR, bit 6 FIN, bit 5 CON, bit 4 UNS,
//! bits 3..0 a 4-bit sequence number (0-15).

use crate::error::{Dnp3Error, Result};
use crate::objects;

pub const FIR_FLAG: u8 = 0x80;
pub const FIN_FLAG: u8 = 0x40;
pub const CON_FLAG: u8 = 0x20;
pub const UNS_FLAG: u8 = 0x10;
pub const SEQ_MASK: u8 = 0x0F;
pub const SEQ_MODULUS: u8 = 16;

/// Application Layer function codes (IEEE 1815).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AppLayerFunction {
    Confirm = 0x00,
    Read = 0x01,
    Write = 0x02,
    Select = 0x03,
    Operate = 0x04,
    DirectOperate = 0x05,
    DirectOperateNoAck = 0x06,
    ImmediateFreeze = 0x07,
    ImmediateFreezeNoAck = 0x08,
    FreezeClear = 0x09,
    FreezeClearNoAck = 0x0A,
    FreezeAtTime = 0x0B,
    FreezeAtTimeNoAck = 0x0C,
    ColdRestart = 0x0D,
    WarmRestart = 0x0E,
    InitializeData = 0x0F,
    InitializeApplication = 0x10,
    StartApplication = 0x11,
    StopApplication = 0x12,
    SaveConfiguration = 0x13,
    EnableUnsolicited = 0x14,
    DisableUnsolicited = 0x15,
    AssignClass = 0x16,
    DelayMeasure = 0x17,
    RecordCurrentTime = 0x18,
    OpenFile = 0x19,
    CloseFile = 0x1A,
    DeleteFile = 0x1B,
    GetFileInfo = 0x1C,
    AuthenticateFile = 0x1D,
    AbortFile = 0x1E,
    Response = 0x81,
    UnsolicitedResponse = 0x82,
    AuthenticationResponse = 0x83,
}

impl AppLayerFunction {
    fn is_valid_response_function(code: u8) -> bool {
        matches!(
            code,
            0x81 | 0x82 | 0x83 // Response, UnsolicitedResponse, AuthenticationResponse
        )
    }
}

/// Object header qualifier codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QualifierCode {
    Uint8StartStop = 0x00,
    Uint16StartStop = 0x01,
    AllObjects = 0x06,
    Uint8Count = 0x07,
    Uint16Count = 0x08,
    Uint8CountUint8Index = 0x17,
    Uint8CountUint16Index = 0x28,
    Uint16CountUint16Index = 0x29,
}

/// Internal Indications, two status octets returned with every response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IinFlags {
    pub broadcast: bool,
    pub class_1_events: bool,
    pub class_2_events: bool,
    pub class_3_events: bool,
    pub need_time: bool,
    pub local_control: bool,
    pub device_trouble: bool,
    pub device_restart: bool,

    pub no_func_code_support: bool,
    pub object_unknown: bool,
    pub parameter_error: bool,
    pub event_buffer_overflow: bool,
    pub already_executing: bool,
    pub config_corrupt: bool,
    pub reserved_2_6: bool,
    pub reserved_2_7: bool,
}

impl IinFlags {
    pub fn from_bytes(iin1: u8, iin2: u8) -> Self {
        IinFlags {
            broadcast: iin1 & 0x01 != 0,
            class_1_events: iin1 & 0x02 != 0,
            class_2_events: iin1 & 0x04 != 0,
            class_3_events: iin1 & 0x08 != 0,
            need_time: iin1 & 0x10 != 0,
            local_control: iin1 & 0x20 != 0,
            device_trouble: iin1 & 0x40 != 0,
            device_restart: iin1 & 0x80 != 0,
            no_func_code_support: iin2 & 0x01 != 0,
            object_unknown: iin2 & 0x02 != 0,
            parameter_error: iin2 & 0x04 != 0,
            event_buffer_overflow: iin2 & 0x08 != 0,
            already_executing: iin2 & 0x10 != 0,
            config_corrupt: iin2 & 0x20 != 0,
            reserved_2_6: iin2 & 0x40 != 0,
            reserved_2_7: iin2 & 0x80 != 0,
        }
    }

    pub fn to_bytes(self) -> (u8, u8) {
        let iin1 = (self.broadcast as u8)
            | (self.class_1_events as u8) << 1
            | (self.class_2_events as u8) << 2
            | (self.class_3_events as u8) << 3
            | (self.need_time as u8) << 4
            | (self.local_control as u8) << 5
            | (self.device_trouble as u8) << 6
            | (self.device_restart as u8) << 7;
        let iin2 = (self.no_func_code_support as u8)
            | (self.object_unknown as u8) << 1
            | (self.parameter_error as u8) << 2
            | (self.event_buffer_overflow as u8) << 3
            | (self.already_executing as u8) << 4
            | (self.config_corrupt as u8) << 5
            | (self.reserved_2_6 as u8) << 6
            | (self.reserved_2_7 as u8) << 7;
        (iin1, iin2)
    }

    pub fn has_errors(&self) -> bool {
        self.no_func_code_support || self.object_unknown || self.parameter_error || self.config_corrupt
    }

    pub fn has_reserved_bits(&self) -> bool {
        self.reserved_2_6 || self.reserved_2_7
    }
}

/// An object header: group/variation/qualifier plus the range or count it
/// implies. `data` carries only the bytes to append when building a
/// request object (point values to write/select/operate); response
/// parsing decodes object data directly into typed points rather than
/// keeping an offset into a shared buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub group: u8,
    pub variation: u8,
    pub qualifier: u8,
    pub range_start: u32,
    pub range_stop: u32,
    pub count: u32,
    pub data: Vec<u8>,
}

impl ObjectHeader {
    pub fn all_objects(group: u8, variation: u8) -> Self {
        ObjectHeader {
            group,
            variation,
            qualifier: QualifierCode::AllObjects as u8,
            range_start: 0,
            range_stop: 0,
            count: 0,
            data: Vec::new(),
        }
    }

    pub fn range(group: u8, variation: u8, start: u32, stop: u32) -> Self {
        let qualifier = if start <= 0xFF && stop <= 0xFF {
            QualifierCode::Uint8StartStop as u8
        } else {
            QualifierCode::Uint16StartStop as u8
        };
        ObjectHeader {
            group,
            variation,
            qualifier,
            range_start: start,
            range_stop: stop,
            count: 0,
            data: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut result = vec![self.group, self.variation, self.qualifier];

        match self.qualifier {
            q if q == QualifierCode::Uint8StartStop as u8 => {
                if self.range_stop < self.range_start {
                    return Err(Dnp3Error::object(
                        format!("invalid range: start {} > stop {}", self.range_start, self.range_stop),
                        Some(self.group),
                        Some(self.variation),
                    ));
                }
                if self.range_start > 0xFF || self.range_stop > 0xFF {
                    return Err(Dnp3Error::object("uint8 range must be 0-255", Some(self.group), Some(self.variation)));
                }
                result.push(self.range_start as u8);
                result.push(self.range_stop as u8);
            }
            q if q == QualifierCode::Uint16StartStop as u8 => {
                if self.range_stop < self.range_start {
                    return Err(Dnp3Error::object(
                        format!("invalid range: start {} > stop {}", self.range_start, self.range_stop),
                        Some(self.group),
                        Some(self.variation),
                    ));
                }
                result.extend_from_slice(&(self.range_start as u16).to_le_bytes());
                result.extend_from_slice(&(self.range_stop as u16).to_le_bytes());
            }
            q if q == QualifierCode::AllObjects as u8 => {}
            q if q == QualifierCode::Uint8Count as u8 || q == QualifierCode::Uint8CountUint8Index as u8 => {
                if self.count > 0xFF {
                    return Err(Dnp3Error::object("uint8 count must be 0-255", Some(self.group), Some(self.variation)));
                }
                result.push(self.count as u8);
            }
            q if q == QualifierCode::Uint16Count as u8 || q == QualifierCode::Uint16CountUint16Index as u8 => {
                result.extend_from_slice(&(self.count as u16).to_le_bytes());
            }
            q if q == QualifierCode::Uint8CountUint16Index as u8 => {
                if self.count > 0xFF {
                    return Err(Dnp3Error::object("uint8 count must be 0-255", Some(self.group), Some(self.variation)));
                }
                result.push(self.count as u8);
            }
            other => {
                return Err(Dnp3Error::object(
                    format!("unsupported qualifier code: {other:#04x}"),
                    Some(self.group),
                    Some(self.variation),
                ));
            }
        }

        result.extend_from_slice(&self.data);
        Ok(result)
    }

    /// Parse a header's group/variation/qualifier/range-or-count fields.
    /// Does not consume any object data; returns bytes consumed for the
    /// header fields alone.
    pub fn from_bytes(data: &[u8], offset: usize) -> Result<(Self, usize)> {
        if offset > data.len() {
            return Err(Dnp3Error::object("offset beyond data length", None, None));
        }
        if data.len() - offset < 3 {
            return Err(Dnp3Error::object("insufficient data for object header", None, None));
        }

        let group = data[offset];
        let variation = data[offset + 1];
        let qualifier = data[offset + 2];
        let mut consumed = 3;

        let mut range_start = 0u32;
        let mut range_stop = 0u32;
        let mut count = 0u32;

        match qualifier {
            q if q == QualifierCode::Uint8StartStop as u8 => {
                if data.len() - offset - consumed < 2 {
                    return Err(Dnp3Error::object("insufficient data for range", Some(group), Some(variation)));
                }
                range_start = data[offset + consumed] as u32;
                range_stop = data[offset + consumed + 1] as u32;
                if range_stop < range_start {
                    return Err(Dnp3Error::object(
                        format!("invalid range: start {range_start} > stop {range_stop}"),
                        Some(group),
                        Some(variation),
                    ));
                }
                count = range_stop - range_start + 1;
                consumed += 2;
            }
            q if q == QualifierCode::Uint16StartStop as u8 => {
                if data.len() - offset - consumed < 4 {
                    return Err(Dnp3Error::object("insufficient data for range", Some(group), Some(variation)));
                }
                range_start = u16::from_le_bytes([data[offset + consumed], data[offset + consumed + 1]]) as u32;
                range_stop = u16::from_le_bytes([data[offset + consumed + 2], data[offset + consumed + 3]]) as u32;
                if range_stop < range_start {
                    return Err(Dnp3Error::object(
                        format!("invalid range: start {range_start} > stop {range_stop}"),
                        Some(group),
                        Some(variation),
                    ));
                }
                count = range_stop - range_start + 1;
                consumed += 4;
            }
            q if q == QualifierCode::AllObjects as u8 => {}
            q if q == QualifierCode::Uint8Count as u8 || q == QualifierCode::Uint8CountUint8Index as u8 => {
                if data.len() - offset - consumed < 1 {
                    return Err(Dnp3Error::object("insufficient data for count", Some(group), Some(variation)));
                }
                count = data[offset + consumed] as u32;
                consumed += 1;
            }
            q if q == QualifierCode::Uint8CountUint16Index as u8 => {
                if data.len() - offset - consumed < 1 {
                    return Err(Dnp3Error::object("insufficient data for count", Some(group), Some(variation)));
                }
                count = data[offset + consumed] as u32;
                consumed += 1;
            }
            q if q == QualifierCode::Uint16CountUint16Index as u8 => {
                if data.len() - offset - consumed < 2 {
                    return Err(Dnp3Error::object("insufficient data for count", Some(group), Some(variation)));
                }
                count = u16::from_le_bytes([data[offset + consumed], data[offset + consumed + 1]]) as u32;
                consumed += 2;
            }
            other => {
                return Err(Dnp3Error::object(
                    format!("unsupported qualifier code: {other:#04x}"),
                    Some(group),
                    Some(variation),
                ));
            }
        }

        Ok((
            ObjectHeader {
                group,
                variation,
                qualifier,
                range_start,
                range_stop,
                count,
                data: Vec::new(),
            },
            consumed,
        ))
    }

    /// Index prefix width implied by the qualifier (0, 1, or 2 bytes).
    pub fn index_prefix_size(&self) -> usize {
        match self.qualifier {
            q if q == QualifierCode::Uint8CountUint8Index as u8 => 1,
            q if q == QualifierCode::Uint8CountUint16Index as u8 => 2,
            q if q == QualifierCode::Uint16CountUint16Index as u8 => 2,
            _ => 0,
        }
    }
}

/// A fully decoded application response: control flags, IIN, and the
/// typed points extracted from each object section.
#[derive(Debug, Clone)]
pub struct ApplicationResponse {
    pub function: u8,
    pub sequence: u8,
    pub first: bool,
    pub final_: bool,
    pub confirm_required: bool,
    pub unsolicited: bool,
    pub iin: IinFlags,
    pub objects: Vec<objects::DecodedObjects>,
}

impl ApplicationResponse {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Dnp3Error::protocol("response too short", None));
        }

        let control = data[0];
        let function = data[1];
        let iin1 = data[2];
        let iin2 = data[3];

        if !AppLayerFunction::is_valid_response_function(function) {
            return Err(Dnp3Error::protocol(
                format!("invalid response function code: {function:#04x}"),
                Some(function),
            ));
        }

        let sequence = control & SEQ_MASK;
        let first = control & FIR_FLAG != 0;
        let final_ = control & FIN_FLAG != 0;
        let confirm_required = control & CON_FLAG != 0;
        let unsolicited = control & UNS_FLAG != 0;
        let iin = IinFlags::from_bytes(iin1, iin2);

        let mut decoded_objects = Vec::new();
        let mut offset = 4;

        while offset < data.len() {
            let (header, header_consumed) = match ObjectHeader::from_bytes(data, offset) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(offset, error = %e, "skipping trailing bytes: malformed object header");
                    break;
                }
            };

            let data_size = match objects::object_data_size(
                header.group,
                header.variation,
                header.qualifier,
                header.count,
            ) {
                Ok(size) => size,
                Err(e) => {
                    tracing::warn!(
                        group = header.group,
                        variation = header.variation,
                        error = %e,
                        "skipping object section: unknown object size"
                    );
                    break;
                }
            };

            let total_object_size = header_consumed + data_size;
            if offset + total_object_size > data.len() {
                tracing::warn!(
                    group = header.group,
                    variation = header.variation,
                    declared_size = total_object_size,
                    remaining = data.len() - offset,
                    "skipping object section: declared size exceeds remaining data"
                );
                break;
            }

            let object_data = &data[offset + header_consumed..offset + total_object_size];
            let decoded = objects::decode_object(&header, object_data)?;
            decoded_objects.push(decoded);

            offset += total_object_size;
        }

        Ok(ApplicationResponse {
            function,
            sequence,
            first,
            final_,
            confirm_required,
            unsolicited,
            iin,
            objects: decoded_objects,
        })
    }
}

/// Application Layer encoder/decoder. Tracks the outgoing request
/// sequence counter (mod 16).
pub struct ApplicationLayer {
    tx_sequence: u8,
}

impl Default for ApplicationLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationLayer {
    pub fn new() -> Self {
        ApplicationLayer { tx_sequence: 0 }
    }

    fn next_sequence(&mut self) -> u8 {
        let seq = self.tx_sequence;
        self.tx_sequence = (self.tx_sequence + 1) & SEQ_MASK;
        seq
    }

    pub fn sequence(&self) -> u8 {
        self.tx_sequence
    }

    pub fn reset_sequence(&mut self) {
        self.tx_sequence = 0;
    }

    /// Build a request APDU (single fragment: FIR and FIN both set).
    pub fn build_request(
        &mut self,
        function: AppLayerFunction,
        objects: &[ObjectHeader],
        confirm: bool,
    ) -> Result<Vec<u8>> {
        let sequence = self.next_sequence();
        let mut control = sequence & SEQ_MASK;
        control |= FIR_FLAG | FIN_FLAG;
        if confirm {
            control |= CON_FLAG;
        }

        let mut out = vec![control, function as u8];
        for header in objects {
            out.extend_from_slice(&header.to_bytes()?);
        }
        Ok(out)
    }

    /// Build an application confirmation for `sequence`.
    pub fn build_confirm(sequence: u8, unsolicited: bool) -> Result<Vec<u8>> {
        if sequence > SEQ_MASK {
            return Err(Dnp3Error::protocol(
                format!("application sequence must be 0-15, got {sequence}"),
                None,
            ));
        }
        let mut control = sequence & SEQ_MASK;
        control |= FIR_FLAG | FIN_FLAG;
        if unsolicited {
            control |= UNS_FLAG;
        }
        Ok(vec![control, AppLayerFunction::Confirm as u8])
    }

    /// Build a READ request for `group`/`variation` over `start..=stop`,
    /// or all objects of that group/variation if no range is given.
    pub fn build_read_request(
        &mut self,
        group: u8,
        variation: u8,
        range: Option<(u32, u32)>,
    ) -> Result<Vec<u8>> {
        let header = match range {
            Some((start, stop)) => {
                if start > stop {
                    return Err(Dnp3Error::protocol(
                        format!("start must be <= stop, got start={start}, stop={stop}"),
                        None,
                    ));
                }
                ObjectHeader::range(group, variation, start, stop)
            }
            None => ObjectHeader::all_objects(group, variation),
        };
        self.build_request(AppLayerFunction::Read, &[header], false)
    }

    /// Build an integrity poll: Class 0 (static) plus Class 1/2/3 events.
    pub fn build_integrity_poll(&mut self) -> Result<Vec<u8>> {
        let headers = [
            ObjectHeader::all_objects(60, 1),
            ObjectHeader::all_objects(60, 2),
            ObjectHeader::all_objects(60, 3),
            ObjectHeader::all_objects(60, 4),
        ];
        self.build_request(AppLayerFunction::Read, &headers, false)
    }

    /// Build a class poll for class 0, 1, 2, or 3.
    pub fn build_class_poll(&mut self, class_num: u8) -> Result<Vec<u8>> {
        let variation = match class_num {
            0 => 1,
            1 => 2,
            2 => 3,
            3 => 4,
            other => {
                return Err(Dnp3Error::protocol(
                    format!("invalid class number: {other}"),
                    None,
                ));
            }
        };
        let header = ObjectHeader::all_objects(60, variation);
        self.build_request(AppLayerFunction::Read, &[header], false)
    }

    pub fn parse_response(data: &[u8]) -> Result<ApplicationResponse> {
        ApplicationResponse::from_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_read_request_matches_scenario_1() {
        let mut al = ApplicationLayer::new();
        let apdu = al
            .build_read_request(60, 1, None)
            .unwrap();
        assert_eq!(apdu, vec![0xC0, 0x01, 0x3C, 0x01, 0x06]);
    }

    #[test]
    fn sequence_counter_wraps_at_16() {
        let mut al = ApplicationLayer::new();
        for _ in 0..16 {
            al.build_read_request(1, 0, Some((0, 0))).unwrap();
        }
        assert_eq!(al.sequence(), 0);
    }

    #[test]
    fn confirm_sets_fir_fin_and_sequence() {
        let confirm = ApplicationLayer::build_confirm(7, false).unwrap();
        assert_eq!(confirm[0], FIR_FLAG | FIN_FLAG | 7);
        assert_eq!(confirm[1], AppLayerFunction::Confirm as u8);
    }

    #[test]
    fn confirm_rejects_out_of_range_sequence() {
        assert!(ApplicationLayer::build_confirm(16, false).is_err());
    }

    #[test]
    fn parse_response_extracts_iin_and_flags() {
        let data = vec![0xC0, 0x81, 0x00, 0x00];
        let response = ApplicationResponse::from_bytes(&data).unwrap();
        assert_eq!(response.function, AppLayerFunction::Response as u8);
        assert!(response.first);
        assert!(response.final_);
        assert!(!response.iin.has_errors());
        assert!(response.objects.is_empty());
    }

    #[test]
    fn parse_response_rejects_short_data() {
        assert!(ApplicationResponse::from_bytes(&[0xC0, 0x81]).is_err());
    }

    #[test]
    fn parse_response_rejects_non_response_function_code() {
        let data = vec![0xC0, 0x01, 0x00, 0x00];
        assert!(ApplicationResponse::from_bytes(&data).is_err());
    }

    #[test]
    fn reserved_iin_bits_are_reported_but_dont_fail_parsing() {
        let data = vec![0xC0, 0x81, 0x00, 0xC0];
        let response = ApplicationResponse::from_bytes(&data).unwrap();
        assert!(response.iin.has_reserved_bits());
    }

    #[test]
    fn integrity_poll_contains_all_four_classes() {
        let mut al = ApplicationLayer::new();
        let apdu = al.build_integrity_poll().unwrap();
        // control, function, then 4x (group,var,qualifier) = 2 + 4*3
        assert_eq!(apdu.len(), 14);
        assert_eq!(apdu[1], AppLayerFunction::Read as u8);
    }
}
