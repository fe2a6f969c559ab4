//! DNP3 Data Link Layer (FT3 framing).
//!
//! Frame layout: `05 64 | length | control | dest(LE) | src(LE) | header CRC(LE) |
//! block(<=16) | block CRC(LE) | ...`.

use crate::crc;
use crate::error::{Dnp3Error, Result};

pub const START_1: u8 = 0x05;
pub const START_2: u8 = 0x64;

pub const MAX_VALID_ADDRESS: u16 = 65519;
pub const BROADCAST_ADDRESS: u16 = 65535;

const MAX_USER_DATA: usize = 250;
const BLOCK_SIZE: usize = 16;
const HEADER_LEN: usize = 10; // 2 start + 1 length + 1 control + 2 dest + 2 src + 2 crc

/// Control byte bit positions (link layer).
mod control_bits {
    pub const DIR: u8 = 0x80;
    pub const PRM: u8 = 0x40;
    pub const FCB: u8 = 0x20;
    pub const FCV: u8 = 0x10;
    pub const FUNC_MASK: u8 = 0x0F;
}

/// Primary station function codes (link layer, bits 3..0 of control when PRM=1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrimaryFunction {
    ResetLink = 0x00,
    ResetUserProcess = 0x01,
    TestLink = 0x02,
    UserDataConfirmed = 0x03,
    UserDataUnconfirmed = 0x04,
    RequestLinkStatus = 0x09,
}

/// Secondary station function codes (link layer, bits 3..0 of control when PRM=0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecondaryFunction {
    Ack = 0x00,
    Nack = 0x01,
    LinkStatus = 0x0B,
    NotSupported = 0x0F,
}

/// A decoded link-layer control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlByte {
    pub dir: bool,
    pub prm: bool,
    pub fcb: bool,
    pub fcv: bool,
    pub function: u8,
}

impl ControlByte {
    pub fn from_byte(b: u8) -> Self {
        ControlByte {
            dir: b & control_bits::DIR != 0,
            prm: b & control_bits::PRM != 0,
            fcb: b & control_bits::FCB != 0,
            fcv: b & control_bits::FCV != 0,
            function: b & control_bits::FUNC_MASK,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut b = self.function & control_bits::FUNC_MASK;
        if self.dir {
            b |= control_bits::DIR;
        }
        if self.prm {
            b |= control_bits::PRM;
        }
        if self.fcb {
            b |= control_bits::FCB;
        }
        if self.fcv {
            b |= control_bits::FCV;
        }
        b
    }
}

/// A parsed Data Link frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub destination: u16,
    pub source: u16,
    pub control: ControlByte,
    pub user_data: Vec<u8>,
}

fn validate_address(addr: u16, label: &str) -> Result<()> {
    if addr > MAX_VALID_ADDRESS {
        return Err(Dnp3Error::frame(format!(
            "{label} address {addr} exceeds maximum valid address {MAX_VALID_ADDRESS}"
        )));
    }
    Ok(())
}

/// Data Link Layer encoder/decoder. Holds the one bit of persistent
/// link-layer state: the outgoing FCB toggle.
pub struct DataLinkLayer {
    master_address: u16,
    outstation_address: u16,
    fcb: bool,
}

impl DataLinkLayer {
    pub fn new(master_address: u16, outstation_address: u16) -> Result<Self> {
        validate_address(master_address, "master")?;
        validate_address(outstation_address, "outstation")?;
        Ok(DataLinkLayer {
            master_address,
            outstation_address,
            fcb: false,
        })
    }

    pub fn toggle_fcb(&mut self) {
        self.fcb = !self.fcb;
    }

    pub fn reset_fcb(&mut self) {
        self.fcb = false;
    }

    /// Build a user-data frame from the master to the outstation.
    pub fn build_frame(&self, user_data: &[u8], confirmed: bool, fcv: bool) -> Result<Vec<u8>> {
        if user_data.len() > MAX_USER_DATA {
            return Err(Dnp3Error::frame(format!(
                "user data length {} exceeds maximum {MAX_USER_DATA}",
                user_data.len()
            )));
        }

        let control = ControlByte {
            dir: true,
            prm: true,
            fcb: confirmed && self.fcb,
            fcv,
            function: if confirmed {
                PrimaryFunction::UserDataConfirmed as u8
            } else {
                PrimaryFunction::UserDataUnconfirmed as u8
            },
        };

        Ok(self.build_raw(control, user_data))
    }

    /// Build a Reset Link frame (no user data).
    pub fn build_reset_link(&self) -> Vec<u8> {
        let control = ControlByte {
            dir: true,
            prm: true,
            fcb: false,
            fcv: false,
            function: PrimaryFunction::ResetLink as u8,
        };
        self.build_raw(control, &[])
    }

    /// Build a Request Link Status frame (no user data).
    pub fn build_request_link_status(&self) -> Vec<u8> {
        let control = ControlByte {
            dir: true,
            prm: true,
            fcb: false,
            fcv: false,
            function: PrimaryFunction::RequestLinkStatus as u8,
        };
        self.build_raw(control, &[])
    }

    fn build_raw(&self, control: ControlByte, user_data: &[u8]) -> Vec<u8> {
        let length = 5 + user_data.len() as u8;
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.push(START_1);
        header.push(START_2);
        header.push(length);
        header.push(control.to_byte());
        header.extend_from_slice(&self.outstation_address.to_le_bytes());
        header.extend_from_slice(&self.master_address.to_le_bytes());

        let mut frame = crc::append(&header);

        for block in user_data.chunks(BLOCK_SIZE) {
            frame.extend_from_slice(&crc::append(block));
        }

        frame
    }

    /// Scan `buf` for the 0x05 0x64 start sequence. Returns the offset of
    /// the first candidate start, or -1 if none is found (in which case
    /// the caller should retain at most the final byte).
    pub fn find_frame_start(buf: &[u8]) -> isize {
        if buf.len() < 2 {
            return if buf.is_empty() { -1 } else { -1 };
        }
        for i in 0..=buf.len() - 2 {
            if buf[i] == START_1 && buf[i + 1] == START_2 {
                return i as isize;
            }
        }
        -1
    }

    /// Compute the total frame size (header + all blocks + block CRCs)
    /// implied by the length byte.
    pub fn calculate_frame_size(length_byte: u8) -> Result<usize> {
        if length_byte < 5 {
            return Err(Dnp3Error::frame(format!(
                "length byte {length_byte} is below the minimum of 5"
            )));
        }
        let user_data_len = length_byte as usize - 5;
        if user_data_len > MAX_USER_DATA {
            return Err(Dnp3Error::frame(format!(
                "implied user data length {user_data_len} exceeds maximum {MAX_USER_DATA}"
            )));
        }
        let full_blocks = user_data_len / BLOCK_SIZE;
        let remainder = user_data_len % BLOCK_SIZE;
        let mut blocks = full_blocks;
        if remainder > 0 {
            blocks += 1;
        }
        Ok(HEADER_LEN + user_data_len + blocks * 2)
    }

    /// Parse a complete frame from `buf` (exactly `calculate_frame_size`
    /// bytes, as determined by the caller). Returns the frame and the
    /// number of bytes consumed.
    pub fn parse_frame(buf: &[u8]) -> Result<(Frame, usize)> {
        if buf.len() < HEADER_LEN {
            return Err(Dnp3Error::frame("buffer shorter than link header"));
        }
        if buf[0] != START_1 || buf[1] != START_2 {
            return Err(Dnp3Error::frame("missing start bytes"));
        }

        let length = buf[2];
        let total_size = Self::calculate_frame_size(length)?;
        if buf.len() < total_size {
            return Err(Dnp3Error::frame("buffer shorter than declared frame size"));
        }

        let header = &buf[0..8];
        let header_crc = u16::from_le_bytes([buf[8], buf[9]]);
        let computed = crc::calculate(header);
        if computed != header_crc {
            return Err(Dnp3Error::Crc {
                expected: header_crc,
                actual: computed,
            });
        }

        let control = ControlByte::from_byte(buf[3]);
        let destination = u16::from_le_bytes([buf[4], buf[5]]);
        let source = u16::from_le_bytes([buf[6], buf[7]]);

        let user_data_len = length as usize - 5;
        let mut user_data = Vec::with_capacity(user_data_len);
        let mut offset = HEADER_LEN;
        let mut remaining = user_data_len;

        while remaining > 0 {
            let block_len = remaining.min(BLOCK_SIZE);
            let block = &buf[offset..offset + block_len];
            let block_crc = u16::from_le_bytes([buf[offset + block_len], buf[offset + block_len + 1]]);
            let computed = crc::calculate(block);
            if computed != block_crc {
                return Err(Dnp3Error::Crc {
                    expected: block_crc,
                    actual: computed,
                });
            }
            user_data.extend_from_slice(block);
            offset += block_len + 2;
            remaining -= block_len;
        }

        Ok((
            Frame {
                destination,
                source,
                control,
                user_data,
            },
            total_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dll() -> DataLinkLayer {
        DataLinkLayer::new(1, 10).unwrap()
    }

    #[test]
    fn empty_read_request_framing() {
        // Scenario 1: APDU `C0 01 3C 01 06`, master=1, outstation=10.
        let dll = dll();
        let user_data = [0xC0, 0x01, 0x3C, 0x01, 0x06];
        let frame = dll.build_frame(&user_data, false, false).unwrap();

        assert_eq!(
            &frame[0..8],
            &[0x05, 0x64, 0x08, 0xC4, 0x0A, 0x00, 0x01, 0x00]
        );
        let header_crc = crc::calculate(&frame[0..8]);
        assert_eq!(&frame[8..10], &header_crc.to_le_bytes());

        assert_eq!(&frame[10..15], &user_data);
        let block_crc = crc::calculate(&user_data);
        assert_eq!(&frame[15..17], &block_crc.to_le_bytes());
        assert_eq!(frame.len(), 17);
    }

    #[test]
    fn crc_rejection_does_not_advance() {
        let dll = dll();
        let user_data = [0xC0, 0x01, 0x3C, 0x01, 0x06];
        let mut frame = dll.build_frame(&user_data, false, false).unwrap();
        frame[8] ^= 0xFF; // flip header CRC low byte

        let err = DataLinkLayer::parse_frame(&frame).unwrap_err();
        assert!(matches!(err, Dnp3Error::Crc { .. }));
    }

    #[test]
    fn build_then_parse_round_trips_for_arbitrary_payload() {
        let dll = dll();
        for len in [0usize, 1, 15, 16, 17, 32, 33, 249, 250] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let frame = dll.build_frame(&payload, false, false).unwrap();
            let (parsed, consumed) = DataLinkLayer::parse_frame(&frame).unwrap();
            assert_eq!(consumed, frame.len());
            assert_eq!(parsed.user_data, payload);
        }
    }

    #[test]
    fn user_data_251_is_rejected() {
        let dll = dll();
        let payload = vec![0u8; 251];
        assert!(dll.build_frame(&payload, false, false).is_err());
    }

    #[test]
    fn user_data_250_is_accepted() {
        let dll = dll();
        let payload = vec![0u8; 250];
        assert!(dll.build_frame(&payload, false, false).is_ok());
    }

    #[test]
    fn length_byte_boundaries() {
        assert!(DataLinkLayer::calculate_frame_size(4).is_err());
        assert!(DataLinkLayer::calculate_frame_size(5).is_ok());
        assert!(DataLinkLayer::calculate_frame_size(255).is_ok());
    }

    #[test]
    fn address_boundaries() {
        assert!(DataLinkLayer::new(65519, 1).is_ok());
        assert!(DataLinkLayer::new(65520, 1).is_err());
        assert!(DataLinkLayer::new(BROADCAST_ADDRESS, 1).is_err());
    }

    #[test]
    fn find_frame_start_scans_for_sync_bytes() {
        let buf = [0x00, 0x01, 0x05, 0x64, 0x08];
        assert_eq!(DataLinkLayer::find_frame_start(&buf), 2);
        assert_eq!(DataLinkLayer::find_frame_start(&[0x00, 0x01]), -1);
    }

    #[test]
    fn fcb_toggles_independently_of_parsing() {
        let mut dll = dll();
        assert!(!dll.fcb);
        dll.toggle_fcb();
        assert!(dll.fcb);
        dll.reset_fcb();
        assert!(!dll.fcb);
    }
}
