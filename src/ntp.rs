//! NTP wire codec.
//!
//! Only the unauthenticated client/server exchange is supported: the client sends
//! a fixed 48-byte request and reads the transmit timestamp seconds from the reply.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::TimeSyncError;

pub const NTP_PORT: u16 = 123;
pub const NTP_PACKET_SIZE: usize = 48;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01 (Unix epoch).
pub const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// LI = 3 (unsynchronized), VN = 4, Mode = 3 (client).
pub const REQUEST_LI_VN_MODE: u8 = 0b1110_0011;
pub const REQUEST_POLL: u8 = 6;
pub const REQUEST_PRECISION: u8 = 0xEC;
pub const REQUEST_REFERENCE_ID: [u8; 4] = [49, 0x4E, 49, 52];

// Field offsets within the 48-byte packet
pub const OFFSET_ROOT_DELAY: usize = 4;
pub const OFFSET_REFERENCE_ID: usize = 12;
pub const OFFSET_REFERENCE_TS: usize = 16;
pub const OFFSET_TRANSMIT_TS: usize = 40;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    fn read(rdr: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let seconds = rdr.read_u32::<BigEndian>()?;
        let fraction = rdr.read_u32::<BigEndian>()?;
        Ok(NtpTimestamp { seconds, fraction })
    }

    fn write(&self, wtr: &mut Vec<u8>) -> std::io::Result<()> {
        wtr.write_u32::<BigEndian>(self.seconds)?;
        wtr.write_u32::<BigEndian>(self.fraction)
    }
}

/// The fixed NTP header. Request and reply share this layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NtpPacket {
    pub li_vn_mode: u8,
    pub stratum: u8,
    pub poll: u8,
    pub precision: u8,
    pub root_delay: u32,
    pub root_dispersion: u32,
    pub reference_id: [u8; 4],
    pub reference_timestamp: NtpTimestamp,
    pub origin_timestamp: NtpTimestamp,
    pub receive_timestamp: NtpTimestamp,
    pub transmit_timestamp: NtpTimestamp,
}

impl NtpPacket {
    pub const SIZE: usize = NTP_PACKET_SIZE;

    pub fn request() -> Self {
        NtpPacket {
            li_vn_mode: REQUEST_LI_VN_MODE,
            stratum: 0,
            poll: REQUEST_POLL,
            precision: REQUEST_PRECISION,
            reference_id: REQUEST_REFERENCE_ID,
            ..Default::default()
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, TimeSyncError> {
        if data.len() < Self::SIZE {
            return Err(TimeSyncError::MalformedPacket {
                len: data.len(),
                expected: Self::SIZE,
            });
        }
        // Length is checked above so the reads below cannot run short
        Self::read_fields(&data[..Self::SIZE]).map_err(|_| TimeSyncError::MalformedPacket {
            len: data.len(),
            expected: Self::SIZE,
        })
    }

    fn read_fields(data: &[u8]) -> std::io::Result<Self> {
        let mut rdr = Cursor::new(data);

        let li_vn_mode = rdr.read_u8()?;
        let stratum = rdr.read_u8()?;
        let poll = rdr.read_u8()?;
        let precision = rdr.read_u8()?;
        let root_delay = rdr.read_u32::<BigEndian>()?;
        let root_dispersion = rdr.read_u32::<BigEndian>()?;

        let mut reference_id = [0u8; 4];
        for byte in reference_id.iter_mut() {
            *byte = rdr.read_u8()?;
        }

        let reference_timestamp = NtpTimestamp::read(&mut rdr)?;
        let origin_timestamp = NtpTimestamp::read(&mut rdr)?;
        let receive_timestamp = NtpTimestamp::read(&mut rdr)?;
        let transmit_timestamp = NtpTimestamp::read(&mut rdr)?;

        Ok(NtpPacket {
            li_vn_mode,
            stratum,
            poll,
            precision,
            root_delay,
            root_dispersion,
            reference_id,
            reference_timestamp,
            origin_timestamp,
            receive_timestamp,
            transmit_timestamp,
        })
    }

    pub fn encode(&self) -> [u8; NTP_PACKET_SIZE] {
        let mut wtr = Vec::with_capacity(Self::SIZE);
        // Writes into a Vec never fail
        let _ = self.write_fields(&mut wtr);

        let mut buf = [0u8; NTP_PACKET_SIZE];
        buf.copy_from_slice(&wtr[..NTP_PACKET_SIZE]);
        buf
    }

    fn write_fields(&self, wtr: &mut Vec<u8>) -> std::io::Result<()> {
        wtr.write_u8(self.li_vn_mode)?;
        wtr.write_u8(self.stratum)?;
        wtr.write_u8(self.poll)?;
        wtr.write_u8(self.precision)?;
        wtr.write_u32::<BigEndian>(self.root_delay)?;
        wtr.write_u32::<BigEndian>(self.root_dispersion)?;
        wtr.extend_from_slice(&self.reference_id);
        self.reference_timestamp.write(wtr)?;
        self.origin_timestamp.write(wtr)?;
        self.receive_timestamp.write(wtr)?;
        self.transmit_timestamp.write(wtr)
    }
}

/// Builds the client request datagram.
pub fn build_request() -> [u8; NTP_PACKET_SIZE] {
    NtpPacket::request().encode()
}

/// Extracts the transmit timestamp seconds (since 1900-01-01) from a reply.
pub fn parse_reply(data: &[u8]) -> Result<u32, TimeSyncError> {
    Ok(NtpPacket::parse(data)?.transmit_timestamp.seconds)
}

/// Converts NTP era-0 seconds into Unix epoch seconds.
pub fn ntp_to_unix(secs_since_1900: u32) -> i64 {
    secs_since_1900 as i64 - NTP_UNIX_OFFSET
}

// ============================================================================
// TESTS
// ============================================================================
