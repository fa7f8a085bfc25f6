//! Radiotap header decoding.
//!
//! Only the fields up to and including the dBm antenna signal are decoded;
//! later fields are skipped by using the header length.

/// Flags field: frame includes a trailing FCS.
pub const FLAG_FCS_AT_END: u8 = 0x10;
/// Flags field: frame failed the FCS check.
pub const FLAG_BAD_FCS: u8 = 0x40;

const PRESENT_TSFT: u32 = 1 << 0;
const PRESENT_FLAGS: u32 = 1 << 1;
const PRESENT_RATE: u32 = 1 << 2;
const PRESENT_CHANNEL: u32 = 1 << 3;
const PRESENT_FHSS: u32 = 1 << 4;
const PRESENT_DBM_ANTSIGNAL: u32 = 1 << 5;
const PRESENT_EXT: u32 = 1 << 31;

/// Decoded radiotap header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadiotapHeader {
    /// Total header length; the 802.11 frame starts here.
    pub length: usize,
    /// Flags field, if present.
    pub flags: Option<u8>,
    /// Channel frequency in MHz, if present.
    pub frequency_mhz: Option<u16>,
    /// Antenna signal in dBm, if present.
    pub signal_dbm: Option<i8>,
}

impl RadiotapHeader {
    /// Returns `true` if the frame carries a trailing FCS.
    #[must_use]
    pub fn has_fcs(&self) -> bool {
        self.flags.is_some_and(|f| f & FLAG_FCS_AT_END != 0)
    }

    /// Returns `true` if the receiver flagged the FCS as bad.
    #[must_use]
    pub fn bad_fcs(&self) -> bool {
        self.flags.is_some_and(|f| f & FLAG_BAD_FCS != 0)
    }

    /// Returns the channel number for the header's frequency.
    #[must_use]
    pub fn channel(&self) -> Option<u8> {
        self.frequency_mhz.and_then(channel_from_frequency)
    }
}

/// Decodes a radiotap header at the start of `data`.
///
/// Returns `None` for unsupported versions and truncated headers.
#[must_use]
pub fn parse(data: &[u8]) -> Option<RadiotapHeader> {
    if data.len() < 8 || data[0] != 0 {
        return None;
    }
    let length = usize::from(u16::from_le_bytes([data[2], data[3]]));
    if length < 8 || length > data.len() {
        return None;
    }
    let header = &data[..length];

    let present = read_u32(header, 4)?;
    // Skip extended presence words; their fields come after the ones below.
    let mut offset = 8;
    let mut word = present;
    while word & PRESENT_EXT != 0 {
        word = read_u32(header, offset)?;
        offset += 4;
    }

    let mut decoded = RadiotapHeader {
        length,
        ..RadiotapHeader::default()
    };

    if present & PRESENT_TSFT != 0 {
        offset = align(offset, 8) + 8;
    }
    if present & PRESENT_FLAGS != 0 {
        decoded.flags = Some(*header.get(offset)?);
        offset += 1;
    }
    if present & PRESENT_RATE != 0 {
        offset += 1;
    }
    if present & PRESENT_CHANNEL != 0 {
        offset = align(offset, 2);
        decoded.frequency_mhz = Some(read_u16(header, offset)?);
        offset += 4;
    }
    if present & PRESENT_FHSS != 0 {
        offset += 2;
    }
    if present & PRESENT_DBM_ANTSIGNAL != 0 {
        decoded.signal_dbm = Some(i8::from_le_bytes([*header.get(offset)?]));
    }

    Some(decoded)
}

/// Maps a center frequency to its 802.11 channel number.
#[must_use]
pub fn channel_from_frequency(mhz: u16) -> Option<u8> {
    let channel = match mhz {
        2484 => 14,
        2412..=2472 => (mhz - 2407) / 5,
        5955..=7115 => (mhz - 5950) / 5,
        5000..=5925 => (mhz - 5000) / 5,
        _ => return None,
    };
    u8::try_from(channel).ok()
}

const fn align(offset: usize, to: usize) -> usize {
    offset.div_ceil(to) * to
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
