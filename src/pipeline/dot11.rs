//! 802.11 MAC header and information element decoding.

use crate::models::{FrameKind, HwAddr};

/// Frame control flag: frame is headed to the distribution system.
pub const FLAG_TO_DS: u8 = 0x01;
/// Frame control flag: frame comes from the distribution system.
pub const FLAG_FROM_DS: u8 = 0x02;
/// Frame control flag: +HTC/Order. Management and `QoS` data frames with this
/// bit carry a 4-byte HT Control field.
pub const FLAG_ORDER: u8 = 0x80;
/// Length of the HT Control field.
pub const HT_CONTROL_LEN: usize = 4;

/// Minimum header length for management and data frames.
pub const MIN_HEADER_LEN: usize = 24;
/// Fixed parameters preceding the IEs of beacons and probe responses.
pub const AP_FIXED_PARAMS_LEN: usize = 12;

/// Element ID: SSID.
pub const IE_SSID: u8 = 0;
/// Element ID: DS Parameter Set (current channel).
pub const IE_DS_PARAMETER_SET: u8 = 3;
/// Element ID: HT Operation.
pub const IE_HT_OPERATION: u8 = 61;

/// Decoded MAC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacHeader {
    /// Frame kind from the type and subtype bits.
    pub kind: FrameKind,
    /// Subtype bits.
    pub subtype: u8,
    /// Second frame-control byte.
    pub flags: u8,
    /// Receiver address.
    pub addr1: HwAddr,
    /// Transmitter address.
    pub addr2: HwAddr,
    /// Third address (BSSID for most frames).
    pub addr3: HwAddr,
    /// Offset of the frame body within the MPDU.
    pub body_offset: usize,
}

impl MacHeader {
    /// Returns `true` if the frame is headed to the DS.
    #[must_use]
    pub const fn to_ds(&self) -> bool {
        self.flags & FLAG_TO_DS != 0
    }

    /// Returns `true` if the frame comes from the DS.
    #[must_use]
    pub const fn from_ds(&self) -> bool {
        self.flags & FLAG_FROM_DS != 0
    }

    /// Returns the BSSID implied by the DS bits.
    ///
    /// Four-address frames (WDS) carry no single BSSID.
    #[must_use]
    pub const fn bssid(&self) -> Option<HwAddr> {
        match (self.to_ds(), self.from_ds()) {
            (false, false) => Some(self.addr3),
            (true, false) => Some(self.addr1),
            (false, true) => Some(self.addr2),
            (true, true) => None,
        }
    }
}

/// Decodes the MAC header of an MPDU.
///
/// Returns `None` for control frames, reserved types and truncated headers.
#[must_use]
pub fn parse_header(mpdu: &[u8]) -> Option<MacHeader> {
    let fc = *mpdu.first()?;
    let flags = *mpdu.get(1)?;
    if fc & 0x03 != 0 {
        // Protocol version other than 0.
        return None;
    }
    let frame_type = (fc >> 2) & 0x03;
    let subtype = fc >> 4;
    let kind = FrameKind::from_type_subtype(frame_type, subtype);
    if matches!(kind, FrameKind::Control | FrameKind::Unknown) {
        return None;
    }

    let mut body_offset = MIN_HEADER_LEN;
    let qos = kind == FrameKind::Data && subtype & 0x08 != 0;
    if kind == FrameKind::Data {
        if flags & (FLAG_TO_DS | FLAG_FROM_DS) == FLAG_TO_DS | FLAG_FROM_DS {
            body_offset += 6;
        }
        if qos {
            body_offset += 2;
        }
    }
    // On non-QoS data frames the bit only requests strict ordering.
    if flags & FLAG_ORDER != 0 && (kind != FrameKind::Data || qos) {
        body_offset += HT_CONTROL_LEN;
    }
    if mpdu.len() < body_offset {
        return None;
    }

    Some(MacHeader {
        kind,
        subtype,
        flags,
        addr1: HwAddr::from_slice(&mpdu[4..10])?,
        addr2: HwAddr::from_slice(&mpdu[10..16])?,
        addr3: HwAddr::from_slice(&mpdu[16..22])?,
        body_offset,
    })
}

/// Iterator over `(id, payload)` information elements.
///
/// Stops at the first element whose declared length overruns the buffer.
#[derive(Debug, Clone)]
pub struct InformationElements<'a> {
    remaining: &'a [u8],
}

impl<'a> InformationElements<'a> {
    /// Iterates over the elements in `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { remaining: data }
    }

    /// Returns the payload of the first element with `id`.
    #[must_use]
    pub fn element(self, id: u8) -> Option<&'a [u8]> {
        self.into_iter()
            .find_map(|(eid, payload)| (eid == id).then_some(payload))
    }
}

impl<'a> Iterator for InformationElements<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let [id, len, rest @ ..] = self.remaining else {
            return None;
        };
        let len = usize::from(*len);
        if rest.len() < len {
            self.remaining = &[];
            return None;
        }
        let (payload, tail) = rest.split_at(len);
        self.remaining = tail;
        Some((*id, payload))
    }
}

/// Decodes an SSID element payload.
///
/// Empty and all-zero (hidden) SSIDs yield `None`. Invalid UTF-8 is replaced
/// lossily.
#[must_use]
pub fn decode_ssid(payload: &[u8]) -> Option<String> {
    if payload.iter().all(|&b| b == 0) {
        return None;
    }
    Some(String::from_utf8_lossy(payload).into_owned())
}

/// Reads the advertised channel from an AP's information elements.
///
/// Prefers the DS Parameter Set and falls back to the HT Operation primary
/// channel.
#[must_use]
pub fn advertised_channel(elements: &InformationElements<'_>) -> Option<u8> {
    let ds = elements
        .clone()
        .element(IE_DS_PARAMETER_SET)
        .and_then(|p| p.first().copied());
    ds.or_else(|| {
        elements
            .clone()
            .element(IE_HT_OPERATION)
            .and_then(|p| p.first().copied())
    })
    .filter(|&channel| channel != 0)
}
