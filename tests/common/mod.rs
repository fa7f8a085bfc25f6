//! Frame builders shared by the integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use airtrack::HwAddr;
use airtrack::capture::CapturedFrame;
use chrono::{DateTime, Utc};

/// Radiotap flags bit: trailing FCS present.
pub const FCS_AT_END: u8 = 0x10;
/// Radiotap flags bit: FCS check failed.
pub const BAD_FCS: u8 = 0x40;

/// Locally administered unicast address ending in `last`.
pub fn mac(last: u8) -> HwAddr {
    HwAddr::new([0x02, 0x00, 0x5e, 0x10, 0x00, last])
}

/// Timestamp `secs` after a fixed epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

/// Wraps raw bytes as a frame captured at `secs`.
pub fn captured(data: Vec<u8>, secs: i64) -> CapturedFrame {
    CapturedFrame::new(data, at(secs))
}

/// Builds 802.11 frames wrapped in a radiotap header.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    signal: Option<i8>,
    frequency: u16,
    flags: u8,
    frame_control: [u8; 2],
    addr1: HwAddr,
    addr2: HwAddr,
    addr3: HwAddr,
    addr4: Option<HwAddr>,
    qos: bool,
    body: Vec<u8>,
    fcs: bool,
}

impl FrameBuilder {
    fn new(frame_type: u8, subtype: u8) -> Self {
        Self {
            signal: Some(-50),
            frequency: 2437,
            flags: 0,
            frame_control: [(subtype << 4) | (frame_type << 2), 0],
            addr1: HwAddr::BROADCAST,
            addr2: HwAddr::NULL,
            addr3: HwAddr::BROADCAST,
            addr4: None,
            qos: false,
            body: Vec::new(),
            fcs: false,
        }
    }

    /// Beacon from `bssid` advertising `ssid`.
    pub fn beacon(bssid: HwAddr, ssid: &str) -> Self {
        let mut builder = Self::new(0, 8);
        builder.addr2 = bssid;
        builder.addr3 = bssid;
        builder.body = ap_fixed_params(0x0011);
        builder.element(0, ssid.as_bytes())
    }

    /// Probe response from `bssid` to `client`.
    pub fn probe_response(bssid: HwAddr, client: HwAddr, ssid: &str) -> Self {
        let mut builder = Self::new(0, 5);
        builder.addr1 = client;
        builder.addr2 = bssid;
        builder.addr3 = bssid;
        builder.body = ap_fixed_params(0x0001);
        builder.element(0, ssid.as_bytes())
    }

    /// Probe request from `client`, directed at `ssid` or wildcard.
    pub fn probe_request(client: HwAddr, ssid: Option<&str>) -> Self {
        let mut builder = Self::new(0, 4);
        builder.addr2 = client;
        builder.element(0, ssid.unwrap_or_default().as_bytes())
    }

    /// `QoS` data frame from `client` to the AP `bssid` (`ToDS`).
    pub fn data_to_ds(client: HwAddr, bssid: HwAddr) -> Self {
        let mut builder = Self::new(2, 8);
        builder.frame_control[1] = 0x01;
        builder.addr1 = bssid;
        builder.addr2 = client;
        builder.addr3 = HwAddr::new([0x02, 0xff, 0, 0, 0, 1]);
        builder.qos = true;
        builder.body = vec![0xaa, 0xaa, 0x03, 0, 0, 0, 0x08, 0x00];
        builder
    }

    /// Data frame from the AP `bssid` to `client` (`FromDS`).
    pub fn data_from_ds(bssid: HwAddr, client: HwAddr) -> Self {
        let mut builder = Self::new(2, 0);
        builder.frame_control[1] = 0x02;
        builder.addr1 = client;
        builder.addr2 = bssid;
        builder.addr3 = bssid;
        builder.body = vec![0xaa, 0xaa, 0x03, 0, 0, 0, 0x08, 0x00];
        builder
    }

    /// Four-address (WDS) data frame.
    pub fn data_wds(transmitter: HwAddr) -> Self {
        let mut builder = Self::new(2, 0);
        builder.frame_control[1] = 0x03;
        builder.addr2 = transmitter;
        builder.addr4 = Some(mac(0xfe));
        builder
    }

    /// Acknowledgement control frame.
    pub fn ack(receiver: HwAddr) -> Self {
        let mut builder = Self::new(1, 13);
        builder.addr1 = receiver;
        builder
    }

    /// Sets the transmitter address.
    pub fn from(mut self, addr: HwAddr) -> Self {
        self.addr2 = addr;
        self
    }

    /// Sets the antenna signal, or omits the field.
    pub fn signal(mut self, dbm: Option<i8>) -> Self {
        self.signal = dbm;
        self
    }

    /// Sets the radiotap channel frequency.
    pub fn frequency(mut self, mhz: u16) -> Self {
        self.frequency = mhz;
        self
    }

    /// Appends an information element to the body.
    pub fn element(mut self, id: u8, payload: &[u8]) -> Self {
        self.body.push(id);
        self.body.push(u8::try_from(payload.len()).unwrap());
        self.body.extend_from_slice(payload);
        self
    }

    /// Appends a 4-byte FCS and flags it in the radiotap header.
    pub fn with_fcs(mut self) -> Self {
        self.fcs = true;
        self.flags |= FCS_AT_END;
        self
    }

    /// Marks the FCS as failed.
    pub fn bad_fcs(mut self) -> Self {
        self.flags |= BAD_FCS;
        self
    }

    /// Serializes the frame.
    pub fn build(&self) -> Vec<u8> {
        let mut out = self.radiotap();
        out.extend_from_slice(&self.frame_control);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.addr1.octets());
        if self.frame_control[0] & 0x0c == 0x04 {
            // Control frames stop after the receiver address.
            return out;
        }
        out.extend_from_slice(&self.addr2.octets());
        out.extend_from_slice(&self.addr3.octets());
        out.extend_from_slice(&[0, 0]);
        if let Some(addr4) = self.addr4 {
            out.extend_from_slice(&addr4.octets());
        }
        if self.qos {
            out.extend_from_slice(&[0, 0]);
        }
        out.extend_from_slice(&self.body);
        if self.fcs {
            out.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        }
        out
    }

    /// Serializes the frame as captured at `secs`.
    pub fn at(&self, secs: i64) -> CapturedFrame {
        captured(self.build(), secs)
    }

    fn radiotap(&self) -> Vec<u8> {
        // Flags, Channel and (optionally) dBm antenna signal.
        let mut present: u32 = 0x02 | 0x08;
        if self.signal.is_some() {
            present |= 0x20;
        }
        let mut header = vec![0, 0, 0, 0];
        header.extend_from_slice(&present.to_le_bytes());
        header.push(self.flags);
        header.push(0);
        header.extend_from_slice(&self.frequency.to_le_bytes());
        header.extend_from_slice(&0x00a0u16.to_le_bytes());
        if let Some(signal) = self.signal {
            header.extend_from_slice(&signal.to_le_bytes());
        }
        let len = u16::try_from(header.len()).unwrap();
        header[2..4].copy_from_slice(&len.to_le_bytes());
        header
    }
}

fn ap_fixed_params(capabilities: u16) -> Vec<u8> {
    let mut params = vec![0; 8];
    params.extend_from_slice(&100u16.to_le_bytes());
    params.extend_from_slice(&capabilities.to_le_bytes());
    params
}
