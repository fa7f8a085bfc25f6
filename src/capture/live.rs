//! Live capture from a monitor-mode device.

use super::{FrameSource, NextFrame};
use crate::Result;
use std::time::Duration;

#[cfg(feature = "live-capture")]
mod imp {
    use super::super::{CapturedFrame, LINKTYPE_IEEE802_11_RADIOTAP, NextFrame, timestamp_from_parts};
    use crate::{Error, Result};
    use pcap::{Active, Capture, Linktype};
    use std::time::Duration;
    use tracing::{debug, info};

    /// Snapshot length for live capture.
    const SNAPLEN: i32 = 1500;

    pub struct Device {
        capture: Capture<Active>,
    }

    impl Device {
        pub fn open(name: &str, read_timeout: Duration) -> Result<Self> {
            let startup = |e: pcap::Error| Error::StartupFailure {
                component: "frame source",
                cause: format!("{name}: {e}"),
            };
            let timeout_ms = i32::try_from(read_timeout.as_millis()).unwrap_or(i32::MAX);

            let mut capture = Capture::from_device(name)
                .map_err(startup)?
                .promisc(true)
                .snaplen(SNAPLEN)
                .timeout(timeout_ms)
                .open()
                .map_err(startup)?;

            let radiotap = Linktype(LINKTYPE_IEEE802_11_RADIOTAP);
            if capture.get_datalink() != radiotap {
                capture.set_datalink(radiotap).map_err(startup)?;
            }
            info!(device = name, "Opened capture device");
            Ok(Self { capture })
        }

        pub fn next_frame(&mut self) -> Result<NextFrame> {
            match self.capture.next_packet() {
                Ok(packet) => {
                    let secs = u64::try_from(packet.header.ts.tv_sec).unwrap_or(0);
                    let micros = u64::try_from(packet.header.ts.tv_usec).unwrap_or(0);
                    Ok(NextFrame::Frame(CapturedFrame::new(
                        packet.data.to_vec(),
                        timestamp_from_parts(secs, micros, 1_000_000),
                    )))
                },
                Err(pcap::Error::TimeoutExpired) => Ok(NextFrame::Idle),
                Err(pcap::Error::NoMorePackets) => {
                    debug!("Capture device reported no more packets");
                    Ok(NextFrame::EndOfInput)
                },
                Err(e) => Err(Error::Source(e.to_string())),
            }
        }
    }
}

/// Captures frames from a monitor-mode wireless interface.
///
/// The device is opened promiscuous with a short read timeout so that
/// [`next_frame`](FrameSource::next_frame) returns [`NextFrame::Idle`]
/// regularly on a quiet channel. Requires the `live-capture` feature.
pub struct LiveSource {
    name: String,
    #[cfg(feature = "live-capture")]
    device: imp::Device,
}

impl LiveSource {
    /// Opens `device` for capture.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StartupFailure`] if the device cannot be
    /// opened or does not deliver radiotap frames.
    #[cfg(feature = "live-capture")]
    pub fn open(device: &str, read_timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: device.to_string(),
            device: imp::Device::open(device, read_timeout)?,
        })
    }

    /// Opens `device` for capture.
    ///
    /// # Errors
    ///
    /// Always returns [`crate::Error::FeatureNotEnabled`]: this build has no
    /// live capture support.
    #[cfg(not(feature = "live-capture"))]
    pub fn open(device: &str, read_timeout: Duration) -> Result<Self> {
        let _ = (device, read_timeout);
        Err(crate::Error::FeatureNotEnabled("live-capture".to_string()))
    }
}

impl FrameSource for LiveSource {
    #[cfg(feature = "live-capture")]
    fn next_frame(&mut self) -> Result<NextFrame> {
        self.device.next_frame()
    }

    #[cfg(not(feature = "live-capture"))]
    fn next_frame(&mut self) -> Result<NextFrame> {
        Ok(NextFrame::EndOfInput)
    }

    fn is_live(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("device {}", self.name)
    }
}
