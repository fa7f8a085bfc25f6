//! Frame interpretation pipeline.
//!
//! A [`Pipeline`] runs a fixed, ordered list of [`Interpreter`]s over each
//! captured frame. Every interpreter sees the frame and the [`Observation`]
//! built so far and either lets the frame continue or stops it. Recording
//! interpreters update the registries synchronously, so a sighting is
//! visible before [`Pipeline::process`] returns.
//!
//! Malformed input never panics: a decoder that cannot make sense of its
//! layer stops the frame.

pub mod dot11;
pub mod radiotap;

use crate::capture::CapturedFrame;
use crate::models::{ApAttributes, FrameKind, Observation};
use crate::registry::Registry;
use crate::{Error, Result};
use dot11::{InformationElements, MacHeader};
use std::sync::Arc;
use tracing::trace;

/// Outcome of one interpreter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Run the next interpreter.
    Continue,
    /// Skip all remaining interpreters.
    Stop,
}

/// One stage of the pipeline.
#[derive(Debug, Clone)]
pub enum Interpreter {
    /// Radiotap header: signal, channel, FCS handling.
    PhysicalLayer,
    /// 802.11 MAC header: frame kind, addresses, body offset.
    MacHeader,
    /// Records access points from beacons and probe responses.
    AccessPoint(Arc<Registry>),
    /// Records client stations from probe requests and to-DS data frames.
    Station {
        /// Client registry that receives sightings.
        clients: Arc<Registry>,
        /// AP registry used to keep access points out of the client registry.
        access_points: Arc<Registry>,
    },
}

impl Interpreter {
    /// Short name used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PhysicalLayer => "physical_layer",
            Self::MacHeader => "mac_header",
            Self::AccessPoint(_) => "access_point",
            Self::Station { .. } => "station",
        }
    }

    const fn records(&self) -> bool {
        matches!(self, Self::AccessPoint(_) | Self::Station { .. })
    }

    fn interpret(&self, view: &mut FrameView<'_>, obs: &mut Observation) -> Verdict {
        match self {
            Self::PhysicalLayer => physical_layer(view, obs),
            Self::MacHeader => mac_header(view, obs),
            Self::AccessPoint(registry) => access_point(registry, view, obs),
            Self::Station {
                clients,
                access_points,
            } => station(clients, access_points, view, obs),
        }
    }
}

/// Per-frame decoding state shared between interpreters.
#[derive(Debug)]
struct FrameView<'a> {
    raw: &'a [u8],
    radiotap: bool,
    /// 802.11 frame without radiotap header or trailing FCS.
    mpdu: &'a [u8],
    header: Option<MacHeader>,
}

impl FrameView<'_> {
    fn body(&self) -> &[u8] {
        self.header
            .and_then(|h| self.mpdu.get(h.body_offset..))
            .unwrap_or_default()
    }
}

/// An ordered chain of interpreters.
#[derive(Debug, Clone)]
pub struct Pipeline {
    interpreters: Vec<Interpreter>,
}

impl Pipeline {
    /// Builds a pipeline, checking that decoders precede the stages that
    /// depend on them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a recording interpreter appears
    /// before both `PhysicalLayer` and `MacHeader`, or if `MacHeader`
    /// appears before `PhysicalLayer`.
    pub fn new(interpreters: Vec<Interpreter>) -> Result<Self> {
        let position = |pred: fn(&Interpreter) -> bool| interpreters.iter().position(pred);
        let physical = position(|i| matches!(i, Interpreter::PhysicalLayer));
        let mac = position(|i| matches!(i, Interpreter::MacHeader));
        let first_recording = position(Interpreter::records);

        if let Some(mac) = mac {
            if physical.is_none_or(|p| p > mac) {
                return Err(Error::InvalidInput(
                    "mac_header interpreter requires a preceding physical_layer".to_string(),
                ));
            }
        }
        if let Some(first) = first_recording {
            let decoded = physical.is_some_and(|p| p < first) && mac.is_some_and(|m| m < first);
            if !decoded {
                return Err(Error::InvalidInput(format!(
                    "{} interpreter must follow physical_layer and mac_header",
                    interpreters[first].name()
                )));
            }
        }
        Ok(Self { interpreters })
    }

    /// Builds the canonical chain: physical layer, MAC header, access point,
    /// station.
    #[must_use]
    pub fn standard(clients: Arc<Registry>, access_points: Arc<Registry>) -> Self {
        Self {
            interpreters: vec![
                Interpreter::PhysicalLayer,
                Interpreter::MacHeader,
                Interpreter::AccessPoint(Arc::clone(&access_points)),
                Interpreter::Station {
                    clients,
                    access_points,
                },
            ],
        }
    }

    /// Runs every interpreter over `frame` until one stops it.
    pub fn process(&self, frame: &CapturedFrame) -> Observation {
        let mut obs = Observation::new(frame.timestamp);
        let mut view = FrameView {
            raw: &frame.data,
            radiotap: frame.is_radiotap(),
            mpdu: &[],
            header: None,
        };
        for interpreter in &self.interpreters {
            if interpreter.interpret(&mut view, &mut obs) == Verdict::Stop {
                trace!(
                    interpreter = interpreter.name(),
                    kind = obs.kind.as_str(),
                    len = frame.data.len(),
                    "Frame stopped"
                );
                metrics::counter!("pipeline_frames_stopped_total", "interpreter" => interpreter.name())
                    .increment(1);
                break;
            }
        }
        obs
    }
}

fn physical_layer(view: &mut FrameView<'_>, obs: &mut Observation) -> Verdict {
    if !view.radiotap {
        return Verdict::Stop;
    }
    let raw = view.raw;
    let Some(header) = radiotap::parse(raw) else {
        return Verdict::Stop;
    };
    if header.bad_fcs() {
        return Verdict::Stop;
    }
    let Some(signal) = header.signal_dbm else {
        return Verdict::Stop;
    };

    let mut mpdu = &raw[header.length..];
    if header.has_fcs() {
        let Some(end) = mpdu.len().checked_sub(4) else {
            return Verdict::Stop;
        };
        mpdu = &mpdu[..end];
    }

    view.mpdu = mpdu;
    obs.signal_dbm = Some(signal);
    obs.phy_channel = header.channel();
    Verdict::Continue
}

fn mac_header(view: &mut FrameView<'_>, obs: &mut Observation) -> Verdict {
    let Some(header) = dot11::parse_header(view.mpdu) else {
        return Verdict::Stop;
    };
    obs.kind = header.kind;
    obs.destination = Some(header.addr1);
    obs.source = Some(header.addr2);
    obs.bssid = header.bssid();
    view.header = Some(header);
    Verdict::Continue
}

fn access_point(registry: &Registry, view: &FrameView<'_>, obs: &mut Observation) -> Verdict {
    if !obs.kind.is_ap_advertisement() {
        return Verdict::Continue;
    }
    let (Some(source), Some(signal)) = (obs.source, obs.signal_dbm) else {
        return Verdict::Stop;
    };
    let body = view.body();
    if body.len() < dot11::AP_FIXED_PARAMS_LEN {
        return Verdict::Stop;
    }

    let capabilities = u16::from_le_bytes([body[10], body[11]]);
    let elements = InformationElements::new(&body[dot11::AP_FIXED_PARAMS_LEN..]);
    obs.ssid = elements
        .clone()
        .element(dot11::IE_SSID)
        .and_then(dot11::decode_ssid);
    let ap = ApAttributes {
        channel: dot11::advertised_channel(&elements).or(obs.phy_channel),
        capabilities,
    };
    trace!(
        source = %source,
        channel = ?ap.channel,
        ess = ap.is_ess(),
        ibss = ap.is_ibss(),
        privacy = ap.is_privacy(),
        "AP advertisement"
    );
    obs.ap = Some(ap);

    if source.is_multicast() {
        return Verdict::Stop;
    }
    registry.record_sighting(source, signal, obs.timestamp, obs.ssid.as_deref());
    obs.interesting = true;
    Verdict::Continue
}

fn station(
    clients: &Registry,
    access_points: &Registry,
    view: &FrameView<'_>,
    obs: &mut Observation,
) -> Verdict {
    let Some(header) = view.header else {
        return Verdict::Stop;
    };
    match obs.kind {
        FrameKind::ProbeRequest => {
            obs.ssid = InformationElements::new(view.body())
                .element(dot11::IE_SSID)
                .and_then(dot11::decode_ssid);
        },
        FrameKind::Data if header.to_ds() && !header.from_ds() => {},
        _ => return Verdict::Continue,
    }

    let (Some(client), Some(signal)) = (obs.source, obs.signal_dbm) else {
        return Verdict::Stop;
    };
    if client.is_sentinel() || client.is_multicast() || access_points.contains(&client) {
        return Verdict::Continue;
    }

    clients.record_sighting(client, signal, obs.timestamp, obs.ssid.as_deref());
    obs.interesting = true;
    Verdict::Continue
}
