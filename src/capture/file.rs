//! Capture file replay (pcap and pcapng).

use super::{CapturedFrame, FrameSource, LINKTYPE_IEEE802_11_RADIOTAP, NextFrame, timestamp_from_parts};
use crate::{Error, Result};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{Block, LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Initial reader buffer size.
const READER_CAPACITY: usize = 65_536;
/// Upper bound for the reader buffer when a block does not fit.
const MAX_READER_CAPACITY: usize = 16 * 1024 * 1024;
/// Section header block type, which starts every pcapng file.
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
/// Consecutive refills without a complete block before giving up.
const MAX_STALLED_REFILLS: u32 = 3;

enum Reader {
    Legacy(LegacyPcapReader<File>),
    Ng(PcapNGReader<File>),
}

#[derive(Debug, Clone, Copy)]
struct InterfaceInfo {
    linktype: i32,
    units_per_sec: u64,
}

#[derive(Debug, Default)]
struct DecodeState {
    /// Legacy files: sub-second resolution from the global header.
    legacy_units_per_sec: u64,
    /// Legacy files: link type from the global header.
    legacy_linktype: i32,
    /// pcapng files: one entry per interface description block.
    interfaces: Vec<InterfaceInfo>,
    warned_linktype: bool,
    stalled: u32,
    capacity: usize,
}

/// Replays frames from a pcap or pcapng file.
pub struct FileSource {
    path: PathBuf,
    reader: Reader,
    state: DecodeState,
}

impl FileSource {
    /// Opens a capture file, detecting its format from the first block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StartupFailure`] if the file cannot be opened or is
    /// not a pcap/pcapng capture.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let startup = |cause: String| Error::StartupFailure {
            component: "frame source",
            cause: format!("{}: {cause}", path.display()),
        };

        let mut file = File::open(&path).map_err(|e| startup(e.to_string()))?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|e| startup(format!("cannot read header: {e}")))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| startup(e.to_string()))?;

        let reader = if magic == PCAPNG_MAGIC {
            PcapNGReader::new(READER_CAPACITY, file)
                .map(Reader::Ng)
                .map_err(|e| startup(format!("invalid pcapng: {e:?}")))?
        } else {
            LegacyPcapReader::new(READER_CAPACITY, file)
                .map(Reader::Legacy)
                .map_err(|e| startup(format!("invalid pcap: {e:?}")))?
        };

        debug!(path = %path.display(), "Opened capture file");
        Ok(Self {
            path,
            reader,
            state: DecodeState {
                legacy_units_per_sec: 1_000_000,
                legacy_linktype: LINKTYPE_IEEE802_11_RADIOTAP,
                capacity: READER_CAPACITY,
                ..DecodeState::default()
            },
        })
    }
}

impl DecodeState {
    fn check_linktype(&mut self, linktype: i32) {
        if linktype != LINKTYPE_IEEE802_11_RADIOTAP && !self.warned_linktype {
            self.warned_linktype = true;
            warn!(
                linktype,
                "Capture is not radiotap-encapsulated 802.11; frames will be ignored"
            );
        }
    }

    /// Extracts a frame from a block, updating header state as needed.
    fn frame_from_block(&mut self, block: &PcapBlockOwned<'_>) -> Option<CapturedFrame> {
        match block {
            PcapBlockOwned::LegacyHeader(header) => {
                self.legacy_units_per_sec = if header.is_nanosecond_precision() {
                    1_000_000_000
                } else {
                    1_000_000
                };
                self.legacy_linktype = header.network.0;
                self.check_linktype(header.network.0);
                None
            },
            PcapBlockOwned::Legacy(packet) => Some(
                CapturedFrame::new(
                    packet.data.to_vec(),
                    timestamp_from_parts(
                        u64::from(packet.ts_sec),
                        u64::from(packet.ts_usec),
                        self.legacy_units_per_sec,
                    ),
                )
                .with_linktype(self.legacy_linktype),
            ),
            PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                self.interfaces.clear();
                None
            },
            PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                self.check_linktype(idb.linktype.0);
                self.interfaces.push(InterfaceInfo {
                    linktype: idb.linktype.0,
                    units_per_sec: units_per_sec(idb.if_tsresol),
                });
                None
            },
            PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                let info = self
                    .interfaces
                    .get(epb.if_id as usize)
                    .copied()
                    .unwrap_or(InterfaceInfo {
                        linktype: LINKTYPE_IEEE802_11_RADIOTAP,
                        units_per_sec: 1_000_000,
                    });
                let ticks = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);
                let units = info.units_per_sec.max(1);
                let len = (epb.caplen as usize).min(epb.data.len());
                Some(
                    CapturedFrame::new(
                        epb.data[..len].to_vec(),
                        timestamp_from_parts(ticks / units, ticks % units, units),
                    )
                    .with_linktype(info.linktype),
                )
            },
            PcapBlockOwned::NG(_) => None,
        }
    }
}

/// Decodes the pcapng `if_tsresol` option into ticks per second.
fn units_per_sec(tsresol: u8) -> u64 {
    let exponent = u32::from(tsresol & 0x7f);
    if tsresol & 0x80 == 0 {
        10u64.checked_pow(exponent).unwrap_or(1_000_000)
    } else {
        1u64.checked_shl(exponent).unwrap_or(1_000_000)
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<NextFrame> {
        let reader: &mut dyn PcapReaderIterator = match &mut self.reader {
            Reader::Legacy(reader) => reader,
            Reader::Ng(reader) => reader,
        };

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    self.state.stalled = 0;
                    let frame = self.state.frame_from_block(&block);
                    drop(block);
                    reader.consume(offset);
                    if let Some(frame) = frame {
                        return Ok(NextFrame::Frame(frame));
                    }
                },
                Err(PcapError::Eof) => return Ok(NextFrame::EndOfInput),
                Err(PcapError::UnexpectedEof) => {
                    warn!(path = %self.path.display(), "Capture file ends with a truncated block");
                    return Ok(NextFrame::EndOfInput);
                },
                Err(PcapError::BufferTooSmall) => {
                    let grown = self.state.capacity.saturating_mul(2);
                    if grown > MAX_READER_CAPACITY || !reader.grow(grown) {
                        return Err(Error::Source(format!(
                            "{}: block larger than {MAX_READER_CAPACITY} bytes",
                            self.path.display()
                        )));
                    }
                    debug!(capacity = grown, "Grew capture reader buffer");
                    self.state.capacity = grown;
                    reader
                        .refill()
                        .map_err(|e| Error::Source(format!("{}: {e:?}", self.path.display())))?;
                },
                Err(PcapError::Incomplete(_)) => {
                    self.state.stalled += 1;
                    if self.state.stalled > MAX_STALLED_REFILLS {
                        warn!(path = %self.path.display(), "Capture file ends with a truncated block");
                        return Ok(NextFrame::EndOfInput);
                    }
                    reader
                        .refill()
                        .map_err(|e| Error::Source(format!("{}: {e:?}", self.path.display())))?;
                },
                Err(e) => {
                    return Err(Error::Source(format!("{}: {e:?}", self.path.display())));
                },
            }
        }
    }

    fn is_live(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Writes a little-endian microsecond pcap with the given packets.
    fn write_pcap(linktype: u32, packets: &[(u32, u32, &[u8])]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&65_535u32.to_le_bytes());
        bytes.extend_from_slice(&linktype.to_le_bytes());
        for (secs, micros, data) in packets {
            let len = u32::try_from(data.len()).unwrap();
            bytes.extend_from_slice(&secs.to_le_bytes());
            bytes.extend_from_slice(&micros.to_le_bytes());
            bytes.extend_from_slice(&len.to_le_bytes());
            bytes.extend_from_slice(&len.to_le_bytes());
            bytes.extend_from_slice(data);
        }
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_legacy_pcap_in_order() {
        let file = write_pcap(127, &[(100, 500_000, &[1, 2, 3]), (101, 0, &[4, 5])]);
        let mut source = FileSource::open(file.path()).unwrap();

        let NextFrame::Frame(first) = source.next_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(first.data, vec![1, 2, 3]);
        assert_eq!(first.timestamp.timestamp(), 100);
        assert_eq!(first.timestamp.timestamp_subsec_micros(), 500_000);

        let NextFrame::Frame(second) = source.next_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(second.data, vec![4, 5]);

        assert!(matches!(source.next_frame().unwrap(), NextFrame::EndOfInput));
        assert!(!source.is_live());
    }

    #[test]
    fn test_block_larger_than_reader_buffer_is_read() {
        let large = vec![0x5a; READER_CAPACITY * 3];
        let file = write_pcap(127, &[(1, 0, large.as_slice()), (2, 0, &[9])]);
        let mut source = FileSource::open(file.path()).unwrap();

        let NextFrame::Frame(first) = source.next_frame().unwrap() else {
            panic!("expected the large frame");
        };
        assert_eq!(first.data.len(), large.len());
        let NextFrame::Frame(second) = source.next_frame().unwrap() else {
            panic!("expected a frame after the large one");
        };
        assert_eq!(second.data, vec![9]);
        assert!(matches!(source.next_frame().unwrap(), NextFrame::EndOfInput));
    }

    #[test]
    fn test_truncated_tail_ends_input() {
        let file = write_pcap(127, &[(1, 0, &[1, 2, 3])]);
        let mut bytes = std::fs::read(file.path()).unwrap();
        // Second record header claims 64 bytes but carries two.
        for field in [2u32, 0, 64, 64] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes.extend_from_slice(&[0xaa, 0xbb]);
        std::fs::write(file.path(), &bytes).unwrap();

        let mut source = FileSource::open(file.path()).unwrap();
        assert!(matches!(source.next_frame().unwrap(), NextFrame::Frame(_)));
        assert!(matches!(source.next_frame().unwrap(), NextFrame::EndOfInput));
    }

    #[test]
    fn test_frames_carry_file_link_type() {
        let file = write_pcap(1, &[(1, 0, &[1, 2, 3])]);
        let mut source = FileSource::open(file.path()).unwrap();

        let NextFrame::Frame(frame) = source.next_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.linktype, 1);
        assert!(!frame.is_radiotap());
    }

    #[test]
    fn test_missing_file_is_startup_failure() {
        let err = FileSource::open("/nonexistent/airtrack.pcap").err().unwrap();
        assert!(matches!(err, Error::StartupFailure { component: "frame source", .. }));
    }

    #[test]
    fn test_garbage_file_is_startup_failure() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a capture file").unwrap();
        file.flush().unwrap();
        assert!(FileSource::open(file.path()).is_err());
    }

    #[test]
    fn test_units_per_sec() {
        assert_eq!(units_per_sec(6), 1_000_000);
        assert_eq!(units_per_sec(9), 1_000_000_000);
        assert_eq!(units_per_sec(0x80 | 10), 1024);
    }
}
