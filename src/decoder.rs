//! Decoder for the binary event log (cAER aedat 3.0) produced by the device.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::address::{decode_special_word, decode_spike_word};
use crate::error::DynapseError;
use crate::events::EventSet;

/// Event type code of a special (marker) event packet.
const SPECIAL_EVENT_TYPE: u16 = 0;
/// Event type code of a spike event packet.
const SPIKE_EVENT_TYPE: u16 = 12;
/// Size of the fixed packet header, in bytes.
const PACKET_HEADER_SIZE: usize = 28;
/// Minimum record size holding the two 32-bit words of an event.
const MIN_EVENT_SIZE: usize = 8;
/// The line closing the textual file header.
const END_OF_HEADER: &[u8] = b"#!END-HEADER";

/// The fixed-size header preceding every event packet.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PacketHeader {
    pub event_type: u16,
    pub event_source: u16,
    pub event_size: u32,
    pub event_offset: u32,
    /// Timestamp overflow counter. Read but deliberately not folded into the
    /// 32-bit timestamps, which therefore wrap on recordings longer than ~71 min.
    pub ts_overflow: u32,
    pub capacity: u32,
    pub number: u32,
    pub valid: u32,
}

impl PacketHeader {
    fn parse(buf: &[u8; PACKET_HEADER_SIZE]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([buf[i], buf[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        PacketHeader {
            event_type: u16_at(0),
            event_source: u16_at(2),
            event_size: u32_at(4),
            event_offset: u32_at(8),
            ts_overflow: u32_at(12),
            capacity: u32_at(16),
            number: u32_at(20),
            valid: u32_at(24),
        }
    }
}

/// The special (marker) events of a recording, kept apart from the spikes.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct SpecialEvents {
    pub types: Vec<u8>,
    pub timestamps: Vec<u32>,
}

impl SpecialEvents {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// A fully decoded recording: the spike events and the special events.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub events: EventSet,
    pub special: SpecialEvents,
}

impl Recording {
    /// Save the decoded recording to a JSON file, sparing the binary decoding
    /// on later analysis runs.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), DynapseError> {
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| DynapseError::Io(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Load a previously saved recording from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Recording, DynapseError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| DynapseError::Io(e.to_string()))
    }
}

/// Read a recording from an aedat file.
///
/// # Examples
///
/// ```rust,no_run
/// use rusty_dynapse::decoder::import_events;
///
/// let recording = import_events("recording.aedat").unwrap();
/// println!("{} spikes, {} markers", recording.events.len(), recording.special.len());
/// ```
pub fn import_events<P: AsRef<Path>>(path: P) -> Result<Recording, DynapseError> {
    let file = File::open(&path).map_err(|e| {
        DynapseError::Io(format!(
            "Error while reading file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    let mut reader = BufReader::new(file);
    decode_stream(&mut reader)
}

/// Decode a recording from any buffered byte stream.
///
/// The stream starts with a textual comment header terminated by the
/// `#!END-HEADER` line, followed by a sequence of binary packets. A zero-byte
/// read at a packet boundary is the normal end of stream; a truncated packet
/// stops the decoding cleanly at the last complete record.
pub fn decode_stream<R: BufRead>(reader: &mut R) -> Result<Recording, DynapseError> {
    skip_header(reader)?;

    let mut timestamps = Vec::new();
    let mut chip_ids = Vec::new();
    let mut core_ids = Vec::new();
    let mut neuron_ids = Vec::new();
    let mut special = SpecialEvents::default();
    let mut num_packets = 0usize;

    while let Some(header) = read_packet_header(reader)? {
        num_packets += 1;
        let payload_size = header.capacity as usize * header.event_size as usize;
        let payload = read_up_to(reader, payload_size)?;
        let event_size = header.event_size as usize;
        if event_size < MIN_EVENT_SIZE {
            continue;
        }

        match header.event_type {
            SPIKE_EVENT_TYPE => {
                for record in payload.chunks_exact(event_size) {
                    let (word, timestamp) = split_record(record);
                    let (core_id, chip_id, neuron_id) = decode_spike_word(word);
                    core_ids.push(core_id);
                    chip_ids.push(chip_id);
                    neuron_ids.push(neuron_id);
                    timestamps.push(timestamp);
                }
            }
            SPECIAL_EVENT_TYPE => {
                for record in payload.chunks_exact(event_size) {
                    let (word, timestamp) = split_record(record);
                    special.types.push(decode_special_word(word));
                    special.timestamps.push(timestamp);
                }
            }
            // Unknown event types are skipped without extracting any field.
            _ => {}
        }

        if payload.len() < payload_size {
            break;
        }
    }

    info!(
        "Decoded {} packets: {} spike events, {} special events",
        num_packets,
        timestamps.len(),
        special.len()
    );

    let events = EventSet::new(timestamps, chip_ids, core_ids, neuron_ids)?;
    Ok(Recording { events, special })
}

/// Skip the textual header, consuming lines while they start with `#` and
/// stopping right after the `#!END-HEADER` line.
fn skip_header<R: BufRead>(reader: &mut R) -> Result<(), DynapseError> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() || buf[0] != b'#' {
            return Ok(());
        }
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;
        if line.starts_with(END_OF_HEADER) {
            return Ok(());
        }
    }
}

/// Read one packet header, or `None` at the end of the stream.
fn read_packet_header<R: Read>(reader: &mut R) -> Result<Option<PacketHeader>, DynapseError> {
    let mut buf = [0u8; PACKET_HEADER_SIZE];
    let mut filled = 0;
    while filled < PACKET_HEADER_SIZE {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            // A zero-byte read on the first attempt is the regular end of data;
            // a partial header is a truncated file and stops the decoding too.
            return Ok(None);
        }
        filled += n;
    }
    Ok(Some(PacketHeader::parse(&buf)))
}

/// Read up to `size` bytes, returning fewer only at the end of the stream.
fn read_up_to<R: Read>(reader: &mut R, size: usize) -> Result<Vec<u8>, DynapseError> {
    let mut payload = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut payload[filled..])?;
        if n == 0 {
            payload.truncate(filled);
            break;
        }
        filled += n;
    }
    Ok(payload)
}

/// Split an event record into its data word and its absolute timestamp.
fn split_record(record: &[u8]) -> (u32, u32) {
    let word = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    let timestamp = u32::from_le_bytes([record[4], record[5], record[6], record[7]]);
    (word, timestamp)
}
