//! # PMTK LOCUS Log Decoder
//!
//! Decodes the GPS log dump the vario's MTK GPS module emits after
//! `$PMTK622,0*28` (query locus data).
//!
//! A dump is a sequence of `$PMTKLOX` sentences:
//!
//! ```text
//! $PMTKLOX,0,86*67                      start, 86 data lines follow
//! $PMTKLOX,1,0,0100010B,7F000000,...*2E data line 0, 8 hex digits per word
//! ...
//! $PMTKLOX,2*47                         end
//! ```
//!
//! Every 4 data words form one record, of which the first 15 bytes are:
//!
//! | Bytes | Field | Encoding |
//! |-------|-------|----------|
//! | 0-3 | UTC time | u32 LE, UNIX seconds |
//! | 4 | Fix quality | u8 |
//! | 5-8 | Latitude | f32 LE, degrees |
//! | 9-12 | Longitude | f32 LE, degrees |
//! | 13-14 | Height | u16 LE, meters |
//!
//! A dump is written to two sinks: the raw sentences, and one CSV row per
//! record with a fix quality of 2.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{BfvError, Result};

/// Sentence carrying LOCUS log data
pub const LOCUS_SENTENCE: &str = "$PMTKLOX";

/// Data words concatenated into one record
pub const LOCUS_WORDS_PER_RECORD: usize = 4;

/// Bytes of a record that carry data
pub const LOCUS_RECORD_SIZE: usize = 15;

/// Fix quality of records written to the CSV sink
pub const LOCUS_CSV_FIX: u8 = 2;

/// Raw sentence log file name
pub const RAW_LOG_FILE_NAME: &str = "locus_record.mtk";

/// CSV file name
pub const CSV_FILE_NAME: &str = "locus_record.csv";

/// Index of the first data word in a `$PMTKLOX,1,<line>,...` sentence
const FIRST_DATA_FIELD: usize = 3;

/// One decoded LOCUS record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocusRecord {
    /// UTC time in UNIX seconds
    pub timestamp: u32,

    /// Fix quality reported by the GPS
    pub fix: u8,

    /// Latitude in degrees
    pub latitude: f32,

    /// Longitude in degrees
    pub longitude: f32,

    /// Height in meters
    pub height: i32,
}

impl LocusRecord {
    /// Decode a record from its binary layout
    ///
    /// # Errors
    ///
    /// Returns error if fewer than [`LOCUS_RECORD_SIZE`] bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LOCUS_RECORD_SIZE {
            return Err(BfvError::Locus(format!(
                "record too short: expected {} bytes, got {}",
                LOCUS_RECORD_SIZE,
                bytes.len()
            )));
        }

        Ok(Self {
            timestamp: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            fix: bytes[4],
            latitude: f32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
            longitude: f32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]),
            height: i32::from_le_bytes([bytes[13], bytes[14], 0, 0]),
        })
    }

    /// Decode a record from concatenated hex words
    pub fn from_hex(record_hex: &str) -> Result<Self> {
        let bytes = hex::decode(record_hex)
            .map_err(|e| BfvError::Locus(format!("invalid hex record {:?}: {}", record_hex, e)))?;
        Self::from_bytes(&bytes)
    }

    /// UTC time as ISO 8601, e.g. `2023-11-14T22:13:20Z`
    pub fn iso_time(&self) -> String {
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
            .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_default()
    }
}

/// CSV row `timestamp,iso_time,fix,lat,lon,height`
#[derive(Debug, Serialize)]
struct CsvRow {
    timestamp: u32,
    time: String,
    fix: u8,
    latitude: f32,
    longitude: f32,
    height: i32,
}

impl From<&LocusRecord> for CsvRow {
    fn from(record: &LocusRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            time: record.iso_time(),
            fix: record.fix,
            latitude: record.latitude,
            longitude: record.longitude,
            height: record.height,
        }
    }
}

/// Header-less CSV writer with `\n` line ends
fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(inner)
}

/// The two outputs of a LOCUS dump
pub struct LocusSinks {
    /// Raw `$PMTKLOX` sentences
    pub raw: Box<dyn Write + Send>,

    /// Decoded CSV rows
    pub csv: Box<dyn Write + Send>,
}

/// Opens the sinks of a new LOCUS dump
pub trait SinkFactory: Send {
    /// Open both sinks
    fn open(&mut self) -> io::Result<LocusSinks>;
}

/// Writes a dump to `locus_record.mtk` and `locus_record.csv`
///
/// Each dump replaces the files of the previous one.
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    dir: PathBuf,
}

impl FileSinkFactory {
    /// Write dumps into `dir` (created if missing)
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the raw sentence log
    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(RAW_LOG_FILE_NAME)
    }

    /// Path of the CSV file
    pub fn csv_path(&self) -> PathBuf {
        self.dir.join(CSV_FILE_NAME)
    }
}

impl SinkFactory for FileSinkFactory {
    fn open(&mut self) -> io::Result<LocusSinks> {
        fs::create_dir_all(&self.dir)?;
        let raw = File::create(self.raw_path())?;
        let csv = File::create(self.csv_path())?;

        Ok(LocusSinks {
            raw: Box::new(BufWriter::new(raw)),
            csv: Box::new(BufWriter::new(csv)),
        })
    }
}

/// An open dump; both sinks are flushed when it is dropped
struct LocusSession {
    raw: Box<dyn Write + Send>,
    csv: csv::Writer<Box<dyn Write + Send>>,
    rows_written: usize,
}

impl LocusSession {
    fn new(sinks: LocusSinks) -> Self {
        Self {
            raw: sinks.raw,
            csv: csv_writer(sinks.csv),
            rows_written: 0,
        }
    }

    fn write_raw(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.raw, "{}", line)
    }

    fn write_row(&mut self, record: &LocusRecord) -> io::Result<()> {
        self.csv.serialize(CsvRow::from(record))?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.raw.flush()?;
        self.csv.flush()
    }

    /// Flush both sinks, reporting failures, then release them
    fn close(mut self) -> io::Result<usize> {
        self.flush()?;
        Ok(self.rows_written)
    }
}

impl Drop for LocusSession {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush LOCUS sinks: {}", e);
        }
    }
}

/// What a `$PMTK` line did to the LOCUS decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocusEvent {
    /// Dump started, sinks opened
    SessionOpened,

    /// Data line decoded
    Records {
        /// Records found in the line
        decoded: usize,
        /// Records written to the CSV sink
        logged: usize,
    },

    /// Dump finished, sinks closed
    SessionClosed {
        /// CSV rows written during the dump
        rows: usize,
    },

    /// Not a LOCUS sentence, or an unknown sub-mode
    Ignored,
}

/// Decoder for `$PMTKLOX` sentences
pub struct LocusDecoder {
    factory: Box<dyn SinkFactory>,
    session: Option<LocusSession>,
}

impl std::fmt::Debug for LocusDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocusDecoder")
            .field("session_open", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl LocusDecoder {
    /// Create a decoder writing through `factory`
    pub fn new<F: SinkFactory + 'static>(factory: F) -> Self {
        Self {
            factory: Box::new(factory),
            session: None,
        }
    }

    /// Create a decoder writing files into `dir`
    pub fn with_output_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(FileSinkFactory::new(dir))
    }

    /// Whether a dump is in progress
    pub fn is_session_open(&self) -> bool {
        self.session.is_some()
    }

    /// Decode one `$PMTK...` line
    ///
    /// # Arguments
    ///
    /// * `line` - Sentence including the `*checksum` suffix, without line end
    ///
    /// # Returns
    ///
    /// * `Result<LocusEvent>` - What the line did
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The sub-mode field is missing
    /// - A data record is not valid hex or is too short
    /// - A data or end line arrives without an open dump
    /// - A sink cannot be opened, written or flushed
    ///
    /// Nothing is written for a data line that fails to decode.
    pub fn decode_line(&mut self, line: &str) -> Result<LocusEvent> {
        let body = line.split('*').next().unwrap_or(line);
        let fields: Vec<&str> = body.split(',').collect();

        if fields[0] != LOCUS_SENTENCE {
            debug!("Ignoring PMTK sentence: {}", line);
            return Ok(LocusEvent::Ignored);
        }

        let mode = fields
            .get(1)
            .ok_or_else(|| BfvError::Locus(format!("missing sub-mode in {:?}", line)))?;

        match *mode {
            "0" => self.begin(line),
            "1" => self.data(line, &fields),
            "2" => self.end(line),
            other => {
                debug!("Ignoring LOCUS sub-mode {}", other);
                Ok(LocusEvent::Ignored)
            }
        }
    }

    /// Close an unfinished dump, flushing both sinks
    ///
    /// Does nothing if no dump is in progress.
    pub fn close_session(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            let rows = session.close()?;
            info!("Closed unfinished LOCUS dump after {} rows", rows);
        }
        Ok(())
    }

    fn begin(&mut self, line: &str) -> Result<LocusEvent> {
        if self.session.is_some() {
            warn!("LOCUS dump restarted before it ended, closing previous dump");
            self.close_session()?;
        }

        let mut session = LocusSession::new(self.factory.open()?);
        session.write_raw(line)?;
        self.session = Some(session);

        info!("LOCUS dump started");
        Ok(LocusEvent::SessionOpened)
    }

    fn data(&mut self, line: &str, fields: &[&str]) -> Result<LocusEvent> {
        let words = fields.get(FIRST_DATA_FIELD..).unwrap_or(&[]);

        let mut records = Vec::with_capacity(words.len() / LOCUS_WORDS_PER_RECORD);
        for chunk in words.chunks(LOCUS_WORDS_PER_RECORD) {
            if chunk.len() < LOCUS_WORDS_PER_RECORD {
                debug!("Ignoring {} trailing LOCUS words", chunk.len());
                break;
            }
            records.push(LocusRecord::from_hex(&chunk.concat())?);
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BfvError::Locus("data line without an open dump".to_string()))?;

        let mut logged = 0;
        for record in records.iter().filter(|r| r.fix == LOCUS_CSV_FIX) {
            session.write_row(record)?;
            logged += 1;
        }
        session.write_raw(line)?;

        debug!("LOCUS line: {} records, {} logged", records.len(), logged);
        Ok(LocusEvent::Records {
            decoded: records.len(),
            logged,
        })
    }

    fn end(&mut self, line: &str) -> Result<LocusEvent> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| BfvError::Locus("end line without an open dump".to_string()))?;

        session.write_raw(line)?;
        let rows = session.close()?;

        info!("LOCUS dump finished, {} rows written", rows);
        Ok(LocusEvent::SessionClosed { rows })
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Write target shared with the test
    #[derive(Clone, Default)]
    pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Writer that fails every write
    pub struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "Mock write error"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// In-memory sinks; every open appends to the same buffers
    #[derive(Clone, Default)]
    pub struct MemorySinkFactory {
        pub raw: SharedBuffer,
        pub csv: SharedBuffer,
        pub opens: Arc<Mutex<usize>>,
        pub fail_writes: bool,
    }

    impl MemorySinkFactory {
        pub fn open_count(&self) -> usize {
            *self.opens.lock().unwrap()
        }
    }

    impl SinkFactory for MemorySinkFactory {
        fn open(&mut self) -> io::Result<LocusSinks> {
            *self.opens.lock().unwrap() += 1;
            if self.fail_writes {
                return Ok(LocusSinks {
                    raw: Box::new(FailingWriter),
                    csv: Box::new(FailingWriter),
                });
            }
            Ok(LocusSinks {
                raw: Box::new(self.raw.clone()),
                csv: Box::new(self.csv.clone()),
            })
        }
    }

    /// Encode a record the way the GPS module does (16 bytes, 4 words)
    pub fn record_words(timestamp: u32, fix: u8, lat: f32, lon: f32, height: u16) -> Vec<String> {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&timestamp.to_le_bytes());
        bytes.push(fix);
        bytes.extend_from_slice(&lat.to_le_bytes());
        bytes.extend_from_slice(&lon.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.push(bytes.iter().fold(0u8, |acc, b| acc ^ b));

        hex::encode_upper(&bytes)
            .as_bytes()
            .chunks(8)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect()
    }

    /// Build a `$PMTKLOX,1` data line
    pub fn data_line(index: usize, words: &[String]) -> String {
        format!("$PMTKLOX,1,{},{}*00", index, words.join(","))
    }
}
