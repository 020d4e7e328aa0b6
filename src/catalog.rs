//! Wavetable catalog (C3, spec section 4.4).
//!
//! Parses RIFF/WAV headers into [`WavetableEntry`] descriptors and tracks
//! FAT directory structure enough to support the encoder's directory
//! enter/exit semantics. The FAT walk itself, and the byte region each entry
//! points into, are supplied by the main loop's filesystem driver.

use heapless::{String, Vec};

use crate::error::Error;
use crate::hal::ClusterChain;

/// Samples per wavetable frame (spec section 3).
pub const FRAME_LEN: usize = 2048;
/// Bytes into the header a chunk scan may cover before the entry is marked
/// invalid (spec section 4.4).
const SCAN_LIMIT: usize = 1200;
/// Upper bound on catalog entries.
pub const MAX_ENTRIES: usize = 64;
/// Upper bound on an entry's short (8.3) name.
const NAME_LEN: usize = 12;
/// Upper bound on an entry's long filename.
const LONG_NAME_LEN: usize = 64;

/// Sample storage format (spec section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat
{
    /// Integer PCM.
    Pcm,
    /// IEEE float.
    Float,
}

/// One parsed catalog entry: a wavetable file or a directory (spec section
/// 4.4, "Directory semantics").
#[derive(Debug, Clone)]
pub struct WavetableEntry
{
    /// Short (8.3) name.
    pub name: String<NAME_LEN>,
    /// Long filename, if the directory carried LFN entries.
    pub long_name: String<LONG_NAME_LEN>,
    /// Total file size in bytes.
    pub size_bytes: u32,
    /// First FAT cluster of the file.
    pub first_cluster: u32,
    /// Last cluster reachable without crossing a chain discontinuity.
    pub last_contiguous_cluster: u32,
    /// Memory-mapped start address of sample data.
    pub start_addr: usize,
    /// Memory-mapped end address of sample data.
    pub end_addr: usize,
    /// Byte length of the "data" chunk.
    pub data_size: u32,
    /// Sample count, `data_size / (byte_depth·channels)`.
    pub sample_count: u32,
    /// Number of complete 2048-sample frames.
    pub frame_count: u32,
    /// Bytes per sample, 2 or 4.
    pub byte_depth: u8,
    /// PCM or float sample encoding.
    pub format: SampleFormat,
    /// Channel count (expected 1, mono).
    pub channels: u8,
    /// Optional Serum "clm " metadata frame count.
    pub metadata_frame_count: Option<u32>,
    /// Index of the directory this entry belongs to, if any.
    pub dir: Option<u16>,
    /// True if this entry is itself a directory.
    pub is_directory: bool,
    /// False if header parsing failed or exceeded the scan limit.
    pub valid: bool,
}

impl WavetableEntry
{
    /// A directory placeholder entry.
    fn directory(name: &str, dir: Option<u16>) -> Self
    {
        Self { name: String::try_from(name).unwrap_or_default(),
               long_name: String::new(),
               size_bytes: 0,
               first_cluster: 0,
               last_contiguous_cluster: 0,
               start_addr: 0,
               end_addr: 0,
               data_size: 0,
               sample_count: 0,
               frame_count: 0,
               byte_depth: 0,
               format: SampleFormat::Pcm,
               channels: 0,
               metadata_frame_count: None,
               dir,
               is_directory: true,
               valid: true }
    }
}

/// Parsed RIFF/WAV "fmt " fields plus the located "data" chunk window.
struct RiffInfo
{
    byte_depth: u8,
    format: SampleFormat,
    channels: u8,
    metadata_frame_count: Option<u32>,
    data_offset: usize,
    data_size: u32,
}

/// Parses a RIFF/WAV header in `bytes` (spec section 4.4). `bytes` need only
/// cover the header and early chunks; the data payload itself is read by
/// address, not copied.
fn parse_riff(bytes: &[u8]) -> Result<RiffInfo, Error>
{
    if bytes.len() < 12 || &bytes[0 .. 4] != b"RIFF" || &bytes[8 .. 12] != b"WAVE" {
        return Err(Error::InvalidWav);
    }
    let mut pos = 12;
    let mut byte_depth = None;
    let mut format = None;
    let mut channels = None;
    let mut metadata_frame_count = None;
    let mut data = None;

    while pos + 8 <= bytes.len() && pos <= SCAN_LIMIT {
        let id = &bytes[pos .. pos + 4];
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]) as usize;
        let payload_start = pos + 8;
        if id == b"fmt " {
            if payload_start + 16 > bytes.len() {
                return Err(Error::InvalidWav);
            }
            let tag = u16::from_le_bytes([bytes[payload_start], bytes[payload_start + 1]]);
            channels = Some(bytes[payload_start + 2]);
            let bits_per_sample = u16::from_le_bytes([bytes[payload_start + 14], bytes[payload_start + 15]]);
            byte_depth = Some((bits_per_sample / 8) as u8);
            format = Some(if tag == 3 { SampleFormat::Float } else { SampleFormat::Pcm });
        } else if id == b"clm " && payload_start + 8 <= bytes.len() {
            let token = core::str::from_utf8(&bytes[payload_start .. payload_start + 8]).unwrap_or("");
            metadata_frame_count = token.trim().parse::<u32>().ok();
        } else if id == b"data" {
            data = Some((payload_start, size as u32));
            break;
        }
        pos = payload_start + size + (size & 1);
    }

    let (data_offset, data_size) = data.ok_or(Error::InvalidWav)?;
    let (byte_depth, format, channels) = match (byte_depth, format, channels) {
        (Some(b), Some(f), Some(c)) => (b, f, c),
        _ => return Err(Error::InvalidWav),
    };
    Ok(RiffInfo { byte_depth, format, channels, metadata_frame_count, data_offset, data_size })
}

/// Builds a [`WavetableEntry`] for a file whose header bytes are `header`
/// and whose data lives at `[start_addr, start_addr+header.len())` mapped
/// memory, given its FAT placement.
pub fn build_entry(name: &str, header: &[u8], base_addr: usize, first_cluster: u32, chain: &dyn ClusterChain, dir: Option<u16>) -> WavetableEntry
{
    let mut entry = WavetableEntry::directory(name, dir);
    entry.is_directory = false;
    entry.first_cluster = first_cluster;
    entry.last_contiguous_cluster = first_contiguous_run(chain, first_cluster);

    match parse_riff(header) {
        Ok(info) => {
            let sample_count = info.data_size / (info.byte_depth as u32 * info.channels.max(1) as u32);
            entry.start_addr = base_addr + info.data_offset;
            entry.data_size = info.data_size;
            entry.end_addr = entry.start_addr + info.data_size as usize;
            entry.sample_count = info.metadata_frame_count.map(|f| f * FRAME_LEN as u32).unwrap_or(sample_count);
            entry.frame_count = entry.sample_count / FRAME_LEN as u32;
            entry.byte_depth = info.byte_depth;
            entry.format = info.format;
            entry.channels = info.channels;
            entry.metadata_frame_count = info.metadata_frame_count;
            entry.size_bytes = header.len() as u32 + info.data_size;
            entry.valid = entry.start_addr + (entry.data_size as usize) <= entry.end_addr && entry.frame_count >= 1;
        },
        Err(_) => entry.valid = false,
    }
    entry
}

/// Walks the FAT chain from `first_cluster` and returns the last cluster
/// before the first discontinuity (a jump that is not `cluster+1`), per
/// spec section 4.4.
fn first_contiguous_run(chain: &dyn ClusterChain, first_cluster: u32) -> u32
{
    let mut current = first_cluster;
    loop {
        match chain.next_cluster(current) {
            Some(next) if next == current + 1 => current = next,
            _ => return current,
        }
    }
}

/// The in-RAM list of parsed wavetable descriptors.
pub struct Catalog
{
    entries: Vec<WavetableEntry, MAX_ENTRIES>,
}

impl Catalog
{
    /// An empty catalog.
    pub fn new() -> Self
    {
        Self { entries: Vec::new() }
    }

    /// Appends a parsed entry, silently dropping it if the catalog is full.
    pub fn push(&mut self, entry: WavetableEntry)
    {
        let _ = self.entries.push(entry);
    }

    /// Clears the catalog ahead of a fresh FAT walk.
    pub fn clear(&mut self)
    {
        self.entries.clear();
    }

    /// All entries in catalog order.
    pub fn entries(&self) -> &[WavetableEntry]
    {
        &self.entries
    }

    /// The entry at `index`, refusing invalid entries (spec section 4.4,
    /// "Contract on invalidity").
    pub fn selectable(&self, index: usize) -> Option<&WavetableEntry>
    {
        self.entries.get(index).filter(|e| e.valid)
    }

    /// Index of the first member of directory `dir_index`, for the
    /// encoder-press "enter directory" gesture.
    pub fn first_in_directory(&self, dir_index: u16) -> Option<usize>
    {
        self.entries.iter().position(|e| e.dir == Some(dir_index) && !e.is_directory)
    }

    /// Index of the last member of directory `dir_index`, used to clamp
    /// "down" at the end of a directory listing.
    pub fn last_in_directory(&self, dir_index: u16) -> Option<usize>
    {
        self.entries.iter().rposition(|e| e.dir == Some(dir_index) && !e.is_directory)
    }
}

impl Default for Catalog
{
    fn default() -> Self
    {
        Self::new()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct NoChain;

    impl ClusterChain for NoChain
    {
        fn next_cluster(&self, _cluster: u32) -> Option<u32>
        {
            None
        }
    }

    struct LinearChain(u32);

    impl ClusterChain for LinearChain
    {
        fn next_cluster(&self, cluster: u32) -> Option<u32>
        {
            if cluster < self.0 { Some(cluster + 1) } else { None }
        }
    }

    fn build_wav(sample_rate: u32, byte_depth: u16, frames: u32) -> Vec<u8, 128>
    {
        let mut bytes: Vec<u8, 128> = Vec::new();
        let data_size = frames * FRAME_LEN as u32 * byte_depth as u32;
        let _ = bytes.extend_from_slice(b"RIFF");
        let _ = bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
        let _ = bytes.extend_from_slice(b"WAVE");
        let _ = bytes.extend_from_slice(b"fmt ");
        let _ = bytes.extend_from_slice(&16_u32.to_le_bytes());
        let tag: u16 = if byte_depth == 4 { 3 } else { 1 };
        let _ = bytes.extend_from_slice(&tag.to_le_bytes());
        let _ = bytes.extend_from_slice(&1_u16.to_le_bytes()); // mono
        let _ = bytes.extend_from_slice(&sample_rate.to_le_bytes());
        let byte_rate = sample_rate * byte_depth as u32;
        let _ = bytes.extend_from_slice(&byte_rate.to_le_bytes());
        let _ = bytes.extend_from_slice(&byte_depth.to_le_bytes());
        let _ = bytes.extend_from_slice(&(byte_depth * 8).to_le_bytes());
        let _ = bytes.extend_from_slice(b"data");
        let _ = bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes
    }

    #[test]
    fn parses_valid_float_wav_header()
    {
        let header = build_wav(48_000, 4, 2);
        let entry = build_entry("WAVE.WAV", &header, 0x1000, 10, &NoChain, None);
        assert!(entry.valid);
        assert_eq!(entry.frame_count, 2);
        assert_eq!(entry.format, SampleFormat::Float);
        assert_eq!(entry.start_addr, 0x1000 + header.len());
    }

    #[test]
    fn rejects_header_missing_riff_magic()
    {
        let mut header = build_wav(48_000, 2, 1);
        header[0] = b'X';
        let entry = build_entry("BAD.WAV", &header, 0, 0, &NoChain, None);
        assert!(!entry.valid);
    }

    #[test]
    fn contiguous_cluster_run_stops_at_first_gap()
    {
        let chain = LinearChain(5);
        let last = first_contiguous_run(&chain, 2);
        assert_eq!(last, 5);
    }

    #[test]
    fn directory_enter_finds_first_and_last_member()
    {
        let mut catalog = Catalog::new();
        catalog.push(WavetableEntry::directory("SUB", None));
        let mut a = WavetableEntry::directory("A.WAV", Some(0));
        a.is_directory = false;
        let mut b = WavetableEntry::directory("B.WAV", Some(0));
        b.is_directory = false;
        catalog.push(a);
        catalog.push(b);
        assert_eq!(catalog.first_in_directory(0), Some(1));
        assert_eq!(catalog.last_in_directory(0), Some(2));
    }
}
