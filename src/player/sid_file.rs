// PSID / RSID header parser with payload extraction.

use thiserror::Error;

use crate::memory::Memory;

/// Smallest file that still carries every v1 header field.
pub const MIN_HEADER_LEN: usize = 0x76;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SidFileError {
    #[error("file too small for a SID header ({0} bytes)")]
    TooSmall(usize),
    #[error("not a SID file (magic={0:?})")]
    BadMagic(String),
    #[error("data offset ${offset:02X} past end of file ({len} bytes)")]
    DataOffsetPastEnd { offset: usize, len: usize },
    #[error("file too small for embedded load address")]
    MissingLoadAddress,
}

/// Parsed SID file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidHeader {
    pub magic: String,
    pub version: u16,
    pub data_offset: u8,
    /// As stored; 0 means the dump starts with its own load address.
    pub load_address: u16,
    pub init_address: u16,
    /// 0 means init installs the play routine through $0314/$0315.
    pub play_address: u16,
    /// Highest 0-based track number (declared songs - 1).
    pub subsong_count: u8,
    /// 0-based track selected on load.
    pub start_track: u8,
    /// 0 = vertical-blank (50 Hz) timing, anything else follows the CIA timer.
    pub speed_flag: u8,
    pub name: String,
    pub author: String,
    pub published: String,
    pub is_pal: bool,
    pub is_rsid: bool,
}

/// A fully loaded SID file: header + extracted payload + its load address.
#[derive(Debug, Clone)]
pub struct SidFile {
    pub header: SidHeader,
    pub load_address: u16,
    pub payload: Vec<u8>,
    /// Full raw file bytes, hashed by [`SidFile::hvsc_md5`].
    pub raw: Vec<u8>,
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn read_be_u16(d: &[u8], o: usize) -> u16 {
    ((d[o] as u16) << 8) | d[o + 1] as u16
}

fn read_string(d: &[u8], o: usize, len: usize) -> String {
    let s = &d[o..o + len];
    let end = s.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&s[..end]).to_string()
}

// ── Public API ───────────────────────────────────────────────────────────

/// Parse a SID file from raw bytes.
pub fn load_sid(data: &[u8]) -> Result<SidFile, SidFileError> {
    let header = parse_header(data)?;
    let ds = header.data_offset as usize;

    if ds >= data.len() {
        return Err(SidFileError::DataOffsetPastEnd {
            offset: ds,
            len: data.len(),
        });
    }

    let (load_address, payload_start) = if header.load_address == 0 {
        if ds + 2 > data.len() {
            return Err(SidFileError::MissingLoadAddress);
        }
        let lo = data[ds] as u16;
        let hi = data[ds + 1] as u16;
        ((hi << 8) | lo, ds + 2)
    } else {
        (header.load_address, ds)
    };

    let payload = data[payload_start..].to_vec();
    log::debug!(
        "{} v{}: load=${:04X} init=${:04X} play=${:04X} {} bytes",
        header.magic,
        header.version,
        load_address,
        header.init_address,
        header.play_address,
        payload.len()
    );

    Ok(SidFile {
        header,
        load_address,
        payload,
        raw: data.to_vec(),
    })
}

/// Parse just the header (no payload extraction).
pub fn parse_header(data: &[u8]) -> Result<SidHeader, SidFileError> {
    if data.len() < MIN_HEADER_LEN {
        return Err(SidFileError::TooSmall(data.len()));
    }

    let magic = String::from_utf8_lossy(&data[0..4]).to_string();
    if magic != "PSID" && magic != "RSID" {
        return Err(SidFileError::BadMagic(magic));
    }

    let is_rsid = magic == "RSID";
    let version = read_be_u16(data, 0x04);

    // Clock bits of the v2+ flags word: 1 = PAL, 2 = NTSC, 3 = either.
    let mut is_pal = true;
    if version >= 2 && data.len() >= 0x78 {
        let flags = read_be_u16(data, 0x76);
        is_pal = ((flags >> 2) & 0x03) != 2;
    }

    Ok(SidHeader {
        magic,
        version,
        data_offset: data[0x07],
        load_address: read_be_u16(data, 0x08),
        init_address: read_be_u16(data, 0x0A),
        play_address: read_be_u16(data, 0x0C),
        subsong_count: data[0x0F].saturating_sub(1),
        start_track: data[0x11].saturating_sub(1),
        speed_flag: data[0x15],
        name: read_string(data, 0x16, 32),
        author: read_string(data, 0x36, 32),
        published: read_string(data, 0x56, 32),
        is_pal,
        is_rsid,
    })
}

impl SidFile {
    /// A fresh 64 KiB image with the payload placed at the load address.
    /// Anything past $FFFF is dropped.
    pub fn memory_image(&self) -> Memory {
        let mut mem = Memory::new();
        mem.load(self.load_address, &self.payload);
        mem
    }

    /// MD5 of the whole file, as used to key song-length databases.
    ///
    /// https://hvsc.c64.org/download/C64Music/DOCUMENTS/Songlengths.faq
    pub fn hvsc_md5(&self) -> String {
        format!("{:x}", md5::compute(&self.raw))
    }

    /// One-line description, e.g. `Commando ( 2 / 3 ) | Rob Hubbard, Published: 1985 Elite`.
    /// The track part is left out for single-song files.
    pub fn info_string(&self, current_track: u8) -> String {
        let h = &self.header;
        let mut out = format!("{} ", h.name);
        if h.subsong_count > 0 {
            out.push_str(&format!(
                "( {} / {} ) ",
                current_track as u16 + 1,
                h.subsong_count as u16 + 1
            ));
        }
        out.push_str(&format!("| {}, Published: {}", h.author, h.published));
        out
    }
}
