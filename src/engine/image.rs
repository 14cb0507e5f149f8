//! Built-in engine backed by the raw file image.

use super::{AnalysisEngine, Database, DatabaseSummary, EngineError, StringInfo};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Minimum run length for a printable string.
const MIN_STRING_LEN: usize = 4;

/// Engine that loads whole files into memory and sniffs their headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageEngine;

impl ImageEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisEngine for ImageEngine {
    fn name(&self) -> &'static str {
        "image"
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn Database>, EngineError> {
        let bytes = std::fs::read(path).map_err(|e| EngineError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(EngineError::Load {
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }
        let format = Format::detect(&bytes);
        debug!(path = %path.display(), format = %format.name(), size = bytes.len(), "Loaded image");
        Ok(Arc::new(Image {
            path: path.to_path_buf(),
            bytes,
            format,
            strings: OnceLock::new(),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn as_str(self) -> &'static str {
        match self {
            Endian::Little => "little",
            Endian::Big => "big",
        }
    }

    fn u16(self, bytes: &[u8], at: usize) -> Option<u16> {
        let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u16::from_le_bytes(raw),
            Endian::Big => u16::from_be_bytes(raw),
        })
    }

    fn u32(self, bytes: &[u8], at: usize) -> Option<u32> {
        let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Elf { bits: u32, endian: Endian, machine: u16 },
    Pe { bits: u32, machine: u16 },
    MachO { bits: u32, endian: Endian, cpu: u32 },
    Universal,
    Raw,
}

impl Format {
    fn detect(bytes: &[u8]) -> Self {
        Self::elf(bytes)
            .or_else(|| Self::pe(bytes))
            .or_else(|| Self::macho(bytes))
            .unwrap_or(Format::Raw)
    }

    fn elf(bytes: &[u8]) -> Option<Self> {
        if !bytes.starts_with(b"\x7fELF") {
            return None;
        }
        let bits = match bytes.get(4)? {
            1 => 32,
            2 => 64,
            _ => return None,
        };
        let endian = match bytes.get(5)? {
            1 => Endian::Little,
            2 => Endian::Big,
            _ => return None,
        };
        let machine = endian.u16(bytes, 18)?;
        Some(Format::Elf {
            bits,
            endian,
            machine,
        })
    }

    fn pe(bytes: &[u8]) -> Option<Self> {
        if !bytes.starts_with(b"MZ") {
            return None;
        }
        let pe_offset = Endian::Little.u32(bytes, 0x3c)? as usize;
        if bytes.get(pe_offset..pe_offset + 4)? != b"PE\0\0" {
            return None;
        }
        let machine = Endian::Little.u16(bytes, pe_offset + 4)?;
        let bits = match Endian::Little.u16(bytes, pe_offset + 24)? {
            0x10b => 32,
            0x20b => 64,
            _ => return None,
        };
        Some(Format::Pe { bits, machine })
    }

    fn macho(bytes: &[u8]) -> Option<Self> {
        let magic = Endian::Big.u32(bytes, 0)?;
        let (bits, endian) = match magic {
            0xfeed_face => (32, Endian::Big),
            0xfeed_facf => (64, Endian::Big),
            0xcefa_edfe => (32, Endian::Little),
            0xcffa_edfe => (64, Endian::Little),
            0xcafe_babe | 0xcafe_babf => return Some(Format::Universal),
            _ => return None,
        };
        let cpu = endian.u32(bytes, 4)?;
        Some(Format::MachO { bits, endian, cpu })
    }

    fn name(&self) -> &'static str {
        match self {
            Format::Elf { .. } => "elf",
            Format::Pe { .. } => "pe",
            Format::MachO { .. } => "mach-o",
            Format::Universal => "mach-o-universal",
            Format::Raw => "raw",
        }
    }

    fn architecture(&self) -> String {
        let known = match *self {
            Format::Elf { machine, .. } => match machine {
                0x03 => Some("x86"),
                0x3e => Some("x86_64"),
                0x28 => Some("arm"),
                0xb7 => Some("aarch64"),
                0x08 => Some("mips"),
                0x14 => Some("powerpc"),
                0x15 => Some("powerpc64"),
                0xf3 => Some("riscv"),
                _ => None,
            },
            Format::Pe { machine, .. } => match machine {
                0x014c => Some("x86"),
                0x8664 => Some("x86_64"),
                0x01c0 | 0x01c4 => Some("arm"),
                0xaa64 => Some("aarch64"),
                _ => None,
            },
            Format::MachO { cpu, .. } => match cpu {
                0x0000_0007 => Some("x86"),
                0x0100_0007 => Some("x86_64"),
                0x0000_000c => Some("arm"),
                0x0100_000c => Some("aarch64"),
                0x0000_0012 => Some("powerpc"),
                _ => None,
            },
            Format::Universal | Format::Raw => return "unknown".to_string(),
        };
        match known {
            Some(arch) => arch.to_string(),
            None => match *self {
                Format::Elf { machine, .. } | Format::Pe { machine, .. } => {
                    format!("unknown({machine:#x})")
                }
                Format::MachO { cpu, .. } => format!("unknown({cpu:#x})"),
                _ => "unknown".to_string(),
            },
        }
    }

    fn bits(&self) -> Option<u32> {
        match *self {
            Format::Elf { bits, .. } | Format::Pe { bits, .. } | Format::MachO { bits, .. } => {
                Some(bits)
            }
            Format::Universal | Format::Raw => None,
        }
    }

    fn endianness(&self) -> Option<Endian> {
        match *self {
            Format::Elf { endian, .. } | Format::MachO { endian, .. } => Some(endian),
            Format::Pe { .. } => Some(Endian::Little),
            Format::Universal | Format::Raw => None,
        }
    }
}

struct Image {
    path: PathBuf,
    bytes: Vec<u8>,
    format: Format,
    strings: OnceLock<Arc<Vec<StringInfo>>>,
    closed: AtomicBool,
}

impl Image {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::Acquire) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn scan_strings(&self) -> Arc<Vec<StringInfo>> {
        Arc::new(scan_printable(&self.bytes, MIN_STRING_LEN))
    }
}

impl Database for Image {
    fn summary(&self) -> Result<DatabaseSummary, EngineError> {
        self.ensure_open()?;
        Ok(DatabaseSummary {
            path: self.path.display().to_string(),
            format: self.format.name().to_string(),
            architecture: self.format.architecture(),
            bits: self.format.bits(),
            endianness: self.format.endianness().map(|e| e.as_str().to_string()),
            size: self.bytes.len() as u64,
            sha256: format!("{:x}", Sha256::digest(&self.bytes)),
        })
    }

    fn auto_analyze(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        let strings = self.strings.get_or_init(|| self.scan_strings());
        debug!(path = %self.path.display(), strings = strings.len(), "Auto-analysis finished");
        Ok(())
    }

    fn read_bytes(&self, offset: u64, size: usize) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        let len = self.bytes.len() as u64;
        if offset >= len {
            return Err(EngineError::OutOfRange { offset, size: len });
        }
        let start = offset as usize;
        let end = start.saturating_add(size).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }

    fn strings(&self) -> Result<Arc<Vec<StringInfo>>, EngineError> {
        self.ensure_open()?;
        Ok(self.strings.get_or_init(|| self.scan_strings()).clone())
    }

    fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(EngineError::Closed);
        }
        debug!(path = %self.path.display(), "Closed image");
        Ok(())
    }
}

fn is_printable(b: u8) -> bool {
    b == b'\t' || (0x20..0x7f).contains(&b)
}

/// Collect runs of printable ASCII at least `min_len` bytes long.
fn scan_printable(bytes: &[u8], min_len: usize) -> Vec<StringInfo> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &b) in bytes.iter().chain(std::iter::once(&0u8)).enumerate() {
        if i < bytes.len() && is_printable(b) {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take() {
            if i - s >= min_len {
                let content = String::from_utf8_lossy(&bytes[s..i]).into_owned();
                out.push(StringInfo {
                    address: format!("{:#x}", s),
                    length: content.len(),
                    content,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file
    }

    fn elf64_le_x86_64() -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 2;
        bytes[5] = 1;
        bytes[18..20].copy_from_slice(&0x3eu16.to_le_bytes());
        bytes.extend_from_slice(b"\0hello world\0ab\0");
        bytes
    }

    #[test]
    fn detects_elf_header() {
        let file = write_temp(&elf64_le_x86_64());
        let db = ImageEngine::new().load(file.path()).expect("load");
        let summary = db.summary().expect("summary");
        assert_eq!(summary.format, "elf");
        assert_eq!(summary.architecture, "x86_64");
        assert_eq!(summary.bits, Some(64));
        assert_eq!(summary.endianness.as_deref(), Some("little"));
        assert_eq!(summary.sha256.len(), 64);
    }

    #[test]
    fn detects_pe_header() {
        let mut bytes = vec![0u8; 0x100];
        bytes[..2].copy_from_slice(b"MZ");
        bytes[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
        bytes[0x80..0x84].copy_from_slice(b"PE\0\0");
        bytes[0x84..0x86].copy_from_slice(&0x8664u16.to_le_bytes());
        bytes[0x98..0x9a].copy_from_slice(&0x20bu16.to_le_bytes());
        assert_eq!(
            Format::detect(&bytes),
            Format::Pe {
                bits: 64,
                machine: 0x8664
            }
        );
    }

    #[test]
    fn detects_macho_and_raw() {
        let mut macho = 0xcffa_edfeu32.to_be_bytes().to_vec();
        macho.extend_from_slice(&0x0100_000cu32.to_le_bytes());
        let format = Format::detect(&macho);
        assert_eq!(format.name(), "mach-o");
        assert_eq!(format.architecture(), "aarch64");
        assert_eq!(format.bits(), Some(64));

        assert_eq!(Format::detect(b"just some text"), Format::Raw);
        assert_eq!(Format::detect(b"MZ"), Format::Raw);
    }

    #[test]
    fn scan_finds_runs_at_least_min_len() {
        let strings = scan_printable(b"\0abc\0abcd\x01tail", 4);
        let contents: Vec<_> = strings.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["abcd", "tail"]);
        assert_eq!(strings[0].address, "0x5");
    }

    #[test]
    fn read_bytes_clamps_and_rejects_out_of_range() {
        let file = write_temp(b"0123456789");
        let db = ImageEngine::new().load(file.path()).expect("load");
        assert_eq!(db.read_bytes(8, 16).expect("read"), b"89".to_vec());
        assert_eq!(
            db.read_bytes(10, 1),
            Err(EngineError::OutOfRange {
                offset: 10,
                size: 10
            })
        );
    }

    #[test]
    fn closed_database_rejects_reads() {
        let file = write_temp(b"0123456789");
        let db = ImageEngine::new().load(file.path()).expect("load");
        db.close().expect("first close");
        assert_eq!(db.read_bytes(0, 1), Err(EngineError::Closed));
        assert_eq!(db.close(), Err(EngineError::Closed));
    }

    #[test]
    fn empty_file_fails_to_load() {
        let file = write_temp(b"");
        let err = ImageEngine::new()
            .load(file.path())
            .err()
            .expect("empty file");
        assert!(matches!(err, EngineError::Load { .. }));
    }
}
