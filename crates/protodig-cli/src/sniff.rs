//! Cheap checks deciding whether a file found during a directory walk is
//! worth scanning.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Files larger than this are never scanned
pub(crate) const MAX_INPUT_SIZE: u64 = 500 * 1024 * 1024;

/// Files smaller than this are skipped during a directory walk
pub(crate) const MIN_INPUT_SIZE: u64 = 1024;

/// Extensions of files that are certainly not compiled programs
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "yaml", "yml", "xml", "html", "css", "js", "ts", "py", "rb", "go", "rs",
    "c", "h", "cpp", "hpp", "java", "proto", "toml", "ini", "cfg", "conf", "log", "csv", "svg",
    "png", "jpg", "jpeg", "gif", "pdf", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "sh",
    "bash", "zsh", "fish", "ps1", "bat", "cmd",
];

/// Executable container formats recognized by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryFormat {
    Elf,
    MachO,
    /// Fat Mach-O holding several architectures
    Universal,
    Pe,
}

impl BinaryFormat {
    pub(crate) fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match magic {
            [0x7F, b'E', b'L', b'F'] => Some(Self::Elf),
            [0xCF | 0xCE, 0xFA, 0xED, 0xFE] | [0xFE, 0xED, 0xFA, 0xCF | 0xCE] => Some(Self::MachO),
            [0xCA, 0xFE, 0xBA, 0xBE] => Some(Self::Universal),
            [b'M', b'Z', _, _] => Some(Self::Pe),
            _ => None,
        }
    }
}

/// Reads the first four bytes of `path` and matches them against known formats
pub(crate) fn detect_format(path: &Path) -> io::Result<Option<BinaryFormat>> {
    let mut magic = [0u8; 4];
    match File::open(path)?.read_exact(&mut magic) {
        Ok(()) => Ok(BinaryFormat::from_magic(magic)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Heuristic used for directory walks.
///
/// Known text extensions and files outside the size bounds are skipped.
/// Otherwise a recognized executable header wins; an unrecognized file is
/// still scanned if it has no extension.
pub(crate) fn is_likely_binary(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return false;
        }
    }

    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !(MIN_INPUT_SIZE..=MAX_INPUT_SIZE).contains(&metadata.len()) {
        return false;
    }

    match detect_format(path) {
        Ok(Some(_)) => true,
        _ => path.extension().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn padded(header: &[u8]) -> Vec<u8> {
        let mut data = header.to_vec();
        data.resize(2048, 0);
        data
    }

    #[test]
    fn test_from_magic() {
        assert_eq!(
            BinaryFormat::from_magic([0x7F, b'E', b'L', b'F']),
            Some(BinaryFormat::Elf)
        );
        assert_eq!(
            BinaryFormat::from_magic([0xCF, 0xFA, 0xED, 0xFE]),
            Some(BinaryFormat::MachO)
        );
        assert_eq!(
            BinaryFormat::from_magic([0xFE, 0xED, 0xFA, 0xCE]),
            Some(BinaryFormat::MachO)
        );
        assert_eq!(
            BinaryFormat::from_magic([0xCA, 0xFE, 0xBA, 0xBE]),
            Some(BinaryFormat::Universal)
        );
        assert_eq!(
            BinaryFormat::from_magic([b'M', b'Z', 0x90, 0x00]),
            Some(BinaryFormat::Pe)
        );
        assert_eq!(BinaryFormat::from_magic(*b"#!/b"), None);
    }

    #[test]
    fn test_text_extensions_are_skipped() {
        assert!(!is_likely_binary(Path::new("/tmp/test.txt")));
        assert!(!is_likely_binary(Path::new("/tmp/test.JSON")));
        assert!(!is_likely_binary(Path::new("/tmp/test.proto")));
    }

    #[test]
    fn test_detects_headers() {
        let dir = TempDir::new().unwrap();

        let elf = dir.path().join("server.bin");
        std::fs::write(&elf, padded(&[0x7F, b'E', b'L', b'F'])).unwrap();
        assert!(is_likely_binary(&elf));

        let unknown_ext = dir.path().join("data.bin");
        std::fs::write(&unknown_ext, padded(b"????")).unwrap();
        assert!(!is_likely_binary(&unknown_ext));

        let no_ext = dir.path().join("tool");
        std::fs::write(&no_ext, padded(b"????")).unwrap();
        assert!(is_likely_binary(&no_ext));
    }

    #[test]
    fn test_small_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let tiny = dir.path().join("tiny");
        std::fs::write(&tiny, [0x7F, b'E', b'L', b'F']).unwrap();
        assert!(!is_likely_binary(&tiny));
    }

    #[test]
    fn test_detect_format_short_file() {
        let dir = TempDir::new().unwrap();
        let short = dir.path().join("short");
        std::fs::write(&short, b"MZ").unwrap();
        assert_eq!(detect_format(&short).unwrap(), None);
    }
}
