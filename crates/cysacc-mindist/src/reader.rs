//! Transparent opening of plain, gzip and bzip2 distance files.
//!
//! The format is detected from magic bytes, not from the file extension:
//! - gzip (`1F 8B`) is decoded in-process with `flate2`
//! - bzip2 (`BZh`) is decoded by an external `bzip2 -dc` child
//! - anything else is read as plain text

use crate::error::{MindistError, Result};
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

/// Compression formats recognised on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Plain,
    Gzip,
    Bzip2,
}

/// Detect the encoding from the leading bytes of a file.
pub fn detect_encoding(magic: &[u8]) -> Encoding {
    if magic.len() >= 2 && magic[..2] == [0x1F, 0x8B] {
        Encoding::Gzip
    } else if magic.len() >= 3 && &magic[..3] == b"BZh" {
        Encoding::Bzip2
    } else {
        Encoding::Plain
    }
}

/// Options for [`open_distance_file_with`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Program used to decode bzip2 streams
    pub bzip2: PathBuf,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            bzip2: PathBuf::from("bzip2"),
        }
    }
}

/// Open a distance file, decompressing transparently.
pub fn open_distance_file(path: &Path) -> Result<Box<dyn BufRead>> {
    open_distance_file_with(path, &ReaderOptions::default())
}

/// Open a distance file with explicit decoder settings.
pub fn open_distance_file_with(path: &Path, options: &ReaderOptions) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| MindistError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let encoding = detect_encoding(reader.fill_buf().map_err(|e| MindistError::io(path, e))?);
    log::debug!("{}: detected {:?} encoding", path.display(), encoding);

    match encoding {
        Encoding::Plain => Ok(Box::new(reader)),
        Encoding::Gzip => Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader)))),
        Encoding::Bzip2 => {
            drop(reader);
            let child = ChildReader::spawn(&options.bzip2, path)?;
            Ok(Box::new(BufReader::new(child)))
        }
    }
}

/// Reads the stdout of a decoder child and reaps it at end of stream.
///
/// A non-zero exit status surfaces as an I/O error on the final read.
struct ChildReader {
    child: Child,
    stdout: Option<ChildStdout>,
    program: PathBuf,
}

impl ChildReader {
    fn spawn(program: &Path, path: &Path) -> Result<Self> {
        let mut child = Command::new(program)
            .arg("-dc")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MindistError::Decompress {
                path: path.to_path_buf(),
                message: format!("failed to launch {}: {}", program.display(), e),
            })?;
        let stdout = child.stdout.take();
        Ok(Self {
            child,
            stdout,
            program: program.to_path_buf(),
        })
    }

    fn finish(&mut self) -> io::Result<()> {
        self.stdout = None;
        let mut stderr = String::new();
        if let Some(mut err) = self.child.stderr.take() {
            err.read_to_string(&mut stderr)?;
        }
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} exited with {}: {}", self.program.display(), status, stderr.trim()),
            ))
        }
    }
}

impl Read for ChildReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf)?,
            None => return Ok(0),
        };
        if n == 0 && !buf.is_empty() {
            self.finish()?;
        }
        Ok(n)
    }
}

impl Drop for ChildReader {
    fn drop(&mut self) {
        if self.stdout.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_detect_encoding() {
        assert_eq!(detect_encoding(&[0x1F, 0x8B, 0x08]), Encoding::Gzip);
        assert_eq!(detect_encoding(b"BZh91AY"), Encoding::Bzip2);
        assert_eq!(detect_encoding(b"t: 0 1 SOL"), Encoding::Plain);
        assert_eq!(detect_encoding(&[]), Encoding::Plain);
    }

    #[test]
    fn test_open_plain_and_gzip() {
        let tmp = TempDir::new().unwrap();
        let text = "t: 0  12 SOL 345 OW  0.45 (nm)\n";

        let plain = tmp.path().join("plain.txt");
        std::fs::write(&plain, text).unwrap();

        let gz = tmp.path().join("series.txt.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        std::fs::write(&gz, enc.finish().unwrap()).unwrap();

        for path in [&plain, &gz] {
            let mut s = String::new();
            open_distance_file(path).unwrap().read_to_string(&mut s).unwrap();
            assert_eq!(s, text);
        }
    }

    #[test]
    fn test_open_missing_file_names_path() {
        let err = match open_distance_file(Path::new("/nonexistent/Cys1_OW_dist.txt.gz")) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.to_string().contains("Cys1_OW_dist"));
    }
}
