//! EEPROM emulation backed by a file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use loadcell_core::RecordStorage;
use log::{debug, info};

/// Size of the emulated part when the file does not exist yet.
pub const DEFAULT_EEPROM_SIZE: usize = 64;

/// Value of an erased EEPROM cell.
const ERASED: u8 = 0xFF;

/// The whole EEPROM image lives in memory and is flushed to `path` after
/// every write.
pub struct FileEeprom {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileEeprom {
    /// Open the image at `path`, or start from an erased one of `size` bytes.
    /// A shorter file is padded with erased cells.
    pub fn open(path: impl Into<PathBuf>, size: usize) -> io::Result<Self> {
        let path = path.into();
        let mut image = match fs::read(&path) {
            Ok(bytes) => {
                info!("Loaded EEPROM image {} ({} bytes)", path.display(), bytes.len());
                bytes
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No EEPROM image at {}, starting erased", path.display());
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        if image.len() < size {
            image.resize(size, ERASED);
        }
        Ok(Self { path, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    fn range(&self, offset: usize, len: usize) -> io::Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.image.len() => Ok(offset..end),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "access {}..{} outside {} byte EEPROM",
                    offset,
                    offset.saturating_add(len),
                    self.image.len()
                ),
            )),
        }
    }
}

impl RecordStorage for FileEeprom {
    type Error = io::Error;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.image[range]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, data.len())?;
        self.image[range].copy_from_slice(data);
        fs::write(&self.path, &self.image)?;
        debug!("Wrote {} bytes at {} to {}", data.len(), offset, self.path.display());
        Ok(())
    }
}
