use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors crossing a remote-call boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactError {
    #[error("Interface mismatch: expected {expected}, got {found}")]
    InterfaceMismatch { expected: String, found: String },

    #[error("Frame truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid string at offset {offset}")]
    InvalidString { offset: usize },

    #[error("String of {len} bytes does not fit a frame length prefix")]
    Oversized { len: usize },

    #[error("Null call target")]
    NullTarget,

    #[error("No object reference at offset {offset}")]
    MissingObject { offset: usize },

    #[error("Remote call failed: {0}")]
    Remote(String),
}

/// Something that accepts remote calls.
pub trait CallTarget: Send + Sync {
    /// Handle call `code`. Returns `Ok(false)` when the code is not recognized.
    fn transact(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: Option<&mut Parcel>,
        flags: u32,
    ) -> Result<bool, TransactError>;

    /// Short description used in logs.
    fn describe(&self) -> String {
        "CallTarget".to_string()
    }
}

/// Tag written in place of an object reference.
const OBJECT_TAG: i32 = 0x7362_6F6A;
/// Tag written for a null object reference.
const NULL_TAG: i32 = 0;

/// A call frame: a flat little-endian byte buffer with a read cursor, plus the
/// object references embedded in it.
///
/// Object references are recorded by the byte offset of their tag, so copying
/// a byte range with [`append_from`](Self::append_from) carries the references
/// in that range to the same relative positions.
#[derive(Clone, Default)]
pub struct Parcel {
    data: Vec<u8>,
    position: usize,
    objects: Vec<(usize, Arc<dyn CallTarget>)>,
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn data_position(&self) -> usize {
        self.position
    }

    pub fn set_data_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    /// Bytes left to read.
    pub fn data_avail(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_i32(i32::from(value));
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Length-prefixed UTF-8. `None` is written as length `-1`.
    pub fn write_string(&mut self, value: Option<&str>) -> Result<(), TransactError> {
        match value {
            Some(s) => {
                self.write_i32(length_prefix(s.len())?);
                self.data.extend_from_slice(s.as_bytes());
            }
            None => self.write_i32(-1),
        }
        Ok(())
    }

    pub fn write_interface_token(&mut self, descriptor: &str) -> Result<(), TransactError> {
        self.write_string(Some(descriptor))
    }

    pub fn write_target(&mut self, target: Option<Arc<dyn CallTarget>>) {
        match target {
            Some(target) => {
                self.objects.push((self.data.len(), target));
                self.write_i32(OBJECT_TAG);
            }
            None => self.write_i32(NULL_TAG),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn read_i32(&mut self) -> Result<i32, TransactError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, TransactError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bool(&mut self) -> Result<bool, TransactError> {
        Ok(self.read_i32()? != 0)
    }

    pub fn read_u64(&mut self) -> Result<u64, TransactError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_string(&mut self) -> Result<Option<String>, TransactError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        let offset = self.position;
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| TransactError::InvalidString { offset })
    }

    /// Check the interface token at the cursor.
    pub fn enforce_interface(&mut self, descriptor: &str) -> Result<(), TransactError> {
        let found = self.read_string()?.unwrap_or_default();
        if found != descriptor {
            return Err(TransactError::InterfaceMismatch {
                expected: descriptor.to_string(),
                found,
            });
        }
        Ok(())
    }

    pub fn read_target(&mut self) -> Result<Option<Arc<dyn CallTarget>>, TransactError> {
        let offset = self.position;
        if self.read_i32()? == NULL_TAG {
            return Ok(None);
        }
        self.objects
            .iter()
            .find(|(at, _)| *at == offset)
            .map(|(_, target)| Some(Arc::clone(target)))
            .ok_or(TransactError::MissingObject { offset })
    }

    /// Append `len` bytes of `source` starting at `offset`, with the object
    /// references that fall inside that range.
    pub fn append_from(
        &mut self,
        source: &Parcel,
        offset: usize,
        len: usize,
    ) -> Result<(), TransactError> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= source.data.len())
            .ok_or(TransactError::Truncated {
                offset,
                needed: len,
                available: source.data.len().saturating_sub(offset),
            })?;

        let base = self.data.len();
        self.data.extend_from_slice(&source.data[offset..end]);
        for (at, target) in &source.objects {
            if (offset..end).contains(at) {
                self.objects.push((base + (at - offset), Arc::clone(target)));
            }
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&[u8], TransactError> {
        let available = self.data_avail();
        if len > available {
            return Err(TransactError::Truncated {
                offset: self.position,
                needed: len,
                available,
            });
        }
        let start = self.position;
        self.position += len;
        Ok(&self.data[start..start + len])
    }
}

fn length_prefix(len: usize) -> Result<i32, TransactError> {
    i32::try_from(len).map_err(|_| TransactError::Oversized { len })
}

impl fmt::Debug for Parcel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parcel")
            .field("size", &self.data.len())
            .field("position", &self.position)
            .field("objects", &self.objects.len())
            .finish()
    }
}
