//! Database parameter buffer (DPB)
//!
//! Connection parameters are handed to the driver's attach call as a tagged byte buffer:
//! a version byte followed by `tag, length, bytes` triplets.

use super::error::{DatabaseError, Result};

/// DPB format version written as the first byte
pub const DPB_VERSION1: u8 = 1;
/// User name attribute
pub const DPB_USER_NAME: u8 = 28;
/// Password attribute
pub const DPB_PASSWORD: u8 = 29;
/// Connection character set attribute
pub const DPB_LC_CTYPE: u8 = 48;
/// SQL role attribute
pub const DPB_SQL_ROLE_NAME: u8 = 60;

/// Upper bound on the encoded buffer size
pub const MAX_DPB_SIZE: usize = 1024;

/// Append-only attribute buffer for connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBuffer {
    bytes: Vec<u8>,
}

impl AttributeBuffer {
    /// Create a buffer holding only the version byte
    pub fn new() -> Self {
        let mut bytes = Vec::with_capacity(64);
        bytes.push(DPB_VERSION1);
        Self { bytes }
    }

    /// Append a string attribute
    ///
    /// # Errors
    ///
    /// Returns `InvalidUsage` if the value is longer than 255 bytes or the buffer would
    /// exceed [`MAX_DPB_SIZE`].
    pub fn insert(&mut self, tag: u8, value: &str) -> Result<()> {
        let value = value.as_bytes();
        let len = u8::try_from(value.len()).map_err(|_| {
            DatabaseError::invalid_usage(
                "DPB::Insert",
                format!("Attribute {} is too long ({} bytes)", tag, value.len()),
            )
        })?;
        if self.bytes.len() + 2 + value.len() > MAX_DPB_SIZE {
            return Err(DatabaseError::invalid_usage(
                "DPB::Insert",
                "Parameter buffer is full",
            ));
        }

        self.bytes.push(tag);
        self.bytes.push(len);
        self.bytes.extend_from_slice(value);
        Ok(())
    }

    /// Encoded bytes, version byte included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no attribute was inserted yet
    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= 1
    }

    /// Look up the value stored for `tag`
    pub fn get(&self, tag: u8) -> Option<&str> {
        let mut pos = 1;
        while pos + 1 < self.bytes.len() {
            let len = self.bytes[pos + 1] as usize;
            let start = pos + 2;
            let end = (start + len).min(self.bytes.len());
            if self.bytes[pos] == tag {
                return std::str::from_utf8(&self.bytes[start..end]).ok();
            }
            pos = end;
        }
        None
    }
}

impl Default for AttributeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_layout() {
        let mut dpb = AttributeBuffer::new();
        assert!(dpb.is_empty());

        dpb.insert(DPB_USER_NAME, "SYSDBA").unwrap();
        dpb.insert(DPB_PASSWORD, "").unwrap();

        assert_eq!(
            dpb.as_bytes(),
            &[1, 28, 6, b'S', b'Y', b'S', b'D', b'B', b'A', 29, 0]
        );
        assert_eq!(dpb.get(DPB_USER_NAME), Some("SYSDBA"));
        assert_eq!(dpb.get(DPB_PASSWORD), Some(""));
        assert_eq!(dpb.get(DPB_SQL_ROLE_NAME), None);
    }

    #[test]
    fn test_value_too_long() {
        let mut dpb = AttributeBuffer::new();
        let long = "x".repeat(256);
        let err = dpb.insert(DPB_LC_CTYPE, &long).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidUsage { .. }));
        assert!(dpb.is_empty());
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut dpb = AttributeBuffer::new();
        let value = "y".repeat(200);
        for _ in 0..5 {
            dpb.insert(DPB_SQL_ROLE_NAME, &value).unwrap();
        }
        assert!(dpb.insert(DPB_SQL_ROLE_NAME, &value).is_err());
        assert!(dpb.len() <= MAX_DPB_SIZE);
    }
}
