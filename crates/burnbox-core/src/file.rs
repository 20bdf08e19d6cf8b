//! File message framing
//!
//! Stored layout: `!!FILE!!` followed by the sealed blob. Once opened the blob
//! reads `file_name!!content_type!!\n` followed by the raw file bytes. The
//! marker stays outside the ciphertext so a record can be classified without
//! the pin.
//!
//! Parsing relies on validation: a file name or content type can never carry
//! the `!!` delimiter, a newline or any other control character.

use crate::error::{Error, Result};

/// Unencrypted marker prefixed to file messages
pub const FILE_MARKER: &[u8] = b"!!FILE!!";

/// Separator between header fields
pub const FIELD_DELIMITER: &str = "!!";

/// How far past the marker the header terminator is searched for
pub const HEADER_SCAN_LIMIT: usize = 4096;

/// Maximum file name length in bytes
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Metadata recovered from a decrypted file message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    /// Original file name
    pub file_name: String,
    /// Declared content type
    pub content_type: String,
    /// Offset of the first payload byte
    pub data_offset: usize,
}

/// Check for the file marker on raw or decrypted data
pub fn is_file_message(data: &[u8]) -> bool {
    data.len() > FILE_MARKER.len() && data.starts_with(FILE_MARKER)
}

/// Parse the header of a decrypted file message.
///
/// Returns `None` when the marker is missing, no newline appears within
/// [`HEADER_SCAN_LIMIT`] bytes, or fewer than two fields are present.
pub fn parse_file_header(data: &[u8]) -> Option<FileHeader> {
    if !is_file_message(data) {
        return None;
    }

    let start = FILE_MARKER.len();
    let scan_end = data.len().min(start + HEADER_SCAN_LIMIT);
    let header_end = start + data[start..scan_end].iter().position(|&b| b == b'\n')?;

    let header = std::str::from_utf8(&data[start..header_end]).ok()?;
    let mut fields = header.split(FIELD_DELIMITER);
    let file_name = fields.next()?;
    let content_type = fields.next()?;

    Some(FileHeader {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        data_offset: header_end + 1,
    })
}

/// Build the plaintext header placed in front of the file bytes
pub fn encode_file_header(file_name: &str, content_type: &str) -> Vec<u8> {
    format!("{file_name}{FIELD_DELIMITER}{content_type}{FIELD_DELIMITER}\n").into_bytes()
}

/// Reject names that could break parsing or escape a download directory
pub fn validate_file_name(file_name: &str) -> Result<()> {
    let invalid = file_name.is_empty()
        || file_name.len() > MAX_FILE_NAME_LEN
        || file_name.contains(FIELD_DELIMITER)
        || file_name.contains("..")
        || file_name.contains(['/', '\\'])
        || file_name.chars().any(char::is_control);

    if invalid {
        return Err(Error::BadFileName);
    }
    Ok(())
}

/// Reject content types that could break header parsing
pub fn validate_content_type(content_type: &str) -> Result<()> {
    if content_type.contains(FIELD_DELIMITER) || content_type.chars().any(char::is_control) {
        return Err(Error::BadContentType);
    }
    Ok(())
}
