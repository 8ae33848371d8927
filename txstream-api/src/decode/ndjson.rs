use super::DecodeError;
use crate::record::Record;

/// Splits `buffer` into complete newline-terminated documents.
///
/// Returns the decoded records and the unterminated tail, which the caller
/// keeps until more bytes arrive. Blank lines are skipped.
pub fn decode_ndjson(buffer: &[u8]) -> Result<(Vec<Record>, &[u8]), DecodeError> {
    let mut records = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = buffer[cursor..].iter().position(|b| *b == b'\n') {
        let line = &buffer[cursor..cursor + offset];
        cursor += offset + 1;
        if let Some(record) = parse_line(line)? {
            records.push(record);
        }
    }
    Ok((records, &buffer[cursor..]))
}

pub(super) fn parse_line(line: &[u8]) -> Result<Option<Record>, DecodeError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice(line) {
        Ok(value) => Ok(Some(Record::Json(value))),
        Err(err) => Err(DecodeError::InvalidJson {
            line: String::from_utf8_lossy(line).into_owned(),
            message: err.to_string(),
        }),
    }
}
