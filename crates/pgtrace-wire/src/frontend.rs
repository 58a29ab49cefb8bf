//! Client-to-server message grammars.
//!
//! One parser per tag, operating on the frame body (the bytes after the
//! tag and length). Parsers only produce the capture detail string; field
//! semantics never influence forwarding.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::DecodeError;

/// Startup request codes carried by the untagged frame.
pub const REQUEST_V3: i32 = 196608;
pub const REQUEST_CANCEL: i32 = 80877102;
pub const REQUEST_SSL: i32 = 80877103;
pub const REQUEST_GSS: i32 = 80877104;
pub const REQUEST_V2: i32 = 131072;

/// The client tag alphabet.
pub const TAGS: &[u8] = b"BCDEFHPQSXcdfp";

/// Parse one tagged client frame body into its capture detail.
///
/// The caller has already established the whole-frame guard, so any
/// `Truncated` from the cursor means the declared length lies about the
/// body and is reported as a malformed frame.
pub fn parse(tag: u8, body: &[u8]) -> Result<Option<String>, DecodeError> {
    let result = match tag {
        b'B' => bind(body),
        b'C' => close(body),
        b'D' => describe(body),
        b'E' => execute(body),
        b'F' => function_call(body),
        b'P' => prepare(body),
        b'Q' => query(body),
        b'd' => copy_data(body),
        b'f' => copy_fail(body),
        b'p' => password(body),
        // Flush, Sync, Terminate and CopyDone have no payload worth
        // reporting.
        b'H' | b'S' | b'X' | b'c' => Ok(None),
        _ => unreachable!("tag {tag} is not in the frontend alphabet"),
    };

    result.map_err(|e| match e {
        DecodeError::Truncated => {
            DecodeError::malformed(tag, "declared length inconsistent with body")
        }
        other => other,
    })
}

fn bind(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let portal = r.read_cstr()?;
    let statement = r.read_cstr()?;

    let formats = r.read_i16()?;
    r.skip(formats.max(0) as usize * 2)?;

    let parameters = r.read_i16()?;
    for _ in 0..parameters.max(0) {
        let len = r.read_i32()?;
        if len > 0 {
            r.skip(len as usize)?;
        }
    }

    Ok(Some(format!(
        "portal={portal} statement={statement} formats={formats} parameters={parameters}"
    )))
}

fn close(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let kind = r.read_u8()?;
    let name = r.read_cstr()?;
    Ok(Some(format!("kind={} name={name}", kind as char)))
}

fn describe(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let kind = r.read_u8()?;
    let name = r.read_cstr()?;
    Ok(Some(format!("kind={} name={name}", kind as char)))
}

fn execute(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let portal = r.read_cstr()?;
    let rows = r.read_i32()?;
    Ok(Some(format!("portal={portal} rows={rows}")))
}

fn function_call(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let oid = r.read_i32()?;

    let formats = r.read_i16()?;
    r.skip(formats.max(0) as usize * 2)?;

    let arguments = r.read_i16()?;
    for _ in 0..arguments.max(0) {
        let len = r.read_i32()?;
        if len > 0 {
            r.skip(len as usize)?;
        }
    }

    Ok(Some(format!("oid={oid} arguments={arguments}")))
}

fn prepare(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let statement = r.read_cstr()?;
    let query = r.read_cstr()?;
    let types = r.read_i16()?;
    Ok(Some(format!("statement={statement} types={types} query={query}")))
}

fn query(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let query = r.read_cstr()?;
    Ok(Some(format!("query={query}")))
}

fn copy_data(body: &[u8]) -> Result<Option<String>, DecodeError> {
    Ok(Some(format!("bytes={}", body.len())))
}

fn copy_fail(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let message = r.read_cstr()?;
    Ok(Some(format!("message={message}")))
}

fn password(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut r = ByteReader::new(body);
    let data = r.read_cstr()?;
    Ok(Some(format!("data={data}")))
}

/// Old-style error reply refusing a protocol 1/2 startup: the tag byte
/// followed by a null-terminated text, no length word.
pub(crate) fn legacy_refusal() -> bytes::Bytes {
    let mut w = ByteWriter::new();
    w.write_u8(b'E')
        .write_str("connection refused: protocol version not supported")
        .write_u8(0);
    w.freeze()
}

/// The empty terminator sent after the refusal.
pub(crate) fn empty_terminator() -> bytes::Bytes {
    let mut w = ByteWriter::new();
    w.write_u8(0);
    w.freeze()
}
