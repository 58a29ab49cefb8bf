//! Server-to-client message grammars.
//!
//! One parser per tag over the frame body, same discipline as the
//! frontend. DataRow is absent here: its streaming walk lives with the
//! decoder because it is the one message that may pull more bytes from
//! the wire mid-frame.

use crate::codec::ByteReader;
use crate::error::DecodeError;

/// The server tag alphabet.
pub const TAGS: &[u8] = b"123ACDEGHIKNRSTVWZcdnstv";

/// SQLSTATE that keeps a FATAL/PANIC ErrorResponse from ending the
/// session: feature-not-supported, which servers raise on optional
/// functionality without dropping the connection.
const SQLSTATE_BENIGN: &str = "0A000";

/// A parsed backend frame: the capture detail plus whether the frame is a
/// session-fatal error report.
pub struct BackendFrame {
    pub detail: Option<String>,
    pub fatal: bool,
}

impl BackendFrame {
    fn detail(detail: String) -> Self {
        Self {
            detail: Some(detail),
            fatal: false,
        }
    }

    fn empty() -> Self {
        Self {
            detail: None,
            fatal: false,
        }
    }
}

/// Parse one tagged server frame body (every tag except DataRow).
pub fn parse(tag: u8, body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let result = match tag {
        b'A' => notification(body),
        b'C' => command_complete(body),
        b'E' => error_response(body),
        b'G' | b'H' | b'W' => copy_response(body),
        b'K' => backend_key_data(body),
        b'N' => notice_response(body),
        b'R' => authentication(body),
        b'S' => parameter_status(body),
        b'T' => row_description(body),
        b'V' => function_call_response(body),
        b'Z' => ready_for_query(body),
        b'd' => copy_data(body),
        b't' => parameter_description(body),
        b'v' => negotiate_protocol_version(body),
        // ParseComplete, BindComplete, CloseComplete, EmptyQueryResponse,
        // NoData, PortalSuspended and CopyDone carry nothing.
        b'1' | b'2' | b'3' | b'I' | b'n' | b's' | b'c' => Ok(BackendFrame::empty()),
        _ => unreachable!("tag {tag} is not in the backend alphabet"),
    };

    result.map_err(|e| match e {
        DecodeError::Truncated => {
            DecodeError::malformed(tag, "declared length inconsistent with body")
        }
        other => other,
    })
}

fn notification(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let pid = r.read_i32()?;
    let channel = r.read_cstr()?;
    let payload = r.read_cstr()?;
    Ok(BackendFrame::detail(format!(
        "pid={pid} channel={channel} payload={payload}"
    )))
}

fn command_complete(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let command = r.read_cstr()?;
    Ok(BackendFrame::detail(format!("command={command}")))
}

/// Field list shared by ErrorResponse and NoticeResponse: one-byte field
/// code plus null-terminated value, terminated by a zero code byte.
fn fields(body: &[u8]) -> Result<Vec<(u8, String)>, DecodeError> {
    let mut r = ByteReader::new(body);
    let mut fields = Vec::new();
    loop {
        let code = r.read_u8()?;
        if code == 0 {
            break;
        }
        fields.push((code, r.read_cstr()?));
    }
    Ok(fields)
}

fn render_fields(fields: &[(u8, String)]) -> String {
    fields
        .iter()
        .map(|(code, value)| format!("{}={value}", *code as char))
        .collect::<Vec<_>>()
        .join(" ")
}

fn error_response(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let fields = fields(body)?;

    let field = |code: u8| {
        fields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    };

    let severity = field(b'S').or_else(|| field(b'V')).unwrap_or("");
    let sqlstate = field(b'C').unwrap_or("");

    let fatal = matches!(severity, "FATAL" | "PANIC") && sqlstate != SQLSTATE_BENIGN;

    Ok(BackendFrame {
        detail: Some(render_fields(&fields)),
        fatal,
    })
}

fn notice_response(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let fields = fields(body)?;
    Ok(BackendFrame::detail(render_fields(&fields)))
}

fn copy_response(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let format = r.read_u8()?;
    let columns = r.read_i16()?;
    r.skip(columns.max(0) as usize * 2)?;
    Ok(BackendFrame::detail(format!(
        "format={format} columns={columns}"
    )))
}

fn backend_key_data(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let process = r.read_i32()?;
    let secret = r.read_i32()?;
    Ok(BackendFrame::detail(format!(
        "process={process} secret={secret}"
    )))
}

fn authentication(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let code = r.read_i32()?;

    let detail = match code {
        0 => "success".to_string(),
        2 => "kerberos5".to_string(),
        3 => "cleartext-password".to_string(),
        5 => {
            let salt = r.read_bytes(4)?;
            format!(
                "md5-password salt={:02x}{:02x}{:02x}{:02x}",
                salt[0], salt[1], salt[2], salt[3]
            )
        }
        6 => "scm-credential".to_string(),
        7 => "gss".to_string(),
        8 => "gss-continue".to_string(),
        9 => "sspi".to_string(),
        10 => {
            // Mechanism names until the empty-string terminator.
            let mut mechanisms = Vec::new();
            while r.remaining() > 0 {
                let name = r.read_cstr()?;
                if name.is_empty() {
                    break;
                }
                mechanisms.push(name);
            }
            format!("sasl {}", mechanisms.join(" "))
        }
        11 => format!("sasl-continue bytes={}", r.remaining()),
        12 => format!("sasl-final bytes={}", r.remaining()),
        other => format!("code={other}"),
    };

    Ok(BackendFrame::detail(detail))
}

fn parameter_status(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let name = r.read_cstr()?;
    let value = r.read_cstr()?;
    Ok(BackendFrame::detail(format!("name={name} value={value}")))
}

fn row_description(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let count = r.read_i16()?;

    let mut parts = vec![format!("fields={count}")];
    for _ in 0..count.max(0) {
        let name = r.read_cstr()?;
        let table = r.read_i32()?;
        let attr = r.read_i16()?;
        let type_oid = r.read_i32()?;
        let type_len = r.read_i16()?;
        let type_mod = r.read_i32()?;
        let format = r.read_i16()?;
        parts.push(format!(
            "[{name} table={table} attr={attr} type={type_oid} len={type_len} mod={type_mod} fmt={format}]"
        ));
    }

    Ok(BackendFrame::detail(parts.join(" ")))
}

fn function_call_response(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let len = r.read_i32()?;
    let detail = if len < 0 {
        "null".to_string()
    } else {
        format!("bytes={len}")
    };
    Ok(BackendFrame::detail(detail))
}

fn ready_for_query(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let status = r.read_u8()?;
    Ok(BackendFrame::detail(format!("status={}", status as char)))
}

fn copy_data(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    Ok(BackendFrame::detail(format!("bytes={}", body.len())))
}

fn parameter_description(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let count = r.read_i16()?;
    let mut detail = format!("parameters={count}");
    if count > 0 {
        let mut oids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            oids.push(r.read_i32()?.to_string());
        }
        detail.push_str(" types=");
        detail.push_str(&oids.join(" "));
    }
    Ok(BackendFrame::detail(detail))
}

fn negotiate_protocol_version(body: &[u8]) -> Result<BackendFrame, DecodeError> {
    let mut r = ByteReader::new(body);
    let minor = r.read_i32()?;
    let count = r.read_i32()?;
    let mut parts = vec![format!("minor={minor} unsupported={count}")];
    for _ in 0..count.max(0) {
        parts.push(r.read_cstr()?);
    }
    Ok(BackendFrame::detail(parts.join(" ")))
}
