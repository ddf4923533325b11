//! RESP2 codec
//!
//! Encodes commands and parses replies. Callers provide the buffers so a
//! connection can reuse them across calls.

use std::io::BufRead;

use bytes::Bytes;

use super::{Command, ConnError, Reply};

/// Largest bulk string or array we are willing to allocate for (512 MB)
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Encodes a command as a RESP2 array of bulk strings into `out`
pub fn encode_command(command: &Command, out: &mut Vec<u8>) {
    out.push(b'*');
    push_decimal(out, command.len());
    out.extend_from_slice(b"\r\n");
    for arg in command.args() {
        out.push(b'$');
        push_decimal(out, arg.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one reply from the buffered reader
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> Result<Reply, ConnError> {
    read_line(reader, line_buf)?;
    let Some((&tag, rest)) = line_buf.split_first() else {
        return Err(ConnError::Protocol("empty reply line".to_string()));
    };

    match tag {
        b'+' => Ok(Reply::Status(String::from_utf8_lossy(rest).into_owned())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(rest).into_owned())),
        b':' => Ok(Reply::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            read_array(reader, len, line_buf)
        }
        other => Err(ConnError::Protocol(format!(
            "unexpected reply tag 0x{:02x}",
            other
        ))),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> Result<Reply, ConnError> {
    if len < 0 {
        return Ok(Reply::Nil);
    }
    if len > MAX_BULK_LEN {
        return Err(ConnError::Protocol(format!("bulk length {} too large", len)));
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != *b"\r\n" {
        return Err(ConnError::Protocol("bulk string not terminated by CRLF".to_string()));
    }

    Ok(Reply::Bulk(Bytes::from(data)))
}

fn read_array<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> Result<Reply, ConnError> {
    if len < 0 {
        return Ok(Reply::Nil);
    }
    if len > MAX_BULK_LEN {
        return Err(ConnError::Protocol(format!("array length {} too large", len)));
    }

    // Cap the pre-allocation; a hostile length should not reserve gigabytes.
    let mut items = Vec::with_capacity((len as usize).min(1024));
    for _ in 0..len {
        items.push(read_reply(reader, line_buf)?);
    }
    Ok(Reply::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), ConnError> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(ConnError::Closed);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ConnError::Protocol("reply line not terminated by CRLF".to_string()));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> Result<i64, ConnError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| {
            ConnError::Protocol(format!(
                "invalid integer {:?}",
                String::from_utf8_lossy(data)
            ))
        })
}

fn push_decimal(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(value.to_string().as_bytes());
}
