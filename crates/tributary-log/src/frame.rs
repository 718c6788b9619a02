//! Entry framing
//!
//! Format: [offset: i64][key_len: i32][key][value_len: i32][value], all
//! big-endian. A length of -1 encodes an absent key or a tombstone value.

use std::io::{self, Write};

const ABSENT: i32 = -1;

pub(crate) struct Entry {
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

pub(crate) fn write_entry<W: Write>(
    w: &mut W,
    offset: i64,
    key: Option<&[u8]>,
    value: Option<&[u8]>,
) -> io::Result<()> {
    w.write_all(&offset.to_be_bytes())?;
    write_bytes(w, key)?;
    write_bytes(w, value)
}

fn write_bytes<W: Write>(w: &mut W, bytes: Option<&[u8]>) -> io::Result<()> {
    match bytes {
        Some(b) => {
            let len = i32::try_from(b.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "entry too large"))?;
            w.write_all(&len.to_be_bytes())?;
            w.write_all(b)
        }
        None => w.write_all(&ABSENT.to_be_bytes()),
    }
}

/// Decode one entry from the front of `buf`
///
/// Returns the entry and the number of bytes consumed, or `None` if `buf`
/// ends inside an entry (a concurrent append still in flight).
pub(crate) fn read_entry(buf: &[u8]) -> io::Result<Option<(Entry, usize)>> {
    let mut pos = 0;
    let Some(offset) = take_i64(buf, &mut pos) else {
        return Ok(None);
    };
    let Some(key) = take_bytes(buf, &mut pos)? else {
        return Ok(None);
    };
    let Some(value) = take_bytes(buf, &mut pos)? else {
        return Ok(None);
    };
    Ok(Some((Entry { offset, key, value }, pos)))
}

fn take_i64(buf: &[u8], pos: &mut usize) -> Option<i64> {
    let bytes: [u8; 8] = buf.get(*pos..*pos + 8)?.try_into().ok()?;
    *pos += 8;
    Some(i64::from_be_bytes(bytes))
}

/// `Ok(None)` means incomplete; `Ok(Some(None))` is an absent field
#[allow(clippy::type_complexity)]
fn take_bytes(buf: &[u8], pos: &mut usize) -> io::Result<Option<Option<Vec<u8>>>> {
    let Some(len_bytes) = buf.get(*pos..*pos + 4) else {
        return Ok(None);
    };
    let len = i32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    if len == ABSENT {
        *pos += 4;
        return Ok(Some(None));
    }
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("corrupt entry length {}", len),
        ));
    }
    let start = *pos + 4;
    let Some(data) = buf.get(start..start + len as usize) else {
        return Ok(None);
    };
    *pos = start + len as usize;
    Ok(Some(Some(data.to_vec())))
}
