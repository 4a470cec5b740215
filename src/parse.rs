use byteorder::{ByteOrder, LittleEndian};

use crate::error::GameServerError;

/// Borrow `len` bytes at index `offset` from `data`.
///
/// Mutates `offset` to the index after the bytes.
fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], GameServerError> {
    let end: usize = offset.checked_add(len).ok_or(GameServerError::UnexpectedEnd)?;
    let bytes: &[u8] = data.get(*offset..end).ok_or(GameServerError::UnexpectedEnd)?;
    *offset = end;
    Ok(bytes)
}

/// Get the value of a null-terminated string
/// with index 0 at `offset` in an array of bytes.
///
/// Invalid UTF-8 is replaced rather than rejected, player names are not
/// guaranteed to be valid.
///
/// Mutates `offset` to the index after the null-termination byte.
pub fn get_string(data: &[u8], offset: &mut usize) -> Result<String, GameServerError> {
    let rest: &[u8] = data.get(*offset..).ok_or(GameServerError::UnexpectedEnd)?;
    let len: usize = rest
        .iter()
        .position(|c| *c == 0)
        .ok_or(GameServerError::UnexpectedEnd)?;
    let value: String = String::from_utf8_lossy(&rest[..len]).into_owned();
    *offset += len + 1;
    Ok(value)
}

/// Get the [u8] at index `offset` from `data`.
///
/// Mutates `offset` to the index after the byte.
pub fn get_u8(data: &[u8], offset: &mut usize) -> Result<u8, GameServerError> {
    Ok(take(data, offset, 1)?[0])
}

/// Get 2 little endian bytes (as a [u16]) at index `offset` from `data`.
///
/// Mutates `offset` to the index after the bytes.
pub fn get_u16(data: &[u8], offset: &mut usize) -> Result<u16, GameServerError> {
    Ok(LittleEndian::read_u16(take(data, offset, 2)?))
}

/// Get 4 little endian bytes (as an [i32]) at index `offset` from `data`.
///
/// Mutates `offset` to the index after the bytes.
pub fn get_i32(data: &[u8], offset: &mut usize) -> Result<i32, GameServerError> {
    Ok(LittleEndian::read_i32(take(data, offset, 4)?))
}

/// Get 4 little endian bytes (as an [f32]) at index `offset` from `data`.
///
/// Mutates `offset` to the index after the bytes.
pub fn get_f32(data: &[u8], offset: &mut usize) -> Result<f32, GameServerError> {
    Ok(LittleEndian::read_f32(take(data, offset, 4)?))
}
