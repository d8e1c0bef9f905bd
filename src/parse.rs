use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, SourceQueryError};

/// Borrow `len` bytes at index `offset` from `data`.
///
/// Mutates `offset` to the index after the bytes.
fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = offset.checked_add(len).ok_or_else(SourceQueryError::truncated)?;
    let bytes = data.get(*offset..end).ok_or_else(SourceQueryError::truncated)?;
    *offset = end;
    Ok(bytes)
}

/// Get the value of a null-terminated string
/// with index 0 at `offset` in an array of bytes.
///
/// Mutates `offset` to the index after the null-termination byte.
pub fn get_string(data: &[u8], offset: &mut usize) -> Result<String> {
    let rest = data.get(*offset..).ok_or_else(SourceQueryError::truncated)?;
    let len = rest
        .iter()
        .position(|&c| c == 0)
        .ok_or_else(SourceQueryError::truncated)?;
    let value = std::str::from_utf8(&rest[..len])?.to_string();
    *offset += len + 1;
    Ok(value)
}

/// Get the [u8] at index `offset` from `data`.
///
/// Mutates `offset` to the index after the byte.
pub fn get_u8(data: &[u8], offset: &mut usize) -> Result<u8> {
    Ok(take(data, offset, 1)?[0])
}

/// Get 2 bytes (as a [u16]) at index `offset` from `data`.
///
/// Mutates `offset` to the index after the bytes.
pub fn get_u16(data: &[u8], offset: &mut usize) -> Result<u16> {
    Ok(LittleEndian::read_u16(take(data, offset, 2)?))
}

pub fn get_i32(data: &[u8], offset: &mut usize) -> Result<i32> {
    Ok(LittleEndian::read_i32(take(data, offset, 4)?))
}

pub fn get_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    Ok(LittleEndian::read_u32(take(data, offset, 4)?))
}

pub fn get_f32(data: &[u8], offset: &mut usize) -> Result<f32> {
    Ok(LittleEndian::read_f32(take(data, offset, 4)?))
}

/// Get 8 bytes (as a [u64]) at index `offset` from `data`.
///
/// Mutates `offset` to the index after the bytes.
pub fn get_u64(data: &[u8], offset: &mut usize) -> Result<u64> {
    Ok(LittleEndian::read_u64(take(data, offset, 8)?))
}
