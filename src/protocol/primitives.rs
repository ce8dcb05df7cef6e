// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Primitive building blocks of the wire format.
//!
//! Everything on the wire is big-endian and either fixed-size (bool, int,
//! long, float, double) or length-prefixed by a signed 32-bit count
//! (strings, buffers, vectors).  A negative count encodes `null`.  Composite
//! records serialize by plain concatenation and parse by sequential
//! consumption; there is no tag/length framing inside a record.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ZkError, ZkResult};

fn need(src: &Bytes, wanted: usize, what: &str) -> ZkResult<()> {
    if src.remaining() < wanted {
        return Err(ZkError::Decode(format!(
            "truncated {what}: need {wanted} bytes, have {}",
            src.remaining()
        )));
    }
    Ok(())
}

pub fn put_bool(dst: &mut BytesMut, value: bool) {
    dst.put_u8(u8::from(value));
}

pub fn put_i32(dst: &mut BytesMut, value: i32) {
    dst.put_i32(value);
}

pub fn put_i64(dst: &mut BytesMut, value: i64) {
    dst.put_i64(value);
}

pub fn put_f32(dst: &mut BytesMut, value: f32) {
    dst.put_f32(value);
}

pub fn put_f64(dst: &mut BytesMut, value: f64) {
    dst.put_f64(value);
}

pub fn put_ustring(dst: &mut BytesMut, value: &str) {
    dst.put_i32(value.len() as i32);
    dst.put_slice(value.as_bytes());
}

pub fn put_buffer(dst: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        None => dst.put_i32(-1),
        Some(raw) => {
            dst.put_i32(raw.len() as i32);
            dst.put_slice(raw);
        },
    }
}

pub fn get_bool(src: &mut Bytes) -> ZkResult<bool> {
    need(src, 1, "bool")?;
    Ok(src.get_u8() != 0)
}

pub fn get_i32(src: &mut Bytes) -> ZkResult<i32> {
    need(src, 4, "int")?;
    Ok(src.get_i32())
}

pub fn get_i64(src: &mut Bytes) -> ZkResult<i64> {
    need(src, 8, "long")?;
    Ok(src.get_i64())
}

pub fn get_f32(src: &mut Bytes) -> ZkResult<f32> {
    need(src, 4, "float")?;
    Ok(src.get_f32())
}

pub fn get_f64(src: &mut Bytes) -> ZkResult<f64> {
    need(src, 8, "double")?;
    Ok(src.get_f64())
}

/// Reads a length-prefixed UTF-8 string.  A `-1` length (null) decodes as
/// the empty string.
pub fn get_ustring(src: &mut Bytes) -> ZkResult<String> {
    let len = get_i32(src)?;
    if len < 0 {
        return Ok(String::new());
    }
    let len = len as usize;
    need(src, len, "string")?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| ZkError::Decode(format!("invalid utf-8 in string: {e}")))
}

/// Reads a length-prefixed byte buffer; `-1` decodes as `None`.
pub fn get_buffer(src: &mut Bytes) -> ZkResult<Option<Bytes>> {
    let len = get_i32(src)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    need(src, len, "buffer")?;
    Ok(Some(src.split_to(len)))
}

/// A named, ordered tuple of primitives and/or nested records.
pub trait Record: Sized {
    fn write(&self, dst: &mut BytesMut);
    fn read(src: &mut Bytes) -> ZkResult<Self>;
}

pub fn put_string_vec(dst: &mut BytesMut, values: &[String]) {
    dst.put_i32(values.len() as i32);
    for value in values {
        put_ustring(dst, value);
    }
}

pub fn get_string_vec(src: &mut Bytes) -> ZkResult<Vec<String>> {
    let count = get_i32(src)?;
    if count < 0 {
        return Ok(Vec::new());
    }
    let mut values = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        values.push(get_ustring(src)?);
    }
    Ok(values)
}

pub fn put_records<T: Record>(dst: &mut BytesMut, values: &[T]) {
    dst.put_i32(values.len() as i32);
    for value in values {
        value.write(dst);
    }
}

pub fn get_records<T: Record>(src: &mut Bytes) -> ZkResult<Vec<T>> {
    let count = get_i32(src)?;
    if count < 0 {
        return Ok(Vec::new());
    }
    let mut values = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        values.push(T::read(src)?);
    }
    Ok(values)
}
