//! Fixed-width numeric arrays and auxiliary per-document scoring keys.
//!
//! Arrays are written as `[count: u32][count x element]`, big-endian, so
//! they can be embedded at any offset of a larger buffer and read back
//! without knowing their length in advance.

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WordShardError};

/// A numeric array element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

/// On-disk element type of a packed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int16,
    Int32,
    Int64,
    UInt32,
    Float32,
    Float64,
}

impl ValueKind {
    /// Bytes per element.
    pub fn width(&self) -> usize {
        match self {
            ValueKind::Int16 => 2,
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float32 => 4,
            ValueKind::Int64 | ValueKind::Float64 => 8,
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, ValueKind::Float32 | ValueKind::Float64)
    }
}

const COUNT_LEN: usize = 4;

/// Pack `values` as an array of `kind`.
pub fn pack_values(values: &[Value], kind: ValueKind) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(COUNT_LEN + values.len() * kind.width());
    pack_values_into(values, kind, &mut out)?;
    Ok(out)
}

/// Append a packed array to `out`. On error `out` is unchanged.
pub fn pack_values_into(values: &[Value], kind: ValueKind, out: &mut Vec<u8>) -> Result<()> {
    let count = u32::try_from(values.len()).map_err(|_| {
        WordShardError::invalid_argument(format!("cannot pack {} values", values.len()))
    })?;

    let start = out.len();
    let written = write_values(values, kind, count, out);
    if written.is_err() {
        out.truncate(start);
    }
    written
}

fn write_values(values: &[Value], kind: ValueKind, count: u32, out: &mut Vec<u8>) -> Result<()> {
    out.write_u32::<BigEndian>(count)?;
    for (i, value) in values.iter().enumerate() {
        match (*value, kind) {
            (Value::Int(v), ValueKind::Int16) => out.write_i16::<BigEndian>(narrow(v, i, kind)?)?,
            (Value::Int(v), ValueKind::Int32) => out.write_i32::<BigEndian>(narrow(v, i, kind)?)?,
            (Value::Int(v), ValueKind::Int64) => out.write_i64::<BigEndian>(v)?,
            (Value::Int(v), ValueKind::UInt32) => out.write_u32::<BigEndian>(narrow(v, i, kind)?)?,
            (Value::Int(v), ValueKind::Float32) => out.write_f32::<BigEndian>(v as f32)?,
            (Value::Int(v), ValueKind::Float64) => out.write_f64::<BigEndian>(v as f64)?,
            (Value::Float(v), ValueKind::Float32) => out.write_f32::<BigEndian>(v as f32)?,
            (Value::Float(v), ValueKind::Float64) => out.write_f64::<BigEndian>(v)?,
            (Value::Float(v), _) => {
                return Err(WordShardError::invalid_argument(format!(
                    "value {i} ({v}) is a float but the array kind is {kind:?}"
                )));
            }
        }
    }
    Ok(())
}

fn narrow<T: TryFrom<i64>>(v: i64, index: usize, kind: ValueKind) -> Result<T> {
    T::try_from(v).map_err(|_| {
        WordShardError::invalid_argument(format!("value {index} ({v}) does not fit {kind:?}"))
    })
}

/// Unpack an array of `kind` starting at `start_offset`.
///
/// Returns the values and the offset just past the array.
pub fn unpack_values(buf: &[u8], start_offset: usize, kind: ValueKind) -> Result<(Vec<Value>, usize)> {
    let data_start = start_offset
        .checked_add(COUNT_LEN)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| truncated(start_offset, buf.len()))?;
    let count = BigEndian::read_u32(&buf[start_offset..data_start]) as usize;

    let end = count
        .checked_mul(kind.width())
        .and_then(|n| n.checked_add(data_start))
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| truncated(start_offset, buf.len()))?;

    let values = buf[data_start..end]
        .chunks_exact(kind.width())
        .map(|b| match kind {
            ValueKind::Int16 => Value::Int(BigEndian::read_i16(b) as i64),
            ValueKind::Int32 => Value::Int(BigEndian::read_i32(b) as i64),
            ValueKind::Int64 => Value::Int(BigEndian::read_i64(b)),
            ValueKind::UInt32 => Value::Int(BigEndian::read_u32(b) as i64),
            ValueKind::Float32 => Value::Float(BigEndian::read_f32(b) as f64),
            ValueKind::Float64 => Value::Float(BigEndian::read_f64(b)),
        })
        .collect();

    Ok((values, end))
}

fn truncated(offset: usize, len: usize) -> WordShardError {
    WordShardError::corrupt(format!(
        "packed array at offset {offset} overruns buffer of {len} bytes"
    ))
}

// ============================================================================
// Auxiliary document keys
// ============================================================================

/// Pack extra scoring signals for a document: sparse description scores
/// keyed by position, and a dense list of user ranks.
///
/// Layout: positions (`UInt32` array), scores (`Float32` array), ranks
/// (`Float32` array).
pub fn pack_auxiliary_document_keys(
    description_scores: &BTreeMap<u32, f32>,
    user_ranks: &[f32],
) -> Result<Vec<u8>> {
    let positions: Vec<Value> = description_scores
        .keys()
        .map(|&p| Value::Int(p as i64))
        .collect();
    let scores: Vec<Value> = description_scores
        .values()
        .map(|&s| Value::Float(s as f64))
        .collect();
    let ranks: Vec<Value> = user_ranks.iter().map(|&r| Value::Float(r as f64)).collect();

    let mut out = Vec::new();
    pack_values_into(&positions, ValueKind::UInt32, &mut out)?;
    pack_values_into(&scores, ValueKind::Float32, &mut out)?;
    pack_values_into(&ranks, ValueKind::Float32, &mut out)?;
    Ok(out)
}

/// Inverse of [`pack_auxiliary_document_keys`].
pub fn unpack_auxiliary_document_keys(buf: &[u8]) -> Result<(BTreeMap<u32, f32>, Vec<f32>)> {
    let (positions, offset) = unpack_values(buf, 0, ValueKind::UInt32)?;
    let (scores, offset) = unpack_values(buf, offset, ValueKind::Float32)?;
    let (ranks, offset) = unpack_values(buf, offset, ValueKind::Float32)?;

    if positions.len() != scores.len() {
        return Err(WordShardError::corrupt(format!(
            "auxiliary keys hold {} positions but {} scores",
            positions.len(),
            scores.len()
        )));
    }
    if offset != buf.len() {
        return Err(WordShardError::corrupt(format!(
            "{} trailing bytes after auxiliary keys",
            buf.len() - offset
        )));
    }

    let description_scores = positions
        .into_iter()
        .zip(scores)
        .map(|(p, s)| Ok((as_u32(p)?, as_f32(s)?)))
        .collect::<Result<BTreeMap<_, _>>>()?;
    let user_ranks = ranks.into_iter().map(as_f32).collect::<Result<Vec<_>>>()?;

    Ok((description_scores, user_ranks))
}

fn as_u32(value: Value) -> Result<u32> {
    match value {
        Value::Int(v) => u32::try_from(v).map_err(|_| WordShardError::corrupt("position out of range")),
        Value::Float(_) => Err(WordShardError::corrupt("expected integer position")),
    }
}

fn as_f32(value: Value) -> Result<f32> {
    match value {
        Value::Float(v) => Ok(v as f32),
        Value::Int(_) => Err(WordShardError::corrupt("expected float score")),
    }
}
