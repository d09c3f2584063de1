//! Fixed-size binary layout of command and result records.
//!
//! All integers are little-endian. Unused trailing bytes are zero.
//!
//! ```text
//! SlotDescriptor := offset:u64 length:u64 element_kind:u8 rank:u8 shape[rank]:u32
//! Command        := sequence:u64 op_id:u32 correlation_id:u64 input_count:u8
//!                   inputs[input_count]:SlotDescriptor output:SlotDescriptor
//! Result         := correlation_id:u64 status:u8 error_code:u8 output:SlotDescriptor
//! ```
//!
//! The largest command (four rank-4 inputs plus a rank-4 output) is 191
//! bytes, so every record fits one 192-byte slot.

use smallvec::SmallVec;
use weir_core::{
    CommandRecord, CorrelationId, ElementKind, ErrorCode, OpId, ResultRecord, Sequence, Shape,
    SlotDescriptor, Status, MAX_INPUTS, MAX_RANK,
};

use crate::error::CodecError;

/// Bytes per ring slot.
pub const RECORD_BYTES: usize = 192;

/// `u64` words per ring slot.
pub const RECORD_WORDS: usize = RECORD_BYTES / 8;

/// Byte offset of `correlation_id` within an encoded command.
const COMMAND_CORRELATION_AT: usize = 12;

const STATUS_OK: u8 = 0;
const STATUS_ERR: u8 = 1;

/// One slot's worth of encoded bytes.
///
/// Stored as words so that it copies into and out of the ring's atomic
/// cells without reinterpretation; [`as_bytes`](RawRecord::as_bytes) gives
/// the byte layout above.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    pub(crate) words: [u64; RECORD_WORDS],
}

impl RawRecord {
    /// An all-zero record.
    pub fn zeroed() -> Self {
        Self {
            words: [0; RECORD_WORDS],
        }
    }

    /// Encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// Mutable encoded bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    /// Correlation id of an encoded command, readable even when the rest
    /// of the record is malformed.
    pub fn command_correlation_id(&self) -> CorrelationId {
        let mut r = Reader::new(self.as_bytes());
        r.pos = COMMAND_CORRELATION_AT;
        CorrelationId(r.u64("correlation_id").unwrap_or_default())
    }
}

impl std::fmt::Debug for RawRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawRecord")
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

/// A record type with a fixed-size wire encoding.
pub trait WireRecord: Sized {
    /// Write `self` into `raw`, which starts zeroed.
    fn encode(&self, raw: &mut RawRecord) -> Result<(), CodecError>;

    /// Read a record back.
    fn decode(raw: &RawRecord) -> Result<Self, CodecError>;

    /// Encode into a fresh zeroed slot.
    fn to_raw(&self) -> Result<RawRecord, CodecError> {
        let mut raw = RawRecord::zeroed();
        self.encode(&mut raw)?;
        Ok(raw)
    }
}

impl WireRecord for CommandRecord {
    fn encode(&self, raw: &mut RawRecord) -> Result<(), CodecError> {
        if self.inputs.len() > MAX_INPUTS {
            return Err(CodecError::TooManyInputs {
                count: self.inputs.len(),
            });
        }
        let mut w = Writer::new(raw.as_bytes_mut());
        w.u64(self.sequence.0)?;
        w.u32(self.op_id.0)?;
        w.u64(self.correlation_id.0)?;
        w.u8(self.inputs.len() as u8)?;
        for input in &self.inputs {
            w.descriptor(input)?;
        }
        w.descriptor(&self.output)
    }

    fn decode(raw: &RawRecord) -> Result<Self, CodecError> {
        let mut r = Reader::new(raw.as_bytes());
        let sequence = Sequence(r.u64("sequence")?);
        let op_id = OpId(r.u32("op_id")?);
        let correlation_id = CorrelationId(r.u64("correlation_id")?);
        let count = r.u8("input_count")? as usize;
        if count > MAX_INPUTS {
            return Err(CodecError::TooManyInputs { count });
        }
        let mut inputs = SmallVec::new();
        for _ in 0..count {
            inputs.push(r.descriptor()?);
        }
        let output = r.descriptor()?;
        Ok(Self {
            sequence,
            op_id,
            correlation_id,
            inputs,
            output,
        })
    }
}

impl WireRecord for ResultRecord {
    fn encode(&self, raw: &mut RawRecord) -> Result<(), CodecError> {
        let mut w = Writer::new(raw.as_bytes_mut());
        w.u64(self.correlation_id.0)?;
        match self.status {
            Status::Ok => {
                w.u8(STATUS_OK)?;
                w.u8(0)?;
            }
            Status::Err(code) => {
                w.u8(STATUS_ERR)?;
                w.u8(code.as_u8())?;
            }
        }
        w.descriptor(&self.output)
    }

    fn decode(raw: &RawRecord) -> Result<Self, CodecError> {
        let mut r = Reader::new(raw.as_bytes());
        let correlation_id = CorrelationId(r.u64("correlation_id")?);
        let tag = r.u8("status")?;
        let code = r.u8("error_code")?;
        let status = match tag {
            STATUS_OK => Status::Ok,
            STATUS_ERR => Status::Err(
                ErrorCode::from_u8(code).ok_or(CodecError::UnknownErrorCode { code })?,
            ),
            tag => return Err(CodecError::UnknownStatus { tag }),
        };
        let output = r.descriptor()?;
        Ok(Self {
            correlation_id,
            status,
            output,
        })
    }
}

// ── Primitive writers ───────────────────────────────────────────

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos + bytes.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(CodecError::Overflow { needed: end })?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn u8(&mut self, v: u8) -> Result<(), CodecError> {
        self.put(&[v])
    }

    fn u32(&mut self, v: u32) -> Result<(), CodecError> {
        self.put(&v.to_le_bytes())
    }

    fn u64(&mut self, v: u64) -> Result<(), CodecError> {
        self.put(&v.to_le_bytes())
    }

    fn descriptor(&mut self, d: &SlotDescriptor) -> Result<(), CodecError> {
        if d.rank() > MAX_RANK {
            return Err(CodecError::RankTooLarge { rank: d.rank() });
        }
        self.u64(d.offset)?;
        self.u64(d.length)?;
        self.u8(d.kind.tag())?;
        self.u8(d.rank() as u8)?;
        for &extent in &d.shape {
            self.u32(extent)?;
        }
        Ok(())
    }
}

// ── Primitive readers ───────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], CodecError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or(CodecError::Truncated { field })?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take::<1>(field)?[0])
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        self.take(field).map(u32::from_le_bytes)
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        self.take(field).map(u64::from_le_bytes)
    }

    fn descriptor(&mut self) -> Result<SlotDescriptor, CodecError> {
        let offset = self.u64("offset")?;
        let length = self.u64("length")?;
        let tag = self.u8("element_kind")?;
        let kind = ElementKind::from_tag(tag).ok_or(CodecError::UnknownElementKind { tag })?;
        let rank = self.u8("rank")? as usize;
        if rank > MAX_RANK {
            return Err(CodecError::RankTooLarge { rank });
        }
        let mut shape = Shape::new();
        for _ in 0..rank {
            shape.push(self.u32("shape")?);
        }
        Ok(SlotDescriptor {
            offset,
            length,
            kind,
            shape,
        })
    }
}
