//! Signals: ordered, LSB-first concatenations of wire slices and constants.
use crate::{Bit, Const, Wire};
use netsynth_utils::Id;
use smallvec::SmallVec;

/// One piece of a signal: a literal constant or a slice of a wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigChunk {
    /// A literal bit-vector.
    Const(Const),
    /// `width` bits of `wire` starting at `offset`.
    Slice { wire: Id, offset: u64, width: u64 },
}

impl SigChunk {
    pub fn width(&self) -> u64 {
        match self {
            SigChunk::Const(value) => value.width(),
            SigChunk::Slice { width, .. } => *width,
        }
    }
}

/// A single bit of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigBit {
    /// Bit `1` of wire `0`.
    Wire(Id, u64),
    Const(Bit),
}

/// An ordered, LSB-first concatenation of signal chunks.
///
/// Appending keeps the chunk list canonical: adjacent slices of the same
/// wire with contiguous offsets merge, as do adjacent constants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SigSpec {
    chunks: SmallVec<[SigChunk; 1]>,
}

impl SigSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole of `wire`.
    pub fn from_wire(wire: &Wire) -> Self {
        Self::slice(wire.name, 0, wire.width)
    }

    pub fn slice(wire: impl Into<Id>, offset: u64, width: u64) -> Self {
        let mut sig = Self::new();
        sig.append(SigChunk::Slice {
            wire: wire.into(),
            offset,
            width,
        });
        sig
    }

    pub fn constant(value: Const) -> Self {
        let mut sig = Self::new();
        sig.append(SigChunk::Const(value));
        sig
    }

    pub fn chunks(&self) -> &[SigChunk] {
        &self.chunks
    }

    pub fn width(&self) -> u64 {
        self.chunks.iter().map(SigChunk::width).sum()
    }

    pub fn append(&mut self, chunk: SigChunk) {
        if chunk.width() == 0 {
            return;
        }
        if let Some(last) = self.chunks.last_mut() {
            match (last, &chunk) {
                (
                    SigChunk::Slice { wire, offset, width },
                    SigChunk::Slice {
                        wire: new_wire,
                        offset: new_offset,
                        width: new_width,
                    },
                ) if *wire == *new_wire && *new_offset == *offset + *width => {
                    *width += new_width;
                    return;
                }
                (SigChunk::Const(value), SigChunk::Const(new_value)) => {
                    let mut bits = value.bits().to_vec();
                    bits.extend_from_slice(new_value.bits());
                    *value = Const::new(bits);
                    return;
                }
                _ => {}
            }
        }
        self.chunks.push(chunk);
    }

    pub fn append_sig(&mut self, other: &SigSpec) {
        for chunk in other.chunks() {
            self.append(chunk.clone());
        }
    }

    /// Per-bit view, LSB first.
    pub fn bits(&self) -> impl Iterator<Item = SigBit> + '_ {
        self.chunks.iter().flat_map(|chunk| {
            (0..chunk.width()).map(move |i| match chunk {
                SigChunk::Const(value) => SigBit::Const(value.bit(i)),
                SigChunk::Slice { wire, offset, .. } => SigBit::Wire(*wire, offset + i),
            })
        })
    }

    /// `length` bits starting at `offset`, re-chunked into maximal runs.
    pub fn extract(&self, offset: u64, length: u64) -> SigSpec {
        assert!(
            offset + length <= self.width(),
            "extract [{}, {}) out of range for signal of width {}",
            offset,
            offset + length,
            self.width()
        );
        let mut out = SigSpec::new();
        for bit in self.bits().skip(offset as usize).take(length as usize) {
            match bit {
                SigBit::Wire(wire, idx) => out.append(SigChunk::Slice {
                    wire,
                    offset: idx,
                    width: 1,
                }),
                SigBit::Const(b) => out.append(SigChunk::Const(Const::new(vec![b]))),
            }
        }
        out
    }

    pub fn is_fully_const(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| matches!(chunk, SigChunk::Const(_)))
    }

    /// The signal as one constant, when every chunk is a literal.
    pub fn as_const(&self) -> Option<Const> {
        if !self.is_fully_const() {
            return None;
        }
        let mut bits = Vec::with_capacity(self.width() as usize);
        for chunk in &self.chunks {
            if let SigChunk::Const(value) = chunk {
                bits.extend_from_slice(value.bits());
            }
        }
        Some(Const::new(bits))
    }
}

impl From<&Wire> for SigSpec {
    fn from(wire: &Wire) -> Self {
        SigSpec::from_wire(wire)
    }
}

impl From<Const> for SigSpec {
    fn from(value: Const) -> Self {
        SigSpec::constant(value)
    }
}
