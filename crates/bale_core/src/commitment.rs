//! Piece commitment (CommP) calculation.
//!
//! Bytes are consumed in 127-byte quads. Each quad is expanded with Fr32
//! padding to 128 bytes (two zero bits after every 254 bits of payload), cut
//! into four 32-byte leaves, and folded into a binary Merkle tree whose node
//! function is SHA-256 with the top two bits of the last byte cleared.
//!
//! The tree is reduced on the fly with one pending node per level, so memory
//! use is logarithmic in the input length.
//!
//! # Example
//!
//! ```rust
//! use bale_core::commitment::CommitmentCalc;
//! use std::io::Write;
//!
//! let mut calc = CommitmentCalc::new();
//! calc.write_all(&[1u8; 300]).unwrap();
//! let (_commitment, size) = calc.digest().unwrap();
//! assert_eq!(size.get(), 512);
//! ```

use crate::error::{CoreError, CoreResult};
use crate::piece::{PaddedPieceSize, PieceInfo};
use bale_codec::Cid;
use sha2::{Digest, Sha256};
use std::io;
use std::sync::OnceLock;

/// A 32-byte tree node.
pub type Commitment = [u8; 32];

/// Payload bytes per quad.
pub const QUAD_PAYLOAD: usize = 127;

/// Inputs shorter than this are zero-padded up to it before digesting.
pub const MIN_PIECE_PAYLOAD: u64 = 65;

const NODE_SIZE: usize = 32;
const MAX_LEVELS: usize = 64;

/// SHA-256 truncated to 254 bits: the tree's node function.
pub fn hash_pair(left: &Commitment, right: &Commitment) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let mut out: Commitment = hasher.finalize().into();
    out[31] &= 0x3f;
    out
}

fn zero_table() -> &'static [Commitment] {
    static TABLE: OnceLock<Vec<Commitment>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = Vec::with_capacity(MAX_LEVELS);
        let mut node = [0u8; NODE_SIZE];
        for _ in 0..MAX_LEVELS {
            table.push(node);
            node = hash_pair(&node, &node);
        }
        table
    })
}

/// Commitment of an all-zero subtree `level` levels above the leaves.
///
/// Level 0 is a zero leaf; level `h` covers `32 << h` padded bytes.
///
/// # Panics
///
/// Panics if `level >= 64`; no `u64` piece size needs a taller tree.
pub fn zero_commitment(level: u32) -> Commitment {
    zero_table()[level as usize]
}

/// Commitment of an all-zero piece of the given padded size.
pub fn zero_piece_commitment(size: PaddedPieceSize) -> Commitment {
    zero_commitment(size.tree_height())
}

/// Expands one 127-byte quad into four Fr32-padded leaves.
fn fr32_expand(input: &[u8; QUAD_PAYLOAD]) -> [u8; 128] {
    let mut out = [0u8; 128];

    out[..32].copy_from_slice(&input[..32]);
    out[31] &= 0x3f;

    for i in 32..64 {
        out[i] = (input[i] << 2) | (input[i - 1] >> 6);
    }
    out[63] &= 0x3f;

    for i in 64..96 {
        out[i] = (input[i] << 4) | (input[i - 1] >> 4);
    }
    out[95] &= 0x3f;

    for i in 96..127 {
        out[i] = (input[i] << 6) | (input[i - 1] >> 2);
    }
    out[127] = input[126] >> 2;

    out
}

/// Commitment of a piece holding at most one quad.
///
/// Only the first 127 bytes of `data` are used; shorter input is zero-padded,
/// so the piece is always 128 bytes. Agrees with [`CommitmentCalc`] for any
/// input of up to 127 bytes.
pub fn quad_commitment(data: &[u8]) -> Commitment {
    let mut quad = [0u8; QUAD_PAYLOAD];
    let len = data.len().min(QUAD_PAYLOAD);
    quad[..len].copy_from_slice(&data[..len]);
    let expanded = fr32_expand(&quad);

    let mut leaves = [[0u8; NODE_SIZE]; 4];
    for (leaf, chunk) in leaves.iter_mut().zip(expanded.chunks_exact(NODE_SIZE)) {
        leaf.copy_from_slice(chunk);
    }
    hash_pair(
        &hash_pair(&leaves[0], &leaves[1]),
        &hash_pair(&leaves[2], &leaves[3]),
    )
}

/// Streaming piece commitment accumulator.
///
/// Implements [`io::Write`]; call [`CommitmentCalc::digest`] once all bytes
/// are written.
pub struct CommitmentCalc {
    quad: [u8; QUAD_PAYLOAD],
    quad_len: usize,
    quads: u64,
    written: u64,
    layers: Vec<Option<Commitment>>,
    consumed: bool,
}

impl CommitmentCalc {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            quad: [0u8; QUAD_PAYLOAD],
            quad_len: 0,
            quads: 0,
            written: 0,
            layers: Vec::new(),
            consumed: false,
        }
    }

    /// Bytes written since creation or the last reset.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Clears all state so the accumulator can be reused.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Finishes the tree and returns the commitment and padded size.
    ///
    /// Inputs shorter than [`MIN_PIECE_PAYLOAD`] are zero-padded first, so
    /// the smallest result is a 128-byte piece.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DigestConsumed`] if called twice without
    /// [`CommitmentCalc::reset`].
    pub fn digest(&mut self) -> CoreResult<(Commitment, PaddedPieceSize)> {
        if self.consumed {
            return Err(CoreError::DigestConsumed);
        }
        self.consumed = true;
        self.finish()
    }

    fn absorb(&mut self, data: &[u8]) {
        self.written += data.len() as u64;
        let mut data = data;
        while !data.is_empty() {
            let take = (QUAD_PAYLOAD - self.quad_len).min(data.len());
            self.quad[self.quad_len..self.quad_len + take].copy_from_slice(&data[..take]);
            self.quad_len += take;
            data = &data[take..];
            if self.quad_len == QUAD_PAYLOAD {
                self.flush_quad();
            }
        }
    }

    fn flush_quad(&mut self) {
        let expanded = fr32_expand(&self.quad);
        for leaf in expanded.chunks_exact(NODE_SIZE) {
            let mut node = [0u8; NODE_SIZE];
            node.copy_from_slice(leaf);
            self.push_node(node, 0);
        }
        self.quad = [0u8; QUAD_PAYLOAD];
        self.quad_len = 0;
        self.quads += 1;
    }

    fn push_node(&mut self, mut node: Commitment, mut level: usize) {
        loop {
            if self.layers.len() <= level {
                self.layers.resize(level + 1, None);
            }
            match self.layers[level].take() {
                Some(left) => {
                    node = hash_pair(&left, &node);
                    level += 1;
                }
                None => {
                    self.layers[level] = Some(node);
                    return;
                }
            }
        }
    }

    fn finish(&mut self) -> CoreResult<(Commitment, PaddedPieceSize)> {
        if self.written < MIN_PIECE_PAYLOAD {
            let pad = [0u8; MIN_PIECE_PAYLOAD as usize];
            let missing = (MIN_PIECE_PAYLOAD - self.written) as usize;
            self.absorb(&pad[..missing]);
        }
        if self.quad_len > 0 {
            self.flush_quad();
        }

        let content = self
            .quads
            .checked_mul(128)
            .ok_or_else(|| CoreError::invalid_piece_size("input too large"))?;
        let size = PaddedPieceSize::covering(content)?;
        let height = size.tree_height() as usize;

        let mut carry: Option<Commitment> = None;
        for level in 0..height {
            let pending = self.layers.get_mut(level).and_then(Option::take);
            carry = match (pending, carry) {
                (Some(left), Some(right)) => Some(hash_pair(&left, &right)),
                (Some(left), None) => Some(hash_pair(&left, &zero_commitment(level as u32))),
                (None, Some(left)) => Some(hash_pair(&left, &zero_commitment(level as u32))),
                (None, None) => None,
            };
        }
        let root = match carry {
            Some(root) => root,
            None => self
                .layers
                .get_mut(height)
                .and_then(Option::take)
                .ok_or_else(|| CoreError::invalid_piece_size("commitment tree is empty"))?,
        };
        Ok((root, size))
    }
}

impl Default for CommitmentCalc {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for CommitmentCalc {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.consumed {
            return Err(io::Error::other(CoreError::DigestConsumed.to_string()));
        }
        self.absorb(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Commitment and size of an in-memory byte string.
///
/// # Errors
///
/// Only fails for inputs too large to address.
pub fn piece_commitment(data: &[u8]) -> CoreResult<PieceInfo> {
    let mut calc = CommitmentCalc::new();
    calc.absorb(data);
    let (commitment, size) = calc.digest()?;
    Ok(PieceInfo {
        cid: Cid::piece_commitment(&commitment),
        size,
    })
}

/// Combines child pieces, in order, into the commitment of a piece of
/// `target` size.
///
/// Children are placed left to right. Before each child, zero pieces are
/// inserted until the offset is a multiple of the child's size. The result is
/// then padded with zero subtrees up to `target`. Child commitments are the
/// leaves here, never raw bytes.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPieceSize`] if `pieces` is empty, a child is
/// not a piece commitment, or the children do not fit in `target`.
pub fn aggregate_commitment(pieces: &[PieceInfo], target: PaddedPieceSize) -> CoreResult<Commitment> {
    if pieces.is_empty() {
        return Err(CoreError::invalid_piece_size("no pieces to aggregate"));
    }

    let mut stack: Vec<(Commitment, u64)> = Vec::new();
    let mut offset: u64 = 0;

    for piece in pieces {
        let size = piece.size.get();
        let mut fill = (size - offset % size) % size;
        // Fill the alignment gap with zero pieces, smallest first.
        while fill > 0 {
            let pad = 1u64 << fill.trailing_zeros();
            push_reduce(&mut stack, (zero_commitment(leaf_height(pad)), pad));
            offset += pad;
            fill -= pad;
        }
        push_reduce(&mut stack, (piece.commitment()?, size));
        offset = offset
            .checked_add(size)
            .ok_or_else(|| CoreError::invalid_piece_size("aggregate size overflows"))?;
    }

    while stack.len() > 1 {
        let top = stack[stack.len() - 1].1;
        push_reduce(&mut stack, (zero_commitment(leaf_height(top)), top));
    }

    let (mut root, mut size) = stack[0];
    if size > target.get() {
        return Err(CoreError::invalid_piece_size(format!(
            "pieces need {size} bytes but target is {target}"
        )));
    }
    while size < target.get() {
        root = hash_pair(&root, &zero_commitment(leaf_height(size)));
        size *= 2;
    }
    Ok(root)
}

fn leaf_height(size: u64) -> u32 {
    (size / NODE_SIZE as u64).trailing_zeros()
}

fn push_reduce(stack: &mut Vec<(Commitment, u64)>, node: (Commitment, u64)) {
    stack.push(node);
    while stack.len() >= 2 {
        let (right, right_size) = stack[stack.len() - 1];
        let (left, left_size) = stack[stack.len() - 2];
        if left_size != right_size {
            break;
        }
        stack.truncate(stack.len() - 2);
        stack.push((hash_pair(&left, &right), left_size * 2));
    }
}
