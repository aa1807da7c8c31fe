//! Low-level byte-pair encoding for tiktoken-style rank tables.
//!
//! A piece (one pre-tokenizer match) is split into single-byte parts which
//! are then merged pairwise, always taking the pair whose combined bytes
//! carry the lowest rank in the vocabulary. Merging stops when no adjacent
//! pair forms a known token; whatever parts remain are looked up and
//! emitted in order.
//!
//! Ranks double as token ids, so the output of [`byte_pair_encode`] can be
//! decoded directly against the inverse of the same table.

use rustc_hash::FxHashMap;

/// A piece whose remaining parts cannot all be resolved against the rank
/// table. `offset` is relative to the start of the piece.
///
/// Vocabularies that contain all 256 single-byte tokens (Kimi's does) can
/// never produce this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnencodablePiece {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

/// Run the merge loop and return the surviving part boundaries.
///
/// Each entry is `(start, rank_of_pair_starting_here)`; the final two
/// entries are sentinels so that pair ranks can always look two parts
/// ahead. On return, consecutive `start` values delimit the output tokens.
fn byte_pair_merge(piece: &[u8], ranks: &FxHashMap<Vec<u8>, u32>) -> Vec<(usize, u32)> {
    debug_assert!(piece.len() > 1);

    let mut parts = Vec::with_capacity(piece.len() + 1);

    // Track the current minimum so the first merge needs no extra scan.
    // Strict `<` keeps the leftmost occurrence on rank ties.
    let mut min_rank: (u32, usize) = (u32::MAX, usize::MAX);
    for i in 0..piece.len() - 1 {
        let rank = *ranks.get(&piece[i..i + 2]).unwrap_or(&u32::MAX);
        if rank < min_rank.0 {
            min_rank = (rank, i);
        }
        parts.push((i, rank));
    }
    parts.push((piece.len() - 1, u32::MAX));
    parts.push((piece.len(), u32::MAX));

    let get_rank = |parts: &[(usize, u32)], i: usize| -> u32 {
        if i + 3 < parts.len() {
            // Rank of the pair formed by parts i and i+1 after a merge,
            // i.e. the byte range spanning three original boundaries.
            *ranks
                .get(&piece[parts[i].0..parts[i + 3].0])
                .unwrap_or(&u32::MAX)
        } else {
            u32::MAX
        }
    };

    while min_rank.0 != u32::MAX {
        let i = min_rank.1;

        // Only the neighbors of the merged pair change rank.
        if i > 0 {
            parts[i - 1].1 = get_rank(&parts, i - 1);
        }
        parts[i].1 = get_rank(&parts, i);
        parts.remove(i + 1);

        min_rank = (u32::MAX, usize::MAX);
        for (j, &(_, rank)) in parts[..parts.len() - 1].iter().enumerate() {
            if rank < min_rank.0 {
                min_rank = (rank, j);
            }
        }
    }

    parts
}

/// Encode a single piece into token ids using rank-priority merges.
///
/// Every id in the output is a value from `ranks`, and decoding the ids
/// against the inverse table reproduces `piece` exactly.
pub fn byte_pair_encode(
    piece: &[u8],
    ranks: &FxHashMap<Vec<u8>, u32>,
) -> Result<Vec<u32>, UnencodablePiece> {
    match piece.len() {
        0 => return Ok(Vec::new()),
        1 => {
            return match ranks.get(piece) {
                Some(&rank) => Ok(vec![rank]),
                None => Err(UnencodablePiece {
                    offset: 0,
                    bytes: piece.to_vec(),
                }),
            }
        }
        _ => {}
    }

    if let Some(&rank) = ranks.get(piece) {
        return Ok(vec![rank]);
    }

    let parts = byte_pair_merge(piece, ranks);

    let mut out = Vec::with_capacity(parts.len() - 1);
    for window in parts.windows(2) {
        let (start, end) = (window[0].0, window[1].0);
        match ranks.get(&piece[start..end]) {
            Some(&rank) => out.push(rank),
            None => {
                return Err(UnencodablePiece {
                    offset: start,
                    bytes: piece[start..end].to_vec(),
                })
            }
        }
    }
    Ok(out)
}
