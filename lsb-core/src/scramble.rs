//! LiveMaker `TScramble` chunk shuffling used by protected charts.

use serde::{Deserialize, Serialize};

use crate::error::{Error, FormatKind, Result};

/// Constant xored into the stored seed before seeding the PRNG.
pub const SCRAMBLE_KEY: u32 = 0xF8EA;

const FACTORS: [u64; 4] = [0x7DD4_FFC7, 0x0000_05D4, 0x0000_06F0, 0x0000_13FB];

/// Multiply-with-carry PRNG behind `TScramble`.
#[derive(Debug, Clone)]
pub struct LmScramble {
    state: [u32; 5],
}

impl LmScramble {
    pub fn new(seed: u32) -> Self {
        let mut seed = if seed == 0 { u32::MAX } else { seed };
        let mut state = [0u32; 5];
        for slot in &mut state {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            *slot = seed;
        }
        let mut rng = Self { state };
        for _ in 0..19 {
            rng.rand();
        }
        rng
    }

    pub fn rand(&mut self) -> u32 {
        let s = &mut self.state;
        let x = (s[3] as u64)
            .wrapping_mul(FACTORS[0])
            .wrapping_add((s[2] as u64).wrapping_mul(FACTORS[1]))
            .wrapping_add((s[1] as u64).wrapping_mul(FACTORS[2]))
            .wrapping_add((s[0] as u64).wrapping_mul(FACTORS[3]))
            .wrapping_add(s[4] as u64);
        s[4] = (x >> 32) as u32;
        s[3] = s[2];
        s[2] = s[1];
        s[1] = s[0];
        s[0] = x as u32;
        s[0]
    }

    /// Uniform float in `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.rand() as f64 / 4_294_967_296.0
    }

    /// Integer in `[low, high]`. Requires `low <= high`.
    pub fn randint(&mut self, low: usize, high: usize) -> usize {
        low + (self.random() * (high - low + 1) as f64) as usize
    }
}

/// Chunk permutation for `count` chunks: plain chunk `k` is stored at
/// scrambled position `randseq(..)[k]`.
pub fn randseq(count: usize, seed: u32) -> Vec<usize> {
    let mut rng = LmScramble::new(seed);
    let mut values: Vec<usize> = (0..count).collect();
    let mut seq = vec![0usize; count];
    let mut next = 0;
    while !values.is_empty() {
        let n = if values.len() == 1 {
            0
        } else {
            rng.randint(0, values.len() - 2)
        };
        seq[values.remove(n)] = next;
        next += 1;
    }
    seq
}

/// Scramble header stored after the chart flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrambleParams {
    pub chunk_size: i32,
    pub seed: u32,
}

/// Size of the `chunk_size` + `seed` header.
pub const SCRAMBLE_HEADER_LEN: usize = 8;

struct Layout {
    chunk: usize,
    len: usize,
    /// `perm[k]` = scrambled position of plain chunk `k`.
    perm: Vec<usize>,
    /// Byte offset of each scrambled position.
    offsets: Vec<usize>,
}

impl Layout {
    fn new(params: ScrambleParams, len: usize, at: usize) -> Result<Self> {
        if params.chunk_size <= 0 {
            return Err(Error::format(
                None,
                at,
                FormatKind::BadScramble(format!("chunk size {} is not positive", params.chunk_size)),
            ));
        }
        let chunk = params.chunk_size as usize;
        let count = len.div_ceil(chunk);
        let perm = randseq(count, params.seed ^ SCRAMBLE_KEY);
        let mut inverse = vec![0usize; count];
        for (k, &p) in perm.iter().enumerate() {
            inverse[p] = k;
        }
        let mut layout = Self {
            chunk,
            len,
            perm,
            offsets: Vec::with_capacity(count),
        };
        let mut offset = 0;
        for &k in &inverse {
            layout.offsets.push(offset);
            offset += layout.size(k);
        }
        Ok(layout)
    }

    fn size(&self, k: usize) -> usize {
        if k + 1 == self.perm.len() {
            self.len - k * self.chunk
        } else {
            self.chunk
        }
    }
}

/// Restore the plain body from its scrambled image.
///
/// `at` is the image's offset in the file, used for error reporting.
pub fn unscramble(data: &[u8], params: ScrambleParams, at: usize) -> Result<Vec<u8>> {
    let layout = Layout::new(params, data.len(), at)?;
    let mut out = Vec::with_capacity(data.len());
    for (k, &p) in layout.perm.iter().enumerate() {
        let start = layout.offsets[p];
        out.extend_from_slice(&data[start..start + layout.size(k)]);
    }
    Ok(out)
}

/// Shuffle a plain body into its scrambled image.
pub fn scramble(plain: &[u8], params: ScrambleParams) -> Result<Vec<u8>> {
    let layout = Layout::new(params, plain.len(), 0)?;
    let mut out = vec![0u8; plain.len()];
    for (k, &p) in layout.perm.iter().enumerate() {
        let src = k * layout.chunk;
        let size = layout.size(k);
        let dst = layout.offsets[p];
        out[dst..dst + size].copy_from_slice(&plain[src..src + size]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prng_matches_engine() {
        let mut rng = LmScramble::new(0x1234 ^ SCRAMBLE_KEY);
        assert_eq!(
            [rng.rand(), rng.rand(), rng.rand()],
            [2314092413, 1831583387, 3307235460]
        );
        assert_eq!(randseq(8, 0x1234 ^ SCRAMBLE_KEY), [4, 5, 1, 0, 6, 2, 3, 7]);
        assert_eq!(randseq(5, SCRAMBLE_KEY), [3, 2, 1, 0, 4]);
    }

    #[test]
    fn zero_seed_is_replaced() {
        assert_eq!(
            LmScramble::new(0).state,
            [4103386465, 208644517, 3456471529, 3829293269, 740776759]
        );
    }

    #[test]
    fn short_final_chunk_round_trips() {
        let plain: Vec<u8> = (0..=250u8).collect();
        for chunk_size in [1, 7, 16, 250, 251, 4096] {
            let params = ScrambleParams { chunk_size, seed: 0xDEAD_BEEF };
            let image = scramble(&plain, params).unwrap();
            assert_eq!(image.len(), plain.len());
            assert_eq!(unscramble(&image, params, 0).unwrap(), plain);
        }
    }

    #[test]
    fn scrambled_positions_follow_permutation() {
        let plain: Vec<u8> = (0..8u8).collect();
        let params = ScrambleParams { chunk_size: 1, seed: 0x1234 };
        let image = scramble(&plain, params).unwrap();
        // plain chunk k lands at position randseq[k]
        assert_eq!(image, [3, 2, 5, 6, 0, 1, 4, 7]);
    }

    #[test]
    fn rejects_non_positive_chunk_size() {
        let params = ScrambleParams { chunk_size: 0, seed: 1 };
        assert!(matches!(
            unscramble(&[1, 2, 3], params, 5),
            Err(Error::Format { offset: 5, kind: FormatKind::BadScramble(_), .. })
        ));
    }
}
