use crate::error::{RendererError, Result};

pub const BLOOM_CHAIN_LENGTH: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

/// Sizes of a bloom mip chain: level `i` is `floor(W / 2^i) x floor(H / 2^i)`.
///
/// Fails when any level would collapse to zero texels.
pub fn chain_extents(width: u32, height: u32, levels: usize) -> Result<Vec<Extent>> {
    if levels == 0 || levels > max_chain_length(width, height) {
        return Err(RendererError::InvalidBloomChain {
            width,
            height,
            levels,
        });
    }
    Ok((0..levels)
        .map(|i| Extent {
            width: width >> i,
            height: height >> i,
        })
        .collect())
}

/// Longest chain whose smallest level is still at least 1x1.
pub fn max_chain_length(width: u32, height: u32) -> usize {
    let smaller = width.min(height);
    if smaller == 0 {
        0
    } else {
        (u32::BITS - smaller.leading_zeros()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_length_tracks_smaller_axis() {
        assert_eq!(max_chain_length(1, 1), 1);
        assert_eq!(max_chain_length(32, 1000), 6);
        assert_eq!(max_chain_length(63, 1000), 6);
        assert_eq!(max_chain_length(64, 64), 7);
        assert_eq!(max_chain_length(0, 64), 0);
    }

    #[test]
    fn collapsing_chain_is_rejected() {
        assert!(chain_extents(31, 720, BLOOM_CHAIN_LENGTH).is_err());
        assert!(chain_extents(32, 720, BLOOM_CHAIN_LENGTH).is_ok());
        assert!(chain_extents(32, 720, 0).is_err());
    }
}
