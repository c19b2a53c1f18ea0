use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::bits;

/// highest value of `s + b` for which the tag keeps at least one address bit.
pub const MAX_ADDRESS_BITS: u32 = u64::BITS - 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{name}` must be a positive integer")]
    ZeroParameter { name: &'static str },
    #[error("set bits ({set_bits}) + block bits ({block_bits}) must not exceed {max}", max = MAX_ADDRESS_BITS)]
    AddressBitsExceeded { set_bits: u32, block_bits: u32 },
}

/// shape of the simulated cache: `2^s` sets of `E` lines holding `2^b`-byte blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub set_bits: u32,
    pub associativity: usize,
    pub block_bits: u32,
}

impl Geometry {
    pub fn new(set_bits: u32, associativity: usize, block_bits: u32) -> Self {
        Self {
            set_bits,
            associativity,
            block_bits,
        }
    }

    /// checks done on user input before anything is allocated.
    pub fn validate_positive(&self) -> Result<(), ConfigError> {
        if self.set_bits == 0 {
            return Err(ConfigError::ZeroParameter { name: "s" });
        }
        if self.associativity == 0 {
            return Err(ConfigError::ZeroParameter { name: "E" });
        }
        if self.block_bits == 0 {
            return Err(ConfigError::ZeroParameter { name: "b" });
        }
        if !self.fits_address() {
            return Err(ConfigError::AddressBitsExceeded {
                set_bits: self.set_bits,
                block_bits: self.block_bits,
            });
        }
        Ok(())
    }

    pub fn fits_address(&self) -> bool {
        self.set_bits
            .checked_add(self.block_bits)
            .map_or(false, |bits| bits <= MAX_ADDRESS_BITS)
    }

    /// `S = 2^s`, or `None` if it does not fit in `usize`.
    pub fn num_sets(&self) -> Option<usize> {
        1usize.checked_shl(self.set_bits)
    }

    pub fn block_size(&self) -> Option<u64> {
        1u64.checked_shl(self.block_bits)
    }

    /// `S * E * B` in bytes.
    pub fn capacity_bytes(&self) -> Option<u64> {
        let lines = (self.num_sets()? as u64).checked_mul(self.associativity as u64)?;
        lines.checked_mul(self.block_size()?)
    }

    /// splits `addr` into (set index, tag). block offset bits are dropped.
    #[inline]
    pub fn decompose(&self, addr: u64) -> (usize, u64) {
        let set_index = bits::extract(addr, self.block_bits, self.set_bits);
        let tag = bits::shr(addr, self.set_bits.saturating_add(self.block_bits));
        (set_index as usize, tag)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={} E={} b={}",
            self.set_bits, self.associativity, self.block_bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose() {
        let g = Geometry::new(4, 1, 4);
        assert_eq!((0x3, 0xab), g.decompose(0xab3f));
        let g = Geometry::new(1, 1, 1);
        assert_eq!((0, 0), g.decompose(0));
        assert_eq!((1, 0), g.decompose(2));
        assert_eq!((0, 1), g.decompose(4));
    }
    #[test]
    fn test_decompose_without_set_or_block_bits() {
        let g = Geometry::new(0, 1, 0);
        assert_eq!((0, 0x10), g.decompose(0x10));
        assert_eq!((0, u64::MAX), g.decompose(u64::MAX));
    }
    #[test]
    fn test_decompose_at_address_limit() {
        let g = Geometry::new(32, 1, 31);
        let (set, tag) = g.decompose(u64::MAX);
        assert_eq!(set, u32::MAX as usize);
        assert_eq!(tag, 1);
    }
    #[test]
    fn test_validate_positive() {
        assert_eq!(Ok(()), Geometry::new(1, 1, 1).validate_positive());
        assert_eq!(
            Err(ConfigError::ZeroParameter { name: "s" }),
            Geometry::new(0, 1, 1).validate_positive()
        );
        assert_eq!(
            Err(ConfigError::ZeroParameter { name: "E" }),
            Geometry::new(1, 0, 1).validate_positive()
        );
        assert_eq!(
            Err(ConfigError::ZeroParameter { name: "b" }),
            Geometry::new(1, 1, 0).validate_positive()
        );
        assert_eq!(Ok(()), Geometry::new(32, 1, 31).validate_positive());
        assert_eq!(
            Err(ConfigError::AddressBitsExceeded {
                set_bits: 32,
                block_bits: 32
            }),
            Geometry::new(32, 1, 32).validate_positive()
        );
    }
    #[test]
    fn test_sizes() {
        let g = Geometry::new(4, 2, 5);
        assert_eq!(Some(16), g.num_sets());
        assert_eq!(Some(32), g.block_size());
        assert_eq!(Some(16 * 2 * 32), g.capacity_bytes());
        assert_eq!(None, Geometry::new(70, 1, 1).num_sets());
    }
}
