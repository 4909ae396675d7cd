//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Ordered bit container used to assemble and parse encoded messages."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Bit-level buffer.
//!
//! Values are appended most-significant bit first. When converted to bytes the first bit
//! lands in the most significant bit of byte 0 and the final byte is padded with zero bits
//! at its low-order end.
use std::collections::VecDeque;
use std::fmt;

use crate::error::{DcclError, Result};

/// Number of bits needed to represent every value in `0..=max`.
pub fn bits_for(max: u64) -> usize {
    (u64::BITS - max.leading_zeros()) as usize
}

/// Ordered sequence of bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitset {
    bits: VecDeque<bool>,
}

impl Bitset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bitset holding `value` in exactly `width` bits.
    pub fn from_unsigned(value: u64, width: usize) -> Result<Self> {
        let mut bits = Self::new();
        bits.append_bits(value, width)?;
        Ok(bits)
    }

    /// Bits of `bytes`, most significant bit of the first byte first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut bits = VecDeque::with_capacity(bytes.len() * 8);
        for byte in bytes {
            for shift in (0..8).rev() {
                bits.push_back(byte >> shift & 1 == 1);
            }
        }
        Self { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().copied()
    }

    pub fn push(&mut self, bit: bool) {
        self.bits.push_back(bit);
    }

    /// Append the low `width` bits of `value`, most significant first.
    pub fn append_bits(&mut self, value: u64, width: usize) -> Result<()> {
        if width > u64::BITS as usize {
            return Err(DcclError::SizeMismatch(format!(
                "width {} exceeds 64 bits",
                width
            )));
        }
        if width < u64::BITS as usize && value >> width != 0 {
            return Err(DcclError::SizeMismatch(format!(
                "value {} does not fit in {} bits",
                value, width
            )));
        }
        for shift in (0..width).rev() {
            self.bits.push_back(value >> shift & 1 == 1);
        }
        Ok(())
    }

    pub fn append(&mut self, other: &Bitset) {
        self.bits.extend(other.bits.iter().copied());
    }

    /// Insert `other` in front of the existing bits.
    pub fn prepend(&mut self, other: &Bitset) {
        for bit in other.bits.iter().rev() {
            self.bits.push_front(*bit);
        }
    }

    /// Interpret the whole bitset as an unsigned integer.
    pub fn to_unsigned(&self) -> Result<u64> {
        if self.len() > u64::BITS as usize {
            return Err(DcclError::SizeMismatch(format!(
                "{} bits do not fit in a 64-bit integer",
                self.len()
            )));
        }
        Ok(self
            .bits
            .iter()
            .fold(0u64, |acc, bit| acc << 1 | u64::from(*bit)))
    }

    /// Pack into bytes, zero padding the low end of the last byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.len().div_ceil(8)];
        for (index, bit) in self.bits.iter().enumerate() {
            if *bit {
                bytes[index / 8] |= 0x80 >> (index % 8);
            }
        }
        bytes
    }

    pub fn cursor(&self) -> BitCursor<'_> {
        BitCursor::new(self)
    }
}

impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Sequential reader over a [`Bitset`].
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    bits: &'a Bitset,
    position: usize,
}

impl<'a> BitCursor<'a> {
    pub fn new(bits: &'a Bitset) -> Self {
        Self { bits, position: 0 }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bits.len() - self.position
    }

    fn ensure(&self, width: usize) -> Result<()> {
        if width > self.remaining() {
            return Err(DcclError::DecodeSizeMismatch {
                required: self.position + width,
                available: self.bits.len(),
            });
        }
        Ok(())
    }

    pub fn read_unsigned(&mut self, width: usize) -> Result<u64> {
        if width > u64::BITS as usize {
            return Err(DcclError::SizeMismatch(format!(
                "width {} exceeds 64 bits",
                width
            )));
        }
        self.ensure(width)?;
        let mut value = 0u64;
        for _ in 0..width {
            value = value << 1 | u64::from(self.bits.bits[self.position]);
            self.position += 1;
        }
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_unsigned(1)? == 1)
    }

    pub fn read_bits(&mut self, width: usize) -> Result<Bitset> {
        self.ensure(width)?;
        let bits = self
            .bits
            .bits
            .range(self.position..self.position + width)
            .copied()
            .collect();
        self.position += width;
        Ok(Bitset { bits })
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.ensure(count * 8)?;
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.read_unsigned(8)? as u8);
        }
        Ok(bytes)
    }
}
