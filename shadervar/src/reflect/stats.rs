//! Instruction count statistics

use super::container::read_u32;
use crate::Result;
use std::fmt;

// Dword indices in the STAT chunk
const STAT_INSTRUCTION_COUNT: usize = 0;
const STAT_FLOAT_INSTRUCTIONS: usize = 4;
const STAT_INT_INSTRUCTIONS: usize = 5;
const STAT_UINT_INSTRUCTIONS: usize = 6;
const STAT_TEXTURE_NORMAL: usize = 14;
const STAT_TEXTURE_GRADIENT: usize = 18;

/// Marker preceding the instruction slot total in a compiler listing
const LISTING_MARKER: &str = "// approximately";

/// Instruction counts of a compiled shader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstructionCounts {
    pub total: u32,
    /// Arithmetic instructions
    pub alu: u32,
    /// Texture instructions
    pub texture: u32,
}

impl InstructionCounts {
    fn new(total: u32, alu: u32, texture: u32) -> Self {
        InstructionCounts { total, alu, texture }
    }

    /// Instructions that are neither arithmetic nor texture (flow control, moves, ...).
    pub fn other(&self) -> u32 {
        self.total.saturating_sub(self.alu.saturating_add(self.texture))
    }

    /// Reads counts from the data of a DXBC `STAT` chunk.
    pub fn from_stat_chunk(data: &[u8]) -> Result<Self> {
        let dword = |index: usize| read_u32(data, index * 4);

        let total = dword(STAT_INSTRUCTION_COUNT)?;
        let alu = dword(STAT_FLOAT_INSTRUCTIONS)?
            .saturating_add(dword(STAT_INT_INSTRUCTIONS)?)
            .saturating_add(dword(STAT_UINT_INSTRUCTIONS)?);

        let mut texture = 0u32;
        for index in STAT_TEXTURE_NORMAL..=STAT_TEXTURE_GRADIENT {
            texture = texture.saturating_add(dword(index)?);
        }

        Ok(InstructionCounts::new(total, alu, texture))
    }

    /// Parses the slot summary line of a legacy compiler listing:
    ///
    /// `// approximately 12 instruction slots used (3 texture, 9 arithmetic)`
    ///
    /// If only the total is present, every slot is counted as arithmetic.
    pub fn from_listing(listing: &str) -> Option<Self> {
        let line = listing.lines().find_map(|line| {
            let start = line.find(LISTING_MARKER)?;
            Some(&line[start + LISTING_MARKER.len()..])
        })?;

        let numbers: Vec<u32> = line
            .split(|c: char| !c.is_ascii_digit())
            .filter(|token| !token.is_empty())
            .filter_map(|token| token.parse().ok())
            .collect();

        match numbers.as_slice() {
            [] => None,
            [total] => Some(InstructionCounts::new(*total, *total, 0)),
            [total, texture, alu, ..] => Some(InstructionCounts::new(*total, *alu, *texture)),
            [total, _] => Some(InstructionCounts::new(*total, *total, 0)),
        }
    }
}

impl fmt::Display for InstructionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} ALU, {} texture, {} other",
            self.total,
            self.alu,
            self.texture,
            self.other()
        )
    }
}
