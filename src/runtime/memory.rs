use crate::bytecode::ir::Address;
use crate::runtime::runtime_error::{
    RuntimeError, locals_overflow, out_of_arena, store_into_constant,
};

/// A window of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub base: usize,
    pub len: usize,
}

/// One word arena: constants, then globals, then the locals region that
/// frames are carved from, stack-wise.
#[derive(Debug)]
pub struct Memory {
    words: Vec<u32>,
    constants: Segment,
    globals: Segment,
    locals_top: usize,
}

impl Memory {
    pub fn new(constants: &[u32], globals: &[u32], locals_words: usize) -> Self {
        let mut words = Vec::with_capacity(constants.len() + globals.len() + locals_words);
        words.extend_from_slice(constants);
        words.extend_from_slice(globals);
        let locals_top = words.len();
        words.resize(locals_top + locals_words, 0);
        Self {
            words,
            constants: Segment {
                base: 0,
                len: constants.len(),
            },
            globals: Segment {
                base: constants.len(),
                len: globals.len(),
            },
            locals_top,
        }
    }

    /// Carve a zeroed frame from the locals region.
    pub fn push_frame(&mut self, slots: usize) -> Result<Segment, RuntimeError> {
        let free = self.words.len() - self.locals_top;
        if slots > free {
            return Err(locals_overflow(slots, free));
        }
        let frame = Segment {
            base: self.locals_top,
            len: slots,
        };
        self.words[frame.base..frame.base + slots].fill(0);
        self.locals_top += slots;
        Ok(frame)
    }

    /// Release `frame` and everything carved after it.
    pub fn pop_frame(&mut self, frame: Segment) {
        self.locals_top = frame.base;
    }

    /// Arena index of a segment slot.
    pub fn absolute(&self, address: Address, frame: Segment) -> usize {
        let (segment, n) = match address {
            Address::Const(n) => (self.constants, n),
            Address::Global(n) => (self.globals, n),
            Address::Local(n) => (frame, n),
        };
        debug_assert!((n as usize) < segment.len, "{} outside its segment", address);
        segment.base + n as usize
    }

    pub fn load(&self, address: Address, frame: Segment) -> Result<u32, RuntimeError> {
        self.read(self.absolute(address, frame) as i64)
    }

    pub fn store(&mut self, address: Address, frame: Segment, value: u32) -> Result<(), RuntimeError> {
        self.write(self.absolute(address, frame) as i64, value)
    }

    /// Read through a pointer.
    pub fn read(&self, index: i64) -> Result<u32, RuntimeError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.words.get(i))
            .copied()
            .ok_or_else(|| out_of_arena(index))
    }

    /// Write through a pointer. Constants are read-only.
    pub fn write(&mut self, index: i64, value: u32) -> Result<(), RuntimeError> {
        let i = usize::try_from(index).map_err(|_| out_of_arena(index))?;
        if i < self.constants.len {
            return Err(store_into_constant(i));
        }
        let slot = self.words.get_mut(i).ok_or_else(|| out_of_arena(index))?;
        *slot = value;
        Ok(())
    }

    /// Read the byte at `index`, counted in bytes from the arena start.
    /// Words hold their bytes little-endian.
    pub fn read_byte(&self, index: i64) -> Result<u8, RuntimeError> {
        let word = self
            .read(index.div_euclid(4))
            .map_err(|_| out_of_arena(index))?;
        Ok(word.to_le_bytes()[index.rem_euclid(4) as usize])
    }

    /// Replace one byte, leaving the rest of its word alone.
    pub fn write_byte(&mut self, index: i64, value: u8) -> Result<(), RuntimeError> {
        let at = index.div_euclid(4);
        let mut bytes = self.read(at).map_err(|_| out_of_arena(index))?.to_le_bytes();
        bytes[index.rem_euclid(4) as usize] = value;
        self.write(at, u32::from_le_bytes(bytes))
    }

    pub fn globals(&self) -> &[u32] {
        &self.words[self.globals.base..self.globals.base + self.globals.len]
    }
}
