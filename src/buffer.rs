/// Growable byte buffer holding the code of the method being generated.
///
/// The write position is always the buffer length. Writes at an explicit offset
/// only touch bytes already written and never move the position.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
}

const INITIAL_CAPACITY: usize = 1500;

impl CodeBuffer {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_at(&self, pos: usize) -> Option<u8> {
        self.bytes.get(pos).copied()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Drops every byte at or after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    fn ensure_capacity(&mut self, additional: usize) {
        let required = self.bytes.len() + additional;
        let capacity = self.bytes.capacity();
        if required <= capacity {
            return;
        }
        let mut grown = capacity * 2;
        if grown < required {
            grown = required + capacity;
        }
        self.bytes.reserve_exact(grown - self.bytes.len());
    }

    pub fn write_u1(&mut self, value: u8) {
        self.ensure_capacity(1);
        self.bytes.push(value);
    }

    pub fn write_i1(&mut self, value: i8) {
        self.write_u1(value as u8);
    }

    pub fn write_u2(&mut self, value: u16) {
        self.ensure_capacity(2);
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i2(&mut self, value: i16) {
        self.write_u2(value as u16);
    }

    pub fn write_i4(&mut self, value: i32) {
        self.ensure_capacity(4);
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.ensure_capacity(count);
        self.bytes.resize(self.bytes.len() + count, 0);
    }

    /// Overwrites two already written bytes. Returns `false` if `pos` is out of range.
    pub fn write_i2_at(&mut self, pos: usize, value: i16) -> bool {
        match self.bytes.get_mut(pos..pos + 2) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_be_bytes());
                true
            }
            None => false,
        }
    }

    /// Overwrites four already written bytes. Returns `false` if `pos` is out of range.
    pub fn write_i4_at(&mut self, pos: usize, value: i32) -> bool {
        match self.bytes.get_mut(pos..pos + 4) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_be_bytes());
                true
            }
            None => false,
        }
    }

    /// Exact copy of the bytes written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_writes() {
        let mut buffer = CodeBuffer::new();
        buffer.write_u1(0x10);
        buffer.write_i2(-2);
        buffer.write_i4(0x01020304);
        assert_eq!(
            buffer.as_slice(),
            &[0x10, 0xFF, 0xFE, 0x01, 0x02, 0x03, 0x04]
        );
        assert_eq!(buffer.position(), 7);
    }

    #[test]
    fn test_patch_in_place_does_not_move_position() {
        let mut buffer = CodeBuffer::new();
        buffer.write_zeros(6);
        assert!(buffer.write_i2_at(1, 0x0102));
        assert!(buffer.write_i4_at(2, -1));
        assert!(!buffer.write_i4_at(4, 0));
        assert_eq!(buffer.position(), 6);
        assert_eq!(buffer.contents(), vec![0, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_growth_beyond_initial_capacity() {
        let mut buffer = CodeBuffer::new();
        for i in 0..(INITIAL_CAPACITY * 3) {
            buffer.write_u1(i as u8);
        }
        assert_eq!(buffer.position(), INITIAL_CAPACITY * 3);
        assert_eq!(buffer.byte_at(INITIAL_CAPACITY + 1), Some((INITIAL_CAPACITY + 1) as u8));
        buffer.truncate(2);
        assert_eq!(buffer.contents(), vec![0, 1]);
    }
}
