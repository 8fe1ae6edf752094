use smallvec::SmallVec;

/// Binary key whose byte order matches the order of its components.
///
/// Signed integers are stored big-endian with the sign bit flipped so that
/// negative values sort before positive ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueBoxKey {
    bytes: SmallVec<[u8; 32]>,
}

impl ValueBoxKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: SmallVec::from_slice(bytes),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.bytes.push(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        let shifted = (value as u32) ^ 0x8000_0000;
        self.bytes.extend_from_slice(&shifted.to_be_bytes());
        self
    }

    pub fn i64(mut self, value: i64) -> Self {
        let shifted = (value as u64) ^ 0x8000_0000_0000_0000;
        self.bytes.extend_from_slice(&shifted.to_be_bytes());
        self
    }

    /// Raw trailing component; must be the last one pushed.
    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.bytes.extend_from_slice(value);
        self
    }

    /// Terminated string component, safe to follow with further components.
    pub fn string(mut self, value: &str) -> Self {
        for byte in value.as_bytes() {
            if *byte == 0 {
                // Escape interior nulls so the terminator stays unambiguous.
                self.bytes.extend_from_slice(&[0x00, 0xFF]);
            } else {
                self.bytes.push(*byte);
            }
        }
        self.bytes.push(0x00);
        self
    }

    /// Smallest key greater than every key starting with `self`.
    pub fn successor(&self) -> ValueBoxKey {
        let mut next = self.bytes.clone();
        for i in (0..next.len()).rev() {
            if next[i] != 0xFF {
                next[i] += 1;
                next.truncate(i + 1);
                return ValueBoxKey { bytes: next };
            }
        }
        // All bytes saturated: extend instead so the result still sorts above.
        next.push(0xFF);
        ValueBoxKey { bytes: next }
    }

    pub fn reader(&self) -> KeyReader<'_> {
        KeyReader {
            bytes: &self.bytes,
            offset: 0,
        }
    }
}

/// Sequential decoder for keys built with `ValueBoxKey`.
///
/// Reading past the end yields zeroes; callers only decode keys they built.
pub struct KeyReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl KeyReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let end = (self.offset + N).min(self.bytes.len());
        let available = end.saturating_sub(self.offset);
        out[..available].copy_from_slice(&self.bytes[self.offset..end]);
        self.offset += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_be_bytes(self.take::<2>())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_be_bytes(self.take::<4>())
    }

    pub fn i32(&mut self) -> i32 {
        (u32::from_be_bytes(self.take::<4>()) ^ 0x8000_0000) as i32
    }

    pub fn i64(&mut self) -> i64 {
        (u64::from_be_bytes(self.take::<8>()) ^ 0x8000_0000_0000_0000) as i64
    }

    pub fn rest(&mut self) -> &[u8] {
        let start = self.offset.min(self.bytes.len());
        self.offset = self.bytes.len();
        &self.bytes[start..]
    }

    pub fn string(&mut self) -> String {
        let mut out = Vec::new();
        while self.offset < self.bytes.len() {
            let byte = self.bytes[self.offset];
            self.offset += 1;
            if byte == 0 {
                if self.bytes.get(self.offset) == Some(&0xFF) {
                    out.push(0);
                    self.offset += 1;
                    continue;
                }
                break;
            }
            out.push(byte);
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::ValueBoxKey;

    #[test]
    fn integer_order_is_preserved() {
        let a = ValueBoxKey::new().i32(-1);
        let b = ValueBoxKey::new().i32(0);
        let c = ValueBoxKey::new().i32(42);
        assert!(a < b);
        assert!(b < c);
        let d = ValueBoxKey::new().i64(i64::MIN);
        let e = ValueBoxKey::new().i64(-3);
        assert!(d < e);
    }

    #[test]
    fn composite_order_is_lexicographic() {
        let a = ValueBoxKey::new().i64(1).i32(5);
        let b = ValueBoxKey::new().i64(1).i32(6);
        let c = ValueBoxKey::new().i64(2).i32(-100);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn components_round_trip_through_reader() {
        let key = ValueBoxKey::new().i64(-9).u8(3).string("a\0b").i32(-2).u32(7);
        let mut reader = key.reader();
        assert_eq!(reader.i64(), -9);
        assert_eq!(reader.u8(), 3);
        assert_eq!(reader.string(), "a\0b");
        assert_eq!(reader.i32(), -2);
        assert_eq!(reader.u32(), 7);
        assert!(reader.rest().is_empty());
    }

    #[test]
    fn successor_bounds_every_extension() {
        let prefix = ValueBoxKey::new().i64(7);
        let next = prefix.successor();
        assert!(prefix.clone().i32(i32::MAX) < next);
        assert!(ValueBoxKey::new().i64(8) >= next);
        let saturated = ValueBoxKey::from_bytes(&[0xFF, 0xFF]);
        assert!(saturated < saturated.successor());
        let key = ValueBoxKey::from_bytes(&[0x10, 0xAA, 0x00]);
        assert_eq!(key.successor().as_slice(), &[0x10, 0xAA, 0x01]);
    }
}
