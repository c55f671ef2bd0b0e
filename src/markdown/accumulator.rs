//! Bounded-growth body buffer. Collects upstream body chunks
//! ahead of conversion with a hard size ceiling and geometric growth so a
//! single huge `Content-Length` can't force one giant allocation up front.

pub const MIN_INITIAL_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Owns the backing store for one request's buffered body. Releases it on
/// `Drop` regardless of which exit path the request takes — normal
/// completion, an error, or an aborted future on client disconnect.
pub struct Accumulator {
    data: Vec<u8>,
    max_size: u64,
}

impl Accumulator {
    /// `required` is an optional `Content-Length` hint used to pre-size the
    /// first allocation: `max(MIN_INITIAL_CAPACITY, required)`, capped at
    /// `max_size`.
    pub fn new(max_size: u64, required_hint: Option<u64>) -> Self {
        let first = required_hint
            .unwrap_or(0)
            .max(MIN_INITIAL_CAPACITY as u64)
            .min(max_size);
        Self {
            data: Vec::with_capacity(first as usize),
            max_size,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn capacity(&self) -> u64 {
        self.data.capacity() as u64
    }

    /// Grow capacity up to `min(hint, max_size)` ahead of an `append`, to
    /// avoid repeated reallocation when the final size is known in advance.
    pub fn reserve(&mut self, hint: u64) {
        let target = hint.min(self.max_size);
        if target > self.capacity() {
            let additional = target - self.size();
            self.data.reserve(additional as usize);
        }
    }

    /// Append a chunk, growing geometrically (doubling, capped at
    /// `max_size`) when the current capacity is insufficient. Fails without
    /// a partial append iff `size + data.len() > max_size`.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), Overflow> {
        let new_size = self.size() + chunk.len() as u64;
        if new_size > self.max_size {
            return Err(Overflow);
        }

        if new_size > self.capacity() {
            let doubled = (self.capacity().max(MIN_INITIAL_CAPACITY as u64) * 2).min(self.max_size);
            let target = doubled.max(new_size);
            self.data.reserve((target - self.size()) as usize);
        }

        self.data.extend_from_slice(chunk);
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_within_limit_succeeds() {
        let mut acc = Accumulator::new(1024, None);
        assert!(acc.append(b"hello").is_ok());
        assert_eq!(acc.size(), 5);
    }

    #[test]
    fn append_exactly_at_max_size_succeeds() {
        let mut acc = Accumulator::new(10, None);
        assert!(acc.append(&[0u8; 10]).is_ok());
        assert_eq!(acc.size(), 10);
    }

    #[test]
    fn append_exceeding_max_size_overflows() {
        let mut acc = Accumulator::new(10, None);
        assert_eq!(acc.append(&[0u8; 11]), Err(Overflow));
        assert_eq!(acc.size(), 0, "overflowing append must not partially apply");
    }

    #[test]
    fn sequential_appends_respect_ceiling() {
        let mut acc = Accumulator::new(10, None);
        assert!(acc.append(&[0u8; 6]).is_ok());
        assert_eq!(acc.append(&[0u8; 6]), Err(Overflow));
        assert_eq!(acc.size(), 6);
    }

    #[test]
    fn reserve_caps_at_max_size() {
        let mut acc = Accumulator::new(100, None);
        acc.reserve(10_000);
        assert!(acc.capacity() <= 100);
    }

    #[test]
    fn initial_capacity_honors_content_length_hint() {
        let acc = Accumulator::new(10 * 1024 * 1024, Some(1_000_000));
        assert!(acc.capacity() >= 1_000_000);
    }

    #[test]
    fn small_content_length_hint_floors_at_min_capacity() {
        let acc = Accumulator::new(10 * 1024 * 1024, Some(10));
        assert!(acc.capacity() >= MIN_INITIAL_CAPACITY as u64);
    }
}
