//! Fixed-capacity ring buffer

/// Fixed-capacity FIFO ring buffer.
///
/// One slot is sacrificed as the full/empty discriminator, so a buffer
/// constructed with `size` holds at most `size - 1` values. Both
/// operations are O(1) and allocation-free; [`Queue`](crate::Queue)
/// layers growth on top.
#[derive(Debug)]
pub struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    write_pos: usize,
    read_pos: usize,
}

impl<T> CircularBuffer<T> {
    /// Create a buffer with `size` slots (`size - 1` usable).
    ///
    /// # Panics
    /// Panics if `size < 2`: a smaller ring cannot hold any value.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size >= 2, "ring buffer needs at least 2 slots");
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || None);
        Self {
            slots,
            write_pos: 0,
            read_pos: 0,
        }
    }

    /// Number of values the buffer can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// True when a `write` would fail.
    #[must_use]
    pub fn is_full(&self) -> bool {
        (self.write_pos + 1) % self.slots.len() == self.read_pos
    }

    /// True when a `read` would return `None`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.write_pos == self.read_pos
    }

    /// Append a value.
    ///
    /// Returns the value back unchanged when the buffer is full, leaving
    /// the buffer state untouched.
    pub fn write(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        self.slots[self.write_pos] = Some(value);
        self.write_pos = (self.write_pos + 1) % self.slots.len();
        Ok(())
    }

    /// Remove and return the oldest value, or `None` when empty.
    ///
    /// The slot is vacated so the buffer never retains a read value.
    pub fn read(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.read_pos].take();
        self.read_pos = (self.read_pos + 1) % self.slots.len();
        value
    }
}
