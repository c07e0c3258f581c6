/// Fixed-capacity circular buffer used for the debounce histories
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    // Buffer of readings
    buffer: Vec<T>,

    // The next position to write in the circular buffer, once it is full
    ptr: usize,

    // The length of this circular buffer (once it is fully populated)
    capacity: usize,
}

impl<T> CircularBuffer<T>
where
    T: Clone,
{
    /// Create a new circular buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            buffer: Vec::with_capacity(capacity),
            ptr: 0,
            capacity,
        }
    }

    /// Push a new element into the circular buffer.  Once the buffer is full
    /// the oldest element is overwritten and handed back to the caller, so
    /// running tallies can be kept without rescanning the buffer.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.buffer.len() < self.capacity {
            self.buffer.push(value);
            None
        } else {
            let evicted = std::mem::replace(&mut self.buffer[self.ptr], value);
            self.ptr = (self.ptr + 1) % self.capacity;
            Some(evicted)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// If the circular buffer is full then get an immutable reference to the
    /// contained buffer.  If the circular buffer is not yet full then None is
    /// returned.  Slots that were never written count as unknown, so callers
    /// that need a verdict over the whole window use this.
    pub fn buffer(&self) -> Option<&[T]> {
        if self.is_full() {
            Some(&self.buffer)
        } else {
            None
        }
    }
}
