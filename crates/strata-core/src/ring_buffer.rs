//! Single-producer / single-consumer ring buffer over contiguous memory.
//!
//! Any element count works (no power-of-two requirement). Indices run over
//! `[0, 2 * capacity)` so a full buffer is distinguishable from an empty one
//! without sacrificing a slot.
//!
//! The unsplit [`RingBuffer`] is for single-thread use and is the only place
//! where [`reset`](RingBuffer::reset) and [`set`](RingBuffer::set) exist.
//! Once [`split`](RingBuffer::split), exactly one thread owns the
//! [`RingProducer`] and one owns the [`RingConsumer`].

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared<T> {
    buf: Box<[UnsafeCell<T>]>,
    capacity: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// SAFETY: the producer only touches the vacant region and the consumer only
// touches the occupied region; the two never overlap because each side
// publishes its index with Release after it finishes with the memory.
unsafe impl<T: Send> Sync for Shared<T> {}
unsafe impl<T: Send> Send for Shared<T> {}

impl<T: Copy> Shared<T> {
    #[inline]
    fn wrap(&self, index: usize) -> usize {
        if index >= 2 * self.capacity {
            index - 2 * self.capacity
        } else {
            index
        }
    }

    #[inline]
    fn occupied(&self, write: usize, read: usize) -> usize {
        self.wrap(write + 2 * self.capacity - read)
    }

    #[inline]
    fn read_space(&self) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        self.occupied(w, r)
    }

    #[inline]
    fn write_space(&self) -> usize {
        self.capacity - self.read_space()
    }

    #[inline]
    fn base(&self) -> *mut T {
        // UnsafeCell<T> is repr(transparent) over T
        self.buf.as_ptr() as *mut T
    }

    /// Two segments of `len` elements starting at physical index of `index`.
    #[inline]
    fn segments(&self, index: usize, len: usize) -> (usize, usize, usize) {
        let phys = index % self.capacity;
        let first = len.min(self.capacity - phys);
        (phys, first, len - first)
    }

    fn write_from(&self, src: &[T]) -> usize {
        let w = self.write.load(Ordering::Relaxed);
        let r = self.read.load(Ordering::Acquire);
        let n = src.len().min(self.capacity - self.occupied(w, r));
        if n == 0 {
            return 0;
        }
        let (phys, first, second) = self.segments(w, n);
        // SAFETY: [w, w + n) is vacant and owned by the producer.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(phys), first);
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), self.base(), second);
        }
        self.write.store(self.wrap(w + n), Ordering::Release);
        n
    }

    fn copy_out(&self, dst: &mut [T], advance: bool) -> usize {
        let r = self.read.load(Ordering::Relaxed);
        let w = self.write.load(Ordering::Acquire);
        let n = dst.len().min(self.occupied(w, r));
        if n == 0 {
            return 0;
        }
        let (phys, first, second) = self.segments(r, n);
        // SAFETY: [r, r + n) is occupied and owned by the consumer.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(phys), dst.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(self.base(), dst.as_mut_ptr().add(first), second);
        }
        if advance {
            self.read.store(self.wrap(r + n), Ordering::Release);
        }
        n
    }

    fn advance_read(&self, n: usize) -> usize {
        let r = self.read.load(Ordering::Relaxed);
        let w = self.write.load(Ordering::Acquire);
        let n = n.min(self.occupied(w, r));
        self.read.store(self.wrap(r + n), Ordering::Release);
        n
    }

    fn advance_write(&self, n: usize) -> usize {
        let w = self.write.load(Ordering::Relaxed);
        let r = self.read.load(Ordering::Acquire);
        let n = n.min(self.capacity - self.occupied(w, r));
        self.write.store(self.wrap(w + n), Ordering::Release);
        n
    }
}

/// Fixed-capacity circular buffer, not yet split between threads.
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a buffer holding `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shared: Arc::new(Shared {
                buf,
                capacity,
                write: AtomicUsize::new(0),
                read: AtomicUsize::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn read_space(&self) -> usize {
        self.shared.read_space()
    }

    pub fn write_space(&self) -> usize {
        self.shared.write_space()
    }

    pub fn write(&mut self, src: &[T]) -> usize {
        self.shared.write_from(src)
    }

    pub fn read(&mut self, dst: &mut [T]) -> usize {
        self.shared.copy_out(dst, true)
    }

    pub fn peek(&self, dst: &mut [T]) -> usize {
        self.shared.copy_out(dst, false)
    }

    /// Discard all content. Requires exclusive access.
    pub fn reset(&mut self) {
        self.shared.write.store(0, Ordering::Release);
        self.shared.read.store(0, Ordering::Release);
    }

    /// Fill every element with `value` and reset to empty.
    pub fn set(&mut self, value: T) {
        for cell in self.shared.buf.iter() {
            // SAFETY: &mut self guarantees no producer/consumer exists yet.
            unsafe { *cell.get() = value };
        }
        self.reset();
    }

    /// Split into the producer and consumer halves.
    pub fn split(self) -> (RingProducer<T>, RingConsumer<T>) {
        (
            RingProducer {
                shared: Arc::clone(&self.shared),
            },
            RingConsumer {
                shared: self.shared,
            },
        )
    }
}

/// Writing half. Owned by exactly one thread.
pub struct RingProducer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> RingProducer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    #[inline]
    pub fn write_space(&self) -> usize {
        self.shared.write_space()
    }

    #[inline]
    pub fn read_space(&self) -> usize {
        self.shared.read_space()
    }

    /// Copy as many elements of `src` as fit. Returns the count written.
    #[inline]
    pub fn write(&mut self, src: &[T]) -> usize {
        self.shared.write_from(src)
    }

    /// Push a single element, returning `false` when full.
    #[inline]
    pub fn push(&mut self, value: T) -> bool {
        self.shared.write_from(std::slice::from_ref(&value)) == 1
    }

    /// Vacant region as two slices for zero-copy production.
    /// Follow with [`commit_write`](Self::commit_write).
    pub fn write_vector(&mut self) -> (&mut [T], &mut [T]) {
        let shared = &*self.shared;
        let w = shared.write.load(Ordering::Relaxed);
        let r = shared.read.load(Ordering::Acquire);
        let vacant = shared.capacity - shared.occupied(w, r);
        let (phys, first, second) = shared.segments(w, vacant);
        // SAFETY: the vacant region belongs to the producer until committed,
        // and &mut self prevents handing it out twice.
        unsafe {
            (
                std::slice::from_raw_parts_mut(shared.base().add(phys), first),
                std::slice::from_raw_parts_mut(shared.base(), second),
            )
        }
    }

    /// Publish `n` elements previously filled through `write_vector`.
    pub fn commit_write(&mut self, n: usize) -> usize {
        self.shared.advance_write(n)
    }
}

/// Reading half. Owned by exactly one thread.
pub struct RingConsumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> RingConsumer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    #[inline]
    pub fn read_space(&self) -> usize {
        self.shared.read_space()
    }

    #[inline]
    pub fn write_space(&self) -> usize {
        self.shared.write_space()
    }

    #[inline]
    pub fn read(&mut self, dst: &mut [T]) -> usize {
        self.shared.copy_out(dst, true)
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let mut slot = [self.peek_one()?];
        self.shared.copy_out(&mut slot, true);
        Some(slot[0])
    }

    #[inline]
    pub fn peek(&self, dst: &mut [T]) -> usize {
        self.shared.copy_out(dst, false)
    }

    fn peek_one(&self) -> Option<T> {
        if self.shared.read_space() == 0 {
            return None;
        }
        let r = self.shared.read.load(Ordering::Relaxed);
        // SAFETY: at least one occupied element at r.
        Some(unsafe { *self.shared.base().add(r % self.shared.capacity) })
    }

    /// Occupied region as two slices. Follow with [`commit_read`](Self::commit_read).
    pub fn read_vector(&self) -> (&[T], &[T]) {
        let shared = &*self.shared;
        let r = shared.read.load(Ordering::Relaxed);
        let w = shared.write.load(Ordering::Acquire);
        let (phys, first, second) = shared.segments(r, shared.occupied(w, r));
        // SAFETY: the occupied region is stable until the consumer advances.
        unsafe {
            (
                std::slice::from_raw_parts(shared.base().add(phys), first),
                std::slice::from_raw_parts(shared.base(), second),
            )
        }
    }

    /// Release `n` elements seen through `read_vector`.
    pub fn commit_read(&mut self, n: usize) -> usize {
        self.shared.advance_read(n)
    }

    /// Drop everything currently readable.
    pub fn skip_all(&mut self) -> usize {
        self.shared.advance_read(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn test_write_read_basic() {
        let mut rb = RingBuffer::<f32>::new(5);
        assert_eq!(rb.write_space(), 5);
        assert_eq!(rb.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(rb.read_space(), 3);

        let mut out = [0.0; 2];
        assert_eq!(rb.read(&mut out), 2);
        assert_eq!(out, [1.0, 2.0]);

        // wraps around the end of a non power-of-two buffer
        assert_eq!(rb.write(&[4.0, 5.0, 6.0, 7.0, 8.0]), 4);
        let mut out = [0.0; 5];
        assert_eq!(rb.read(&mut out), 5);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_full_buffer_uses_every_slot() {
        let mut rb = RingBuffer::<u32>::new(3);
        assert_eq!(rb.write(&[1, 2, 3, 4]), 3);
        assert_eq!(rb.write_space(), 0);
        assert_eq!(rb.read_space(), 3);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut rb = RingBuffer::<u32>::new(4);
        rb.write(&[7, 8]);
        let mut out = [0; 2];
        assert_eq!(rb.peek(&mut out), 2);
        assert_eq!(rb.read_space(), 2);
    }

    #[test]
    fn test_set_and_reset() {
        let mut rb = RingBuffer::<f32>::new(4);
        rb.write(&[1.0, 2.0]);
        rb.set(0.5);
        assert_eq!(rb.read_space(), 0);
        assert_eq!(rb.write_space(), 4);
    }

    #[test]
    fn test_vectors_two_segments() {
        let (mut prod, mut cons) = RingBuffer::<u32>::new(4).split();
        prod.write(&[1, 2, 3]);
        let mut out = [0; 2];
        cons.read(&mut out);

        let (a, b) = prod.write_vector();
        assert_eq!(a.len() + b.len(), 3);
        assert_eq!(a.len(), 1);
        a[0] = 4;
        b[0] = 5;
        b[1] = 6;
        assert_eq!(prod.commit_write(3), 3);

        let (a, b) = cons.read_vector();
        let seen: Vec<u32> = a.iter().chain(b.iter()).copied().collect();
        assert_eq!(seen, vec![3, 4, 5, 6]);
        assert_eq!(cons.commit_read(4), 4);
        assert_eq!(cons.read_space(), 0);
    }

    #[test]
    fn test_push_pop_and_skip() {
        let (mut prod, mut cons) = RingBuffer::<u8>::new(2).split();
        assert!(prod.push(1));
        assert!(prod.push(2));
        assert!(!prod.push(3));
        assert_eq!(cons.pop(), Some(1));
        assert_eq!(cons.skip_all(), 1);
        assert_eq!(cons.pop(), None);
    }

    #[test]
    fn test_threaded_transfer_preserves_order() {
        let (mut prod, mut cons) = RingBuffer::<u32>::new(7).split();
        const TOTAL: u32 = 50_000;

        let writer = std::thread::spawn(move || {
            let mut next = 0;
            while next < TOTAL {
                let chunk: Vec<u32> = (next..(next + 5).min(TOTAL)).collect();
                let n = prod.write(&chunk);
                next += n as u32;
                if n == 0 {
                    std::thread::yield_now();
                }
            }
        });

        let mut expected = 0;
        let mut buf = [0u32; 3];
        while expected < TOTAL {
            let n = cons.read(&mut buf);
            for &v in &buf[..n] {
                assert_eq!(v, expected);
                expected += 1;
            }
            if n == 0 {
                std::thread::yield_now();
            }
        }
        writer.join().unwrap();
    }

    proptest! {
        #[test]
        fn prop_matches_fifo_model(
            capacity in 1usize..17,
            ops in proptest::collection::vec((any::<bool>(), 0usize..9), 1..64)
        ) {
            let mut rb = RingBuffer::<u32>::new(capacity);
            let mut model = VecDeque::new();
            let mut counter = 0u32;

            for (is_write, n) in ops {
                if is_write {
                    let src: Vec<u32> = (counter..counter + n as u32).collect();
                    let written = rb.write(&src);
                    prop_assert_eq!(written, n.min(capacity - model.len()));
                    model.extend(src[..written].iter().copied());
                    counter += written as u32;
                } else {
                    let mut dst = vec![0u32; n];
                    let read = rb.read(&mut dst);
                    prop_assert_eq!(read, n.min(model.len()));
                    for v in &dst[..read] {
                        prop_assert_eq!(Some(*v), model.pop_front());
                    }
                }
                prop_assert_eq!(rb.read_space(), model.len());
                prop_assert_eq!(rb.write_space(), capacity - model.len());
            }
        }
    }
}
