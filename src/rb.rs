use core::{
    cell::{RefCell, UnsafeCell},
    future::{poll_fn, Future},
    mem::MaybeUninit,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering::{Relaxed, Acquire, Release}},
    task::{
        Poll::{Pending, Ready},
        Waker,
    },
};

use critical_section::Mutex;

// Push at HEAD, pop at TAIL
pub struct Ringbuf<T, const N: usize> {
    is_split: AtomicBool,
    head: AtomicUsize,
    tail: AtomicUsize,
    consumer_waker: Mutex<RefCell<Option<Waker>>>,
    buf: [UnsafeCell<MaybeUninit<T>>; N],
}

// SAFETY: The safety guarantees within later unsafe blocks in this implementation
// allow us to safely share the UnsafeCells over thread boundaries.
unsafe impl<T, const N: usize> Sync for Ringbuf<T, N> {}

impl<T, const N: usize> Default for Ringbuf<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Ringbuf<T, N> {
    pub const fn new() -> Self {
        Self {
            is_split: AtomicBool::new(false),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            consumer_waker: Mutex::new(RefCell::new(None)),
            // SAFETY: This array only contains MaybeUninits, which are sound to
            // have hold an uninit value
            #[allow(clippy::uninit_assumed_init)]
            buf: unsafe { MaybeUninit::uninit().assume_init() },
        }
    }

    /// ## Safety
    /// Must only be called once, as only one Producer and Consumer may
    /// exist per Ringbuf.
    pub unsafe fn split(&'static self) -> (Producer<T, N>, Consumer<T, N>) {
        self.is_split.store(true, Relaxed);
        (Producer(self), Consumer(self))
    }

    pub fn try_split(&'static self) -> Option<(Producer<T, N>, Consumer<T, N>)> {
        if self.is_split.fetch_or(true, Relaxed) {
            None
        } else {
            // SAFETY: We have just checked to ensure that this Ringbuf has not
            // been split.
            Some(unsafe { self.split() })
        }
    }

    fn len(&self) -> usize {
        self.head.load(Acquire).wrapping_sub(self.tail.load(Acquire))
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() == N
    }
}

pub struct Consumer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Consumer<T, N> {
    pub fn try_read(&self) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            // SAFETY: The buffer is not empty, and could not have become empty since
            // we checked it because only one Consumer may exist.
            let val = unsafe {
                self.0.buf[self.0.tail.load(Acquire) % N]
                    .get()
                    .read()
                    .assume_init()
            };
            self.0.tail.fetch_add(1, Release);
            Some(val)
        }
    }

    /// Waits for the next value. The waker is registered before the buffer is
    /// checked again, so a write landing in between still wakes the task.
    pub fn async_read(&self) -> impl Future<Output = T> + '_ {
        poll_fn(|ctx| {
            if let Some(val) = self.try_read() {
                return Ready(val);
            }
            critical_section::with(|cs| {
                *self.0.consumer_waker.borrow_ref_mut(cs) = Some(ctx.waker().clone())
            });
            match self.try_read() {
                Some(val) => Ready(val),
                None => Pending,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Producer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Producer<T, N> {
    /// Hands the value back when the buffer is full.
    pub fn try_write(&self, val: T) -> Result<(), T> {
        if self.is_full() {
            Err(val)
        } else {
            // SAFETY: The buffer is not full, and could not have become full since
            // we checked it because only one Producer may exist.
            unsafe {
                (*self.0.buf[self.0.head.load(Acquire) % N].get()).write(val);
            }
            self.0.head.fetch_add(1, Release);

            if let Some(waker) =
                critical_section::with(|cs| self.0.consumer_waker.borrow_ref_mut(cs).take())
            {
                waker.wake();
            }
            Ok(())
        }
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{
        pin::pin,
        task::{Context, Poll},
    };
    use std::{sync::Arc, task::Wake};

    fn leak<const N: usize>() -> &'static Ringbuf<u8, N> {
        Box::leak(Box::new(Ringbuf::new()))
    }

    #[derive(Default)]
    struct Flag(AtomicBool);

    impl Wake for Flag {
        fn wake(self: Arc<Self>) {
            self.0.store(true, Relaxed);
        }
    }

    #[test]
    fn splits_once() {
        let rb = leak::<4>();
        assert!(rb.try_split().is_some());
        assert!(rb.try_split().is_none());
    }

    #[test]
    fn fifo_order_and_capacity() {
        let (tx, rx) = leak::<4>().try_split().unwrap();
        assert!(rx.is_empty());
        for b in 1..=4 {
            assert_eq!(tx.try_write(b), Ok(()));
        }
        assert!(tx.is_full());
        assert_eq!(tx.try_write(5), Err(5));
        assert_eq!(rx.len(), 4);
        assert_eq!(rx.try_read(), Some(1));
        assert_eq!(tx.try_write(5), Ok(()));
        let drained: Vec<u8> = core::iter::from_fn(|| rx.try_read()).collect();
        assert_eq!(drained, [2, 3, 4, 5]);
        assert!(rx.is_empty());
    }

    #[test]
    fn wraps_around_many_times() {
        let (tx, rx) = leak::<3>().try_split().unwrap();
        for b in 0..=255_u8 {
            tx.try_write(b).unwrap();
            assert_eq!(rx.try_read(), Some(b));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn async_read_wakes_on_write() {
        let (tx, rx) = leak::<8>().try_split().unwrap();
        let flag = Arc::new(Flag::default());
        let waker = Waker::from(flag.clone());
        let mut ctx = Context::from_waker(&waker);

        let mut read = pin!(rx.async_read());
        assert_eq!(read.as_mut().poll(&mut ctx), Poll::Pending);
        assert!(!flag.0.load(Relaxed));

        tx.try_write(b'$').unwrap();
        assert!(flag.0.load(Relaxed));
        assert_eq!(read.as_mut().poll(&mut ctx), Poll::Ready(b'$'));
    }

    #[test]
    fn async_read_ready_immediately() {
        let (tx, rx) = leak::<8>().try_split().unwrap();
        tx.try_write(7).unwrap();
        let waker = Waker::from(Arc::new(Flag::default()));
        let mut ctx = Context::from_waker(&waker);
        assert_eq!(pin!(rx.async_read()).poll(&mut ctx), Poll::Ready(7));
    }
}
