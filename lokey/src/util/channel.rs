use alloc::collections::VecDeque;
use core::cell::RefCell;
use core::future::poll_fn;
use core::pin::Pin;
use core::task::{Context, Poll};
use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use embassy_sync::waitqueue::WakerRegistration;
use futures_util::Stream;

struct State<T> {
    queue: VecDeque<T>,
    receiver_waker: WakerRegistration,
}

impl<T> State<T> {
    fn poll_receive(&mut self, cx: &Context) -> Poll<T> {
        match self.queue.pop_front() {
            Some(message) => Poll::Ready(message),
            None => {
                self.receiver_waker.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

/// A bounded single-producer/single-consumer queue.
///
/// The producer side (`try_send`) never blocks and never allocates once the
/// queue has reached `capacity`, which makes it safe to call from interrupt
/// context: when full, the oldest entries are kept and the new message is
/// dropped (the caller is told so it can log the drop).
pub struct Channel<M, T> {
    inner: Mutex<M, RefCell<State<T>>>,
    capacity: usize,
}

impl<M: RawMutex, T> Channel<M, T> {
    pub const fn new(capacity: usize) -> Self {
        let state = State {
            queue: VecDeque::new(),
            receiver_waker: WakerRegistration::new(),
        };
        Self {
            inner: Mutex::new(RefCell::new(state)),
            capacity,
        }
    }

    /// Enqueues `message` without blocking.
    ///
    /// Returns `false` if the queue was already at capacity; the queue is
    /// left unchanged in that case (the existing entries are not evicted).
    pub fn try_send(&self, message: T) -> bool {
        self.inner.lock(|state| {
            let mut state = state.borrow_mut();
            if state.queue.len() >= self.capacity {
                return false;
            }
            state.queue.push_back(message);
            state.receiver_waker.wake();
            true
        })
    }

    pub fn sender(&self) -> Sender<'_, M, T> {
        Sender { channel: self }
    }

    pub fn poll_receive(&self, cx: &Context) -> Poll<T> {
        self.inner.lock(|state| state.borrow_mut().poll_receive(cx))
    }

    pub async fn receive(&self) -> T {
        poll_fn(|cx| self.inner.lock(|state| state.borrow_mut().poll_receive(cx))).await
    }

    pub fn receiver(&self) -> Receiver<'_, M, T> {
        Receiver { channel: self }
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|state| state.borrow().queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Sender<'a, M, T> {
    channel: &'a Channel<M, T>,
}

impl<'a, M: RawMutex, T> Sender<'a, M, T> {
    /// See [`Channel::try_send`].
    pub fn try_send(&self, message: T) -> bool {
        self.channel.try_send(message)
    }
}

impl<'a, M, T> Clone for Sender<'a, M, T> {
    fn clone(&self) -> Self {
        Sender {
            channel: self.channel,
        }
    }
}

impl<'a, M, T> Copy for Sender<'a, M, T> {}

pub struct Receiver<'a, M, T> {
    channel: &'a Channel<M, T>,
}

impl<'a, M: RawMutex, T> Receiver<'a, M, T> {
    pub async fn receive(&self) -> T {
        self.channel.receive().await
    }

    /// Drains every message currently queued without waiting for more.
    ///
    /// Used by the scan pipeline's worker, which is expected to empty the
    /// queue fully on each wake rather than handling one event at a time.
    pub fn drain(&self, mut f: impl FnMut(T)) {
        while let Some(message) = self.channel.inner.lock(|state| {
            let mut state = state.borrow_mut();
            state.queue.pop_front()
        }) {
            f(message);
        }
    }
}

impl<'a, M: RawMutex, T> Stream for Receiver<'a, M, T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.channel.poll_receive(cx).map(Some)
    }
}
