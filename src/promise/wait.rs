//! Await adapter.
//!
//! Lets task-based orchestration code park on a [`Promise`] with `.await`
//! instead of registering handlers. Works with any single-threaded executor;
//! nothing in the relay itself depends on it.

use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use super::eventual::{Promise, PromiseState};
use crate::error::Rejection;
use crate::types::Value;

/// Future resolving when the wrapped promise settles.
pub struct Settled {
    promise: Promise,
    waker: Rc<RefCell<Option<Waker>>>,
    registered: bool,
}

impl Future for Settled {
    type Output = Result<Value, Rejection>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.promise.state() {
            PromiseState::Fulfilled => {
                return Poll::Ready(Ok(self.promise.value().unwrap_or(Value::Null)));
            }
            PromiseState::Rejected => {
                let reason = self
                    .promise
                    .reason()
                    .unwrap_or(Rejection::ParentRejected);
                return Poll::Ready(Err(reason));
            }
            PromiseState::Unscheduled | PromiseState::Pending => {}
        }

        *self.waker.borrow_mut() = Some(cx.waker().clone());
        if !self.registered {
            self.registered = true;
            let slot = self.waker.clone();
            self.promise.on_fulfilled(move |_| wake(&slot));
            let slot = self.waker.clone();
            self.promise.on_rejected(move |_| wake(&slot));
        }
        Poll::Pending
    }
}

fn wake(slot: &Rc<RefCell<Option<Waker>>>) {
    if let Some(waker) = slot.borrow_mut().take() {
        waker.wake();
    }
}

impl IntoFuture for Promise {
    type Output = Result<Value, Rejection>;
    type IntoFuture = Settled;

    fn into_future(self) -> Settled {
        Settled {
            promise: self,
            waker: Rc::new(RefCell::new(None)),
            registered: false,
        }
    }
}
