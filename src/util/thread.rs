//! Module `thread` implement the request/response worker underneath the
//! query engine.
//!
//! A [Thread] owns one OS thread whose main loop drains a request
//! channel; each request optionally carries a channel for the response,
//! so many responses can be multiplexed onto one receiver. A worker
//! exits when every sender to its request channel is gone, which makes
//! shutdown a matter of dropping handles.

use std::{sync::mpsc, thread};

use crate::{Error, Result};

/// Handle to one worker thread.
///
/// Shutdown protocol: the worker's main loop must treat a disconnected
/// [Rx] as its exit signal. [Thread::join] (or dropping the handle)
/// closes the embedded sender; once outstanding [Tx] clones are dropped
/// too, the loop winds down and the thread is reaped.
pub struct Thread<Q, R = (), T = ()> {
    name: String,
    handle: Option<thread::JoinHandle<T>>,
    tx: Option<Tx<Q, R>>,
}

impl<Q, R, T> Thread<Q, R, T> {
    /// Spawn a worker. `main_loop` receives the [Rx] side of the request
    /// channel and returns the closure the new thread runs.
    pub fn new<F, N>(name: &str, main_loop: F) -> Thread<Q, R, T>
    where
        F: 'static + FnOnce(Rx<Q, R>) -> N + Send,
        N: 'static + Send + FnOnce() -> T,
        T: 'static + Send,
    {
        let (tx, rx) = mpsc::channel();
        Thread {
            name: name.to_string(),
            handle: Some(thread::spawn(main_loop(rx))),
            tx: Some(Tx(tx)),
        }
    }

    /// Shut the worker down and collect its exit value. Blocks until
    /// every outstanding [Tx] clone is dropped as well.
    pub fn join(mut self) -> Result<T> {
        self.tx = None; // closes the request channel
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(exit) => Ok(exit),
                Err(err) => err_at!(ThreadFail, msg: "{} panicked, {:?}", self.name, err),
            },
            None => err_at!(ThreadFail, msg: "{} already joined", self.name),
        }
    }

    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    /// A fresh sender for this worker's request channel.
    pub fn to_tx(&self) -> Tx<Q, R> {
        match &self.tx {
            Some(tx) => tx.clone(),
            None => unreachable!(),
        }
    }
}

impl<Q, R, T> Drop for Thread<Q, R, T> {
    fn drop(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

/// Sending half of a worker's request channel, clones freely.
pub struct Tx<Q, R = ()>(mpsc::Sender<(Q, Option<mpsc::Sender<R>>)>);

impl<Q, R> Clone for Tx<Q, R> {
    fn clone(&self) -> Self {
        Tx(self.0.clone())
    }
}

impl<Q, R> Tx<Q, R> {
    /// Fire-and-forget message, no response expected.
    pub fn post(&self, msg: Q) -> Result<()> {
        err_at!(IPCFail, self.0.send((msg, None)))
    }

    /// Round-trip request, blocks for the worker's response.
    pub fn request(&self, req: Q) -> Result<R> {
        let (rt_tx, rt_rx) = mpsc::channel();
        err_at!(IPCFail, self.0.send((req, Some(rt_tx))))?;
        err_at!(IPCFail, rt_rx.recv())
    }

    /// Request whose response lands on the caller supplied channel.
    /// This is how a caller fans requests out across workers and drains
    /// every response from a single receiver.
    pub fn request_tx(&self, req: Q, rt_tx: mpsc::Sender<R>) -> Result<()> {
        err_at!(IPCFail, self.0.send((req, Some(rt_tx))))
    }
}

/// Receiving half handed to the worker's main loop, refer [Thread::new].
pub type Rx<Q, R = ()> = mpsc::Receiver<(Q, Option<mpsc::Sender<R>>)>;
