//! Non-blocking character input.
//!
//! [`Scheduler::read_char`](crate::Scheduler::read_char) polls an
//! [`InputSource`] and yields between polls, so a source must never block
//! the calling thread.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

/// A source of characters that answers immediately.
pub trait InputSource {
    /// One character, or `None` when nothing is available right now.
    fn poll_char(&mut self) -> Option<char>;
}

impl<F> InputSource for F
where
    F: FnMut() -> Option<char>,
{
    #[inline]
    fn poll_char(&mut self) -> Option<char> {
        self()
    }
}

/// Input that never has data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    #[inline]
    fn poll_char(&mut self) -> Option<char> {
        None
    }
}

/// Input fed through a channel, typically from another thread.
///
/// Once every sender is gone the input has no data forever; a reader still
/// polling it never wakes up. The first such poll is logged at `warn`.
#[derive(Debug, Clone)]
pub struct ChannelInput {
    rx: Receiver<char>,
    disconnected: bool,
}

impl ChannelInput {
    /// Create an input and the sender that feeds it.
    pub fn new() -> (Sender<char>, Self) {
        let (tx, rx) = channel::unbounded();
        (tx, Self::from_receiver(rx))
    }

    /// Wrap an existing receiver.
    #[inline]
    pub fn from_receiver(rx: Receiver<char>) -> Self {
        Self {
            rx,
            disconnected: false,
        }
    }

    /// Whether a poll has found the channel drained with no sender left.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Forward standard input through a reader thread.
    ///
    /// The blocking reads happen on the reader thread; the scheduler thread
    /// only ever drains the channel. Input is decoded as UTF-8; invalid
    /// sequences become `U+FFFD`.
    pub fn stdin() -> io::Result<Self> {
        let (tx, input) = Self::new();
        thread::Builder::new()
            .name("cosched-stdin".to_string())
            .spawn(move || forward_utf8(io::stdin().lock(), &tx))?;
        Ok(input)
    }
}

impl InputSource for ChannelInput {
    fn poll_char(&mut self) -> Option<char> {
        match self.rx.try_recv() {
            Ok(c) => Some(c),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected {
                    self.disconnected = true;
                    warn!("input closed; readers waiting for a character will poll forever");
                }
                None
            }
        }
    }
}

/// Decode `reader` as UTF-8 and send every character until end of input or
/// until the receiving side is gone.
fn forward_utf8<R: Read>(
    reader: R,
    tx: &Sender<char>,
) {
    let mut pending: Vec<u8> = Vec::with_capacity(4);
    for byte in reader.bytes() {
        let byte = match byte {
            Ok(byte) => byte,
            Err(e) => {
                debug!("stdin reader stopped: {}", e);
                return;
            }
        };
        pending.push(byte);
        let decoded = match std::str::from_utf8(&pending) {
            Ok(s) => s.chars().next(),
            Err(e) if e.error_len().is_none() && pending.len() < 4 => continue,
            Err(_) => Some(char::REPLACEMENT_CHARACTER),
        };
        pending.clear();
        if let Some(c) = decoded {
            if tx.send(c).is_err() {
                return;
            }
        }
    }
}

/// Pre-recorded sequence of poll results, then no data forever.
///
/// `None` entries stand for polls that find nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    polls: VecDeque<Option<char>>,
}

impl ScriptedInput {
    pub fn new(polls: impl IntoIterator<Item = Option<char>>) -> Self {
        Self {
            polls: polls.into_iter().collect(),
        }
    }

    /// Parse a script where `gap` marks an empty poll and every other
    /// character is delivered as is.
    pub fn from_script(
        script: &str,
        gap: char,
    ) -> Self {
        Self::new(script.chars().map(|c| (c != gap).then_some(c)))
    }

    /// Polls left before the script runs dry.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.polls.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll_char(&mut self) -> Option<char> {
        self.polls.pop_front().flatten()
    }
}
