// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! A tiny logger, mirroring `fyrox_core::log`: a global guarded by a mutex, a severity enum, and
//! an optional listener registry. Unlike the engine-wide logger this crate is grounded on, this
//! one never touches disk - file I/O is outside this crate's scope.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::mpsc::Sender;

/// Severity of a logged message.
#[derive(Copy, Clone, PartialOrd, PartialEq, Eq, Ord, Hash, Debug)]
#[repr(u32)]
pub enum MessageKind {
    /// Routine information (a transition started, a node rewound).
    Information = 0,
    /// Something unusual happened but evaluation continued (a clip sampler fell back to rest pose).
    Warning = 1,
    /// A construction-time failure was reported to the caller.
    Error = 2,
}

impl MessageKind {
    fn as_str(self) -> &'static str {
        match self {
            MessageKind::Information => "[INFO]: ",
            MessageKind::Warning => "[WARNING]: ",
            MessageKind::Error => "[ERROR]: ",
        }
    }
}

/// A single log record, delivered to any listener registered with [`Log::add_listener`].
pub struct LogMessage {
    pub kind: MessageKind,
    pub content: String,
}

struct LogState {
    verbosity: MessageKind,
    listeners: Vec<Sender<LogMessage>>,
}

lazy_static! {
    static ref LOG: Mutex<LogState> = Mutex::new(LogState {
        verbosity: MessageKind::Information,
        listeners: Vec::new(),
    });
}

/// Entry point for the crate's logger. See module docs.
pub struct Log;

impl Log {
    fn write_internal(kind: MessageKind, msg: String) {
        let mut state = LOG.lock();
        if (kind as u32) < (state.verbosity as u32) {
            return;
        }

        state.listeners.retain(|listener| {
            listener
                .send(LogMessage {
                    kind,
                    content: msg.clone(),
                })
                .is_ok()
        });

        println!("{}{}", kind.as_str(), msg);
    }

    /// Writes an informational message.
    pub fn info<S: Into<String>>(msg: S) {
        Self::write_internal(MessageKind::Information, msg.into())
    }

    /// Writes a warning message.
    pub fn warn<S: Into<String>>(msg: S) {
        Self::write_internal(MessageKind::Warning, msg.into())
    }

    /// Writes an error message.
    pub fn err<S: Into<String>>(msg: S) {
        Self::write_internal(MessageKind::Error, msg.into())
    }

    /// Sets the minimum severity that gets printed/forwarded to listeners.
    pub fn set_verbosity(kind: MessageKind) {
        LOG.lock().verbosity = kind;
    }

    /// Registers a channel to receive a copy of every message at or above the current verbosity.
    pub fn add_listener(listener: Sender<LogMessage>) {
        LOG.lock().listeners.push(listener)
    }

    /// Logs `Err` results without otherwise interrupting control flow.
    pub fn verify<T, E: Debug>(result: Result<T, E>) {
        if let Err(e) = result {
            Self::err(format!("Operation failed! Reason: {:?}", e));
        }
    }
}
