//! Register backend double shared by the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::memory::RegisterBackend;
use crate::registers::gpio::{GPCLR0, GPLEV0, GPSET0};

/// One recorded register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(usize),
    Write(usize, u32),
}

#[derive(Default)]
struct State {
    words: HashMap<usize, u32>,
    fixed: HashMap<usize, u32>,
    queued: HashMap<usize, VecDeque<u32>>,
    log: Vec<Access>,
}

/// In-memory register file
///
/// Plain words behave like RAM. Words marked with [`MockBackend::fix`]
/// always read the same value, queued words pop one value per read. With
/// GPIO simulation on, writes to GPSET/GPCLR update GPLEV.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<State>,
    simulate_gpio: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend where set/clear writes show up in the level registers
    pub fn gpio() -> Self {
        Self {
            state: Mutex::default(),
            simulate_gpio: true,
        }
    }

    pub fn poke(&self, offset: usize, value: u32) {
        self.state.lock().unwrap().words.insert(offset, value);
    }

    pub fn peek(&self, offset: usize) -> u32 {
        let state = self.state.lock().unwrap();
        state.words.get(&offset).copied().unwrap_or(0)
    }

    pub fn fix(&self, offset: usize, value: u32) {
        self.state.lock().unwrap().fixed.insert(offset, value);
    }

    pub fn queue(&self, offset: usize, values: impl IntoIterator<Item = u32>) {
        self.state
            .lock()
            .unwrap()
            .queued
            .entry(offset)
            .or_default()
            .extend(values);
    }

    pub fn take_log(&self) -> Vec<Access> {
        std::mem::take(&mut self.state.lock().unwrap().log)
    }

    /// Values written to `offset`, in order
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter_map(|access| match access {
                Access::Write(o, v) if *o == offset => Some(*v),
                _ => None,
            })
            .collect()
    }
}

impl RegisterBackend for MockBackend {
    fn read_word(&self, offset: usize) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.log.push(Access::Read(offset));
        if let Some(value) = state.fixed.get(&offset) {
            return *value;
        }
        if let Some(value) = state.queued.get_mut(&offset).and_then(VecDeque::pop_front) {
            return value;
        }
        state.words.get(&offset).copied().unwrap_or(0)
    }

    fn write_word(&self, offset: usize, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.log.push(Access::Write(offset, value));
        if self.simulate_gpio {
            for bank in 0..2 {
                let level = GPLEV0 + 4 * bank;
                if offset == GPSET0 + 4 * bank {
                    *state.words.entry(level).or_default() |= value;
                    return;
                }
                if offset == GPCLR0 + 4 * bank {
                    *state.words.entry(level).or_default() &= !value;
                    return;
                }
            }
        }
        state.words.insert(offset, value);
    }
}
