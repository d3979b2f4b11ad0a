use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::Backoff;

/// Chunk lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Never touched; owns no buffer.
    Vacant,
    /// Buffer holds codec output of `compressed_size` bytes.
    Closed,
    /// Buffer holds raw voxels and may be read or written.
    Open,
    /// One thread is opening or closing the chunk.
    Busy,
}

// State word layout:
//   bits 0..2  phase
//   bit  2     exclusive writer pin (Open only)
//   bit  3     a writer is waiting; no new shared pins (Open only)
//   bits 4..   shared reader pins (Open only)
const PHASE_MASK: u32 = 0b11;
const VACANT: u32 = 0;
const CLOSED: u32 = 1;
const OPEN: u32 = 2;
const BUSY: u32 = 3;
const WRITER: u32 = 1 << 2;
const WAITING: u32 = 1 << 3;
const READER: u32 = 1 << 4;

fn encode(phase: Phase) -> u32 {
    match phase {
        Phase::Vacant => VACANT,
        Phase::Closed => CLOSED,
        Phase::Open => OPEN,
        Phase::Busy => BUSY,
    }
}

fn decode(word: u32) -> Phase {
    match word & PHASE_MASK {
        VACANT => Phase::Vacant,
        CLOSED => Phase::Closed,
        OPEN => Phase::Open,
        _ => Phase::Busy,
    }
}

/// How an accessor intends to use an open chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Shared,
    Exclusive,
}

impl Access {
    fn pin_bits(self) -> u32 {
        match self {
            Access::Shared => READER,
            Access::Exclusive => WRITER,
        }
    }
}

/// Result of [`StateWord::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    /// The chunk was already open; the caller now holds a pin.
    Pinned,
    /// The caller won the transition out of the given phase and holds `Busy`.
    Opening(Phase),
}

/// Why a close could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseBlocked {
    AlreadyClosed,
    Contended,
}

/// The single atomic that guards a chunk's buffer.
///
/// Entering `Busy` or taking a pin uses Acquire; publishing a phase or
/// dropping a pin uses Release, so everything written to the buffer before
/// a transition is visible to whoever observes the new phase.
///
/// A writer that finds readers present raises a waiting bit that turns away
/// new readers until the writer has had its turn, so a steady stream of
/// readers cannot starve it.
#[derive(Debug)]
pub(crate) struct StateWord(AtomicU32);

impl StateWord {
    pub const fn new() -> Self {
        Self(AtomicU32::new(VACANT))
    }

    pub fn phase(&self) -> Phase {
        decode(self.0.load(Ordering::Acquire))
    }

    /// Number of shared pins currently held.
    pub fn readers(&self) -> u32 {
        self.0.load(Ordering::Relaxed) / READER
    }

    /// Pin an open chunk, or claim the transition that opens it.
    pub fn enter(&self, access: Access) -> Entry {
        let backoff = Backoff::new();
        loop {
            let cur = self.0.load(Ordering::Acquire);
            let (next, entry) = match (cur & PHASE_MASK, access) {
                (VACANT | CLOSED, _) => (BUSY, Some(Entry::Opening(decode(cur)))),
                (OPEN, Access::Shared) if cur & (WRITER | WAITING) == 0 => {
                    (cur + READER, Some(Entry::Pinned))
                }
                (OPEN, Access::Exclusive) if cur & !(PHASE_MASK | WAITING) == 0 => {
                    (OPEN | WRITER, Some(Entry::Pinned))
                }
                (OPEN, Access::Exclusive) if cur & WAITING == 0 => (cur | WAITING, None),
                _ => {
                    backoff.snooze();
                    continue;
                }
            };
            match self
                .0
                .compare_exchange_weak(cur, next, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => match entry {
                    Some(entry) => return entry,
                    None => backoff.snooze(),
                },
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Whether a writer is queued behind the current readers.
    pub fn writer_waiting(&self) -> bool {
        self.0.load(Ordering::Relaxed) & WAITING != 0
    }

    /// Leave `Busy` as `Open`, keeping a pin of the given kind for the caller.
    pub fn publish_open(&self, access: Access) {
        self.0.store(OPEN | access.pin_bits(), Ordering::Release);
    }

    pub fn release(&self, access: Access) {
        match access {
            Access::Shared => {
                self.0.fetch_sub(READER, Ordering::Release);
            }
            Access::Exclusive => {
                self.0.fetch_and(!WRITER, Ordering::Release);
            }
        }
    }

    /// Claim `Busy` from an unpinned `Open` chunk.
    pub fn try_begin_close(&self) -> Result<(), CloseBlocked> {
        match self
            .0
            .compare_exchange(OPEN, BUSY, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Ok(()),
            Err(cur) => match decode(cur) {
                Phase::Vacant | Phase::Closed => Err(CloseBlocked::AlreadyClosed),
                Phase::Open | Phase::Busy => Err(CloseBlocked::Contended),
            },
        }
    }

    /// Leave `Busy` with no pins held.
    pub fn finish(&self, phase: Phase) {
        debug_assert_ne!(phase, Phase::Busy);
        self.0.store(encode(phase), Ordering::Release);
    }

    /// Overwrite the phase while holding exclusive access to the chunk.
    pub fn set(&mut self, phase: Phase) {
        *self.0.get_mut() = encode(phase);
    }
}

/// Holds `Busy` for one transition. If dropped without being resolved (a
/// panic mid-transition), the chunk goes back to the phase it started in.
pub(crate) struct Transition<'a> {
    state: &'a StateWord,
    from: Phase,
    resolved: bool,
}

impl<'a> Transition<'a> {
    pub fn new(state: &'a StateWord, from: Phase) -> Self {
        Self {
            state,
            from,
            resolved: false,
        }
    }

    pub fn publish_open(mut self, access: Access) {
        self.resolved = true;
        self.state.publish_open(access);
    }

    pub fn finish(mut self, phase: Phase) {
        self.resolved = true;
        self.state.finish(phase);
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.state.finish(self.from);
        }
    }
}

/// A shared or exclusive hold on an open chunk, released on drop.
pub(crate) struct Pin<'a> {
    state: &'a StateWord,
    access: Access,
}

impl<'a> Pin<'a> {
    pub fn new(state: &'a StateWord, access: Access) -> Self {
        Self { state, access }
    }
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.state.release(self.access);
    }
}
