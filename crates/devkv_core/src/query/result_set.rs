//! Cursor over a materialized query result.

use crate::error::{KvError, KvResult};
use crate::types::Entry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Cursor {
    id: u64,
    owner: u64,
    entries: Vec<Entry>,
    /// -1 is before the first entry, `len` is after the last.
    position: Mutex<i64>,
    closed: AtomicBool,
}

/// A forward/backward cursor over entries captured when the result set was
/// created. Later store changes are not visible through it.
///
/// Clones share the cursor position and the open/closed state. Every call
/// on a closed result set fails with `ResultSetClosed`.
#[derive(Debug, Clone)]
pub struct ResultSet {
    cursor: Arc<Cursor>,
}

impl ResultSet {
    pub(crate) fn new(owner: u64, entries: Vec<Entry>) -> Self {
        Self {
            cursor: Arc::new(Cursor {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                owner,
                entries,
                position: Mutex::new(-1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique id of this result set.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.cursor.id
    }

    pub(crate) fn owner(&self) -> u64 {
        self.cursor.owner
    }

    /// Returns true once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cursor.closed.load(Ordering::Acquire)
    }

    /// Marks the result set closed.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` if it already was.
    pub(crate) fn close(&self) -> KvResult<()> {
        if self.cursor.closed.swap(true, Ordering::AcqRel) {
            return Err(KvError::ResultSetClosed);
        }
        Ok(())
    }

    fn open(&self) -> KvResult<&Cursor> {
        if self.is_closed() {
            return Err(KvError::ResultSetClosed);
        }
        Ok(&self.cursor)
    }

    fn len(&self) -> KvResult<i64> {
        Ok(i64::try_from(self.open()?.entries.len()).unwrap_or(i64::MAX))
    }

    /// Moves to `target`, clamped to the before-first/after-last bounds.
    /// Returns true if the cursor ends on an entry.
    fn seek(&self, target: impl FnOnce(i64, i64) -> i64) -> KvResult<bool> {
        let len = self.len()?;
        let mut position = self.cursor.position.lock();
        *position = target(*position, len).clamp(-1, len);
        Ok(*position >= 0 && *position < len)
    }

    /// Number of entries.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn count(&self) -> KvResult<usize> {
        Ok(self.open()?.entries.len())
    }

    /// Current position; -1 before the first entry.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn position(&self) -> KvResult<i64> {
        self.open()?;
        Ok(*self.cursor.position.lock())
    }

    /// Moves to the first entry. Returns false if there is none.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn move_to_first(&self) -> KvResult<bool> {
        self.seek(|_, _| 0)
    }

    /// Moves to the last entry. Returns false if there is none.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn move_to_last(&self) -> KvResult<bool> {
        self.seek(|_, len| len - 1)
    }

    /// Advances one entry. Returns false once past the last entry.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn move_to_next(&self) -> KvResult<bool> {
        self.seek(|pos, _| pos + 1)
    }

    /// Steps back one entry. Returns false once before the first entry.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn move_to_previous(&self) -> KvResult<bool> {
        self.seek(|pos, _| pos - 1)
    }

    /// Moves by `offset` entries (negative moves back).
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn move_by(&self, offset: i64) -> KvResult<bool> {
        self.seek(|pos, _| pos.saturating_add(offset))
    }

    /// Moves to absolute `position`.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn move_to_position(&self, position: i64) -> KvResult<bool> {
        self.seek(|_, _| position)
    }

    /// On the first entry.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn is_first(&self) -> KvResult<bool> {
        let len = self.len()?;
        Ok(len > 0 && *self.cursor.position.lock() == 0)
    }

    /// On the last entry.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn is_last(&self) -> KvResult<bool> {
        let len = self.len()?;
        Ok(len > 0 && *self.cursor.position.lock() == len - 1)
    }

    /// Before the first entry; always true for an empty result.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn is_before_first(&self) -> KvResult<bool> {
        let len = self.len()?;
        Ok(len == 0 || *self.cursor.position.lock() < 0)
    }

    /// Past the last entry; always true for an empty result.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close.
    pub fn is_after_last(&self) -> KvResult<bool> {
        let len = self.len()?;
        Ok(len == 0 || *self.cursor.position.lock() >= len)
    }

    /// The entry under the cursor.
    ///
    /// # Errors
    ///
    /// `ResultSetClosed` after close, `ArgumentInvalid` when the cursor is
    /// not on an entry.
    pub fn entry(&self) -> KvResult<Entry> {
        let cursor = self.open()?;
        let position = *cursor.position.lock();
        usize::try_from(position)
            .ok()
            .and_then(|index| cursor.entries.get(index))
            .cloned()
            .ok_or_else(|| KvError::argument_invalid("cursor is not on an entry"))
    }
}
