//! Cleanup handlers run once when the pool is torn down
//!
//! Handlers run newest-first. A record is registered through
//! [`Pool::add_cleanup`](crate::Pool::add_cleanup), which hands back a
//! [`CleanupSlot`] for attaching the handler and its data.

use std::any::Any;
use std::fmt;
use std::ptr::NonNull;

use crate::pool::Pool;

/// Data handed to a cleanup handler
pub enum CleanupData<'a> {
    /// No data was attached
    None,
    /// Buffer carved from the pool when the cleanup was registered
    Buffer(&'a mut [u8]),
    /// Externally owned value attached with [`CleanupSlot::set_data`]
    External(Box<dyn Any>),
}

impl CleanupData<'_> {
    /// Takes the external value if it has type `T`
    pub fn downcast<T: Any>(self) -> Option<Box<T>> {
        match self {
            Self::External(value) => value.downcast().ok(),
            _ => None,
        }
    }

    /// Whether the handler was given no data
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for CleanupData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Buffer(buf) => f.debug_tuple("Buffer").field(&buf.len()).finish(),
            Self::External(_) => f.write_str("External(..)"),
        }
    }
}

type Handler = Box<dyn FnOnce(CleanupData<'_>)>;

enum RecordData {
    None,
    Buffer { ptr: NonNull<u8>, len: usize },
    External(Box<dyn Any>),
}

struct CleanupRecord {
    handler: Option<Handler>,
    data: RecordData,
}

/// Registered cleanups in registration order; the last entry is the head
#[derive(Default)]
pub(crate) struct CleanupChain {
    records: Vec<CleanupRecord>,
}

impl CleanupChain {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a record, optionally backed by a pool buffer of `len` bytes
    pub(crate) fn push(&mut self, buffer: Option<(NonNull<u8>, usize)>) -> usize {
        let data = match buffer {
            Some((ptr, len)) => RecordData::Buffer { ptr, len },
            None => RecordData::None,
        };
        self.records.push(CleanupRecord {
            handler: None,
            data,
        });
        self.records.len() - 1
    }

    /// Installs `handler`, handing back the one it replaced
    fn set_handler(&mut self, index: usize, handler: Handler) -> Option<Handler> {
        let record = self.records.get_mut(index)?;
        record.handler.replace(handler)
    }

    /// Attaches external data, handing back whatever was attached before
    fn set_data(&mut self, index: usize, data: Box<dyn Any>) -> Option<RecordData> {
        let record = self.records.get_mut(index)?;
        Some(std::mem::replace(&mut record.data, RecordData::External(data)))
    }

    fn buffer(&self, index: usize) -> Option<(NonNull<u8>, usize)> {
        match self.records.get(index)?.data {
            RecordData::Buffer { ptr, len } => Some((ptr, len)),
            _ => None,
        }
    }

    /// Drops references to pool buffers whose bytes a reset reclaimed
    pub(crate) fn detach_buffers(&mut self) -> usize {
        let mut detached = 0;
        for record in &mut self.records {
            if matches!(record.data, RecordData::Buffer { .. }) {
                record.data = RecordData::None;
                detached += 1;
            }
        }
        detached
    }

    /// Runs every handler newest-first and empties the chain
    ///
    /// Returns the number of handlers invoked.
    ///
    /// # Safety
    ///
    /// Every pool buffer still referenced by a record must be alive and not
    /// borrowed elsewhere.
    pub(crate) unsafe fn run_all(&mut self) -> usize {
        let mut ran = 0;
        while let Some(record) = self.records.pop() {
            let Some(handler) = record.handler else {
                continue;
            };
            let data = match record.data {
                RecordData::None => CleanupData::None,
                // SAFETY: guaranteed by the caller; the buffer was carved for
                // this record and zero-filled at registration.
                RecordData::Buffer { ptr, len } => {
                    CleanupData::Buffer(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) })
                }
                RecordData::External(value) => CleanupData::External(value),
            };
            handler(data);
            ran += 1;
        }
        ran
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// Handle to a freshly registered cleanup
///
/// The handler and data can be set any time before the pool is destroyed;
/// the slot only borrows the pool.
pub struct CleanupSlot<'p> {
    pool: &'p Pool,
    index: usize,
}

impl<'p> CleanupSlot<'p> {
    pub(crate) fn new(pool: &'p Pool, index: usize) -> Self {
        Self { pool, index }
    }

    /// Position of this cleanup in registration order
    pub fn index(&self) -> usize {
        self.index
    }

    /// Pool buffer reserved at registration, if one is still attached
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        let (ptr, len) = self.pool.cleanups_mut().buffer(self.index)?;
        // SAFETY: the buffer was carved for this record only, the slot is the
        // sole handle to it, and it lives until reset or destroy, neither of
        // which can run while the slot borrows the pool.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }

    /// Sets the handler invoked at destroy
    pub fn set_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnOnce(CleanupData<'_>) + 'static,
    {
        let previous = self
            .pool
            .cleanups_mut()
            .set_handler(self.index, Box::new(handler));
        // Dropped after the chain borrow ends: a captured value may reach back into the pool.
        drop(previous);
        self
    }

    /// Replaces the data with an externally owned value
    ///
    /// A pool buffer reserved at registration stays allocated but is no longer
    /// passed to the handler.
    pub fn set_data<T: Any>(&mut self, data: T) -> &mut Self {
        let previous = self.pool.cleanups_mut().set_data(self.index, Box::new(data));
        drop(previous);
        self
    }
}

impl fmt::Debug for CleanupSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupSlot")
            .field("index", &self.index)
            .finish()
    }
}
