/// heap.rs
///
/// Fixed budget heap. Memory is divided into pools of equally sized blocks
/// which are configured when the environment is created and never grow. A
/// block is handed out by the smallest pool that fits the request and has a
/// free block left, and returns to that same pool's free list once its last
/// reference is released.
///
/// Reference counts are kept in steps of two: the low bit marks a static
/// block which is never freed. Blocks referencing each other in a cycle are
/// never reclaimed.

use std::rc::Rc;

use super::config::HeapConfig;
use super::error::{ExecError, ExecResult};
use super::value::{FuncRef, Value};

pub(crate) const TAG_STRING: u16 = 1;
pub(crate) const TAG_FOREIGN: u16 = 2;
pub(crate) const TAG_ARRAY: u16 = 3;
pub(crate) const TAG_OBJECT: u16 = 4;
pub(crate) const TAG_STORAGE: u16 = 5;
pub(crate) const TAG_CELL: u16 = 6;
pub(crate) const TAG_CLOSURE: u16 = 7;
pub(crate) const TAG_TIMER: u16 = 8;

const REF_STEP: u16 = 2;
const STATIC_BIT: u16 = 1;

/// Handle to a block: the pool it was carved from, its index there and the
/// generation of the block at that index. A block's generation changes when
/// it is freed, so a handle kept past the last release no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub(crate) pool: u8,
    pub(crate) generation: u16,
    pub(crate) index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockHeader {
    tag: u16,
    refs: u16,
    generation: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub block_size: usize,
    pub capacity: usize,
    pub used: usize,
}

struct Pool<T> {
    block_size: usize,
    headers: Vec<BlockHeader>,
    slots: Vec<Option<T>>,
    // Free block indices, the last one is handed out first
    free: Vec<u16>,
}

impl<T> Pool<T> {
    fn new(block_size: usize, block_count: usize) -> Self {
        let mut slots = Vec::with_capacity(block_count);
        slots.resize_with(block_count, || None);
        Self{
            block_size,
            headers: vec![BlockHeader{ tag: 0, refs: 0, generation: 0 }; block_count],
            slots,
            free: (0..block_count as u16).rev().collect(),
        }
    }
}

pub struct PoolSet<T> {
    pools: Vec<Pool<T>>,
}

impl<T> PoolSet<T> {
    /// Pools are ordered by block size. At most 255 pools of at most 65535
    /// blocks each are supported, larger configurations are clamped.
    pub fn new(config: &HeapConfig) -> Self {
        let mut sizes: Vec<_> = config.pools.iter()
            .filter(|p| p.block_size > 0 && p.block_count > 0)
            .map(|p| (p.block_size, p.block_count.min(u16::MAX as usize)))
            .collect();
        sizes.sort_by_key(|(size, _)| *size);
        sizes.truncate(u8::MAX as usize);

        Self{ pools: sizes.into_iter().map(|(size, count)| Pool::new(size, count)).collect() }
    }

    /// Allocates a block of at least `size` bytes holding `data`. When no
    /// suitable block is free the data is handed back.
    pub fn alloc(&mut self, size: usize, tag: u16, data: T) -> Result<BlockRef, T> {
        for (pool_idx, pool) in self.pools.iter_mut().enumerate() {
            if pool.block_size < size {
                continue;
            }
            if let Some(index) = pool.free.pop() {
                let generation = pool.headers[index as usize].generation;
                pool.headers[index as usize] = BlockHeader{ tag, refs: REF_STEP, generation };
                pool.slots[index as usize] = Some(data);
                return Ok(BlockRef{ pool: pool_idx as u8, generation, index });
            }
        }

        Err(data)
    }

    fn header(&self, block: BlockRef) -> Option<&BlockHeader> {
        let header = self.pools.get(block.pool as usize)?.headers.get(block.index as usize)?;
        if header.generation != block.generation {
            return None;
        }
        Some(header)
    }

    fn header_mut(&mut self, block: BlockRef) -> Option<&mut BlockHeader> {
        let header = self.pools.get_mut(block.pool as usize)?.headers.get_mut(block.index as usize)?;
        if header.generation != block.generation {
            return None;
        }
        Some(header)
    }

    /// Takes another reference to a live block. A block referenced more often
    /// than the count can express becomes static.
    pub fn retain(&mut self, block: BlockRef) -> BlockRef {
        if let Some(header) = self.header_mut(block) {
            debug_assert!(header.refs != 0, "retaining a free block");
            if header.refs & STATIC_BIT == 0 && header.refs != 0 {
                match header.refs.checked_add(REF_STEP) {
                    Some(refs) => header.refs = refs,
                    None => header.refs |= STATIC_BIT,
                }
            }
        }
        block
    }

    /// Drops a reference. Returns the block's contents if that was the last
    /// one, the block itself is then back on its pool's free list.
    pub fn release(&mut self, block: BlockRef) -> Option<T> {
        let header = self.header_mut(block)?;
        if header.refs & STATIC_BIT != 0 {
            return None;
        }
        if header.refs < REF_STEP {
            debug_assert!(false, "releasing a free block");
            return None;
        }

        header.refs -= REF_STEP;
        if header.refs != 0 {
            return None;
        }
        header.generation = header.generation.wrapping_add(1);

        let pool = &mut self.pools[block.pool as usize];
        pool.free.push(block.index);
        pool.slots[block.index as usize].take()
    }

    pub fn make_static(&mut self, block: BlockRef) {
        if let Some(header) = self.header_mut(block) {
            if header.refs != 0 {
                header.refs |= STATIC_BIT;
            }
        }
    }

    /// Number of references held, zero for free blocks.
    pub fn ref_count(&self, block: BlockRef) -> u16 {
        self.header(block).map_or(0, |h| h.refs / REF_STEP)
    }

    pub fn is_static(&self, block: BlockRef) -> bool {
        self.header(block).map_or(false, |h| h.refs & STATIC_BIT != 0)
    }

    pub fn tag(&self, block: BlockRef) -> Option<u16> {
        self.get(block)?;
        self.header(block).map(|h| h.tag)
    }

    pub fn block_size(&self, block: BlockRef) -> Option<usize> {
        self.pools.get(block.pool as usize).map(|p| p.block_size)
    }

    pub fn get(&self, block: BlockRef) -> Option<&T> {
        self.header(block)?;
        self.pools[block.pool as usize].slots[block.index as usize].as_ref()
    }

    pub fn get_mut(&mut self, block: BlockRef) -> Option<&mut T> {
        if self.header(block).is_none() {
            return None;
        }
        self.pools[block.pool as usize].slots[block.index as usize].as_mut()
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(|p| PoolStats{
            block_size: p.block_size,
            capacity: p.slots.len(),
            used: p.slots.len() - p.free.len(),
        }).collect()
    }

    pub fn used_blocks(&self) -> usize {
        self.pools.iter().map(|p| p.slots.len() - p.free.len()).sum()
    }
}

// -----------------------------------------------------------------------------
// Typed heap
// -----------------------------------------------------------------------------

pub(crate) enum HeapData {
    Str(Box<str>),
    // The text is shared with the host, the handle is opaque to the runtime
    Foreign{ text: Rc<str>, handle: usize },
    Array{ items: Vec<Value>, capacity: usize, storage: Option<BlockRef> },
    Object{ props: Vec<(Box<str>, Value)>, capacity: usize, storage: Option<BlockRef> },
    // Accounts for the element space of an array or object
    Storage,
    Cell(Value),
    Closure{ func: FuncRef, cells: Vec<Value> },
    Timer,
}

const BLOCK_HEADER_SIZE: usize = 4;
const CONTAINER_SIZE: usize = 16;
const FOREIGN_SIZE: usize = 12;
const CELL_SIZE: usize = 12;
const TIMER_SIZE: usize = 28;

fn string_size(len: usize) -> usize {
    BLOCK_HEADER_SIZE + len + 1
}

fn array_storage_size(capacity: usize) -> usize {
    BLOCK_HEADER_SIZE + 8 * capacity
}

fn object_storage_size(capacity: usize) -> usize {
    BLOCK_HEADER_SIZE + 12 * capacity
}

fn closure_size(num_cells: usize) -> usize {
    8 + 4 * num_cells
}

/// The pools of one environment together with the layout of everything
/// stored in them.
pub struct Heap {
    pools: PoolSet<HeapData>,
}

impl Heap {
    pub fn new(config: &HeapConfig) -> Self {
        Self{ pools: PoolSet::new(config) }
    }

    fn alloc(&mut self, size: usize, tag: u16, data: HeapData) -> ExecResult<BlockRef> {
        match self.pools.alloc(size, tag, data) {
            Ok(block) => Ok(block),
            Err(data) => {
                let mut pending = Vec::new();
                self.release_contents(data, &mut pending);
                self.release_pending(pending);
                Err(ExecError::OutOfMemory)
            }
        }
    }

    pub fn alloc_str(&mut self, text: &str) -> ExecResult<Value> {
        let block = self.alloc(string_size(text.len()), TAG_STRING, HeapData::Str(text.into()))?;
        Ok(Value::String(block))
    }

    /// Wraps a string owned by the host. The text is shared, not copied.
    pub fn alloc_foreign(&mut self, text: Rc<str>, handle: usize) -> ExecResult<Value> {
        let block = self.alloc(FOREIGN_SIZE, TAG_FOREIGN, HeapData::Foreign{ text, handle })?;
        Ok(Value::Foreign(block))
    }

    /// Creates an array owning `items`. The items are released when the
    /// allocation fails.
    pub fn alloc_array(&mut self, items: Vec<Value>) -> ExecResult<Value> {
        let capacity = items.len();
        let storage = match self.alloc_storage(array_storage_size(capacity), capacity) {
            Ok(storage) => storage,
            Err(e) => {
                self.release_all(items);
                return Err(e);
            }
        };
        let block = self.alloc(CONTAINER_SIZE, TAG_ARRAY, HeapData::Array{ items, capacity, storage })?;
        Ok(Value::Array(block))
    }

    /// Creates an object owning the values of `props`. Later duplicates of a
    /// key replace earlier ones.
    pub fn alloc_object(&mut self, props: Vec<(Box<str>, Value)>) -> ExecResult<Value> {
        let mut unique: Vec<(Box<str>, Value)> = Vec::with_capacity(props.len());
        let mut replaced = Vec::new();
        for (key, value) in props.into_iter() {
            match unique.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => replaced.push(std::mem::replace(&mut entry.1, value)),
                None => unique.push((key, value)),
            }
        }
        self.release_all(replaced);

        let capacity = unique.len();
        let storage = match self.alloc_storage(object_storage_size(capacity), capacity) {
            Ok(storage) => storage,
            Err(e) => {
                self.release_all(unique.into_iter().map(|(_, v)| v));
                return Err(e);
            }
        };
        let block = self.alloc(CONTAINER_SIZE, TAG_OBJECT, HeapData::Object{ props: unique, capacity, storage })?;
        Ok(Value::Object(block))
    }

    pub fn alloc_cell(&mut self, value: Value) -> ExecResult<Value> {
        let block = self.alloc(CELL_SIZE, TAG_CELL, HeapData::Cell(value))?;
        Ok(Value::Cell(block))
    }

    pub fn alloc_closure(&mut self, func: FuncRef, cells: Vec<Value>) -> ExecResult<Value> {
        let size = closure_size(cells.len());
        let block = self.alloc(size, TAG_CLOSURE, HeapData::Closure{ func, cells })?;
        Ok(Value::Closure(block))
    }

    pub fn alloc_timer(&mut self) -> ExecResult<BlockRef> {
        self.alloc(TIMER_SIZE, TAG_TIMER, HeapData::Timer)
    }

    fn alloc_storage(&mut self, size: usize, capacity: usize) -> ExecResult<Option<BlockRef>> {
        if capacity == 0 {
            return Ok(None);
        }
        self.alloc(size, TAG_STORAGE, HeapData::Storage).map(Some)
    }

    // --- Reference counting

    /// Takes a reference for a copy of `value` that is about to be stored.
    #[inline]
    pub fn retain(&mut self, value: Value) -> Value {
        if let Some(block) = value.heap_block() {
            self.pools.retain(block);
        }
        value
    }

    /// Drops a reference, freeing the block and releasing everything it
    /// holds once the last reference is gone.
    pub fn release(&mut self, value: Value) {
        let block = match value.heap_block() {
            Some(block) => block,
            None => return,
        };
        if let Some(data) = self.pools.release(block) {
            let mut pending = Vec::new();
            self.release_contents(data, &mut pending);
            self.release_pending(pending);
        }
    }

    pub fn release_all<I: IntoIterator<Item = Value>>(&mut self, values: I) {
        for value in values {
            self.release(value);
        }
    }

    pub fn release_block(&mut self, block: BlockRef) {
        if let Some(data) = self.pools.release(block) {
            let mut pending = Vec::new();
            self.release_contents(data, &mut pending);
            self.release_pending(pending);
        }
    }

    fn release_pending(&mut self, mut pending: Vec<Value>) {
        while let Some(value) = pending.pop() {
            if let Some(block) = value.heap_block() {
                if let Some(data) = self.pools.release(block) {
                    self.release_contents(data, &mut pending);
                }
            }
        }
    }

    fn release_contents(&mut self, data: HeapData, pending: &mut Vec<Value>) {
        match data {
            HeapData::Array{ items, storage, .. } => {
                if let Some(storage) = storage {
                    self.pools.release(storage);
                }
                pending.extend(items);
            },
            HeapData::Object{ props, storage, .. } => {
                if let Some(storage) = storage {
                    self.pools.release(storage);
                }
                pending.extend(props.into_iter().map(|(_, v)| v));
            },
            HeapData::Cell(value) => pending.push(value),
            HeapData::Closure{ cells, .. } => pending.extend(cells),
            HeapData::Str(_) | HeapData::Foreign{ .. } | HeapData::Storage | HeapData::Timer => {},
        }
    }

    pub fn make_static(&mut self, value: Value) {
        if let Some(block) = value.heap_block() {
            self.pools.make_static(block);
        }
    }

    pub fn ref_count(&self, value: Value) -> u16 {
        value.heap_block().map_or(0, |b| self.pools.ref_count(b))
    }

    pub fn is_live(&self, value: Value) -> bool {
        value.heap_block().map_or(false, |b| self.pools.get(b).is_some())
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.stats()
    }

    pub fn used_blocks(&self) -> usize {
        self.pools.used_blocks()
    }

    // --- Access

    /// Text of a heap string, either owned or foreign.
    pub fn string(&self, value: Value) -> Option<&str> {
        match value {
            Value::String(block) | Value::Foreign(block) => match self.pools.get(block)? {
                HeapData::Str(text) => Some(text),
                HeapData::Foreign{ text, .. } => Some(text),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn foreign_handle(&self, value: Value) -> Option<usize> {
        match value {
            Value::Foreign(block) => match self.pools.get(block)? {
                HeapData::Foreign{ handle, .. } => Some(*handle),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn array_len(&self, block: BlockRef) -> Option<usize> {
        match self.pools.get(block)? {
            HeapData::Array{ items, .. } => Some(items.len()),
            _ => None,
        }
    }

    /// Element at `index`, without taking a reference.
    pub fn array_get(&self, block: BlockRef, index: usize) -> Option<Value> {
        match self.pools.get(block)? {
            HeapData::Array{ items, .. } => items.get(index).copied(),
            _ => None,
        }
    }

    /// Stores an already retained value, growing the array when writing past
    /// its end. The gap is filled with `undefined`.
    pub fn array_set(&mut self, block: BlockRef, index: usize, value: Value) -> ExecResult<()> {
        let (len, capacity, old_storage) = match self.pools.get(block) {
            Some(HeapData::Array{ items, capacity, storage }) => (items.len(), *capacity, *storage),
            _ => {
                self.release(value);
                return Err(ExecError::TypeMismatch);
            }
        };

        if index >= capacity {
            let needed = index + 1;
            let mut new_capacity = needed.max(capacity * 2).max(4);
            let mut storage = self.alloc_storage(array_storage_size(new_capacity), new_capacity);
            if storage.is_err() && new_capacity != needed {
                new_capacity = needed;
                storage = self.alloc_storage(array_storage_size(new_capacity), new_capacity);
            }
            let storage = match storage {
                Ok(storage) => storage,
                Err(e) => {
                    self.release(value);
                    return Err(e);
                }
            };
            if let Some(old_storage) = old_storage {
                self.pools.release(old_storage);
            }
            if let Some(HeapData::Array{ capacity, storage: slot, .. }) = self.pools.get_mut(block) {
                *capacity = new_capacity;
                *slot = storage;
            }
        }

        let old = match self.pools.get_mut(block) {
            Some(HeapData::Array{ items, .. }) => {
                if index >= len {
                    items.resize(index, Value::Undefined);
                    items.push(value);
                    None
                } else {
                    Some(std::mem::replace(&mut items[index], value))
                }
            },
            _ => None,
        };
        if let Some(old) = old {
            self.release(old);
        }
        Ok(())
    }

    /// Property value, without taking a reference.
    pub fn object_get(&self, block: BlockRef, key: &str) -> Option<Value> {
        match self.pools.get(block)? {
            HeapData::Object{ props, .. } => props.iter().find(|(k, _)| &**k == key).map(|(_, v)| *v),
            _ => None,
        }
    }

    /// Stores an already retained value under `key`.
    pub fn object_set(&mut self, block: BlockRef, key: &str, value: Value) -> ExecResult<()> {
        let (existing, len, capacity, old_storage) = match self.pools.get(block) {
            Some(HeapData::Object{ props, capacity, storage }) => {
                (props.iter().position(|(k, _)| &**k == key), props.len(), *capacity, *storage)
            },
            _ => {
                self.release(value);
                return Err(ExecError::TypeMismatch);
            }
        };

        if let Some(position) = existing {
            let old = match self.pools.get_mut(block) {
                Some(HeapData::Object{ props, .. }) => Some(std::mem::replace(&mut props[position].1, value)),
                _ => None,
            };
            if let Some(old) = old {
                self.release(old);
            }
            return Ok(());
        }

        if len >= capacity {
            let new_capacity = (capacity * 2).max(4);
            let mut storage = self.alloc_storage(object_storage_size(new_capacity), new_capacity);
            let mut new_capacity = new_capacity;
            if storage.is_err() {
                new_capacity = len + 1;
                storage = self.alloc_storage(object_storage_size(new_capacity), new_capacity);
            }
            let storage = match storage {
                Ok(storage) => storage,
                Err(e) => {
                    self.release(value);
                    return Err(e);
                }
            };
            if let Some(old_storage) = old_storage {
                self.pools.release(old_storage);
            }
            if let Some(HeapData::Object{ capacity, storage: slot, .. }) = self.pools.get_mut(block) {
                *capacity = new_capacity;
                *slot = storage;
            }
        }

        if let Some(HeapData::Object{ props, .. }) = self.pools.get_mut(block) {
            props.push((key.into(), value));
        }
        Ok(())
    }

    pub fn object_len(&self, block: BlockRef) -> Option<usize> {
        match self.pools.get(block)? {
            HeapData::Object{ props, .. } => Some(props.len()),
            _ => None,
        }
    }

    /// Content of a cell, without taking a reference.
    pub fn cell_get(&self, block: BlockRef) -> Option<Value> {
        match self.pools.get(block)? {
            HeapData::Cell(value) => Some(*value),
            _ => None,
        }
    }

    /// Stores an already retained value in a cell, releasing the old one.
    pub fn cell_set(&mut self, block: BlockRef, value: Value) -> ExecResult<()> {
        let old = match self.pools.get_mut(block) {
            Some(HeapData::Cell(slot)) => std::mem::replace(slot, value),
            _ => {
                self.release(value);
                return Err(ExecError::TypeMismatch);
            }
        };
        self.release(old);
        Ok(())
    }

    pub fn closure_func(&self, block: BlockRef) -> Option<FuncRef> {
        match self.pools.get(block)? {
            HeapData::Closure{ func, .. } => Some(*func),
            _ => None,
        }
    }

    /// Captured cell `index` of a closure, without taking a reference.
    pub fn closure_cell(&self, block: BlockRef, index: usize) -> Option<Value> {
        match self.pools.get(block)? {
            HeapData::Closure{ cells, .. } => cells.get(index).copied(),
            _ => None,
        }
    }
}
