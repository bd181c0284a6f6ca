use std::fmt::{Display, Formatter};

/// An interface implemented by objects which live in an [ObjectPool].
pub trait Poolable {
    /// Restore the object to its freshly created state before reuse.
    fn reset(&mut self);
    /// Whether the object is safe to recycle. Objects failing validation on
    /// release are dropped instead of returned to the free list.
    fn validate(&self) -> bool {
        true
    }
    fn in_use(&self) -> bool;
    fn set_in_use(&mut self, in_use: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What [ObjectPool::acquire] does once the high-water mark is reached.
pub enum ExhaustionPolicy {
    /// Keep creating objects above the mark.
    Grow,
    /// Fail the acquisition.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool reached its high-water mark under [ExhaustionPolicy::Fail].
    Exhausted { high_water: usize },
    /// The released object was not marked in use.
    NotInUse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Counters describing pool traffic since creation or the last reset.
pub struct PoolStats {
    pub created: usize,
    pub recycled: usize,
    pub dropped: usize,
    pub live: usize,
}

/// A typed object pool with a `create`/`reset`/`validate` contract.
///
/// `acquire` serves from the free list when possible, calling [Poolable::reset]
/// on the recycled object; otherwise it creates a new object up to the
/// high-water mark, beyond which the configured [ExhaustionPolicy] applies.
pub struct ObjectPool<T: Poolable> {
    free: Vec<T>,
    factory: Box<dyn Fn() -> T>,
    high_water: usize,
    policy: ExhaustionPolicy,
    stats: PoolStats,
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Exhausted { high_water } => {
                write!(f, "ObjectPool exhausted at high-water mark {}", high_water)
            }
            PoolError::NotInUse => write!(f, "Released object was not acquired from this pool"),
        }
    }
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(
        initial_size: usize,
        high_water: usize,
        policy: ExhaustionPolicy,
        factory: Box<dyn Fn() -> T>,
    ) -> Self {
        let mut free = Vec::with_capacity(initial_size);
        for _ in 0..initial_size {
            free.push(factory());
        }
        Self {
            free,
            factory,
            high_water,
            policy,
            stats: PoolStats::default(),
        }
    }

    /// Take an object out of the pool with `in_use` set.
    pub fn acquire(&mut self) -> Result<T, PoolError> {
        let mut object = match self.free.pop() {
            Some(mut recycled) => {
                recycled.reset();
                self.stats.recycled += 1;
                recycled
            }
            None => {
                if self.stats.live >= self.high_water && self.policy == ExhaustionPolicy::Fail {
                    return Err(PoolError::Exhausted {
                        high_water: self.high_water,
                    });
                }
                self.stats.created += 1;
                (self.factory)()
            }
        };
        object.set_in_use(true);
        self.stats.live += 1;
        Ok(object)
    }

    /// Return an object to the free list. Requires `in_use`; objects failing
    /// [Poolable::validate] are dropped instead of reused.
    pub fn release(&mut self, mut object: T) -> Result<(), PoolError> {
        if !object.in_use() {
            return Err(PoolError::NotInUse);
        }
        object.set_in_use(false);
        self.stats.live = self.stats.live.saturating_sub(1);
        if object.validate() {
            self.free.push(object);
        } else {
            self.stats.dropped += 1;
        }
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
