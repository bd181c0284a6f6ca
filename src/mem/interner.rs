use super::{Arena, ArenaError, ArenaRef};
use crate::StrId;
use std::collections::HashMap;

/// A string interner mapping byte-equal strings to dense [StrId]s.
///
/// Backing bytes live in the interner's [Arena] share; ids are stable for the
/// arena's lifetime and `resolve` is O(1). Lookup goes through a deterministic
/// FNV-1a bucket map so that interning order, and therefore id assignment,
/// does not depend on process-random hashing.
pub struct StringInterner {
    arena: Arena,
    refs: Vec<ArenaRef>,
    buckets: HashMap<u64, Vec<StrId>>,
}

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

pub(crate) fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl StringInterner {
    pub fn new(initial_size: usize, cap: usize) -> Self {
        Self {
            arena: Arena::new(initial_size, cap),
            refs: Vec::new(),
            buckets: HashMap::new(),
        }
    }

    /// Intern a string, returning its id. `intern(s) == intern(t)` iff `s == t` byte-wise.
    pub fn intern(&mut self, s: &str) -> Result<StrId, ArenaError> {
        let hash = fnv1a(s.as_bytes(), FNV_OFFSET);
        if let Some(candidates) = self.buckets.get(&hash) {
            for id in candidates {
                if self.arena.get(self.refs[id.0 as usize]) == s.as_bytes() {
                    return Ok(*id);
                }
            }
        }

        let r = self.arena.alloc(s.as_bytes())?;
        let id = StrId(self.refs.len() as u32);
        self.refs.push(r);
        self.buckets.entry(hash).or_default().push(id);
        Ok(id)
    }

    /// Return the id of a previously interned string, without interning.
    pub fn get(&self, s: &str) -> Option<StrId> {
        let hash = fnv1a(s.as_bytes(), FNV_OFFSET);
        self.buckets.get(&hash).and_then(|candidates| {
            candidates
                .iter()
                .find(|id| self.arena.get(self.refs[id.0 as usize]) == s.as_bytes())
                .copied()
        })
    }

    /// Resolve an id back to its string.
    pub fn resolve(&self, id: StrId) -> &str {
        let bytes = self.arena.get(self.refs[id.0 as usize]);
        // Interned bytes always originate from &str values.
        unsafe { std::str::from_utf8_unchecked(bytes) }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }

    /// Drop every interned string. Previously returned ids become invalid.
    pub fn reset(&mut self) {
        self.arena.reset();
        self.refs.clear();
        self.buckets.clear();
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        StringInterner::new(4096, usize::MAX)
    }
}
