use super::{Arena, ExhaustionPolicy, ObjectPool, Poolable, StringInterner};

#[derive(Debug)]
struct Probe {
    value: usize,
    poisoned: bool,
    in_use: bool,
}

impl Poolable for Probe {
    fn reset(&mut self) {
        self.value = 0;
    }
    fn validate(&self) -> bool {
        !self.poisoned
    }
    fn in_use(&self) -> bool {
        self.in_use
    }
    fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }
}

fn probe_pool(initial: usize, high_water: usize, policy: ExhaustionPolicy) -> ObjectPool<Probe> {
    ObjectPool::new(
        initial,
        high_water,
        policy,
        Box::new(|| Probe {
            value: 0,
            poisoned: false,
            in_use: false,
        }),
    )
}

#[test]
fn arena_handles_survive_growth() {
    let mut arena = Arena::new(64, 1 << 20);
    let first = arena.alloc(b"hello").unwrap();
    let mut handles = Vec::new();
    for i in 0..100 {
        let payload = vec![i as u8; 97];
        handles.push((arena.alloc(&payload).unwrap(), payload));
    }
    assert_eq!(arena.get(first), b"hello");
    for (handle, payload) in &handles {
        assert_eq!(arena.get(*handle), &payload[..]);
    }
}

#[test]
fn arena_respects_cap() {
    let mut arena = Arena::new(64, 128);
    arena.alloc(&[0u8; 100]).unwrap();
    let err = arena.alloc(&[0u8; 100]).unwrap_err();
    assert_eq!(err.allocated, 100);
    assert_eq!(err.cap, 128);

    arena.reset();
    assert_eq!(arena.allocated_bytes(), 0);
    arena.alloc(&[0u8; 100]).unwrap();
}

#[test]
fn arena_alignment() {
    let mut arena = Arena::new(64, 1 << 20);
    arena.alloc(b"abc").unwrap();
    let aligned = arena.alloc_raw(16, 8).unwrap();
    assert_eq!(arena.get(aligned).as_ptr() as usize % 8, 0);
}

#[test]
fn interner_deduplicates() {
    let mut interner = StringInterner::default();
    let a = interner.intern("expr").unwrap();
    let b = interner.intern("num").unwrap();
    let c = interner.intern("expr").unwrap();
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(interner.len(), 2);
    assert_eq!(interner.resolve(a), "expr");
    assert_eq!(interner.resolve(b), "num");
    assert_eq!(interner.get("num"), Some(b));
    assert_eq!(interner.get("missing"), None);
}

#[test]
fn interner_ids_are_dense_and_stable() {
    let mut interner = StringInterner::default();
    let ids: Vec<_> = (0..50)
        .map(|i| interner.intern(&format!("sym{}", i)).unwrap())
        .collect();
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id.0 as usize, i);
        assert_eq!(interner.resolve(*id), format!("sym{}", i));
    }
}

#[test]
fn pool_recycles_and_resets() {
    let mut pool = probe_pool(2, 8, ExhaustionPolicy::Fail);
    let mut p = pool.acquire().unwrap();
    assert!(p.in_use());
    p.value = 42;
    pool.release(p).unwrap();

    let p = pool.acquire().unwrap();
    assert_eq!(p.value, 0, "reset must run on recycled objects");
    assert_eq!(pool.stats().recycled, 2);
}

#[test]
fn pool_drops_invalid_objects() {
    let mut pool = probe_pool(0, 8, ExhaustionPolicy::Fail);
    let free_before = pool.free_count();
    let mut p = pool.acquire().unwrap();
    p.poisoned = true;
    pool.release(p).unwrap();
    assert_eq!(pool.free_count(), free_before);
    assert_eq!(pool.stats().dropped, 1);
}

#[test]
fn pool_high_water_fails() {
    let mut pool = probe_pool(0, 2, ExhaustionPolicy::Fail);
    let a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();
    assert!(pool.acquire().is_err());

    pool.release(a).unwrap();
    assert!(pool.acquire().is_ok(), "released capacity is reusable");
}

#[test]
fn pool_release_requires_in_use() {
    let mut pool = probe_pool(0, 2, ExhaustionPolicy::Grow);
    let mut p = pool.acquire().unwrap();
    p.set_in_use(false);
    assert!(pool.release(p).is_err());
}
