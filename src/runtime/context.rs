//! Per-invocation state behind the deterministic host intrinsics.

use std::collections::HashSet;
use std::rc::Rc;

/// Offset added to sequential identity hash codes.
pub const HASH_OFFSET: i64 = 0xfed_c0de;

/// Everything sandboxed code can observe that would otherwise depend on the
/// host: identity hashes, the random stream, interned strings and object ids.
/// A fresh context per invocation keeps repeated runs identical.
#[derive(Debug)]
pub struct ExecutionContext {
    next_object_id: u64,
    next_hash: i64,
    random_state: u64,
    interned: HashSet<Rc<str>>,
}

impl ExecutionContext {
    pub fn new(random_seed: u64) -> Self {
        Self {
            next_object_id: 0,
            next_hash: 0,
            random_state: random_seed,
            interned: HashSet::new(),
        }
    }

    pub fn next_object_id(&mut self) -> u64 {
        self.next_object_id += 1;
        self.next_object_id
    }

    /// Sequential identity hash codes.
    pub fn next_hash(&mut self) -> i64 {
        self.next_hash += 1;
        self.next_hash.wrapping_add(HASH_OFFSET)
    }

    /// splitmix64 step.
    pub fn next_random(&mut self) -> i64 {
        self.random_state = self.random_state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.random_state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        (z ^ (z >> 31)) as i64
    }

    pub fn intern(&mut self, value: &Rc<str>) -> Rc<str> {
        if let Some(existing) = self.interned.get(value) {
            return existing.clone();
        }
        self.interned.insert(value.clone());
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_are_sequential() {
        let mut ctx = ExecutionContext::new(0);
        assert_eq!(ctx.next_hash(), 0xfed_c0de + 1);
        assert_eq!(ctx.next_hash(), 0xfed_c0de + 2);
    }

    #[test]
    fn test_random_stream_depends_only_on_seed() {
        let mut a = ExecutionContext::new(42);
        let mut b = ExecutionContext::new(42);
        let mut c = ExecutionContext::new(43);
        let xs: Vec<i64> = (0..4).map(|_| a.next_random()).collect();
        let ys: Vec<i64> = (0..4).map(|_| b.next_random()).collect();
        assert_eq!(xs, ys);
        assert_ne!(xs[0], c.next_random());
    }

    #[test]
    fn test_intern_returns_canonical() {
        let mut ctx = ExecutionContext::new(0);
        let first: Rc<str> = Rc::from("abc");
        let second: Rc<str> = Rc::from("abc");
        let a = ctx.intern(&first);
        let b = ctx.intern(&second);
        assert!(Rc::ptr_eq(&a, &b));
    }
}
