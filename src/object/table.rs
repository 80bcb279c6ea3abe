//! `LuaTable`: array + hash hybrid, following the teacher's
//! `lua_value/lua_table.rs` design (array part for small positive integer
//! keys, `hashbrown` for everything else).

use crate::gc::TableId;
use crate::value::LuaValue;
use ahash::RandomState;
use hashbrown::HashMap;

pub struct LuaTable {
    array: Vec<LuaValue>,
    hash: HashMap<LuaValue, LuaValue, RandomState>,
    metatable: Option<TableId>,
}

impl LuaTable {
    pub fn new() -> Self {
        LuaTable {
            array: Vec::new(),
            hash: HashMap::with_hasher(RandomState::new()),
            metatable: None,
        }
    }

    pub fn with_capacity(array_hint: usize, hash_hint: usize) -> Self {
        LuaTable {
            array: Vec::with_capacity(array_hint),
            hash: HashMap::with_capacity_and_hasher(hash_hint, RandomState::new()),
            metatable: None,
        }
    }

    pub fn metatable(&self) -> Option<TableId> {
        self.metatable
    }

    pub fn set_metatable(&mut self, mt: Option<TableId>) {
        self.metatable = mt;
    }

    #[inline]
    fn array_slot(&self, i: i64) -> Option<usize> {
        if i >= 1 && (i as usize) <= self.array.len() {
            Some((i - 1) as usize)
        } else {
            None
        }
    }

    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        if let Some(i) = key.as_array_index() {
            if let Some(idx) = self.array_slot(i) {
                return self.array[idx];
            }
        }
        self.hash.get(key).copied().unwrap_or(LuaValue::Nil)
    }

    /// `set(k, nil)` removes the key. Invariant (c): a `nil` key is a no-op;
    /// invariant (a) is enforced by the caller (VM opcodes raise `TypeError`
    /// before calling through with a `nil`/`NaN` key).
    pub fn raw_set(&mut self, key: LuaValue, value: LuaValue) {
        if let Some(i) = key.as_array_index() {
            if let Some(idx) = self.array_slot(i) {
                self.array[idx] = value;
                if value.is_nil() && idx + 1 == self.array.len() {
                    self.shrink_array_tail();
                }
                return;
            }
            if i == self.array.len() as i64 + 1 && !value.is_nil() {
                self.array.push(value);
                self.migrate_from_hash();
                return;
            }
        }
        if value.is_nil() {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
    }

    /// After appending to the array part, pull any now-contiguous integer
    /// keys out of the hash part (the rehash policy from §4.4.2).
    fn migrate_from_hash(&mut self) {
        loop {
            let next = self.array.len() as i64 + 1;
            match self.hash.remove(&LuaValue::integer(next)) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    fn shrink_array_tail(&mut self) {
        while matches!(self.array.last(), Some(v) if v.is_nil()) {
            self.array.pop();
        }
    }

    /// Any boundary `n` such that `t[n] != nil and t[n+1] == nil`, per
    /// invariant (b). With no holes the array length is exactly right; with
    /// holes any boundary is a valid answer, so returning the array length
    /// (trimmed of trailing nils) is conformant.
    pub fn length(&self) -> i64 {
        if !self.array.is_empty() {
            return self.array.len() as i64;
        }
        // Array part empty: binary-search the hash part for a boundary.
        if self.hash.get(&LuaValue::integer(1)).is_none() {
            return 0;
        }
        let mut i: i64 = 1;
        let mut j: i64 = 2;
        while self.hash.contains_key(&LuaValue::integer(j)) {
            i = j;
            if j > i64::MAX / 2 {
                // Degenerate: fall back to a linear scan.
                let mut n = 1;
                while self.hash.contains_key(&LuaValue::integer(n)) {
                    n += 1;
                }
                return n - 1;
            }
            j *= 2;
        }
        while j - i > 1 {
            let m = (i + j) / 2;
            if self.hash.contains_key(&LuaValue::integer(m)) {
                i = m;
            } else {
                j = m;
            }
        }
        i
    }

    /// `next(key)` iteration: array part first (in index order), then the
    /// hash part (order across mutations is unspecified, matching Lua).
    pub fn next(&self, key: &LuaValue) -> Option<(LuaValue, LuaValue)> {
        if key.is_nil() {
            for (i, v) in self.array.iter().enumerate() {
                if !v.is_nil() {
                    return Some((LuaValue::integer(i as i64 + 1), *v));
                }
            }
            return self.hash.iter().next().map(|(k, v)| (*k, *v));
        }
        if let Some(i) = key.as_array_index() {
            if i >= 1 && (i as usize) <= self.array.len() {
                for j in (i as usize)..self.array.len() {
                    if !self.array[j].is_nil() {
                        return Some((LuaValue::integer(j as i64 + 1), self.array[j]));
                    }
                }
                return self.hash.iter().next().map(|(k, v)| (*k, *v));
            }
        }
        let mut found = false;
        for (k, v) in self.hash.iter() {
            if found {
                return Some((*k, *v));
            }
            if k == key {
                found = true;
            }
        }
        None
    }

    pub fn array_len(&self) -> usize {
        self.array.len()
    }

    pub fn iter_array(&self) -> impl Iterator<Item = (i64, &LuaValue)> {
        self.array
            .iter()
            .enumerate()
            .map(|(i, v)| (i as i64 + 1, v))
    }

    pub fn iter_hash(&self) -> impl Iterator<Item = (&LuaValue, &LuaValue)> {
        self.hash.iter()
    }
}

impl Default for LuaTable {
    fn default() -> Self {
        Self::new()
    }
}
