use std::collections::HashMap;
use std::sync::Mutex;

/// Insertion-order-bounded resolve-to-id cache. Mirrors the donor
/// `UserResolver` cache shape: a lookup map plus a parallel order vector,
/// evicting the oldest half once capacity is hit rather than a strict LRU
/// (cheap, and good enough for a resolver that's re-populated on miss).
struct BoundedMap {
    entries: Mutex<HashMap<String, i64>>,
    order: Mutex<Vec<String>>,
    capacity: usize,
}

impl BoundedMap {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<i64> {
        self.entries.lock().unwrap().get(key).copied()
    }

    fn insert(&self, key: String, person_id: i64) {
        let mut entries = self.entries.lock().unwrap();
        let mut order = self.order.lock().unwrap();
        if !entries.contains_key(&key) {
            order.push(key.clone());
        }
        entries.insert(key, person_id);
        if entries.len() > self.capacity {
            let evict_count = entries.len() / 2;
            for _ in 0..evict_count {
                if order.is_empty() {
                    break;
                }
                let oldest = order.remove(0);
                entries.remove(&oldest);
            }
        }
    }

    fn remove_person(&self, person_id: i64) {
        let mut entries = self.entries.lock().unwrap();
        let mut order = self.order.lock().unwrap();
        entries.retain(|_, v| *v != person_id);
        order.retain(|k| entries.contains_key(k));
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.order.lock().unwrap().clear();
    }
}

const CACHE_MAX: usize = 512;

/// The four identifier caches `FindOrCreatePerson` consults before hitting
/// SQLite (spec §4.3 "In-process caches"). Keyed by the raw identifier
/// value, case-folded for `name` only (phone/email/channel ids are used
/// verbatim since callers normalize those upstream).
pub struct IdentityCache {
    whatsapp_id: BoundedMap,
    phone: BoundedMap,
    email: BoundedMap,
    name: BoundedMap,
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityCache {
    pub fn new() -> Self {
        Self {
            whatsapp_id: BoundedMap::new(CACHE_MAX),
            phone: BoundedMap::new(CACHE_MAX),
            email: BoundedMap::new(CACHE_MAX),
            name: BoundedMap::new(CACHE_MAX),
        }
    }

    pub fn get_whatsapp_id(&self, id: &str) -> Option<i64> {
        self.whatsapp_id.get(id)
    }
    pub fn get_phone(&self, phone: &str) -> Option<i64> {
        self.phone.get(phone)
    }
    pub fn get_email(&self, email: &str) -> Option<i64> {
        self.email.get(&email.to_lowercase())
    }
    pub fn get_name(&self, name: &str) -> Option<i64> {
        self.name.get(&name.to_lowercase())
    }

    pub fn put_whatsapp_id(&self, id: &str, person_id: i64) {
        self.whatsapp_id.insert(id.to_string(), person_id);
    }
    pub fn put_phone(&self, phone: &str, person_id: i64) {
        self.phone.insert(phone.to_string(), person_id);
    }
    pub fn put_email(&self, email: &str, person_id: i64) {
        self.email.insert(email.to_lowercase(), person_id);
    }
    pub fn put_name(&self, name: &str, person_id: i64) {
        self.name.insert(name.to_lowercase(), person_id);
    }

    /// Invalidate every cached entry that resolves to `person_id`. Used
    /// after a merge absorbs that id into another, or the other way round.
    pub fn invalidate_person(&self, person_id: i64) {
        self.whatsapp_id.remove_person(person_id);
        self.phone.remove_person(person_id);
        self.email.remove_person(person_id);
        self.name.remove_person(person_id);
    }

    /// Drop every cached entry (spec §4.3 `ClearCaches`). Called after
    /// merges or bulk imports.
    pub fn clear_all(&self) {
        self.whatsapp_id.clear();
        self.phone.clear();
        self.email.clear();
        self.name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_half_past_capacity() {
        let map = BoundedMap::new(4);
        for i in 0..10 {
            map.insert(format!("k{i}"), i as i64);
        }
        assert!(map.entries.lock().unwrap().len() <= 5);
        assert!(map.get("k9").is_some());
    }

    #[test]
    fn clear_all_empties_every_map() {
        let cache = IdentityCache::new();
        cache.put_phone("+1-555", 1);
        cache.put_name("Alice", 1);
        cache.clear_all();
        assert!(cache.get_phone("+1-555").is_none());
        assert!(cache.get_name("Alice").is_none());
    }
}
