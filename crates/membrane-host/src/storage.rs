//! Web storage (`localStorage` / `sessionStorage`).

use crate::error::Completion;
use crate::object::{ObjectKind, StorageArea};
use crate::realm::Realm;
use crate::value::ObjectId;

impl StorageArea {
    /// Bytes charged against the quota: keys plus values, UTF-8.
    pub fn used_bytes(&self) -> usize {
        self.items.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Realm {
    fn storage_area(&mut self, storage: ObjectId) -> Completion<&mut StorageArea> {
        if !matches!(self.object(storage).kind, ObjectKind::Storage(_)) {
            return Err(self.type_error("Illegal invocation"));
        }
        match &mut self.object_mut(storage).kind {
            ObjectKind::Storage(area) => Ok(area),
            _ => unreachable!("checked above"),
        }
    }

    pub fn storage_get_item(&mut self, storage: ObjectId, key: &str) -> Completion<Option<String>> {
        Ok(self.storage_area(storage)?.get(key).map(str::to_string))
    }

    /// Store an item. Exceeding the quota throws `QuotaExceededError` and
    /// leaves the area unchanged.
    pub fn storage_set_item(&mut self, storage: ObjectId, key: &str, value: &str) -> Completion<()> {
        let area = self.storage_area(storage)?;
        let current = area.get(key).map_or(0, |v| key.len() + v.len());
        let needed = area.used_bytes() - current + key.len() + value.len();
        if needed > area.quota_bytes {
            let message = format!(
                "Setting the value of '{key}' exceeded the quota of {} bytes.",
                area.quota_bytes
            );
            return Err(self.dom_exception("QuotaExceededError", &message));
        }
        match area.items.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => area.items.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn storage_remove_item(&mut self, storage: ObjectId, key: &str) -> Completion<()> {
        self.storage_area(storage)?.items.retain(|(k, _)| k != key);
        Ok(())
    }

    pub fn storage_clear(&mut self, storage: ObjectId) -> Completion<()> {
        self.storage_area(storage)?.items.clear();
        Ok(())
    }

    pub fn storage_length(&mut self, storage: ObjectId) -> Completion<usize> {
        Ok(self.storage_area(storage)?.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealmConfig;

    #[test]
    fn set_get_remove() {
        let mut realm = Realm::default();
        let s = realm.local_storage().unwrap();
        realm.storage_set_item(s, "k", "v").unwrap();
        realm.storage_set_item(s, "k", "w").unwrap();
        assert_eq!(realm.storage_get_item(s, "k").unwrap().as_deref(), Some("w"));
        assert_eq!(realm.storage_length(s).unwrap(), 1);
        realm.storage_remove_item(s, "k").unwrap();
        assert_eq!(realm.storage_get_item(s, "k").unwrap(), None);
    }

    #[test]
    fn local_and_session_are_separate() {
        let mut realm = Realm::default();
        let local = realm.local_storage().unwrap();
        let session = realm.session_storage().unwrap();
        realm.storage_set_item(local, "k", "v").unwrap();
        assert_eq!(realm.storage_get_item(session, "k").unwrap(), None);
    }

    #[test]
    fn quota_exceeded_leaves_area_unchanged() {
        let mut realm = Realm::new(RealmConfig {
            storage_quota_bytes: 8,
            ..RealmConfig::default()
        });
        let s = realm.local_storage().unwrap();
        realm.storage_set_item(s, "ab", "cdef").unwrap();
        // replacing an item only charges the difference
        realm.storage_set_item(s, "ab", "cdefgh").unwrap();
        let thrown = realm.storage_set_item(s, "x", "y").unwrap_err();
        assert_eq!(
            realm.error_parts(thrown.value()).map(|e| e.0),
            Some("QuotaExceededError")
        );
        assert_eq!(realm.storage_length(s).unwrap(), 1);
    }

    #[test]
    fn non_storage_receiver_is_type_error() {
        let mut realm = Realm::default();
        let body = realm.body();
        assert!(realm.storage_clear(body).is_err());
    }
}
