//! Field metadata store
//!
//! One collection of descriptors, unique on field name, shared by every
//! tenant. Writes are not locked across calls: uniqueness violations are
//! reported as `DuplicateKey` and resolved by the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::descriptor::FieldDescriptor;
use super::errors::{MetadataError, MetadataResult};

/// Future returned by metadata operations
pub type MetadataFuture<'a, T> = Pin<Box<dyn Future<Output = MetadataResult<T>> + Send + 'a>>;

pub trait MetadataStore: Send + Sync {
    fn get<'a>(&'a self, name: &'a str) -> MetadataFuture<'a, Option<FieldDescriptor>>;

    /// Every descriptor, ordered by name
    fn list(&self) -> MetadataFuture<'_, Vec<FieldDescriptor>>;

    /// Fails with `DuplicateKey` if the name is taken.
    fn insert(&self, descriptor: FieldDescriptor) -> MetadataFuture<'_, ()>;

    /// Overwrites an existing descriptor; fails with `NotFound` otherwise.
    fn replace(&self, descriptor: FieldDescriptor) -> MetadataFuture<'_, ()>;

    /// Moves a descriptor to a new name. Fails with `DuplicateKey` if the
    /// new name is taken and `NotFound` if the old one is absent.
    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> MetadataFuture<'a, FieldDescriptor>;

    /// Returns whether a descriptor was removed.
    fn remove<'a>(&'a self, name: &'a str) -> MetadataFuture<'a, bool>;
}

type Descriptors = BTreeMap<String, FieldDescriptor>;

/// Resident metadata store
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    descriptors: RwLock<Descriptors>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_descriptors(descriptors: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        let map = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self {
            descriptors: RwLock::new(map),
        }
    }

    fn read(&self) -> MetadataResult<RwLockReadGuard<'_, Descriptors>> {
        self.descriptors
            .read()
            .map_err(|_| MetadataError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> MetadataResult<RwLockWriteGuard<'_, Descriptors>> {
        self.descriptors
            .write()
            .map_err(|_| MetadataError::Unavailable("lock poisoned".to_string()))
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get<'a>(&'a self, name: &'a str) -> MetadataFuture<'a, Option<FieldDescriptor>> {
        Box::pin(async move { Ok(self.read()?.get(name).cloned()) })
    }

    fn list(&self) -> MetadataFuture<'_, Vec<FieldDescriptor>> {
        Box::pin(async move { Ok(self.read()?.values().cloned().collect()) })
    }

    fn insert(&self, descriptor: FieldDescriptor) -> MetadataFuture<'_, ()> {
        Box::pin(async move {
            let mut map = self.write()?;
            if map.contains_key(&descriptor.name) {
                return Err(MetadataError::DuplicateKey(descriptor.name));
            }
            map.insert(descriptor.name.clone(), descriptor);
            Ok(())
        })
    }

    fn replace(&self, descriptor: FieldDescriptor) -> MetadataFuture<'_, ()> {
        Box::pin(async move {
            let mut map = self.write()?;
            match map.get_mut(&descriptor.name) {
                Some(slot) => {
                    *slot = descriptor;
                    Ok(())
                }
                None => Err(MetadataError::NotFound(descriptor.name)),
            }
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> MetadataFuture<'a, FieldDescriptor> {
        Box::pin(async move {
            let mut map = self.write()?;
            if map.contains_key(to) {
                return Err(MetadataError::DuplicateKey(to.to_string()));
            }
            let old = map
                .remove(from)
                .ok_or_else(|| MetadataError::NotFound(from.to_string()))?;
            let renamed = old.renamed(to);
            map.insert(to.to_string(), renamed.clone());
            Ok(renamed)
        })
    }

    fn remove<'a>(&'a self, name: &'a str) -> MetadataFuture<'a, bool> {
        Box::pin(async move { Ok(self.write()?.remove(name).is_some()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldType;
    use crate::fields::NewField;

    fn descriptor(name: &str) -> FieldDescriptor {
        NewField::new(name, FieldType::String).into_descriptor()
    }

    #[tokio::test]
    async fn test_insert_is_unique() {
        let store = MemoryMetadataStore::new();
        store.insert(descriptor("gender")).await.unwrap();
        assert_eq!(
            store.insert(descriptor("gender")).await,
            Err(MetadataError::DuplicateKey("gender".into()))
        );
    }

    #[tokio::test]
    async fn test_rename_conflicts() {
        let store = MemoryMetadataStore::with_descriptors([descriptor("a"), descriptor("b")]);
        assert_eq!(
            store.rename("a", "b").await,
            Err(MetadataError::DuplicateKey("b".into()))
        );
        assert_eq!(
            store.rename("missing", "c").await,
            Err(MetadataError::NotFound("missing".into()))
        );
        let renamed = store.rename("a", "c").await.unwrap();
        assert_eq!(renamed.name, "c");
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_replace_and_remove() {
        let store = MemoryMetadataStore::new();
        assert!(matches!(
            store.replace(descriptor("x")).await,
            Err(MetadataError::NotFound(_))
        ));
        store.insert(descriptor("x")).await.unwrap();
        assert!(store.remove("x").await.unwrap());
        assert!(!store.remove("x").await.unwrap());
    }
}
