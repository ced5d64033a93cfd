//! Extension points activated by beacons.
//!
//! A beacon in a bucket names an extension by key. Read extensions may
//! rewrite a SELECT before it is finalised and contribute view metadata;
//! write extensions run before a bucket is classified and may issue their
//! own statements.

mod upsert;

pub use upsert::Upsert;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::builder::SelectParts;
use crate::error::Result;
use crate::execution::WriteExecutor;
use crate::notation::{Beacon, Bucket};

pub trait ReadExtension: Send + Sync {
    /// Rewrite the statement parts for the bucket carrying `beacon`.
    fn rewrite(&self, _beacon: &Beacon, parts: SelectParts) -> Result<SelectParts> {
        Ok(parts)
    }

    /// Inspect or adjust assembled records and return extra view metadata.
    fn meta(
        &self,
        _beacon: &Beacon,
        _records: &mut Vec<Map<String, Value>>,
    ) -> Result<Option<Map<String, Value>>> {
        Ok(None)
    }
}

#[async_trait]
pub trait WriteExtension: Send + Sync {
    /// Run before `bucket` is classified; returns the bucket to write.
    async fn apply(
        &self,
        beacon: &Beacon,
        bucket: Bucket,
        executor: &WriteExecutor<'_>,
    ) -> Result<Bucket>;
}

/// Registry of extensions keyed by beacon key.
#[derive(Clone)]
pub struct Extensions {
    read: HashMap<String, Arc<dyn ReadExtension>>,
    write: HashMap<String, Arc<dyn WriteExtension>>,
}

impl Extensions {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            read: HashMap::new(),
            write: HashMap::new(),
        }
    }

    pub fn with_read(mut self, key: impl Into<String>, extension: impl ReadExtension + 'static) -> Self {
        self.read.insert(key.into(), Arc::new(extension));
        self
    }

    pub fn with_write(
        mut self,
        key: impl Into<String>,
        extension: impl WriteExtension + 'static,
    ) -> Self {
        self.write.insert(key.into(), Arc::new(extension));
        self
    }

    pub fn read(&self, key: &str) -> Option<&dyn ReadExtension> {
        self.read.get(key).map(|e| e.as_ref())
    }

    pub fn write(&self, key: &str) -> Option<&dyn WriteExtension> {
        self.write.get(key).map(|e| e.as_ref())
    }
}

impl Default for Extensions {
    /// Registers [`Upsert`] under `"upsert"`.
    fn default() -> Self {
        Self::empty().with_write("upsert", Upsert)
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut read: Vec<_> = self.read.keys().collect();
        let mut write: Vec<_> = self.write.keys().collect();
        read.sort();
        write.sort();
        f.debug_struct("Extensions")
            .field("read", &read)
            .field("write", &write)
            .finish()
    }
}
