//! Replace semantics built from DELETE followed by the regular write.

use async_trait::async_trait;
use tracing::debug;

use super::WriteExtension;
use crate::error::{Error, Result};
use crate::execution::WriteExecutor;
use crate::notation::{Beacon, Bucket, Element};

/// Deletes rows matching the beacon's expression, then drops the bucket's
/// own clauses so its rows are inserted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Upsert;

#[async_trait]
impl WriteExtension for Upsert {
    async fn apply(
        &self,
        beacon: &Beacon,
        bucket: Bucket,
        executor: &WriteExecutor<'_>,
    ) -> Result<Bucket> {
        let Beacon::Upsert(expression) = beacon else {
            return Err(Error::extension(
                beacon.key(),
                "upsert registered for a non-upsert beacon",
            ));
        };

        let removed = executor.delete(&bucket.name, expression).await?;
        debug!(table = %bucket.name, removed, "upsert cleared matching rows");

        Ok(Bucket {
            elements: bucket
                .elements
                .into_iter()
                .filter(|e| !matches!(e, Element::Clause(_)))
                .collect(),
            ..bucket
        })
    }
}
