//! Multi-record operations on [`Store`](super::Store). Each public function
//! runs in exactly one transaction.

pub mod batch;
pub mod image;
pub mod project;

use redb::WriteTransaction;

use super::schema::{BATCH_ITEMS_TABLE, ITEM_TABLE};
use super::{StoreError, related_ids};

/// Deletes every item of `batch_id` together with its relation rows.
fn remove_items(txn: &WriteTransaction, batch_id: &str) -> Result<Vec<String>, StoreError> {
    let mut relation = txn.open_table(BATCH_ITEMS_TABLE)?;
    let mut items = txn.open_table(ITEM_TABLE)?;
    let ids = related_ids(&relation, batch_id)?;
    for id in &ids {
        relation.remove((batch_id, id.as_str()))?;
        items.remove(id.as_str())?;
    }
    Ok(ids)
}
