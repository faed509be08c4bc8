use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{QueueError, QueueManager};
use crate::models::UserAccount;
use crate::paperless::DocumentQuery;

pub const POLL_PAGE_SIZE: u32 = 100;

/// The first poll for a user only records the newest id it can see, so a
/// freshly started process does not flood the queue with the back catalogue.
#[derive(Debug, Default)]
pub struct DocumentWatcher {
    marks: HashMap<Uuid, i64>,
}

impl DocumentWatcher {
    pub fn mark(&self, user_id: Uuid) -> Option<i64> {
        self.marks.get(&user_id).copied()
    }

    pub async fn poll(&mut self, manager: &QueueManager) -> Result<u64, QueueError> {
        let users = manager.inner.repo.active_users().await?;
        let mut enqueued = 0;
        for user in users {
            match self.poll_user(manager, &user).await {
                Ok(count) => enqueued += count,
                Err(err) => {
                    warn!(user_id = %user.id, error = %err, "polling user documents failed");
                }
            }
        }
        if enqueued > 0 {
            info!(enqueued, "queued newly discovered documents");
        }
        Ok(enqueued)
    }

    async fn poll_user(&mut self, manager: &QueueManager, user: &UserAccount) -> Result<u64, QueueError> {
        let service = manager.inner.clients.for_user(user)?;
        let page = service
            .list_documents(&DocumentQuery::page(1, POLL_PAGE_SIZE).ordering("-id"))
            .await?;
        let ids: Vec<i64> = page.results.iter().map(|doc| doc.id).collect();
        debug!(user_id = %user.id, seen = ids.len(), "polled document service");

        let (fresh, newest) = unseen_documents(self.mark(user.id), &ids);

        // The mark only passes ids that were queued or skipped, so a failed
        // enqueue is picked up again on the next poll.
        let mut enqueued = 0;
        for document_id in fresh {
            let processed = manager
                .inner
                .repo
                .get_processed(user.id, document_id)
                .await?;
            if processed.is_none() {
                manager.add_document(user.id, document_id, 0).await?;
                enqueued += 1;
            }
            self.marks.insert(user.id, document_id);
        }
        self.marks.insert(user.id, newest);
        Ok(enqueued)
    }
}

/// Splits a listing into ids above the previous mark and the new mark.
/// Without a previous mark nothing is reported as new.
pub fn unseen_documents(mark: Option<i64>, ids: &[i64]) -> (Vec<i64>, i64) {
    let newest = ids.iter().copied().max();
    let Some(mark) = mark else {
        return (Vec::new(), newest.unwrap_or(0));
    };
    let mut fresh: Vec<i64> = ids.iter().copied().filter(|id| *id > mark).collect();
    fresh.sort_unstable();
    fresh.dedup();
    (fresh, newest.map_or(mark, |newest| newest.max(mark)))
}
