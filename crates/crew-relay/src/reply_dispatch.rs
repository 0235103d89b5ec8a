use std::sync::Arc;

use crew_comments::{
    validate_comment_text, AuthorRole, CommentStore, CommentStoreError, EnrichedComment,
};
use crew_core::current_unix_timestamp_ms;

use crate::outbound_messenger::{BestEffortDelivery, OutboundMessenger};

/// Appends replies to comment threads and mirrors admin replies onto the
/// external platform. Persistence always happens before the external send,
/// so a crash mid-delivery still leaves a durable, correct reply.
pub struct ReplyDispatcher {
    store: Arc<CommentStore>,
    delivery: BestEffortDelivery,
}

impl ReplyDispatcher {
    pub fn new(store: Arc<CommentStore>, messenger: Arc<dyn OutboundMessenger>) -> Self {
        Self {
            store,
            delivery: BestEffortDelivery::new(messenger),
        }
    }

    /// Adds a reply and, for admin replies, attempts the external
    /// notification. External delivery failure never rolls back or blocks
    /// the persisted reply and is never retried; the caller always gets
    /// the enriched thread back when persistence succeeded.
    pub async fn add_reply(
        &self,
        comment_id: &str,
        text: &str,
        author_role: AuthorRole,
    ) -> Result<EnrichedComment, CommentStoreError> {
        let text = validate_comment_text(text)?;
        let mut comment = self.store.require_by_id(comment_id)?;
        comment.append_reply(&text, author_role, current_unix_timestamp_ms());
        self.store.save(&comment)?;
        let enriched = self.store.enrich(comment)?;

        if author_role.is_admin() {
            let outcome = self
                .delivery
                .deliver(enriched.worker.telegram_id.as_deref(), &text)
                .await;
            tracing::info!(
                comment_id = %enriched.comment.id,
                worker_id = %enriched.comment.author_worker_id,
                outcome = outcome.as_str(),
                "admin reply external delivery finished"
            );
        }

        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound_messenger::test_support::RecordingMessenger;
    use crew_comments::WorkerProfile;
    use std::path::Path;
    use tempfile::tempdir;

    fn seeded_store(root: &Path, telegram_id: Option<&str>) -> Arc<CommentStore> {
        let store = CommentStore::open(root).expect("open store");
        store
            .upsert_worker_profile(&WorkerProfile {
                id: "w-7".to_string(),
                name: "Alice Moreno".to_string(),
                department: Some("Dispatch".to_string()),
                photo: None,
                telegram_id: telegram_id.map(str::to_string),
            })
            .expect("seed worker");
        store
            .upsert_worker_profile(&WorkerProfile {
                id: "admin-1".to_string(),
                name: "Site Admin".to_string(),
                department: None,
                photo: None,
                telegram_id: None,
            })
            .expect("seed admin");
        Arc::new(store)
    }

    #[tokio::test]
    async fn functional_admin_reply_persists_flags_and_sends_once() {
        let temp = tempdir().expect("tempdir");
        let store = seeded_store(temp.path(), Some("987654321"));
        let comment = store
            .create_comment("w-7", "acme", "My timesheet looks wrong")
            .expect("create");
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = ReplyDispatcher::new(store.clone(), messenger.clone());

        let enriched = dispatcher
            .add_reply(&comment.id, "Please resubmit your timesheet", AuthorRole::Admin)
            .await
            .expect("add reply");

        assert_eq!(enriched.comment.replies.len(), 1);
        assert!(enriched.comment.replies[0].is_admin_reply);
        assert!(enriched.comment.replies[0].is_new);
        assert!(enriched.comment.has_unread_admin_reply);
        assert!(enriched.comment.last_reply_timestamp.is_some());
        assert!(enriched.comment.is_new);

        let persisted = store.find_by_id(&comment.id).expect("find").expect("present");
        assert_eq!(persisted.replies.len(), 1);
        assert_eq!(
            messenger.sent_snapshot(),
            vec![(
                "987654321".to_string(),
                "Please resubmit your timesheet".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn functional_worker_reply_never_attempts_external_delivery() {
        let temp = tempdir().expect("tempdir");
        let store = seeded_store(temp.path(), Some("987654321"));
        let comment = store.create_comment("w-7", "acme", "question").expect("create");
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = ReplyDispatcher::new(store.clone(), messenger.clone());

        let enriched = dispatcher
            .add_reply(&comment.id, "Adding context", AuthorRole::Worker)
            .await
            .expect("add reply");

        assert!(!enriched.comment.replies[0].is_admin_reply);
        assert!(!enriched.comment.has_unread_admin_reply);
        // The thread re-flags as unread even for the author's own reply.
        assert!(enriched.comment.is_new);
        assert!(messenger.sent_snapshot().is_empty());
    }

    #[tokio::test]
    async fn functional_missing_telegram_id_skips_delivery_but_persists() {
        let temp = tempdir().expect("tempdir");
        let store = seeded_store(temp.path(), None);
        let comment = store.create_comment("w-7", "acme", "question").expect("create");
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = ReplyDispatcher::new(store.clone(), messenger.clone());

        let enriched = dispatcher
            .add_reply(&comment.id, "Approved", AuthorRole::Admin)
            .await
            .expect("add reply");

        assert_eq!(enriched.comment.replies.len(), 1);
        assert!(enriched.comment.has_unread_admin_reply);
        assert!(messenger.sent_snapshot().is_empty());
        let persisted = store.find_by_id(&comment.id).expect("find").expect("present");
        assert_eq!(persisted.replies.len(), 1);
    }

    #[tokio::test]
    async fn regression_send_failure_does_not_roll_back_the_reply() {
        let temp = tempdir().expect("tempdir");
        let store = seeded_store(temp.path(), Some("987654321"));
        let comment = store.create_comment("w-7", "acme", "question").expect("create");
        let messenger = Arc::new(RecordingMessenger::failing());
        let dispatcher = ReplyDispatcher::new(store.clone(), messenger.clone());

        let enriched = dispatcher
            .add_reply(&comment.id, "Approved", AuthorRole::Admin)
            .await
            .expect("reply succeeds despite failed delivery");

        assert_eq!(enriched.comment.replies.len(), 1);
        assert_eq!(messenger.sent_snapshot().len(), 1);
        let persisted = store.find_by_id(&comment.id).expect("find").expect("present");
        assert!(persisted.has_unread_admin_reply);
    }

    #[tokio::test]
    async fn unit_unknown_comment_and_empty_text_surface_typed_errors() {
        let temp = tempdir().expect("tempdir");
        let store = seeded_store(temp.path(), None);
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = ReplyDispatcher::new(store.clone(), messenger);

        assert!(matches!(
            dispatcher
                .add_reply("c99999999", "hello", AuthorRole::Admin)
                .await,
            Err(CommentStoreError::NotFound(_))
        ));

        let comment = store.create_comment("w-7", "acme", "question").expect("create");
        assert!(matches!(
            dispatcher.add_reply(&comment.id, "   ", AuthorRole::Worker).await,
            Err(CommentStoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn regression_appending_replies_preserves_existing_order() {
        let temp = tempdir().expect("tempdir");
        let store = seeded_store(temp.path(), Some("987654321"));
        let comment = store.create_comment("w-7", "acme", "thread").expect("create");
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = ReplyDispatcher::new(store.clone(), messenger);

        dispatcher
            .add_reply(&comment.id, "first", AuthorRole::Worker)
            .await
            .expect("first");
        dispatcher
            .add_reply(&comment.id, "second", AuthorRole::Admin)
            .await
            .expect("second");
        let enriched = dispatcher
            .add_reply(&comment.id, "third", AuthorRole::Worker)
            .await
            .expect("third");

        let texts: Vec<&str> = enriched
            .comment
            .replies
            .iter()
            .map(|reply| reply.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
