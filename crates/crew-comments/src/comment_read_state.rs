use crate::comment_contract::{CommentStoreError, EnrichedComment};
use crate::comment_store::CommentStore;

/// Marks one thread (and every reply in it) as read. Idempotent: a second
/// call observes the same persisted state.
pub fn mark_comment_read(store: &CommentStore, comment_id: &str) -> Result<(), CommentStoreError> {
    let mut comment = store.require_by_id(comment_id)?;
    comment.mark_read();
    store.save(&comment)
}

/// Returns a worker's own threads, newest first and enriched, marking every
/// thread and reply as read on the way out. The read-marking side effect
/// mirrors the worker-facing listing behavior of the application.
pub fn find_for_worker_marking_read(
    store: &CommentStore,
    worker_id: &str,
) -> Result<Vec<EnrichedComment>, CommentStoreError> {
    let mut comments = store.find_for_worker(worker_id)?;
    for comment in &mut comments {
        if comment.is_new || comment.replies.iter().any(|reply| reply.is_new) {
            comment.mark_read();
            store.save(comment)?;
        }
    }
    store.enrich_all(comments)
}

/// Bulk-clears the unread-admin-reply flag for a worker. Returns how many
/// threads changed; zero when nothing was flagged.
pub fn mark_admin_replies_read(
    store: &CommentStore,
    worker_id: &str,
) -> Result<usize, CommentStoreError> {
    store.clear_unread_admin_replies(worker_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comment_contract::AuthorRole;
    use tempfile::tempdir;

    #[test]
    fn functional_mark_comment_read_clears_comment_and_replies() {
        let temp = tempdir().expect("tempdir");
        let store = CommentStore::open(temp.path()).expect("open");
        let mut comment = store.create_comment("w-1", "acme", "hello").expect("create");
        comment.append_reply("first", AuthorRole::Admin, 10);
        comment.append_reply("second", AuthorRole::Worker, 20);
        store.save(&comment).expect("save");

        mark_comment_read(&store, &comment.id).expect("mark read");
        let loaded = store.find_by_id(&comment.id).expect("find").expect("present");
        assert!(!loaded.is_new);
        assert!(loaded.replies.iter().all(|reply| !reply.is_new));

        // Second call leaves the persisted state untouched.
        mark_comment_read(&store, &comment.id).expect("mark read again");
        let reloaded = store.find_by_id(&comment.id).expect("find").expect("present");
        assert_eq!(reloaded, loaded);
    }

    #[test]
    fn unit_mark_comment_read_reports_missing_thread() {
        let temp = tempdir().expect("tempdir");
        let store = CommentStore::open(temp.path()).expect("open");
        assert!(matches!(
            mark_comment_read(&store, "c99999999"),
            Err(CommentStoreError::NotFound(_))
        ));
    }

    #[test]
    fn functional_worker_listing_marks_everything_read() {
        let temp = tempdir().expect("tempdir");
        let store = CommentStore::open(temp.path()).expect("open");
        let mut comment = store.create_comment("w-1", "acme", "hello").expect("create");
        comment.append_reply("reply", AuthorRole::Admin, 10);
        store.save(&comment).expect("save");

        let listed = find_for_worker_marking_read(&store, "w-1").expect("list");
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].comment.is_new);

        let persisted = store.find_by_id(&comment.id).expect("find").expect("present");
        assert!(!persisted.is_new);
        assert!(persisted.replies.iter().all(|reply| !reply.is_new));
    }

    #[test]
    fn functional_flag_stays_clear_until_next_admin_reply() {
        let temp = tempdir().expect("tempdir");
        let store = CommentStore::open(temp.path()).expect("open");
        let mut comment = store.create_comment("w-1", "acme", "hello").expect("create");
        for index in 0..3 {
            comment.append_reply("admin says", AuthorRole::Admin, index);
        }
        store.save(&comment).expect("save");

        assert_eq!(mark_admin_replies_read(&store, "w-1").expect("clear"), 1);
        let cleared = store.find_by_id(&comment.id).expect("find").expect("present");
        assert!(!cleared.has_unread_admin_reply);

        // A fresh admin reply re-arms the flag.
        let mut comment = cleared;
        comment.append_reply("one more", AuthorRole::Admin, 99);
        store.save(&comment).expect("save");
        let rearmed = store.find_by_id(&comment.id).expect("find").expect("present");
        assert!(rearmed.has_unread_admin_reply);
    }
}
