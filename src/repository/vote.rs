use std::collections::BTreeMap;

use async_trait::async_trait;
use rusqlite::{params, Connection, TransactionBehavior};

use super::{RepositoryError, Store};
use crate::vote::{Reaction, VoteState, VoteTarget};

/// Fact table of votes plus the denormalized counters on posts and
/// commentaries. Counters are only ever touched here, inside the same
/// transaction as the fact rows.
#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Applies `reaction` for `username` on `target` and returns the new state.
    async fn toggle(
        &self,
        target: VoteTarget,
        username: &str,
        reaction: Reaction,
    ) -> Result<VoteState, RepositoryError>;

    async fn state_of(&self, target: VoteTarget, username: &str)
        -> Result<VoteState, RepositoryError>;

    /// Usernames holding `reaction` on `target`, in voting order.
    async fn voters(
        &self,
        target: VoteTarget,
        reaction: Reaction,
    ) -> Result<Vec<String>, RepositoryError>;

    /// Voters for every commentary under `post_id`, keyed by commentary id.
    /// Commentaries nobody voted on map to an empty list.
    async fn commentary_voters(
        &self,
        post_id: i64,
        reaction: Reaction,
    ) -> Result<BTreeMap<i64, Vec<String>>, RepositoryError>;
}

fn current_state(
    conn: &Connection,
    target: VoteTarget,
    username: &str,
) -> Result<VoteState, RepositoryError> {
    let column = target.vote_column();
    let (liked, disliked): (bool, bool) = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM likes WHERE username = ?1 AND {column} = ?2),
                    EXISTS(SELECT 1 FROM dislikes WHERE username = ?1 AND {column} = ?2)"
        ),
        params![username, target.id()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(match (liked, disliked) {
        (true, _) => VoteState::Liked,
        (false, true) => VoteState::Disliked,
        (false, false) => VoteState::None,
    })
}

/// SQLite implementation
pub struct SqliteVoteRepository {
    store: Store,
}

impl SqliteVoteRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VoteRepository for SqliteVoteRepository {
    async fn toggle(
        &self,
        target: VoteTarget,
        username: &str,
        reaction: Reaction,
    ) -> Result<VoteState, RepositoryError> {
        let mut conn = self.store.conn()?;

        // IMMEDIATE takes the write lock up front, so the state read below
        // cannot go stale before the writes land. Dropping `tx` without
        // commit rolls everything back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let transition = current_state(&tx, target, username)?.apply(reaction);

        let updated = tx.execute(
            &format!(
                "UPDATE {} SET likes = likes + ?1, dislikes = dislikes + ?2 WHERE id = ?3",
                target.table()
            ),
            params![
                transition.like_delta(),
                transition.dislike_delta(),
                target.id()
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound(target.to_string()));
        }

        let column = target.vote_column();
        if let Some(removed) = transition.removed() {
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE username = ?1 AND {column} = ?2",
                    removed.table()
                ),
                params![username, target.id()],
            )?;
        }
        if let Some(added) = transition.added() {
            tx.execute(
                &format!(
                    "INSERT INTO {} (username, {column}) VALUES (?1, ?2)",
                    added.table()
                ),
                params![username, target.id()],
            )?;
        }

        tx.commit()?;

        tracing::debug!(
            "{} on {}: {:?} -> {:?}",
            username,
            target,
            transition.from,
            transition.to
        );
        Ok(transition.to)
    }

    async fn state_of(
        &self,
        target: VoteTarget,
        username: &str,
    ) -> Result<VoteState, RepositoryError> {
        let conn = self.store.conn()?;
        current_state(&conn, target, username)
    }

    async fn voters(
        &self,
        target: VoteTarget,
        reaction: Reaction,
    ) -> Result<Vec<String>, RepositoryError> {
        let conn = self.store.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT username FROM {} WHERE {} = ?1 ORDER BY rowid",
            reaction.table(),
            target.vote_column()
        ))?;
        let usernames = stmt
            .query_map(params![target.id()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(usernames)
    }

    async fn commentary_voters(
        &self,
        post_id: i64,
        reaction: Reaction,
    ) -> Result<BTreeMap<i64, Vec<String>>, RepositoryError> {
        let conn = self.store.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT c.id, v.username
             FROM commentaries c
             LEFT JOIN {} v ON v.commentary_id = c.id
             WHERE c.post_id = ?1
             ORDER BY c.id, v.rowid",
            reaction.table()
        ))?;
        let rows = stmt
            .query_map(params![post_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut voters: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for (commentary_id, username) in rows {
            let entry = voters.entry(commentary_id).or_default();
            if let Some(username) = username {
                entry.push(username);
            }
        }

        Ok(voters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;
    use std::sync::Arc;

    struct Fixture {
        repo: SqliteVoteRepository,
        store: Store,
        post_id: i64,
        _tmp: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let (store, tmp) = testing::store();
        for name in ["alice", "bob", "carol"] {
            testing::insert_user(&store, name);
        }
        let post_id = testing::insert_post(&store, "alice", "post");
        Fixture {
            repo: SqliteVoteRepository::new(store.clone()),
            store,
            post_id,
            _tmp: tmp,
        }
    }

    /// (likes counter, dislikes counter, like rows, dislike rows)
    fn tallies(store: &Store, target: VoteTarget) -> (i64, i64, i64, i64) {
        let conn = store.pool().get().unwrap();
        let column = target.vote_column();
        conn.query_row(
            &format!(
                "SELECT t.likes, t.dislikes,
                        (SELECT COUNT(*) FROM likes WHERE {column} = ?1),
                        (SELECT COUNT(*) FROM dislikes WHERE {column} = ?1)
                 FROM {} t WHERE t.id = ?1",
                target.table()
            ),
            params![target.id()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_like_then_like_again_returns_to_none() {
        let f = fixture();
        let target = VoteTarget::Post(f.post_id);

        let state = f.repo.toggle(target, "bob", Reaction::Like).await.unwrap();
        assert_eq!(state, VoteState::Liked);
        assert_eq!(tallies(&f.store, target), (1, 0, 1, 0));

        let state = f.repo.toggle(target, "bob", Reaction::Like).await.unwrap();
        assert_eq!(state, VoteState::None);
        assert_eq!(tallies(&f.store, target), (0, 0, 0, 0));
        assert_eq!(f.repo.state_of(target, "bob").await.unwrap(), VoteState::None);
    }

    #[tokio::test]
    async fn test_switching_moves_the_vote() {
        let f = fixture();
        let target = VoteTarget::Post(f.post_id);

        f.repo.toggle(target, "bob", Reaction::Like).await.unwrap();
        let state = f.repo.toggle(target, "bob", Reaction::Dislike).await.unwrap();

        assert_eq!(state, VoteState::Disliked);
        assert_eq!(tallies(&f.store, target), (0, 1, 0, 1));
        assert!(f.repo.voters(target, Reaction::Like).await.unwrap().is_empty());
        assert_eq!(
            f.repo.voters(target, Reaction::Dislike).await.unwrap(),
            vec!["bob".to_string()]
        );

        let state = f.repo.toggle(target, "bob", Reaction::Like).await.unwrap();
        assert_eq!(state, VoteState::Liked);
        assert_eq!(tallies(&f.store, target), (1, 0, 1, 0));
    }

    #[tokio::test]
    async fn test_counters_track_many_users() {
        let f = fixture();
        let target = VoteTarget::Post(f.post_id);

        f.repo.toggle(target, "alice", Reaction::Like).await.unwrap();
        f.repo.toggle(target, "bob", Reaction::Like).await.unwrap();
        f.repo.toggle(target, "carol", Reaction::Dislike).await.unwrap();
        f.repo.toggle(target, "bob", Reaction::Dislike).await.unwrap();

        assert_eq!(tallies(&f.store, target), (1, 2, 1, 2));
        assert_eq!(
            f.repo.voters(target, Reaction::Dislike).await.unwrap(),
            vec!["carol".to_string(), "bob".to_string()]
        );
    }

    #[tokio::test]
    async fn test_commentary_votes_are_separate_from_post_votes() {
        let f = fixture();
        let commentary = testing::insert_commentary(&f.store, f.post_id, "bob");
        let post = VoteTarget::Post(f.post_id);
        let comment = VoteTarget::Commentary(commentary);

        f.repo.toggle(post, "alice", Reaction::Like).await.unwrap();
        f.repo.toggle(comment, "alice", Reaction::Dislike).await.unwrap();

        assert_eq!(f.repo.state_of(post, "alice").await.unwrap(), VoteState::Liked);
        assert_eq!(
            f.repo.state_of(comment, "alice").await.unwrap(),
            VoteState::Disliked
        );
        assert_eq!(tallies(&f.store, post), (1, 0, 1, 0));
        assert_eq!(tallies(&f.store, comment), (0, 1, 0, 1));
    }

    #[tokio::test]
    async fn test_commentary_voters_grouped_by_commentary() {
        let f = fixture();
        let first = testing::insert_commentary(&f.store, f.post_id, "bob");
        let second = testing::insert_commentary(&f.store, f.post_id, "carol");
        let other_post = testing::insert_post(&f.store, "bob", "other");
        let elsewhere = testing::insert_commentary(&f.store, other_post, "bob");

        f.repo
            .toggle(VoteTarget::Commentary(first), "alice", Reaction::Like)
            .await
            .unwrap();
        f.repo
            .toggle(VoteTarget::Commentary(first), "carol", Reaction::Like)
            .await
            .unwrap();
        f.repo
            .toggle(VoteTarget::Commentary(elsewhere), "alice", Reaction::Like)
            .await
            .unwrap();

        let likes = f
            .repo
            .commentary_voters(f.post_id, Reaction::Like)
            .await
            .unwrap();
        assert_eq!(likes.len(), 2);
        assert_eq!(likes[&first], vec!["alice".to_string(), "carol".to_string()]);
        assert!(likes[&second].is_empty());
        assert!(!likes.contains_key(&elsewhere));
    }

    #[tokio::test]
    async fn test_missing_target_leaves_no_rows() {
        let f = fixture();
        let result = f
            .repo
            .toggle(VoteTarget::Post(9999), "bob", Reaction::Like)
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));

        let conn = f.store.pool().get().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM likes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_toggles_keep_counters_consistent() {
        let f = fixture();
        let repo = Arc::new(SqliteVoteRepository::new(f.store.clone()));
        let target = VoteTarget::Post(f.post_id);

        let users = ["alice", "bob", "carol"];
        let mut handles = Vec::new();
        for (i, &user) in users.iter().enumerate() {
            for round in 0..7 {
                let repo = repo.clone();
                let reaction = if (i + round) % 3 == 0 {
                    Reaction::Dislike
                } else {
                    Reaction::Like
                };
                handles.push(tokio::spawn(async move {
                    repo.toggle(target, user, reaction).await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let (likes, dislikes, like_rows, dislike_rows) = tallies(&f.store, target);
        assert_eq!(likes, like_rows);
        assert_eq!(dislikes, dislike_rows);

        let mut expected = (0, 0);
        for user in users {
            match repo.state_of(target, user).await.unwrap() {
                VoteState::Liked => expected.0 += 1,
                VoteState::Disliked => expected.1 += 1,
                VoteState::None => {}
            }
        }
        assert_eq!((likes, dislikes), expected);
    }
}
