//! Member directory: the opaque fact source audiences are resolved against.
//!
//! The directory is an immutable snapshot shared behind an `Arc`. Reloading
//! swaps in a new snapshot; resolutions already in progress keep the one they
//! started with, which is what makes resolution deterministic.

use std::sync::{Arc, RwLock};

use sqlx::PgPool;

use rollcall_common::types::Member;

/// Immutable set of members.
#[derive(Debug, Default)]
pub struct Directory {
    members: Vec<Member>,
}

impl Directory {
    pub fn new(members: Vec<Member>) -> Self {
        Self { members }
    }

    /// All members, in directory order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Members eligible to receive broadcasts.
    pub fn eligible(&self) -> impl Iterator<Item = &Member> + '_ {
        self.members.iter().filter(|m| m.active)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Load every member from the `members` table.
    pub async fn load(pool: &PgPool) -> anyhow::Result<Self> {
        let members: Vec<Member> = sqlx::query_as(
            r#"
            SELECT id, email, push_token, display_name, role, region, active
            FROM members
            ORDER BY id
            "#,
        )
        .fetch_all(pool)
        .await?;

        tracing::info!(members = members.len(), "Member directory loaded");
        Ok(Self::new(members))
    }
}

/// Shared, swappable handle to the current directory snapshot.
#[derive(Debug, Clone, Default)]
pub struct DirectoryHandle {
    current: Arc<RwLock<Arc<Directory>>>,
}

impl DirectoryHandle {
    pub fn new(directory: Directory) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(directory))),
        }
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<Directory> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the snapshot. Existing resolutions are unaffected.
    pub fn replace(&self, directory: Directory) {
        let members = directory.len();
        let next = Arc::new(directory);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        tracing::info!(members, "Member directory replaced");
    }

    /// Reload from Postgres and swap the snapshot in.
    pub async fn reload(&self, pool: &PgPool) -> anyhow::Result<()> {
        let directory = Directory::load(pool).await?;
        self.replace(directory);
        Ok(())
    }
}
