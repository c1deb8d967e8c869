use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, RwLock};

use tracing::{debug, info};
use uuid::Uuid;

use crate::app::advice::AdviceService;
use crate::app::sequence::RequestSequence;
use crate::domain::advice::AdviceItem;
use crate::http::ApiError;

/// Both views of one user's follows, always fetched together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FollowSnapshot {
    pub following: BTreeSet<Uuid>,
    pub watchlist: Vec<AdviceItem>,
}

impl FollowSnapshot {
    pub fn watchlist_ids(&self) -> BTreeSet<Uuid> {
        self.watchlist.iter().map(|item| item.id).collect()
    }
}

pub struct FollowRegistry {
    advice: AdviceService,
    state: RwLock<FollowSnapshot>,
    busy: Mutex<HashSet<Uuid>>,
    sequence: RequestSequence<()>,
}

impl FollowRegistry {
    pub fn new(advice: AdviceService) -> Self {
        Self {
            advice,
            state: RwLock::new(FollowSnapshot::default()),
            busy: Mutex::new(HashSet::new()),
            sequence: RequestSequence::new(),
        }
    }

    pub fn snapshot(&self) -> FollowSnapshot {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_following(&self, advice_id: Uuid) -> bool {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .following
            .contains(&advice_id)
    }

    /// A busy item has a toggle in flight; its control should be disabled.
    pub fn is_busy(&self, advice_id: Uuid) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&advice_id)
    }

    /// Fetches the membership set and the watchlist together and replaces
    /// both. A response overtaken by a newer refresh is dropped.
    pub async fn refresh(&self) -> Result<FollowSnapshot, ApiError> {
        let ticket = self.sequence.issue(());
        let (follows, watchlist) = tokio::try_join!(self.advice.follows(), self.advice.watchlist())?;

        let snapshot = FollowSnapshot {
            following: follows.into_iter().map(|relation| relation.advice_id).collect(),
            watchlist,
        };

        if self.sequence.is_current(&(), ticket) {
            *self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();
        } else {
            debug!(ticket, "stale follow refresh discarded");
        }
        Ok(snapshot)
    }

    /// Follows or unfollows depending on current membership, then refreshes
    /// both views. A second toggle on the same item while one is in flight
    /// is rejected, not queued.
    pub async fn toggle(&self, advice_id: Uuid) -> Result<bool, ApiError> {
        let _guard = BusyGuard::acquire(&self.busy, advice_id)?;

        let was_following = self.is_following(advice_id);
        if was_following {
            self.advice.unfollow(advice_id).await?;
        } else {
            self.advice.follow(advice_id).await?;
        }
        info!(advice_id = %advice_id, following = !was_following, "follow toggled");

        let snapshot = self.refresh().await?;
        Ok(snapshot.following.contains(&advice_id))
    }
}

struct BusyGuard<'a> {
    busy: &'a Mutex<HashSet<Uuid>>,
    advice_id: Uuid,
}

impl<'a> BusyGuard<'a> {
    fn acquire(busy: &'a Mutex<HashSet<Uuid>>, advice_id: Uuid) -> Result<Self, ApiError> {
        let inserted = busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(advice_id);
        if !inserted {
            return Err(ApiError::InFlight);
        }
        Ok(Self { busy, advice_id })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.advice_id);
    }
}
