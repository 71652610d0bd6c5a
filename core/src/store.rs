//! Obligation storage: live obligations, the deletion archive, and id
//! assignment.
//!
//! Iteration order for anything time-driven is `(scheduled_at, id)`, so the
//! earliest-due obligation wins ties and creation order breaks the rest.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use vow_types::{
    NonEmptyString, Obligation, ObligationId, ObligationKind, ObligationStatus, PositiveUnits,
    StatusChange,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObligationStore {
    obligations: Vec<Obligation>,
    archived: Vec<Obligation>,
    last_id: u64,
}

impl ObligationStore {
    pub fn insert(
        &mut self,
        kind: ObligationKind,
        name: NonEmptyString,
        units_required: PositiveUnits,
        scheduled_at: DateTime<Utc>,
        window: TimeDelta,
        created_at: DateTime<Utc>,
    ) -> &Obligation {
        self.last_id += 1;
        let obligation = Obligation::new(
            ObligationId::new(self.last_id),
            kind,
            name,
            units_required,
            scheduled_at,
            window,
            created_at,
        );
        self.obligations.push(obligation);
        &self.obligations[self.obligations.len() - 1]
    }

    #[must_use]
    pub fn get(&self, id: ObligationId) -> Option<&Obligation> {
        self.obligations.iter().find(|obligation| obligation.id() == id)
    }

    pub fn get_mut(&mut self, id: ObligationId) -> Option<&mut Obligation> {
        self.obligations
            .iter_mut()
            .find(|obligation| obligation.id() == id)
    }

    /// Live obligations in creation order, terminal ones included.
    pub fn iter(&self) -> impl Iterator<Item = &Obligation> {
        self.obligations.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.obligations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.obligations.is_empty()
    }

    #[must_use]
    pub fn archived(&self) -> &[Obligation] {
        &self.archived
    }

    /// Non-terminal obligations, earliest due first.
    #[must_use]
    pub fn pending(&self) -> Vec<&Obligation> {
        let mut pending: Vec<&Obligation> = self
            .obligations
            .iter()
            .filter(|obligation| !obligation.status().is_terminal())
            .collect();
        pending.sort_by_key(|obligation| (obligation.scheduled_at(), obligation.id()));
        pending
    }

    /// Move an obligation out of the live list.
    pub fn archive(&mut self, id: ObligationId) -> Option<&Obligation> {
        let index = self
            .obligations
            .iter()
            .position(|obligation| obligation.id() == id)?;
        let obligation = self.obligations.remove(index);
        self.archived.push(obligation);
        self.archived.last()
    }

    /// Apply time-driven transitions at `now`, in `(scheduled_at, id)` order.
    pub fn advance_all(&mut self, now: DateTime<Utc>) -> Vec<StatusChange> {
        let mut order: Vec<usize> = (0..self.obligations.len())
            .filter(|&index| !self.obligations[index].status().is_terminal())
            .collect();
        order.sort_by_key(|&index| {
            let obligation = &self.obligations[index];
            (obligation.scheduled_at(), obligation.id())
        });
        order
            .into_iter()
            .filter_map(|index| self.obligations[index].advance_to(now))
            .collect()
    }

    /// BOUND obligation that should take the lock when it is free.
    #[must_use]
    pub fn next_bound(&self) -> Option<&Obligation> {
        self.obligations
            .iter()
            .filter(|obligation| obligation.status() == ObligationStatus::Bound)
            .min_by_key(|obligation| (obligation.scheduled_at(), obligation.id()))
    }

    /// Sorted, de-duplicated lifecycle instants of non-terminal obligations
    /// strictly inside `(after, before)`.
    #[must_use]
    pub fn lifecycle_instants(
        &self,
        after: Option<DateTime<Utc>>,
        before: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let mut instants: Vec<DateTime<Utc>> = self
            .obligations
            .iter()
            .filter(|obligation| !obligation.status().is_terminal())
            .flat_map(Obligation::lifecycle_instants)
            .filter(|instant| *instant < before && after.is_none_or(|after| *instant > after))
            .collect();
        instants.sort_unstable();
        instants.dedup();
        instants
    }
}
