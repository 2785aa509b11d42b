//! Pull scope: which farms and animals a client may see

use std::collections::BTreeSet;
use uuid::Uuid;

use crate::models::ScopePredicate;

/// The set of farms and livestock a pull is restricted to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    farm_uuids: BTreeSet<Uuid>,
    livestock_uuids: BTreeSet<Uuid>,
}

impl Scope {
    /// Build a scope from raw identifier lists; duplicates collapse.
    pub fn resolve(
        farm_uuids: impl IntoIterator<Item = Uuid>,
        livestock_uuids: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        Self {
            farm_uuids: farm_uuids.into_iter().collect(),
            livestock_uuids: livestock_uuids.into_iter().collect(),
        }
    }

    /// A farm-level scope with no livestock filter
    pub fn farms(farm_uuids: impl IntoIterator<Item = Uuid>) -> Self {
        Self::resolve(farm_uuids, [])
    }

    pub const fn farm_uuids(&self) -> &BTreeSet<Uuid> {
        &self.farm_uuids
    }

    pub const fn livestock_uuids(&self) -> &BTreeSet<Uuid> {
        &self.livestock_uuids
    }

    /// Whether any row could satisfy `predicate` under this scope.
    ///
    /// Fetchers skip the query entirely when this is false.
    pub fn admits_any(&self, predicate: ScopePredicate) -> bool {
        match predicate {
            ScopePredicate::FarmAndLivestock => {
                !self.farm_uuids.is_empty() && !self.livestock_uuids.is_empty()
            }
            ScopePredicate::FarmOnly | ScopePredicate::SourceOrDestinationFarm => {
                !self.farm_uuids.is_empty()
            }
        }
    }
}
