//! Dependent category selectors.
//!
//! The product chain is strict: a tier is only usable once its parent is
//! chosen. The operational and resolution chains clear deeper tiers on a
//! parent change but keep them enabled so users can pick in any order.

use shared::{
    domain::{CategoryKind, SelectOption},
    protocol::{BackendRequest, CategoriesResponse, CategoryQuery},
};
use tracing::{debug, warn};

use crate::{call, BackendError, TicketBackend};

/// Fetches the options for one tier.
pub async fn load_options(
    backend: &dyn TicketBackend,
    query: CategoryQuery,
) -> Result<Vec<SelectOption>, BackendError> {
    call::<CategoriesResponse>(backend, BackendRequest::LoadCategories(query))
        .await
        .map(|response| response.categories)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierState {
    pub options: Vec<SelectOption>,
    pub selected: Option<String>,
    pub enabled: bool,
    pub loading: bool,
}

impl TierState {
    fn enabled_with(options: Vec<SelectOption>, selected: Option<String>) -> Self {
        Self {
            options,
            selected,
            enabled: true,
            loading: false,
        }
    }

    fn clear(&mut self, enabled: bool) {
        self.options.clear();
        self.selected = None;
        self.enabled = enabled;
        self.loading = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTierChain {
    kind: CategoryKind,
    tiers: Vec<TierState>,
}

impl CategoryTierChain {
    /// Every tier starts empty and enabled.
    pub fn new(kind: CategoryKind) -> Self {
        Self {
            kind,
            tiers: vec![TierState::enabled_with(Vec::new(), None); kind.tier_count()],
        }
    }

    /// Chain pre-populated with the option lists and values the page was
    /// rendered with. Missing tiers start empty.
    pub fn with_initial(
        kind: CategoryKind,
        initial: Vec<(Vec<SelectOption>, Option<String>)>,
    ) -> Self {
        let mut chain = Self::new(kind);
        for (tier, (options, selected)) in chain.tiers.iter_mut().zip(initial) {
            *tier = TierState::enabled_with(options, normalize(selected));
        }
        chain
    }

    pub fn kind(&self) -> CategoryKind {
        self.kind
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// 1-based tier access.
    pub fn tier(&self, tier: usize) -> Option<&TierState> {
        tier.checked_sub(1).and_then(|index| self.tiers.get(index))
    }

    pub fn selected(&self, tier: usize) -> Option<&str> {
        self.tier(tier).and_then(|t| t.selected.as_deref())
    }

    /// Selected values of every tier, `None` where nothing is chosen.
    pub fn selected_values(&self) -> Vec<Option<String>> {
        self.tiers.iter().map(|t| t.selected.clone()).collect()
    }

    /// Only the product chain disables tiers whose parent is unset.
    pub fn locks_deeper_tiers(&self) -> bool {
        self.kind == CategoryKind::Product
    }

    /// Applies a selection change on `tier` and returns the request that
    /// loads the next tier's options, if one is needed.
    pub fn change(&mut self, tier: usize, value: Option<String>) -> Option<CategoryQuery> {
        if tier == 0 || tier > self.tiers.len() {
            warn!(kind = ?self.kind, tier, "category change for unknown tier ignored");
            return None;
        }
        let value = normalize(value);
        let locks = self.locks_deeper_tiers();

        self.tiers[tier - 1].selected = value.clone();
        for deeper in &mut self.tiers[tier..] {
            deeper.clear(!locks);
        }

        if value.is_none() || tier == self.tiers.len() {
            return None;
        }

        let target = &mut self.tiers[tier];
        target.loading = true;
        target.enabled = !locks;

        let parents = self.tiers[..tier]
            .iter()
            .map(|t| t.selected.clone().unwrap_or_default())
            .collect();
        debug!(kind = ?self.kind, tier = tier + 1, "requesting category options");
        Some(CategoryQuery {
            kind: self.kind,
            tier: tier + 1,
            parents,
        })
    }

    /// Installs loaded options. Responses whose parents no longer match the
    /// current selection are dropped and `false` is returned.
    pub fn apply_options(&mut self, query: &CategoryQuery, options: Vec<SelectOption>) -> bool {
        let Some(target) = self.live_target(query) else {
            return false;
        };
        *target = TierState::enabled_with(options, None);
        true
    }

    /// Re-enables the target tier after a failed load so the user is not
    /// stuck. Returns `false` for stale queries.
    pub fn fail_load(&mut self, query: &CategoryQuery) -> bool {
        let Some(target) = self.live_target(query) else {
            return false;
        };
        target.enabled = true;
        target.loading = false;
        true
    }

    fn live_target(&mut self, query: &CategoryQuery) -> Option<&mut TierState> {
        if query.kind != self.kind || query.tier < 2 || query.tier > self.tiers.len() {
            return None;
        }
        let current: Vec<String> = self.tiers[..query.tier - 1]
            .iter()
            .map(|t| t.selected.clone().unwrap_or_default())
            .collect();
        if current != query.parents {
            debug!(kind = ?self.kind, tier = query.tier, "dropping stale category response");
            return None;
        }
        self.tiers.get_mut(query.tier - 1)
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "tests/categories_tests.rs"]
mod tests;
