//! Queue-family scoring and selection.
//!
//! Scoring favors families whose flag set matches the request exactly over
//! general-purpose families with superfluous capabilities (typically busier
//! or shared), while rewarding depth (more parallel queues in the family).

use ash::vk;

/// Hardware-reported record for one queue family. Immutable once queried;
/// cached per physical device by [`QueueSelector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyDescriptor {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
}

impl From<&vk::QueueFamilyProperties> for QueueFamilyDescriptor {
    fn from(props: &vk::QueueFamilyProperties) -> Self {
        Self {
            flags: props.queue_flags,
            queue_count: props.queue_count,
        }
    }
}

/// Outcome of a selection. Derived, never persisted; recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedQueue {
    pub family_index: u32,
    pub score: i32,
}

/// Score one family against the requested flags.
///
/// Families whose flag set is not a superset of the request score 0 and are
/// excluded. Matching families start at 256, lose 16 per flag beyond the
/// request, gain their queue count, and are floored at 1.
pub fn score_family(family: &QueueFamilyDescriptor, requested: vk::QueueFlags) -> i32 {
    if !family.flags.contains(requested) {
        return 0;
    }

    let surplus =
        family.flags.as_raw().count_ones() as i32 - requested.as_raw().count_ones() as i32;
    let score = 256 - surplus * 16 + family.queue_count as i32;
    score.max(1)
}

/// Picks the best-matching queue family for a requested capability set.
///
/// Owns an explicit per-physical-device descriptor cache, invalidated
/// whenever the physical device differs from the previously cached one.
#[derive(Default)]
pub struct QueueSelector {
    cached_device: Option<vk::PhysicalDevice>,
    cache: Vec<QueueFamilyDescriptor>,
}

impl QueueSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the highest-scoring family, fetching descriptors through
    /// `fetch` only when `physical_device` differs from the cached one.
    ///
    /// Ties are broken by first-encountered enumeration order, so repeated
    /// calls with the same inputs are deterministic. Returns `None` when no
    /// family matches the requested flags.
    pub fn select<F>(
        &mut self,
        physical_device: vk::PhysicalDevice,
        requested: vk::QueueFlags,
        fetch: F,
    ) -> Option<SelectedQueue>
    where
        F: FnOnce() -> Vec<QueueFamilyDescriptor>,
    {
        if self.cached_device != Some(physical_device) {
            self.cache = fetch();
            self.cached_device = Some(physical_device);
        }

        let mut best: Option<SelectedQueue> = None;
        for (index, family) in self.cache.iter().enumerate() {
            let score = score_family(family, requested);
            if score > best.map_or(0, |b| b.score) {
                best = Some(SelectedQueue {
                    family_index: index as u32,
                    score,
                });
            }
        }
        best
    }

    /// Select against a live physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn select_on_device(
        &mut self,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        requested: vk::QueueFlags,
    ) -> Option<SelectedQueue> {
        self.select(physical_device, requested, || {
            // SAFETY: caller guarantees both handles are valid.
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
                .iter()
                .map(QueueFamilyDescriptor::from)
                .collect()
        })
    }

    /// Drop the descriptor cache, forcing a re-query on the next selection.
    pub fn clear_caches(&mut self) {
        self.cached_device = None;
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::Cell;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> QueueFamilyDescriptor {
        QueueFamilyDescriptor { flags, queue_count }
    }

    fn device(raw: u64) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(raw)
    }

    const GCT: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn exact_match_scores_base_plus_queue_count() {
        let exact = family(vk::QueueFlags::COMPUTE, 4);
        assert_eq!(score_family(&exact, vk::QueueFlags::COMPUTE), 256 + 4);
    }

    #[test]
    fn exact_match_beats_superfluous_flags_with_more_queues() {
        let exact = family(vk::QueueFlags::COMPUTE, 2);
        let general = family(GCT | vk::QueueFlags::SPARSE_BINDING, 2);

        let exact_score = score_family(&exact, vk::QueueFlags::COMPUTE);
        let general_score = score_family(&general, vk::QueueFlags::COMPUTE);
        assert!(exact_score > general_score);
    }

    #[test]
    fn non_superset_family_is_excluded() {
        let transfer_only = family(vk::QueueFlags::TRANSFER, 16);
        assert_eq!(score_family(&transfer_only, vk::QueueFlags::GRAPHICS), 0);
    }

    #[test]
    fn matching_family_is_floored_at_one() {
        // 17 surplus bits would push the score negative.
        let kitchen_sink = family(vk::QueueFlags::from_raw(0x3FFFF), 1);
        let score = score_family(&kitchen_sink, vk::QueueFlags::GRAPHICS);
        assert_eq!(score, 1);
    }

    #[test]
    fn selects_highest_scoring_family() {
        let mut selector = QueueSelector::new();
        let families = vec![
            family(GCT, 1),
            family(vk::QueueFlags::COMPUTE, 8),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8),
        ];

        let selected = selector
            .select(device(1), vk::QueueFlags::COMPUTE, || families.clone())
            .unwrap();
        assert_eq!(selected.family_index, 1);
        assert_eq!(selected.score, 256 + 8);
    }

    #[test]
    fn ties_break_to_first_encountered() {
        let mut selector = QueueSelector::new();
        let families = vec![family(GCT, 2), family(GCT, 2)];

        let selected = selector.select(device(1), GCT, || families.clone()).unwrap();
        assert_eq!(selected.family_index, 0);
    }

    #[test]
    fn no_matching_family_returns_none() {
        let mut selector = QueueSelector::new();
        let families = vec![family(vk::QueueFlags::TRANSFER, 1)];

        let selected = selector.select(device(1), vk::QueueFlags::GRAPHICS, || families);
        assert!(selected.is_none());
    }

    #[test]
    fn selection_is_deterministic_across_calls() {
        let mut selector = QueueSelector::new();
        let families = vec![family(GCT, 2), family(vk::QueueFlags::GRAPHICS, 2)];

        let first = selector.select(device(1), vk::QueueFlags::GRAPHICS, || families.clone());
        let second = selector.select(device(1), vk::QueueFlags::GRAPHICS, || families.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn cache_avoids_refetch_for_same_device() {
        let mut selector = QueueSelector::new();
        let fetches = Cell::new(0);
        let fetch = || {
            fetches.set(fetches.get() + 1);
            vec![family(GCT, 1)]
        };

        selector.select(device(1), vk::QueueFlags::GRAPHICS, fetch);
        selector.select(device(1), vk::QueueFlags::GRAPHICS, fetch);
        assert_eq!(fetches.get(), 1);
    }

    #[test]
    fn changing_device_invalidates_cache() {
        let mut selector = QueueSelector::new();
        let fetches = Cell::new(0);
        let fetch = || {
            fetches.set(fetches.get() + 1);
            vec![family(GCT, 1)]
        };

        selector.select(device(1), vk::QueueFlags::GRAPHICS, fetch);
        selector.select(device(2), vk::QueueFlags::GRAPHICS, fetch);
        assert_eq!(fetches.get(), 2);
    }

    #[test]
    fn clear_caches_forces_refetch() {
        let mut selector = QueueSelector::new();
        let fetches = Cell::new(0);
        let fetch = || {
            fetches.set(fetches.get() + 1);
            vec![family(GCT, 1)]
        };

        selector.select(device(1), vk::QueueFlags::GRAPHICS, fetch);
        selector.clear_caches();
        selector.select(device(1), vk::QueueFlags::GRAPHICS, fetch);
        assert_eq!(fetches.get(), 2);
    }
}
