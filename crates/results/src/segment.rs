//! Windows of a chat's media history, loaded around wherever the viewer jumped to.

use crate::merge::Direction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingState {
	pub all_loaded_forwards: bool,
	pub all_loaded_backwards: bool,
}

impl LoadingState {
	#[must_use]
	pub const fn union(self, other: Self) -> Self {
		Self {
			all_loaded_forwards: self.all_loaded_forwards || other.all_loaded_forwards,
			all_loaded_backwards: self.all_loaded_backwards || other.all_loaded_backwards,
		}
	}
}

/// A contiguous run of ids, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSegment<Id> {
	found_ids: Vec<Id>,
	loading_state: LoadingState,
}

impl<Id> Default for SearchSegment<Id> {
	fn default() -> Self {
		Self {
			found_ids: Vec::new(),
			loading_state: LoadingState::default(),
		}
	}
}

impl<Id: Ord + Clone> SearchSegment<Id> {
	#[must_use]
	pub fn new(ids: impl IntoIterator<Item = Id>, loading_state: LoadingState) -> Self {
		Self {
			found_ids: Direction::Ascending.normalize(ids),
			loading_state,
		}
	}

	#[must_use]
	pub fn found_ids(&self) -> &[Id] {
		&self.found_ids
	}

	#[must_use]
	pub const fn loading_state(&self) -> LoadingState {
		self.loading_state
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.found_ids.is_empty()
	}

	/// Adds freshly fetched ids. Once a direction was fully loaded it stays so.
	#[must_use]
	pub fn merge_with(&self, ids: impl IntoIterator<Item = Id>, loading_state: LoadingState) -> Self {
		Self {
			found_ids: Direction::Ascending.normalize(self.found_ids.iter().cloned().chain(ids)),
			loading_state: self.loading_state.union(loading_state),
		}
	}

	/// Whether both windows cover part of the same stretch of history.
	#[must_use]
	pub fn intersects(&self, other: &Self) -> bool {
		match (
			self.found_ids.first().zip(self.found_ids.last()),
			other.found_ids.first().zip(other.found_ids.last()),
		) {
			(Some((start, end)), Some((other_start, other_end))) => {
				start <= other_end && other_start <= end
			}
			_ => false,
		}
	}

	#[must_use]
	pub fn without(&self, id: &Id) -> Self {
		Self {
			found_ids: self.found_ids.iter().filter(|found| *found != id).cloned().collect(),
			loading_state: self.loading_state,
		}
	}
}

/// Media search state of one chat thread: the window being viewed plus older, disjoint ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSearch<Id> {
	current: SearchSegment<Id>,
	segments: Vec<SearchSegment<Id>>,
	is_loading: bool,
}

impl<Id> Default for MediaSearch<Id> {
	fn default() -> Self {
		Self {
			current: SearchSegment::default(),
			segments: Vec::new(),
			is_loading: false,
		}
	}
}

impl<Id: Ord + Clone> MediaSearch<Id> {
	#[must_use]
	pub const fn current(&self) -> &SearchSegment<Id> {
		&self.current
	}

	#[must_use]
	pub fn segments(&self) -> &[SearchSegment<Id>] {
		&self.segments
	}

	#[must_use]
	pub const fn is_loading(&self) -> bool {
		self.is_loading
	}

	#[must_use]
	pub fn with_loading(&self, is_loading: bool) -> Self {
		Self {
			is_loading,
			..self.clone()
		}
	}

	/// Makes `current` the viewed window.
	///
	/// Stored windows overlapping it, the previous current one included, are folded into it.
	/// The others are kept for when the viewer jumps back.
	#[must_use]
	pub fn with_current(&self, current: SearchSegment<Id>) -> Self {
		let candidates = self
			.segments
			.iter()
			.chain((!self.current.is_empty()).then_some(&self.current));

		let mut folded = current;
		let mut segments = Vec::with_capacity(self.segments.len() + 1);

		for segment in candidates {
			if segment.intersects(&folded) {
				folded = segment.merge_with(folded.found_ids.iter().cloned(), folded.loading_state);
			} else {
				segments.push(segment.clone());
			}
		}

		Self {
			current: folded,
			segments,
			is_loading: self.is_loading,
		}
	}

	/// Folds a fetched page around the current window into it.
	#[must_use]
	pub fn merge_fetched(&self, ids: impl IntoIterator<Item = Id>, loading_state: LoadingState) -> Self {
		self.with_current(self.current.merge_with(ids, loading_state))
	}

	/// Drops `id` from every window, for example after a message got deleted.
	#[must_use]
	pub fn remove_id(&self, id: &Id) -> Self {
		Self {
			current: self.current.without(id),
			segments: self.segments.iter().map(|segment| segment.without(id)).collect(),
			is_loading: self.is_loading,
		}
	}

	/// A new message arrived, so nothing is fully loaded forwards anymore.
	#[must_use]
	pub fn reset_forwards_loading(&self) -> Self {
		let reset = |segment: &SearchSegment<Id>| SearchSegment {
			found_ids: segment.found_ids.clone(),
			loading_state: LoadingState {
				all_loaded_forwards: false,
				..segment.loading_state
			},
		};

		Self {
			current: reset(&self.current),
			segments: self.segments.iter().map(reset).collect(),
			is_loading: self.is_loading,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const FORWARDS: LoadingState = LoadingState {
		all_loaded_forwards: true,
		all_loaded_backwards: false,
	};

	const BACKWARDS: LoadingState = LoadingState {
		all_loaded_forwards: false,
		all_loaded_backwards: true,
	};

	#[test]
	fn merging_unions_ids_and_flags() {
		let segment = SearchSegment::new([5, 3, 4], BACKWARDS);
		let merged = segment.merge_with([6, 4, 7], FORWARDS);

		assert_eq!(merged.found_ids(), [3, 4, 5, 6, 7]);
		assert_eq!(
			merged.loading_state(),
			LoadingState {
				all_loaded_forwards: true,
				all_loaded_backwards: true,
			}
		);
	}

	#[test]
	fn intersection_is_by_range() {
		let low = SearchSegment::new([1, 5], LoadingState::default());
		let inside = SearchSegment::new([3, 4], LoadingState::default());
		let high = SearchSegment::new([6, 9], LoadingState::default());

		assert!(low.intersects(&inside));
		assert!(inside.intersects(&low));
		assert!(!low.intersects(&high));
		assert!(!low.intersects(&SearchSegment::default()));
	}

	#[test]
	fn jumping_keeps_disjoint_windows_and_folds_overlapping_ones() {
		let search = MediaSearch::default()
			.merge_fetched([10, 11, 12], LoadingState::default())
			.with_current(SearchSegment::new([50, 51], FORWARDS));

		assert_eq!(search.current().found_ids(), [50, 51]);
		assert_eq!(search.segments().len(), 1);
		assert_eq!(search.segments()[0].found_ids(), [10, 11, 12]);

		// Loading backwards from 50 eventually reaches the old window
		let search = search.merge_fetched([12, 20, 30], BACKWARDS);

		assert_eq!(search.current().found_ids(), [10, 11, 12, 20, 30, 50, 51]);
		assert!(search.segments().is_empty());
		assert_eq!(
			search.current().loading_state(),
			LoadingState {
				all_loaded_forwards: true,
				all_loaded_backwards: true,
			}
		);
	}

	#[test]
	fn removal_applies_to_every_window() {
		let search = MediaSearch::default()
			.merge_fetched([1, 2, 3], LoadingState::default())
			.with_current(SearchSegment::new([7, 8], LoadingState::default()))
			.remove_id(&2)
			.remove_id(&8);

		assert_eq!(search.current().found_ids(), [7]);
		assert_eq!(search.segments()[0].found_ids(), [1, 3]);
	}

	#[test]
	fn loading_flag_survives_window_changes() {
		let search = MediaSearch::default().with_loading(true);
		assert!(search.is_loading());

		let search = search
			.merge_fetched([4, 5], FORWARDS)
			.with_current(SearchSegment::new([9], LoadingState::default()))
			.remove_id(&4);
		assert!(search.is_loading());

		assert!(!search.with_loading(false).is_loading());
	}

	#[test]
	fn new_message_resets_forwards_loading_only() {
		let search = MediaSearch::default()
			.merge_fetched([1, 2], BACKWARDS.union(FORWARDS))
			.with_current(SearchSegment::new([9], FORWARDS))
			.reset_forwards_loading();

		assert!(!search.current().loading_state().all_loaded_forwards);
		assert!(!search.segments()[0].loading_state().all_loaded_forwards);
		assert!(search.segments()[0].loading_state().all_loaded_backwards);
	}
}
