//! Merge rules of the individual search features.

use std::{collections::BTreeMap, sync::Arc};

use crate::merge::{merge, Direction, Page, ResultSet};

pub type MessageId = i64;
pub type PeerId = i64;

/// Thread id of a chat's main history.
pub const MAIN_THREAD_ID: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChatThread {
	pub chat_id: PeerId,
	pub thread_id: i64,
}

impl ChatThread {
	#[must_use]
	pub const fn main(chat_id: PeerId) -> Self {
		Self {
			chat_id,
			thread_id: MAIN_THREAD_ID,
		}
	}
}

// Text search inside one chat thread

pub const TEXT_SEARCH_ORDER: Direction = Direction::Descending;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSearchKey {
	pub thread: ChatThread,
	pub query: String,
	pub saved_tag: Option<String>,
}

pub type TextSearchResults = ResultSet<TextSearchKey, MessageId, MessageId>;

pub fn merge_text_search(
	current: Option<&Arc<TextSearchResults>>,
	page: Page<TextSearchKey, MessageId, MessageId>,
) -> Arc<TextSearchResults> {
	merge(current, page, TEXT_SEARCH_ORDER)
}

// Middle search, the search bar above a chat

pub const MIDDLE_SEARCH_ORDER: Direction = Direction::Descending;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MiddleSearchKind {
	#[default]
	Chat,
	MyChats,
	Channels,
}

/// Where the next middle search page starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiddleSearchCursor {
	pub offset_id: Option<MessageId>,
	pub offset_peer_id: Option<PeerId>,
	pub offset_rate: Option<i32>,
}

/// Middle search results are keyed by the query text alone, the other parameters reset
/// them explicitly in [`MiddleSearch::update`].
pub type MiddleSearchResults = ResultSet<String, MessageId, MiddleSearchCursor>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiddleSearch {
	pub kind: MiddleSearchKind,
	pub saved_tag: Option<String>,
	pub from_peer: Option<PeerId>,
	pub is_hashtag: bool,
	pub results: Option<Arc<MiddleSearchResults>>,
}

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiddleSearchUpdate {
	pub kind: Option<MiddleSearchKind>,
	pub saved_tag: Option<Option<String>>,
	pub from_peer: Option<Option<PeerId>>,
	pub is_hashtag: Option<bool>,
}

impl MiddleSearch {
	/// Applies `update`, dropping the results if what they were fetched for changed.
	#[must_use]
	pub fn update(&self, update: MiddleSearchUpdate) -> Self {
		let is_hashtag = update.is_hashtag.unwrap_or(self.is_hashtag);

		let mut next = Self {
			// Only hashtag searches may leave the current chat
			kind: if is_hashtag {
				update.kind.unwrap_or(self.kind)
			} else {
				MiddleSearchKind::Chat
			},
			saved_tag: update.saved_tag.unwrap_or_else(|| self.saved_tag.clone()),
			from_peer: update.from_peer.unwrap_or(self.from_peer),
			is_hashtag,
			results: self.results.clone(),
		};

		if next.kind != self.kind
			|| next.saved_tag != self.saved_tag
			|| next.from_peer != self.from_peer
		{
			next.results = None;
		}

		next
	}

	/// Folds a fetched page in. A page for another query text replaces the results.
	#[must_use]
	pub fn merge_results(&self, page: Page<String, MessageId, MiddleSearchCursor>) -> Self {
		Self {
			results: Some(merge(self.results.as_ref(), page, MIDDLE_SEARCH_ORDER)),
			..self.clone()
		}
	}
}

// Shared media of a chat, one result list per media type

pub const SHARED_MEDIA_ORDER: Direction = Direction::Descending;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SharedMediaType {
	Media,
	Documents,
	Links,
	Audio,
	Voice,
	Gif,
}

pub type SharedMediaResults = ResultSet<SharedMediaType, MessageId, MessageId>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedMediaSearch {
	pub current_type: Option<SharedMediaType>,
	results_by_type: BTreeMap<SharedMediaType, Arc<SharedMediaResults>>,
}

impl SharedMediaSearch {
	#[must_use]
	pub fn results(&self, media_type: SharedMediaType) -> Option<&Arc<SharedMediaResults>> {
		self.results_by_type.get(&media_type)
	}

	/// Switches the viewed type, every type keeps what it accumulated.
	#[must_use]
	pub fn with_type(&self, media_type: Option<SharedMediaType>) -> Self {
		Self {
			current_type: media_type,
			..self.clone()
		}
	}

	/// Folds `page` into the results of the type it was fetched for.
	#[must_use]
	pub fn merge_results(&self, page: Page<SharedMediaType, MessageId, MessageId>) -> Self {
		let media_type = page.query_key;
		let merged = merge(self.results(media_type), page, SHARED_MEDIA_ORDER);

		if self
			.results(media_type)
			.is_some_and(|current| Arc::ptr_eq(current, &merged))
		{
			return self.clone();
		}

		let mut results_by_type = self.results_by_type.clone();
		results_by_type.insert(media_type, merged);

		Self {
			current_type: self.current_type,
			results_by_type,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn middle_page(query: &str, ids: &[MessageId]) -> Page<String, MessageId, MiddleSearchCursor> {
		Page {
			ids: ids.to_vec(),
			total_count: None,
			next_cursor: None,
			query_key: query.to_string(),
		}
	}

	#[test]
	fn text_search_key_includes_saved_tag() {
		let key = |tag: Option<&str>| TextSearchKey {
			thread: ChatThread::main(1),
			query: "hello".to_string(),
			saved_tag: tag.map(ToString::to_string),
		};

		let untagged = merge_text_search(
			None,
			Page {
				ids: vec![3, 8],
				total_count: Some(2),
				next_cursor: None,
				query_key: key(None),
			},
		);
		let tagged = merge_text_search(
			Some(&untagged),
			Page {
				ids: vec![5],
				total_count: Some(1),
				next_cursor: None,
				query_key: key(Some("work")),
			},
		);

		assert_eq!(untagged.found_ids(), [8, 3]);
		assert_eq!(tagged.found_ids(), [5]);
	}

	#[test]
	fn middle_search_filters_invalidate_results() {
		let search = MiddleSearch::default().merge_results(middle_page("cats", &[1, 2]));
		assert!(search.results.is_some());

		let same = search.update(MiddleSearchUpdate::default());
		assert!(same.results.is_some());

		let tagged = search.update(MiddleSearchUpdate {
			saved_tag: Some(Some("work".to_string())),
			..Default::default()
		});
		assert!(tagged.results.is_none());

		let from_peer = search.update(MiddleSearchUpdate {
			from_peer: Some(Some(42)),
			..Default::default()
		});
		assert!(from_peer.results.is_none());
	}

	#[test]
	fn middle_search_kind_needs_a_hashtag() {
		let search = MiddleSearch::default().merge_results(middle_page("cats", &[1]));

		let ignored = search.update(MiddleSearchUpdate {
			kind: Some(MiddleSearchKind::Channels),
			..Default::default()
		});
		assert_eq!(ignored.kind, MiddleSearchKind::Chat);
		assert!(ignored.results.is_some());

		let hashtag = search.update(MiddleSearchUpdate {
			kind: Some(MiddleSearchKind::Channels),
			is_hashtag: Some(true),
			..Default::default()
		});
		assert_eq!(hashtag.kind, MiddleSearchKind::Channels);
		assert!(hashtag.results.is_none());
	}

	#[test]
	fn middle_search_query_change_replaces_results() {
		let search = MiddleSearch::default()
			.merge_results(middle_page("cats", &[1, 4]))
			.merge_results(middle_page("cats", &[2]));
		assert_eq!(search.results.as_ref().unwrap().found_ids(), [4, 2, 1]);

		let search = search.merge_results(middle_page("dogs", &[9]));
		assert_eq!(search.results.as_ref().unwrap().found_ids(), [9]);
	}

	#[test]
	fn shared_media_keeps_one_list_per_type() {
		let page = |media_type, ids: &[MessageId]| Page {
			ids: ids.to_vec(),
			total_count: None,
			next_cursor: None,
			query_key: media_type,
		};

		let search = SharedMediaSearch::default()
			.with_type(Some(SharedMediaType::Media))
			.merge_results(page(SharedMediaType::Media, &[1, 2]))
			.with_type(Some(SharedMediaType::Links))
			.merge_results(page(SharedMediaType::Links, &[7]))
			.merge_results(page(SharedMediaType::Media, &[3]));

		assert_eq!(search.current_type, Some(SharedMediaType::Links));
		assert_eq!(
			search.results(SharedMediaType::Media).unwrap().found_ids(),
			[3, 2, 1]
		);
		assert_eq!(
			search.results(SharedMediaType::Links).unwrap().found_ids(),
			[7]
		);

		let unchanged = search.merge_results(page(SharedMediaType::Links, &[7]));
		assert!(Arc::ptr_eq(
			unchanged.results(SharedMediaType::Links).unwrap(),
			search.results(SharedMediaType::Links).unwrap()
		));
	}
}
