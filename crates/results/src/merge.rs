use std::sync::Arc;

use tracing::{debug, trace};

/// Order in which a feature keeps its ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Ascending,
	Descending,
}

impl Direction {
	/// Sorts and deduplicates `ids` in this direction.
	#[must_use]
	pub fn normalize<Id: Ord>(self, ids: impl IntoIterator<Item = Id>) -> Vec<Id> {
		let mut ids = ids.into_iter().collect::<Vec<_>>();
		ids.sort_unstable();
		ids.dedup();

		if self == Self::Descending {
			ids.reverse();
		}

		ids
	}

	/// Whether `ids` is strictly monotonic in this direction.
	#[must_use]
	pub fn is_normalized<Id: Ord>(self, ids: &[Id]) -> bool {
		ids.windows(2).all(|pair| match self {
			Self::Ascending => pair[0] < pair[1],
			Self::Descending => pair[0] > pair[1],
		})
	}
}

/// One fetched page of a paginated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<K, Id, C> {
	pub ids: Vec<Id>,
	pub total_count: Option<u64>,
	pub next_cursor: Option<C>,
	pub query_key: K,
}

/// Everything fetched so far for one query key.
///
/// Ids are always sorted in the feature's [`Direction`] without repeats. Sets are shared
/// behind an [`Arc`] and never mutated, merging builds a new one or hands back the old.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet<K, Id, C> {
	found_ids: Arc<[Id]>,
	total_count: Option<u64>,
	next_cursor: Option<C>,
	query_key: K,
}

impl<K, Id, C> ResultSet<K, Id, C> {
	#[must_use]
	pub fn found_ids(&self) -> &[Id] {
		&self.found_ids
	}

	/// The shared id buffer, for cheap identity checks downstream.
	#[must_use]
	pub const fn found_ids_shared(&self) -> &Arc<[Id]> {
		&self.found_ids
	}

	#[must_use]
	pub const fn total_count(&self) -> Option<u64> {
		self.total_count
	}

	#[must_use]
	pub const fn next_cursor(&self) -> Option<&C> {
		self.next_cursor.as_ref()
	}

	#[must_use]
	pub const fn query_key(&self) -> &K {
		&self.query_key
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.found_ids.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.found_ids.is_empty()
	}
}

impl<K, Id: Ord, C> ResultSet<K, Id, C> {
	/// A set built from `page` alone.
	#[must_use]
	pub fn from_page(page: Page<K, Id, C>, direction: Direction) -> Self {
		Self {
			found_ids: direction.normalize(page.ids).into(),
			total_count: page.total_count,
			next_cursor: page.next_cursor,
			query_key: page.query_key,
		}
	}

	#[must_use]
	pub fn contains(&self, id: &Id) -> bool {
		self.found_ids.contains(id)
	}
}

/// Folds `page` into `current`.
///
/// A page for another query key starts over. Otherwise ids are unioned, and `current` itself
/// comes back when the page changed nothing at all, so callers can skip work on
/// [`Arc::ptr_eq`].
pub fn merge<K, Id, C>(
	current: Option<&Arc<ResultSet<K, Id, C>>>,
	page: Page<K, Id, C>,
	direction: Direction,
) -> Arc<ResultSet<K, Id, C>>
where
	K: PartialEq,
	Id: Ord + Clone,
	C: PartialEq,
{
	let Some(current) = current.filter(|current| current.query_key == page.query_key) else {
		trace!(ids = page.ids.len(), "Starting a fresh result set");
		return Arc::new(ResultSet::from_page(page, direction));
	};

	let Page {
		ids,
		total_count,
		next_cursor,
		query_key,
	} = page;

	let merged = direction.normalize(current.found_ids.iter().cloned().chain(ids));

	let found_ids = if *merged == *current.found_ids {
		if total_count == current.total_count && next_cursor == current.next_cursor {
			return Arc::clone(current);
		}

		Arc::clone(&current.found_ids)
	} else {
		merged.into()
	};

	Arc::new(ResultSet {
		found_ids,
		total_count,
		next_cursor,
		query_key,
	})
}

/// Like [`merge`] for a fetch that may have failed.
///
/// A failure never touches `current`, the caller keeps what it had and gets the error back.
pub fn merge_fetched<K, Id, C, E>(
	current: Option<&Arc<ResultSet<K, Id, C>>>,
	fetched: Result<Page<K, Id, C>, E>,
	direction: Direction,
) -> Result<Arc<ResultSet<K, Id, C>>, E>
where
	K: PartialEq,
	Id: Ord + Clone,
	C: PartialEq,
	E: std::fmt::Debug,
{
	fetched
		.map(|page| merge(current, page, direction))
		.map_err(|e| {
			debug!(?e, "Page fetch failed, keeping current results");
			e
		})
}

/// Drops `id`, handing back `current` itself when it was not there.
#[must_use]
pub fn remove_id<K, Id, C>(current: &Arc<ResultSet<K, Id, C>>, id: &Id) -> Arc<ResultSet<K, Id, C>>
where
	K: Clone,
	Id: Ord + Clone,
	C: Clone,
{
	if !current.contains(id) {
		return Arc::clone(current);
	}

	Arc::new(ResultSet {
		found_ids: current
			.found_ids
			.iter()
			.filter(|found| *found != id)
			.cloned()
			.collect(),
		total_count: current.total_count,
		next_cursor: current.next_cursor.clone(),
		query_key: current.query_key.clone(),
	})
}
