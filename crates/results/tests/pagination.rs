use mt_results::{merge, merge_fetched, remove_id, Direction, Page, ResultSet};

use std::{collections::BTreeSet, sync::Arc};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;
use tracing_test::traced_test;

type Results = ResultSet<u8, u32, u32>;

#[derive(Debug)]
struct Offline;

fn random_page(rng: &mut StdRng, query_key: u8) -> Page<u8, u32, u32> {
	let ids = (0..rng.gen_range(0..20))
		.map(|_| rng.gen_range(0..200))
		.collect::<Vec<_>>();

	Page {
		next_cursor: ids.iter().min().copied(),
		total_count: Some(200),
		ids,
		query_key,
	}
}

#[test]
#[traced_test]
fn random_pages_keep_the_set_sorted_and_complete() {
	for direction in [Direction::Ascending, Direction::Descending] {
		let mut rng = StdRng::seed_from_u64(7);
		let mut current: Option<Arc<Results>> = None;
		let mut expected = BTreeSet::new();

		for _ in 0..200 {
			let page = random_page(&mut rng, 1);
			expected.extend(page.ids.iter().copied());

			let merged = merge(current.as_ref(), page, direction);
			assert!(direction.is_normalized(merged.found_ids()));
			assert_eq!(merged.len(), expected.len());
			assert!(expected.iter().all(|id| merged.contains(id)));

			current = Some(merged);
		}

		info!(?direction, len = expected.len(), "Accumulated");
	}
}

#[test]
#[traced_test]
fn pagination_session() {
	let first = merge(
		None,
		Page {
			ids: vec![10, 9, 7],
			total_count: Some(6),
			next_cursor: Some(7),
			query_key: 1,
		},
		Direction::Descending,
	);

	// The backend fails once, the user keeps what was on screen
	let failed = merge_fetched(Some(&first), Err::<Page<u8, u32, u32>, _>(Offline), Direction::Descending);
	assert!(failed.is_err());

	let second = merge_fetched(
		Some(&first),
		Ok::<_, Offline>(Page {
			ids: vec![9, 8, 6],
			total_count: Some(6),
			next_cursor: Some(6),
			query_key: 1,
		}),
		Direction::Descending,
	)
	.unwrap();
	assert_eq!(second.found_ids(), [10, 9, 8, 7, 6]);

	// The same page delivered twice changes nothing
	let replayed = merge(
		Some(&second),
		Page {
			ids: vec![9, 8, 6],
			total_count: Some(6),
			next_cursor: Some(6),
			query_key: 1,
		},
		Direction::Descending,
	);
	assert!(Arc::ptr_eq(&second, &replayed));

	let deleted = remove_id(&replayed, &8);
	assert_eq!(deleted.found_ids(), [10, 9, 7, 6]);
	assert_eq!(deleted.next_cursor(), Some(&6));
}
