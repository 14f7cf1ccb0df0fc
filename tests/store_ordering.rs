use std::collections::HashMap;

use censo_rank::{
    record::{EntityYearRecord, Geography, assign_ranks},
    store::{AggregateStore, MemoryStore},
};
use proptest::prelude::*;

fn record(code: &str, year: i32, total: u64) -> EntityYearRecord {
    let mut record = EntityYearRecord::new(code, year, format!("Escola {code}"), Geography::default());
    record.enrollment.basic = total;
    record.total_enrollment = total;
    record
}

proptest! {
    #[test]
    fn top_n_is_ordered_unique_and_ranked_contiguously(
        batches in prop::collection::vec(
            prop::collection::vec(("[0-9]{1,3}", 0u64..40, 2022i32..=2024), 0..30),
            1..4
        ),
        n in 0usize..25
    ) {
        let store = MemoryStore::new();
        let mut first_seen: HashMap<(String, i32), u64> = HashMap::new();
        for batch in &batches {
            let records = batch
                .iter()
                .map(|(code, total, year)| record(code, *year, *total))
                .collect::<Vec<_>>();
            for (code, total, year) in batch {
                first_seen.entry((code.clone(), *year)).or_insert(*total);
            }
            store.merge_if_absent(&records, &[]).expect("merge");
        }

        for year in 2022..=2024 {
            let expected_len = first_seen.keys().filter(|(_, y)| *y == year).count();
            prop_assert_eq!(store.count_for_year(year).expect("count"), expected_len);

            let top = store.top_n(year, n).expect("top");
            prop_assert_eq!(top.len(), expected_len.min(n));
            for pair in top.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(
                    a.total_enrollment > b.total_enrollment
                        || (a.total_enrollment == b.total_enrollment
                            && a.entity_code < b.entity_code)
                );
            }
            for entry in &top {
                prop_assert_eq!(entry.census_year, year);
                let key = (entry.entity_code.clone(), year);
                prop_assert_eq!(Some(&entry.total_enrollment), first_seen.get(&key));
            }

            let ranked = assign_ranks(top);
            let ranks = ranked.iter().map(|entry| entry.rank).collect::<Vec<_>>();
            prop_assert_eq!(ranks, (1..=ranked.len()).collect::<Vec<_>>());
        }
    }
}
