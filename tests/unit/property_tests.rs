#[cfg(test)]
mod tests_properties {
    use itinerary_rs::prelude::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, HashSet};

    const TRIP: TripId = TripId::from_u128(0xC0FFEE);
    const DAYS: u32 = 3;

    fn row(n: u128, prev: Option<u128>) -> ItineraryItem {
        ItineraryItem::new(
            ItemId::from_u128(n),
            Scope::new(TRIP, 1),
            prev.map(ItemId::from_u128),
            ItemPayload::titled(format!("{n}")),
            0,
        )
    }

    /// Rows with arbitrary predecessor pointers: heads, self references,
    /// forks, cycles and dangling ids all show up.
    fn arb_rows() -> impl Strategy<Value = Vec<ItineraryItem>> {
        prop::collection::vec(prop::option::of(1u128..16), 0..14).prop_map(|prevs| {
            prevs
                .into_iter()
                .enumerate()
                .map(|(index, prev)| row(index as u128 + 1, prev))
                .collect()
        })
    }

    /// A well-formed chain of `len` rows, plus a shuffled copy.
    fn arb_shuffled_chain() -> impl Strategy<Value = (Vec<ItemId>, Vec<ItineraryItem>)> {
        (0usize..24).prop_flat_map(|len| {
            let rows: Vec<ItineraryItem> = (0..len as u128)
                .map(|n| row(n + 1, if n == 0 { None } else { Some(n) }))
                .collect();
            let expected: Vec<ItemId> = rows.iter().map(|item| item.id).collect();
            (Just(expected), Just(rows).prop_shuffle())
        })
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert { day: u32, pos: usize },
        Move { pick: usize, day: u32, pos: usize },
        Delete { pick: usize },
        Touch { pick: usize },
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (1..=DAYS, any::<usize>()).prop_map(|(day, pos)| Op::Insert { day, pos }),
            3 => (any::<usize>(), 1..=DAYS, any::<usize>())
                .prop_map(|(pick, day, pos)| Op::Move { pick, day, pos }),
            1 => any::<usize>().prop_map(|pick| Op::Delete { pick }),
            1 => any::<usize>().prop_map(|pick| Op::Touch { pick }),
        ]
    }

    type Model = BTreeMap<u32, Vec<ItemId>>;

    fn point_at(list: &[ItemId], pos: usize) -> InsertionPoint {
        if pos == 0 {
            InsertionPoint::First
        } else {
            InsertionPoint::After(list[pos - 1])
        }
    }

    fn pick(model: &Model, pick: usize) -> Option<(u32, usize)> {
        let total: usize = model.values().map(Vec::len).sum();
        if total == 0 {
            return None;
        }
        let mut index = pick % total;
        for (day, items) in model {
            if index < items.len() {
                return Some((*day, index));
            }
            index -= items.len();
        }
        None
    }

    fn apply(itinerary: &Itinerary<MemoryStore>, model: &mut Model, op: &Op) {
        match *op {
            Op::Insert { day, pos } => {
                let list = model.entry(day).or_default();
                let pos = pos % (list.len() + 1);
                let id = itinerary
                    .insert_after(Scope::new(TRIP, day), point_at(list, pos), ItemPayload::titled("x"))
                    .expect("insert");
                list.insert(pos, id);
            }
            Op::Move { pick: choice, day, pos } => {
                let Some((from, index)) = pick(model, choice) else {
                    return;
                };
                let id = model.get_mut(&from).expect("day").remove(index);
                let target = model.entry(day).or_default();
                let pos = pos % (target.len() + 1);
                let unchanged = from == day && pos == index;

                let outcome = itinerary
                    .move_item(id, day, point_at(target, pos))
                    .expect("move");
                assert_eq!(outcome == MoveOutcome::Unchanged, unchanged);
                target.insert(pos, id);
            }
            Op::Delete { pick: choice } => {
                let Some((day, index)) = pick(model, choice) else {
                    return;
                };
                let id = model.get_mut(&day).expect("day").remove(index);
                itinerary.delete_item(id).expect("delete");
            }
            Op::Touch { pick: choice } => {
                let Some((day, index)) = pick(model, choice) else {
                    return;
                };
                let id = model[&day][index];
                itinerary
                    .update_payload(id, ItemPayload::titled("touched"))
                    .expect("update");
            }
        }
    }

    proptest! {
        #[test]
        fn prop_sequence_is_a_permutation(rows in arb_rows()) {
            let expected: HashSet<ItemId> = rows.iter().map(|item| item.id).collect();
            let ordered = sequence(rows.clone());

            prop_assert_eq!(ordered.len(), rows.len());
            let seen: HashSet<ItemId> = ordered.iter().map(|item| item.id).collect();
            prop_assert_eq!(seen, expected);

            let report = inspect(&rows);
            prop_assert_eq!(report.threaded + report.orphans, rows.len());
        }

        #[test]
        fn prop_sequence_restores_shuffled_chain((expected, shuffled) in arb_shuffled_chain()) {
            let ordered: Vec<ItemId> = sequence(shuffled.clone()).iter().map(|item| item.id).collect();
            prop_assert_eq!(ordered, expected);
            prop_assert!(inspect(&shuffled).is_clean());
        }

        #[test]
        fn prop_operations_keep_chains_well_formed(ops in prop::collection::vec(arb_op(), 1..40)) {
            let itinerary = Itinerary::new(MemoryStore::new());
            let mut model = Model::new();

            for op in &ops {
                apply(&itinerary, &mut model, op);

                for day in 1..=DAYS {
                    let scope = Scope::new(TRIP, day);
                    let report = itinerary.inspect_day(scope).expect("inspect");
                    prop_assert!(report.is_clean(), "day {} after {:?}: {:?}", day, op, report);

                    let actual: Vec<ItemId> = itinerary
                        .day(scope)
                        .expect("day")
                        .iter()
                        .map(|item| item.id)
                        .collect();
                    let expected = model.get(&day).cloned().unwrap_or_default();
                    prop_assert_eq!(actual, expected);
                }
            }
        }

        #[test]
        fn prop_noop_move_is_idempotent(len in 1usize..10, choice in any::<usize>()) {
            let itinerary = Itinerary::new(MemoryStore::new());
            let scope = Scope::new(TRIP, 1);
            let mut ids = Vec::with_capacity(len);
            for _ in 0..len {
                let point = ids.last().copied().map_or(InsertionPoint::First, InsertionPoint::After);
                ids.push(itinerary.insert_after(scope, point, ItemPayload::titled("x")).expect("insert"));
            }

            let index = choice % len;
            let before = itinerary.day(scope).expect("day");
            let point = point_at(&ids, index);
            let outcome = itinerary.move_item(ids[index], 1, point).expect("move");

            prop_assert_eq!(outcome, MoveOutcome::Unchanged);
            prop_assert_eq!(itinerary.day(scope).expect("day"), before);
        }
    }
}
