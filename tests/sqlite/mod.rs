//! Tests for the SQLite-backed store

#[cfg(test)]
mod tests_sqlite {
    use itinerary_rs::prelude::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn in_memory() -> Itinerary<SqliteStore> {
        Itinerary::new(SqliteStore::open_in_memory().expect("open sqlite"))
    }

    fn titles(itinerary: &Itinerary<SqliteStore>, scope: Scope) -> Vec<String> {
        itinerary
            .day(scope)
            .expect("day")
            .into_iter()
            .map(|item| item.payload.title)
            .collect()
    }

    fn fill(itinerary: &Itinerary<SqliteStore>, scope: Scope, names: &[&str]) -> Vec<ItemId> {
        let mut point = InsertionPoint::First;
        names
            .iter()
            .map(|name| {
                let id = itinerary
                    .insert_after(scope, point, ItemPayload::titled(*name))
                    .expect("insert");
                point = InsertionPoint::After(id);
                id
            })
            .collect()
    }

    #[test]
    fn insert_move_delete_scenarios() {
        let itinerary = in_memory();
        let trip = TripId::new();
        let day1 = Scope::new(trip, 1);
        let day2 = Scope::new(trip, 2);

        let ids = fill(&itinerary, day1, &["A", "C"]);
        let b = itinerary
            .insert_after(day1, InsertionPoint::After(ids[0]), ItemPayload::titled("B"))
            .expect("insert middle");
        assert_eq!(titles(&itinerary, day1), ["A", "B", "C"]);

        itinerary
            .move_item(b, 2, InsertionPoint::First)
            .expect("move across days");
        assert_eq!(titles(&itinerary, day1), ["A", "C"]);
        assert_eq!(titles(&itinerary, day2), ["B"]);

        itinerary.delete_item(ids[0]).expect("delete head");
        assert_eq!(titles(&itinerary, day1), ["C"]);
        assert!(itinerary.item(ids[1]).expect("c").is_head());

        let outcome = itinerary
            .move_item(b, 2, InsertionPoint::First)
            .expect("no-op move");
        assert_eq!(outcome, MoveOutcome::Unchanged);
    }

    #[test]
    fn payload_is_stored_as_json_and_never_moves_item() {
        let itinerary = in_memory();
        let day1 = Scope::new(TripId::new(), 1);
        let ids = fill(&itinerary, day1, &["A", "B"]);

        let payload = ItemPayload::titled("Ryokan")
            .with_kind(ItemKind::Lodging)
            .with_schedule(Schedule::Duration { minutes: 720 })
            .with_location(Location {
                name: "Hakone".into(),
                coordinates: Some(GeoPoint {
                    latitude: 35.23,
                    longitude: 139.1,
                }),
                place_id: None,
                prefecture_code: Some(14),
            });
        let updated = itinerary
            .update_payload(ids[1], payload.clone())
            .expect("update");

        assert_eq!(updated.prev_item_id, Some(ids[0]));
        assert_eq!(itinerary.item(ids[1]).expect("item").payload, payload);
    }

    #[test]
    fn guard_failure_rolls_back_transaction() {
        let store = SqliteStore::open_in_memory().expect("open");
        let trip = TripId::new();
        let scope = Scope::new(trip, 1);
        let head = ItineraryItem::new(ItemId::new(), scope, None, ItemPayload::titled("A"), 1);
        store.seed(vec![head.clone()]).expect("seed");

        let intruder = ItineraryItem::new(ItemId::new(), scope, None, ItemPayload::titled("X"), 2);
        let change = ChangeSet::new(trip, 2)
            .guard(Guard::DayEmpty { day: 1 })
            .write(RowWrite::Create(intruder.clone()));

        let err = store.commit(&change).unwrap_err();
        assert!(matches!(err, StoreError::GuardFailed { .. }));
        assert!(store.get(&intruder.id).expect("get").is_none());

        let change = ChangeSet::new(trip, 3)
            .write(RowWrite::Create(intruder.clone()))
            .write(RowWrite::Remove { id: ItemId::new() });
        let err = store.commit(&change).unwrap_err();
        assert!(matches!(err, StoreError::MissingRow(_)));
        assert!(store.get(&intruder.id).expect("get").is_none());
        assert_eq!(store.load_scope(&scope).expect("scope"), vec![head]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let store = SqliteStore::open_in_memory().expect("open");
        let scope = Scope::new(TripId::new(), 1);
        let item = ItineraryItem::new(ItemId::new(), scope, None, ItemPayload::titled("A"), 1);
        store.seed(vec![item.clone()]).expect("seed");

        let err = store.seed(vec![item]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir();
        let dir = dir.unwrap_or_else(|_| panic!("tempdir"));
        let path = dir.path().join("itinerary.db");
        let trip = TripId::new();
        let day1 = Scope::new(trip, 1);

        {
            let itinerary = Itinerary::new(SqliteStore::open(&path).expect("open"));
            fill(&itinerary, day1, &["A", "B", "C"]);
        }

        let reopened = Itinerary::new(SqliteStore::open(&path).expect("reopen"));
        assert_eq!(titles(&reopened, day1), ["A", "B", "C"]);
        assert!(reopened.inspect_day(day1).expect("inspect").is_clean());
    }

    #[test]
    fn snapshot_moves_between_backends() {
        let memory = Itinerary::new(MemoryStore::new());
        let trip = TripId::new();
        let mut point = InsertionPoint::First;
        for name in ["Airport", "Hotel"] {
            let id = memory
                .insert_after(Scope::new(trip, 1), point, ItemPayload::titled(name))
                .expect("insert");
            point = InsertionPoint::After(id);
        }
        let json = memory.snapshot_to_json(trip).expect("json");

        let sqlite = in_memory();
        assert_eq!(sqlite.restore_from_snapshot_json(&json).expect("restore"), 2);
        assert_eq!(titles(&sqlite, Scope::new(trip, 1)), ["Airport", "Hotel"]);
    }

    #[test]
    fn concurrent_tail_appends_stay_linear() {
        const THREADS: usize = 6;

        let dir = tempfile::tempdir();
        let dir = dir.unwrap_or_else(|_| panic!("tempdir"));
        let itinerary = Arc::new(Itinerary::new(
            SqliteStore::open(dir.path().join("race.db")).expect("open"),
        ));
        let day1 = Scope::new(TripId::new(), 1);
        fill(&itinerary, day1, &["start"]);

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|n| {
                let itinerary = Arc::clone(&itinerary);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    loop {
                        let tail = itinerary.day(day1).expect("day").last().map(|item| item.id);
                        let point = tail.map_or(InsertionPoint::First, InsertionPoint::After);
                        match itinerary.insert_after(day1, point, ItemPayload::titled(format!("{n}"))) {
                            Ok(_) => break,
                            Err(err) if err.is_retryable() => continue,
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        let report = itinerary.inspect_day(day1).expect("inspect");
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.len, THREADS + 1);
    }

    /// Runs both operations at once behind a barrier and returns both results.
    fn race<A, B>(
        first: impl FnOnce() -> Result<A, ItineraryError> + Send + 'static,
        second: impl FnOnce() -> Result<B, ItineraryError> + Send + 'static,
    ) -> (Result<A, ItineraryError>, Result<B, ItineraryError>)
    where
        A: Send + 'static,
        B: Send + 'static,
    {
        let barrier = Arc::new(Barrier::new(2));
        let gate = Arc::clone(&barrier);
        let left = thread::spawn(move || {
            gate.wait();
            first()
        });
        barrier.wait();
        let right = second();
        (left.join().expect("thread"), right)
    }

    #[test]
    fn move_racing_delete_of_its_target() {
        for _ in 0..50 {
            let itinerary = Arc::new(in_memory());
            let trip = TripId::new();
            let (day1, day2) = (Scope::new(trip, 1), Scope::new(trip, 2));
            let ids = fill(&itinerary, day1, &["anchor", "next"]);
            let anchor = ids[0];
            let mover = fill(&itinerary, day2, &["mover"])[0];

            let deleter = Arc::clone(&itinerary);
            let mover_side = Arc::clone(&itinerary);
            let (deleted, moved) = race(
                move || deleter.delete_item(anchor),
                move || mover_side.move_item(mover, 1, InsertionPoint::After(anchor)),
            );

            if let Err(err) = &deleted {
                assert!(err.is_retryable(), "delete: {err}");
            }
            match &moved {
                Ok(_) => {}
                Err(ItineraryError::PredecessorNotFound { id, .. }) => {
                    assert_eq!(*id, anchor);
                    assert!(deleted.is_ok());
                }
                Err(err) => assert!(err.is_retryable(), "move: {err}"),
            }

            let mut total = 0;
            for scope in [day1, day2] {
                let report = itinerary.inspect_day(scope).expect("inspect");
                assert!(report.is_clean(), "{scope}: {report:?}");
                total += report.len;
            }
            assert_eq!(total, if deleted.is_ok() { 2 } else { 3 });
        }
    }

    #[test]
    fn racing_inserts_never_exceed_day_capacity() {
        for _ in 0..50 {
            let itinerary = Arc::new(Itinerary::with_limits(
                SqliteStore::open_in_memory().expect("open"),
                ItineraryLimits::new().with_max_items_per_day(2),
            ));
            let day1 = Scope::new(TripId::new(), 1);
            let first = fill(&itinerary, day1, &["first"])[0];

            let head = Arc::clone(&itinerary);
            let tail = Arc::clone(&itinerary);
            let (a, b) = race(
                move || head.insert_after(day1, InsertionPoint::First, ItemPayload::titled("head")),
                move || {
                    tail.insert_after(day1, InsertionPoint::After(first), ItemPayload::titled("tail"))
                },
            );

            for result in [&a, &b] {
                if let Err(err) = result {
                    assert!(
                        err.is_retryable() || matches!(err, ItineraryError::LimitExceeded { .. }),
                        "insert: {err}"
                    );
                }
            }
            assert!(a.is_ok() != b.is_ok(), "exactly one insert fits: {a:?} {b:?}");
            let report = itinerary.inspect_day(day1).expect("inspect");
            assert!(report.is_clean(), "{report:?}");
            assert_eq!(report.len, 2);
        }
    }

    #[test]
    fn coordinates_survive_payload_column() {
        let itinerary = in_memory();
        let day1 = Scope::new(TripId::new(), 1);
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        for n in 0..500 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let latitude = (state >> 11) as f64 / (1u64 << 53) as f64 * 180.0 - 90.0;
            let longitude = (state & 0xFFFF_FFFF) as f64 / f64::from(u32::MAX) * 360.0 - 180.0;
            let point = GeoPoint {
                latitude,
                longitude,
            };
            let payload = ItemPayload::titled(format!("stop {n}")).with_location(Location {
                name: "Somewhere".into(),
                coordinates: Some(point),
                place_id: None,
                prefecture_code: None,
            });
            let id = itinerary
                .insert_after(day1, InsertionPoint::First, payload)
                .expect("insert");

            let stored = itinerary
                .item(id)
                .expect("item")
                .payload
                .location
                .and_then(|location| location.coordinates);
            assert_eq!(stored, Some(point));
        }
    }

    #[test]
    fn negative_timestamps_are_reported_as_corrupt() {
        let dir = tempfile::tempdir();
        let dir = dir.unwrap_or_else(|_| panic!("tempdir"));
        let path = dir.path().join("corrupt.db");
        let store = SqliteStore::open(&path).expect("open");
        let item = ItineraryItem::new(
            ItemId::new(),
            Scope::new(TripId::new(), 1),
            None,
            ItemPayload::titled("A"),
            1,
        );
        store.seed(vec![item.clone()]).expect("seed");

        let raw = rusqlite::Connection::open(&path).expect("raw connection");
        raw.execute(
            "UPDATE itinerary_items SET created_at_ms = -5 WHERE id = ?1",
            [item.id.to_string()],
        )
        .expect("update");

        let err = store.get(&item.id).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");
    }
}
