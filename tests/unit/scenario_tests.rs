#[cfg(test)]
mod tests_scenarios {
    use itinerary_rs::prelude::*;

    fn titles(itinerary: &Itinerary<MemoryStore>, scope: Scope) -> Vec<String> {
        itinerary
            .day(scope)
            .expect("read day")
            .into_iter()
            .map(|item| item.payload.title)
            .collect()
    }

    fn add(
        itinerary: &Itinerary<MemoryStore>,
        scope: Scope,
        point: InsertionPoint,
        title: &str,
    ) -> ItemId {
        itinerary
            .insert_after(scope, point, ItemPayload::titled(title))
            .expect("insert")
    }

    #[test]
    fn basic_insert_chain() {
        let itinerary = Itinerary::new(MemoryStore::new());
        let day1 = Scope::new(TripId::new(), 1);

        let a = add(&itinerary, day1, InsertionPoint::First, "A");
        let b = add(&itinerary, day1, InsertionPoint::After(a), "B");
        add(&itinerary, day1, InsertionPoint::After(b), "C");

        assert_eq!(titles(&itinerary, day1), ["A", "B", "C"]);
    }

    #[test]
    fn insert_in_middle_then_delete_middle() {
        let itinerary = Itinerary::new(MemoryStore::new());
        let day1 = Scope::new(TripId::new(), 1);

        let a = add(&itinerary, day1, InsertionPoint::First, "A");
        let c = add(&itinerary, day1, InsertionPoint::After(a), "C");
        let b = add(&itinerary, day1, InsertionPoint::After(a), "B");
        assert_eq!(titles(&itinerary, day1), ["A", "B", "C"]);

        itinerary.delete_item(b).expect("delete");
        assert_eq!(titles(&itinerary, day1), ["A", "C"]);
        assert_eq!(itinerary.item(c).expect("c").prev_item_id, Some(a));
    }

    #[test]
    fn move_across_days() {
        let itinerary = Itinerary::new(MemoryStore::new());
        let trip = TripId::new();
        let day1 = Scope::new(trip, 1);
        let day2 = Scope::new(trip, 2);

        let a = add(&itinerary, day1, InsertionPoint::First, "A");
        let b = add(&itinerary, day1, InsertionPoint::After(a), "B");
        add(&itinerary, day1, InsertionPoint::After(b), "C");

        let outcome = itinerary
            .move_item(b, 2, InsertionPoint::First)
            .expect("move");
        assert_eq!(outcome, MoveOutcome::Moved);

        assert_eq!(titles(&itinerary, day1), ["A", "C"]);
        assert_eq!(titles(&itinerary, day2), ["B"]);
    }

    #[test]
    fn malformed_read_keeps_every_item() {
        let trip = TripId::new();
        let day1 = Scope::new(trip, 1);
        let item = |n: u128, prev: Option<u128>| {
            ItineraryItem::new(
                ItemId::from_u128(n),
                day1,
                prev.map(ItemId::from_u128),
                ItemPayload::titled(format!("{n}")),
                0,
            )
        };

        // two heads, one follower of the first head
        let store = MemoryStore::new();
        store
            .seed(vec![item(1, None), item(2, None), item(3, Some(1))])
            .expect("seed");
        let itinerary = Itinerary::new(store);

        assert_eq!(titles(&itinerary, day1), ["1", "3", "2"]);

        let report = itinerary.inspect_day(day1).expect("inspect");
        assert!(!report.is_clean());
        assert_eq!(report.orphans, 1);
    }

    #[test]
    fn form_sentinel_inserts_at_head() {
        let itinerary = Itinerary::new(MemoryStore::new());
        let day1 = Scope::new(TripId::new(), 1);

        let a = add(&itinerary, day1, InsertionPoint::First, "A");
        let point = InsertionPoint::parse(FIRST_SENTINEL).expect("sentinel");
        add(&itinerary, day1, point, "Z");

        let point = InsertionPoint::parse(&a.to_string()).expect("uuid");
        add(&itinerary, day1, point, "B");

        assert_eq!(titles(&itinerary, day1), ["Z", "A", "B"]);
        assert!(InsertionPoint::parse("not-a-uuid").is_err());
        assert_eq!(InsertionPoint::parse("").expect("empty"), InsertionPoint::First);
    }

    #[test]
    fn schedule_and_category_round_trip_through_store() {
        let itinerary = Itinerary::new(MemoryStore::new());
        let day1 = Scope::new(TripId::new(), 1);

        let start: ClockTime = "08:15:30".parse().expect("clock");
        let end: ClockTime = "10:42".parse().expect("clock");
        let payload = ItemPayload::titled("Nozomi to Kyoto")
            .with_schedule(Schedule::from_parts(Some(start), Some(end), None))
            .with_kind(ItemKind::Transport(TransportDetails {
                mode: Some(TransportMode::Shinkansen),
                departure_name: Some("Tokyo".into()),
                arrival_name: Some("Kyoto".into()),
                car_number: Some("7".into()),
                seat_number: Some("12A".into()),
            }))
            .with_location(Location::named("Tokyo Station"));

        let id = itinerary
            .insert_after(day1, InsertionPoint::First, payload.clone())
            .expect("insert");
        let stored = itinerary.item(id).expect("item");

        assert_eq!(stored.payload, payload);
        assert_eq!(stored.payload.schedule.start().map(|t| t.to_string()), Some("08:15".into()));
        assert_eq!(stored.payload.kind.label(), "transport");

        let json = serde_json::to_string(&stored.payload).expect("json");
        assert!(json.contains("\"mode\":\"clock\""));
        assert!(json.contains("\"category\":\"transport\""));
    }

    #[test]
    fn duration_wins_over_clock_times() {
        let start: ClockTime = "09:00".parse().expect("clock");
        let schedule = Schedule::from_parts(Some(start), None, Some(90));
        assert_eq!(schedule.duration_minutes(), Some(90));
        assert_eq!(schedule.start(), None);

        assert_eq!(Schedule::from_parts(None, None, Some(0)), Schedule::Unscheduled);
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("9".parse::<ClockTime>().is_err());
    }
}
