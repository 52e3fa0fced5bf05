use std::collections::HashSet;

use memtrace::{
    test_utils::{fresh_session, root_records},
    ContainerConfig, SlotPolicy, TrackedList, TrackedMap,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn sealed_events_evaluate_identically(values in prop::collection::vec(any::<u32>(), 1..32)) {
        let _session = fresh_session();
        let list = TrackedList::from_values(values, ContainerConfig::dense()).unwrap();
        list.seal();

        let first = root_records();
        let second = root_records();
        prop_assert_eq!(&first, &second);
        prop_assert!(list.getloc(&0).unwrap().is_finalized());
    }

    #[test]
    fn dense_addresses_are_key_times_element_size(
        values in prop::collection::vec(any::<u64>(), 1..64),
        probes in prop::collection::vec(any::<prop::sample::Index>(), 1..16),
    ) {
        let _session = fresh_session();
        let list = TrackedList::from_values(values.clone(), ContainerConfig::dense()).unwrap();
        for probe in probes {
            let key = probe.index(values.len());
            let first = list.getloc(&key).unwrap().resolve();
            let again = list.getloc(&key).unwrap().resolve();
            prop_assert_eq!(first, again);
            prop_assert_eq!(first.offset, key as u64 * list.element_size());
        }
    }

    #[test]
    fn sparse_slots_are_injective_and_stable(
        keys in prop::collection::hash_set(any::<u32>(), 1..64),
        seed in any::<u64>(),
    ) {
        let _session = fresh_session();
        let map: TrackedMap<u32, u8> = TrackedMap::with_config(
            ContainerConfig::sparse().slot_policy(SlotPolicy::Seeded(seed)),
        );
        let keys: Vec<u32> = keys.into_iter().collect();
        let mut offsets = Vec::new();
        for &key in &keys {
            map.set(key, 1).unwrap();
            offsets.push(map.getloc(&key).unwrap().resolve().offset);
        }
        let unique: HashSet<u64> = offsets.iter().copied().collect();
        prop_assert_eq!(unique.len(), keys.len());
        for (key, offset) in keys.iter().zip(&offsets) {
            prop_assert_eq!(map.getloc(key).unwrap().resolve().offset, *offset);
            prop_assert!(*offset < map.max_len() * map.element_size());
        }
    }

    #[test]
    fn element_size_never_decreases(words in prop::collection::vec("[a-z]{0,24}", 1..32)) {
        let _session = fresh_session();
        let list: TrackedList<String> = TrackedList::new();
        let mut seen = 0;
        for word in words {
            list.push(word).unwrap();
            let size = list.element_size();
            prop_assert!(size >= seen);
            seen = size;
        }
        list.set(0, String::new()).unwrap();
        prop_assert_eq!(list.element_size(), seen);
    }

    #[test]
    fn dump_count_matches_accepted_events(ops in prop::collection::vec(0u8..3, 0..48)) {
        let _session = fresh_session();
        let list: TrackedList<u16> = TrackedList::new();
        let mut accepted = 0;
        for op in ops {
            match op {
                0 => {
                    list.push(op as u16).unwrap();
                    accepted += 1;
                }
                1 if !list.is_empty() => {
                    list.get(&0).unwrap();
                    accepted += 1;
                }
                _ => {
                    list.contains(&0).unwrap();
                    accepted += 1;
                }
            }
        }
        let mut sink = Vec::new();
        let written = memtrace::tracer::root_context().dump(&mut sink).unwrap();
        prop_assert_eq!(written, accepted);
        prop_assert_eq!(memtrace::tracer::event_count(), accepted);
    }
}
