mod common;

use std::collections::HashSet;

use anyhow::Result;
use common::{of_kind, offsets};
use memtrace::{
    init_logger,
    test_utils::{fresh_session, root_dump, root_records, verbose_session},
    tracer, AccessType, ContainerConfig, DumpTarget, MemoryBlock, MemorySpace, MemorySpaceType,
    Session, TraceConfig, TraceContext, TraceElement, TrackedList, TrackedMap,
};

#[test]
fn scenario_a_dense_sequence() -> Result<()> {
    let _session = fresh_session();
    let list = TrackedList::from_values([10u32, 20, 30], ContainerConfig::dense())?;
    assert_eq!(list.element_size(), 4);

    let writes = of_kind(AccessType::Write);
    assert_eq!(offsets(&writes), vec![0, 4, 8]);

    assert_eq!(list.get(&1)?, 20);
    let reads = of_kind(AccessType::Read);
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].offset, 4);
    assert_eq!(reads[0].element_size, 4);
    Ok(())
}

#[test]
fn scenario_b_sparse_mapping() -> Result<()> {
    let _session = fresh_session();
    let map = TrackedMap::from_entries(
        [("a", 1u32), ("b", 2)],
        ContainerConfig::sparse().capacity(2),
    )?;
    assert_eq!(map.max_len(), 2);

    let writes = of_kind(AccessType::Write);
    assert_eq!(writes.len(), 2);
    let slots: HashSet<u64> = writes.iter().map(|w| w.offset / w.element_size).collect();
    assert_eq!(slots, HashSet::from([0, 1]));

    for _ in 0..3 {
        assert_eq!(map.getloc(&"a")?.resolve().offset, writes[0].offset);
        assert_eq!(map.get(&"a")?, 1);
    }
    Ok(())
}

#[test]
fn scenario_b_seeded_slots_are_reproducible() -> Result<()> {
    let run = || -> Result<Vec<u64>> {
        let _session = Session::start(
            TraceConfig::default()
                .with_output(DumpTarget::Off)
                .with_slot_policy(memtrace::SlotPolicy::Seeded(7)),
        );
        let map = TrackedMap::from_entries(
            (0..16u64).map(|k| (k, k)),
            ContainerConfig::sparse().capacity(16),
        )?;
        (0..16u64)
            .map(|k| Ok(map.getloc(&k)?.resolve().offset))
            .collect()
    };
    let first = run()?;
    assert_eq!(first, run()?);
    assert_eq!(first.iter().collect::<HashSet<_>>().len(), 16);
    Ok(())
}

#[test]
fn scenario_c_nested_container() -> Result<()> {
    let _session = fresh_session();
    let outer: TrackedMap<&'static str, TrackedList<u32>> = TrackedMap::new();
    let child = TrackedList::from_values([1u32, 2, 3], ContainerConfig::dense())?;
    outer.set("x", child.clone())?;

    assert_eq!(child.total_size(), 4 * 3 + 8);
    assert_eq!(outer.element_size(), child.total_size());

    let before = root_records().len();
    let fetched = outer.get(&"x")?;
    assert_eq!(root_records().len(), before);
    assert_eq!(fetched.len(), 3);

    // Reading through the child is charged at the child's own address.
    fetched.get(&2)?;
    let read = *root_records().last().unwrap();
    assert_eq!(read.kind, AccessType::Read);
    assert_eq!(read.offset, 8);
    Ok(())
}

#[test]
fn scenario_c_nesting_moves_the_child_into_the_parent_space() -> Result<()> {
    let _session = fresh_session();
    // The child is written, and so addressed as a root, before it is nested.
    let child = TrackedList::from_values([1u32, 2, 3], ContainerConfig::dense())?;
    let outer: TrackedMap<&'static str, TrackedList<u32>> = TrackedMap::new();
    outer.set("x", child)?;

    let mut manifest = Vec::new();
    tracer::dump_manifest(&mut manifest)?;
    // Outer: one 20 byte element plus overhead.
    assert_eq!(String::from_utf8(manifest)?, "1 28 20\n");

    let spaces: HashSet<u32> = root_records().iter().map(|r| r.space.id).collect();
    assert_eq!(spaces, HashSet::from([1]));
    Ok(())
}

#[test]
fn scenario_c_child_events_follow_the_parent() -> Result<()> {
    let _session = fresh_session();
    let outer: TrackedList<TrackedList<u16>> = TrackedList::new();
    outer.push(TrackedList::new())?;
    outer.push(TrackedList::new())?;

    let second = outer.get(&1)?;
    second.extend([7u16, 8])?;
    let first = outer.get(&0)?;
    first.extend([1u16, 2, 3, 4])?;

    // Both children now span 4 * 2 + 8 bytes, so the second one starts at 16.
    assert_eq!(outer.element_size(), 16);
    let second_writes: Vec<u64> = root_records()
        .iter()
        .filter(|r| r.kind == AccessType::Write && r.element_size == 2)
        .map(|r| r.offset)
        .take(2)
        .collect();
    assert_eq!(second_writes, vec![16, 18]);

    // All nested events live in the outer container's space.
    let spaces: HashSet<u32> = root_records().iter().map(|r| r.space.id).collect();
    assert_eq!(spaces.len(), 1);
    Ok(())
}

fn probe_event() -> TraceElement {
    let space = MemorySpace {
        id: 0,
        kind: MemorySpaceType::Cpu,
    };
    TraceElement::new(
        MemoryBlock::new(
            memtrace::lazy::value(space),
            memtrace::lazy::value(0),
            memtrace::lazy::value(1),
            memtrace::lazy::value(1),
        ),
        AccessType::Unknown,
    )
}

#[test]
fn scenario_d_nested_contexts() -> Result<()> {
    init_logger();
    let _session = fresh_session();
    let outer = TraceContext::new("outer");
    let inner = TraceContext::new("inner");

    outer.enter();
    tracer::record(probe_event(), &[])?;
    tracer::record(probe_event(), &[])?;
    inner.enter();
    tracer::record(probe_event(), &[])?;
    inner.exit()?;
    outer.exit()?;

    let mut sink = Vec::new();
    assert_eq!(inner.dump(&mut sink)?, 1);
    let mut sink = Vec::new();
    assert_eq!(outer.dump(&mut sink)?, 2);
    assert_eq!(String::from_utf8(sink)?.lines().count(), 2);
    assert!(tracer::root_context().is_empty());
    Ok(())
}

#[test]
fn scenario_d_scoped_contexts() -> Result<()> {
    let _session = fresh_session();
    let list = TrackedList::from_values([1u8, 2], ContainerConfig::dense().pre_resident())?;
    let scoped = TraceContext::new("scoped");
    {
        let _scope = scoped.scope();
        list.get(&0)?;
        list.get(&1)?;
    }
    list.get(&0)?;
    assert_eq!(scoped.len(), 2);
    assert_eq!(tracer::root_context().len(), 1);
    assert_eq!(tracer::depth(), 0);
    Ok(())
}

#[test]
fn scenario_d_out_of_order_scope_is_reported() -> Result<()> {
    let _session = fresh_session();
    let outer = TraceContext::new("outer");
    let scope = outer.scope();
    let intruder = TraceContext::new("intruder");
    intruder.enter();
    assert!(scope.close().is_err());
    intruder.exit()?;
    outer.exit()?;
    Ok(())
}

#[test]
fn scenario_e_dependency_edges() -> Result<()> {
    let _session = fresh_session();
    let a = tracer::record(probe_event(), &[])?.unwrap();
    let b = tracer::record(probe_event(), &[a])?.unwrap();
    assert!(tracer::out_edges(a).contains(&b));
    assert_eq!(tracer::deps_on(b), vec![a]);
    Ok(())
}

#[test]
fn dump_matches_registration_order() -> Result<()> {
    let _session = fresh_session();
    let list: TrackedList<u64> = TrackedList::new();
    list.push(1)?;
    list.push(2)?;
    list.get(&0)?;
    list.delete(&1)?;
    assert_eq!(root_dump(), "0 0 8 1 W -1\n0 8 8 1 W -1\n0 0 8 1 R -1\n0 8 8 1 D -1\n");
    Ok(())
}

#[test]
fn session_writes_manifest_and_dependencies() -> Result<()> {
    let session = verbose_session();
    let list: TrackedList<u32> = TrackedList::new();
    let a = list.push(5)?.unwrap();
    list.set_with_deps(0, 6, &[a])?;

    let mut out = Vec::new();
    session.write_to(&mut out)?;
    assert_eq!(
        String::from_utf8(out)?,
        "0 0 4 1 W -1\n0 0 4 1 W -1\n# manifest\n0 12 4\n# dependencies\n0 [] [1]\n1 [0] []\n"
    );
    Ok(())
}

#[test]
fn session_dumps_to_file_on_drop() -> Result<()> {
    let path = std::env::temp_dir().join(format!("memtrace-session-{}.trace", std::process::id()));
    {
        let _session = Session::start(TraceConfig::default().with_output(DumpTarget::File(path.clone())));
        let list = TrackedList::from_values([1u8, 2, 3], ContainerConfig::dense())?;
        list.get(&2)?;
    }
    let written = std::fs::read_to_string(&path)?;
    std::fs::remove_file(&path)?;
    assert_eq!(written, "0 0 1 1 W -1\n0 1 1 1 W -1\n0 2 1 1 W -1\n0 2 1 1 R -1\n");
    Ok(())
}

#[test]
fn dropped_container_freezes_its_events() -> Result<()> {
    let _session = fresh_session();
    {
        let list: TrackedList<u8> = TrackedList::new();
        list.push(1)?;
        list.push(2)?;
    }
    let records = root_records();
    assert_eq!(offsets(&records), vec![0, 1]);
    let mut manifest = Vec::new();
    tracer::dump_manifest(&mut manifest)?;
    assert_eq!(String::from_utf8(manifest)?, "0 10 1\n");
    Ok(())
}
