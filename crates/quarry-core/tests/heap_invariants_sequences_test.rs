use quarry_core::fixed::{Channel, DoubleList, FreeList, ListHead, Pool, QuadList, SingleList};
use quarry_core::{BlockRef, Manager, TreeHeap};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Clone, Copy)]
struct LiveBlock {
    block: BlockRef,
    fill: u8,
    len: usize,
}

fn fill_block(heap: &mut TreeHeap, live: &mut LiveBlock) {
    let payload = heap.payload_mut(live.block).unwrap();
    let fill = live.fill;
    payload.fill(fill);
    live.len = payload.len();
}

#[test]
fn deterministic_heap_sequences_hold_core_invariants() {
    // Deterministic, bounded invariant pressure: every step is followed
    // by a full structural audit.
    const SEEDS: [u64; 4] = [1, 2, 3, 4];
    const STEPS: usize = 2_000;
    const SLOTS: usize = 32;
    const CAPACITY: usize = 64 * 1024;

    for seed in SEEDS {
        let mut rng = XorShift64::new(seed);
        let mut heap = TreeHeap::new(CAPACITY).unwrap();
        let mut table: [Option<LiveBlock>; SLOTS] = [None; SLOTS];

        for step in 0..STEPS {
            let op = rng.gen_range_usize(0, 99);
            let idx = rng.gen_range_usize(0, SLOTS - 1);

            match op {
                // allocate (biased)
                0..=44 => {
                    if table[idx].is_some() {
                        continue;
                    }
                    let size = rng.gen_range_usize(1, 2048);
                    match heap.alloc(size) {
                        Ok(block) => {
                            let mut live = LiveBlock {
                                block,
                                fill: (rng.next_u64() & 0xFF) as u8,
                                len: 0,
                            };
                            fill_block(&mut heap, &mut live);
                            assert!(live.len >= size, "seed={seed} step={step}: short block");
                            table[idx] = Some(live);
                        }
                        Err(_) => {
                            // heap full for this size; legal outcome
                        }
                    }
                }
                // free
                45..=74 => {
                    let Some(live) = table[idx].take() else {
                        continue;
                    };
                    let payload = heap.payload(live.block).unwrap();
                    assert!(
                        payload[..live.len].iter().all(|&b| b == live.fill),
                        "seed={seed} step={step}: payload corrupted before free"
                    );
                    heap.free(live.block).unwrap();
                }
                // realloc
                _ => {
                    let Some(mut live) = table[idx] else {
                        continue;
                    };
                    let old_usable = heap.usable_size(live.block).unwrap();
                    let old_addr = heap.addr(live.block).unwrap();
                    let new_size = rng.gen_range_usize(1, 3072);
                    match heap.realloc(live.block, new_size) {
                        Ok(out) => {
                            if new_size <= old_usable {
                                // fitting requests are the identity
                                assert_eq!(out, live.block, "seed={seed} step={step}");
                                assert_eq!(heap.addr(out).unwrap(), old_addr);
                            }
                            let preserved = live.len.min(heap.usable_size(out).unwrap());
                            let payload = heap.payload(out).unwrap();
                            assert!(
                                payload[..preserved].iter().all(|&b| b == live.fill),
                                "seed={seed} step={step}: realloc lost payload bytes"
                            );
                            live.block = out;
                            live.fill = live.fill.wrapping_add(1);
                            fill_block(&mut heap, &mut live);
                            table[idx] = Some(live);
                        }
                        Err(_) => {
                            // growth denied; the old block must still be intact
                            let payload = heap.payload(live.block).unwrap();
                            assert!(
                                payload[..live.len].iter().all(|&b| b == live.fill),
                                "seed={seed} step={step}: failed realloc damaged block"
                            );
                            table[idx] = Some(live);
                        }
                    }
                }
            }

            assert_eq!(
                heap.live_bytes() + heap.free_bytes(),
                heap.capacity(),
                "seed={seed} step={step}: byte coverage broken"
            );
            assert_eq!(
                heap.live_count(),
                table.iter().flatten().count(),
                "seed={seed} step={step}: live count drifted"
            );
            heap.audit()
                .unwrap_or_else(|e| panic!("seed={seed} step={step}: audit failed: {e}"));
        }

        for live in table.into_iter().flatten() {
            heap.free(live.block).unwrap();
        }
        heap.audit().unwrap();
        assert_eq!(heap.live_count(), 0);
        assert_eq!(heap.free_bytes(), heap.capacity());
        // everything freed: full coalescence back to one block per region
        assert_eq!(heap.dump().len(), heap.region_count());
    }
}

#[test]
fn deterministic_sequences_with_growth_hold_invariants() {
    const STEPS: usize = 600;
    let mut rng = XorShift64::new(0xDEAD_BEEF);
    let mut heap = TreeHeap::new(4 * 1024).unwrap();
    let mut live: Vec<LiveBlock> = Vec::new();

    for step in 0..STEPS {
        let op = rng.gen_range_usize(0, 99);
        match op {
            0..=59 => {
                let size = rng.gen_range_usize(1, 1024);
                match heap.alloc(size) {
                    Ok(block) => {
                        let mut lb = LiveBlock {
                            block,
                            fill: (rng.next_u64() & 0xFF) as u8,
                            len: 0,
                        };
                        fill_block(&mut heap, &mut lb);
                        live.push(lb);
                    }
                    Err(_) => {
                        // grow instead of failing the scenario
                        heap.extend(4 * 1024).unwrap();
                    }
                }
            }
            _ => {
                if live.is_empty() {
                    continue;
                }
                let idx = rng.gen_range_usize(0, live.len() - 1);
                let lb = live.swap_remove(idx);
                heap.free(lb.block).unwrap();
            }
        }
        heap.audit()
            .unwrap_or_else(|e| panic!("step={step}: audit failed: {e}"));
    }
    for lb in live.drain(..) {
        heap.free(lb.block).unwrap();
    }
    heap.audit().unwrap();
    assert_eq!(heap.dump().len(), heap.region_count());
}

#[test]
fn tree_heap_showcase_scenario() {
    let mut heap = TreeHeap::new(1024).unwrap();
    let a = heap.alloc(100).unwrap();
    let b = heap.alloc(200).unwrap();
    let a_addr = heap.addr(a).unwrap();
    let b_addr = heap.addr(b).unwrap();
    assert!(b_addr > a_addr, "blocks must not overlap");

    heap.free(a).unwrap();
    let c = heap.alloc(90).unwrap();
    assert_eq!(
        heap.addr(c).unwrap(),
        a_addr,
        "best fit must reuse the freed hole"
    );

    heap.free(b).unwrap();
    heap.free(c).unwrap();
    let reports = heap.dump();
    assert_eq!(reports.len(), 1, "full coalescence expected");
    assert_eq!(reports[0].size, 1024);
    assert!(!reports[0].active);
    heap.audit().unwrap();
}

#[test]
fn double_list_removal_scenario() {
    let mut list: DoubleList<char> = DoubleList::new(8).unwrap();
    let mut head = ListHead::new();
    let x = list.alloc('x').unwrap();
    let y = list.alloc('y').unwrap();
    let z = list.alloc('z').unwrap();
    for s in [x, y, z] {
        list.push_back(&mut head, s).unwrap();
    }
    list.remove(&mut head, y).unwrap();
    let forward: Vec<char> = list.iter_from(x).map(|(_, v)| *v).collect();
    assert_eq!(forward, vec!['x', 'z']);
    let backward: Vec<char> = list.iter_back_from(z).map(|(_, v)| *v).collect();
    assert_eq!(backward, vec!['z', 'x']);
}

#[test]
fn fixed_allocators_roundtrip_pointer_for_pointer() {
    // alloc followed by free must restore the exact free-list state
    let mut free_list: FreeList<u64> = FreeList::new(8).unwrap();
    let mut pool: Pool<u64> = Pool::new(8).unwrap();
    let mut single: SingleList<u64> = SingleList::new(8).unwrap();
    let mut double: DoubleList<u64> = DoubleList::new(8).unwrap();
    let mut quad: QuadList<u64> = QuadList::new(8).unwrap();

    // disturb each allocator first so the free list is not pristine
    let _keep_fl = free_list.alloc(1).unwrap();
    let _keep_si = single.alloc(1).unwrap();
    let _keep_do = double.alloc(1).unwrap();
    let _keep_qu = quad.alloc(1).unwrap();

    let before_fl = free_list.free_indices();
    let s = free_list.alloc(2).unwrap();
    free_list.free(s).unwrap();
    assert_eq!(free_list.free_indices(), before_fl);

    // the pool reclaims through its inactive list; seed it first
    let _keep_po = pool.alloc(1).unwrap();
    let reclaimed = pool.alloc(2).unwrap();
    pool.free(reclaimed).unwrap();
    let before_po = pool.free_indices();
    let s = pool.alloc(3).unwrap();
    assert_eq!(s, reclaimed);
    pool.free(s).unwrap();
    assert_eq!(pool.free_indices(), before_po);

    let before_si = single.free_indices();
    let s = single.alloc(2).unwrap();
    single.free(s).unwrap();
    assert_eq!(single.free_indices(), before_si);

    let before_do = double.free_indices();
    let s = double.alloc(2).unwrap();
    double.free(s).unwrap();
    assert_eq!(double.free_indices(), before_do);

    let before_qu = quad.free_indices();
    let s = quad.alloc(2).unwrap();
    quad.free(s).unwrap();
    assert_eq!(quad.free_indices(), before_qu);
}

#[test]
fn pool_iteration_visits_active_in_address_order() {
    let mut rng = XorShift64::new(11);
    let mut pool: Pool<u64> = Pool::new(24).unwrap();
    pool.extend(24).unwrap();
    let mut live = Vec::new();
    for step in 0..400 {
        if rng.gen_range_usize(0, 2) < 2 {
            if let Ok(slot) = pool.alloc(rng.next_u64()) {
                live.push(slot);
            }
        } else if !live.is_empty() {
            let idx = rng.gen_range_usize(0, live.len() - 1);
            pool.free(live.swap_remove(idx)).unwrap();
        }

        // every active slot appears exactly once, in ascending address order
        let visited: Vec<u32> = pool.iter().map(|(s, _)| s.index()).collect();
        assert!(
            visited.windows(2).all(|w| w[0] < w[1]),
            "step={step}: iteration out of address order"
        );
        let mut expected: Vec<u32> = live.iter().map(|s| s.index()).collect();
        expected.sort_unstable();
        assert_eq!(visited, expected, "step={step}: visit set drifted");
    }
}

#[test]
fn quad_list_pair_bookkeeping_scenario() {
    // one pair object, two owner lists, one removal
    let mut pairs: QuadList<(u32, u32)> = QuadList::new(16).unwrap();
    let mut body_a = ListHead::new();
    let mut body_b = ListHead::new();

    let ab = pairs.alloc((1, 2)).unwrap();
    let ac = pairs.alloc((1, 3)).unwrap();
    let bc = pairs.alloc((2, 3)).unwrap();

    pairs
        .insert_sorted(&mut body_a, Channel::A, ab, |l, r| l.1.cmp(&r.1))
        .unwrap();
    pairs
        .insert_sorted(&mut body_a, Channel::A, ac, |l, r| l.1.cmp(&r.1))
        .unwrap();
    pairs.push_front(&mut body_b, Channel::B, ab).unwrap();
    pairs.push_front(&mut body_b, Channel::B, bc).unwrap();

    pairs
        .free_from_both(&mut body_a, &mut body_b, ab)
        .unwrap();
    let a_pairs: Vec<(u32, u32)> = pairs.iter(&body_a, Channel::A).map(|(_, v)| *v).collect();
    let b_pairs: Vec<(u32, u32)> = pairs.iter(&body_b, Channel::B).map(|(_, v)| *v).collect();
    assert_eq!(a_pairs, vec![(1, 3)]);
    assert_eq!(b_pairs, vec![(2, 3)]);
}

#[test]
fn manager_sequences_keep_logs_and_state_aligned() {
    let mut rng = XorShift64::new(7);
    let mut mgr = Manager::new(32 * 1024).unwrap();
    let mut live: Vec<BlockRef> = Vec::new();
    for _ in 0..400 {
        if rng.gen_range_usize(0, 1) == 0 || live.is_empty() {
            let size = rng.gen_range_usize(1, 512);
            if let Ok(block) = mgr.alloc(size) {
                live.push(block);
            }
        } else {
            let idx = rng.gen_range_usize(0, live.len() - 1);
            let block = live.swap_remove(idx);
            mgr.free(block).unwrap();
        }
        mgr.audit().unwrap();
    }
    let logs = mgr.lifecycle_logs();
    assert!(!logs.is_empty());
    // decision ids are strictly increasing
    assert!(logs.windows(2).all(|w| w[0].decision_id < w[1].decision_id));
    let last = logs.last().unwrap();
    assert_eq!(last.live_count, mgr.heap().live_count());
}
