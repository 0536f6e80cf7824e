// Property tests: the step is a pure function of (state, packets), and the
// way motion is split across cores never shows in the result.

use empires_protocol::{InputFlags, Packet, Snapshot};
use empires_sim::{Color, Grid, Point, SimConfig, UnitKind, Units};
use proptest::prelude::*;

const RESOLUTION: Point = Point::new(800, 600);

fn grid() -> Grid {
    Grid::new(24, 64, 32)
}

#[derive(Clone, Debug)]
struct Spawn {
    color: Color,
    kind: UnitKind,
    cell: Point,
}

#[derive(Clone, Debug)]
struct Input {
    tick: usize,
    color: Color,
    cell: Point,
    flags: InputFlags,
    drag: Point,
}

fn arb_color() -> impl Strategy<Value = Color> {
    (0usize..4).prop_map(|i| Color::ALL[i])
}

fn arb_cell() -> impl Strategy<Value = Point> {
    (0i32..24, 0i32..24).prop_map(|(x, y)| Point::new(x, y))
}

fn arb_spawn() -> impl Strategy<Value = Spawn> {
    (arb_color(), 0usize..4, arb_cell()).prop_map(|(color, kind, cell)| Spawn {
        color,
        kind: UnitKind::ALL[kind],
        cell,
    })
}

fn arb_input() -> impl Strategy<Value = Input> {
    let flags = prop_oneof![
        Just(InputFlags::MOUSE_LU),
        Just(InputFlags::MOUSE_RU),
        Just(InputFlags::MOUSE_LU | InputFlags::MOUSE_RU),
        Just(InputFlags::MOUSE_LU | InputFlags::LEFT_SHIFT),
    ];
    (0usize..60, arb_color(), arb_cell(), flags, (-300i32..300, -300i32..300)).prop_map(
        |(tick, color, cell, flags, (dx, dy))| Input {
            tick,
            color,
            cell,
            flags,
            drag: Point::new(dx, dy),
        },
    )
}

fn packets(inputs: &[Input], ticks: usize) -> Vec<Packet> {
    let g = grid();
    let mut packets = vec![Packet::default(); ticks];
    for input in inputs {
        let pan = Point::new(0, 300);
        let cursor = g.cart_to_screen(g.cell_to_cart(input.cell), pan, RESOLUTION);
        packets[input.tick % ticks].set(
            input.color,
            Snapshot {
                cursor,
                selection_a: cursor,
                selection_b: cursor + input.drag,
                pan,
                resolution: RESOLUTION,
                flags: input.flags,
                ..Snapshot::EMPTY
            },
        );
    }
    packets
}

fn simulate(spawns: &[Spawn], packets: &[Packet], cpu_count: usize) -> Vec<u64> {
    let mut units = Units::new(grid(), SimConfig::default(), 64, cpu_count);
    for s in spawns {
        units.spawn(s.color, s.kind, s.cell);
    }
    packets.iter().map(|p| units.step(p)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn same_inputs_same_checksums(
        spawns in proptest::collection::vec(arb_spawn(), 0..40),
        inputs in proptest::collection::vec(arb_input(), 0..12),
    ) {
        let packets = packets(&inputs, 80);
        prop_assert_eq!(simulate(&spawns, &packets, 1), simulate(&spawns, &packets, 1));
    }

    #[test]
    fn core_split_is_invisible(
        spawns in proptest::collection::vec(arb_spawn(), 1..40),
        inputs in proptest::collection::vec(arb_input(), 0..12),
        cpu_count in 2usize..9,
    ) {
        let packets = packets(&inputs, 80);
        prop_assert_eq!(simulate(&spawns, &packets, 1), simulate(&spawns, &packets, cpu_count));
    }

    #[test]
    fn restore_midway_matches_uninterrupted_run(
        spawns in proptest::collection::vec(arb_spawn(), 1..30),
        inputs in proptest::collection::vec(arb_input(), 0..12),
        split in 1usize..79,
    ) {
        let packets = packets(&inputs, 80);
        let expected = simulate(&spawns, &packets, 2);

        let mut first = Units::new(grid(), SimConfig::default(), 64, 2);
        for s in &spawns {
            first.spawn(s.color, s.kind, s.cell);
        }
        let mut got: Vec<u64> = packets[..split].iter().map(|p| first.step(p)).collect();
        let bytes = first.pack_restore().to_bytes().unwrap();

        let mut second = Units::new(grid(), SimConfig::default(), 64, 3);
        second.apply_restore_bytes(&bytes).unwrap();
        got.extend(packets[split..].iter().map(|p| second.step(p)));
        prop_assert_eq!(expected, got);
    }
}
