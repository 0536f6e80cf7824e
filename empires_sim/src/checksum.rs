// Population checksum.
//
// Each unit is projected onto a fixed sequence of integer words (identity,
// position, motion, orders, health) which are folded through the SplitMix64
// finalizer into a 64-bit digest. The population checksum is the XOR of all
// unit digests, so it does not depend on the order units are stored or
// visited in, and it can be reduced in parallel.
//
// Display-only fields (`flash_cycles`) and fields derived from `grid_point`
// (`cart`, `cart_grid_offset`) are left out of the projection.

use crate::types::Point;
use crate::unit::Unit;

const GOLDEN: u64 = 0x9e37_79b9_7f4a_7c15;

fn finalize(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

struct Digest(u64);

impl Digest {
    fn word(&mut self, value: u64) {
        self.0 = finalize(self.0.wrapping_add(GOLDEN) ^ value);
    }

    fn point(&mut self, p: Point) {
        self.word((u64::from(p.x as u32) << 32) | u64::from(p.y as u32));
    }

    fn option(&mut self, value: Option<u64>) {
        match value {
            Some(v) => {
                self.word(1);
                self.word(v);
            }
            None => self.word(0),
        }
    }
}

pub fn unit_digest(unit: &Unit) -> u64 {
    let mut d = Digest(GOLDEN);
    d.word(u64::from(unit.id.0));
    d.word(unit.color.index() as u64);
    d.word(u64::from(unit.kind.code()));
    d.point(unit.grid_point);
    d.point(unit.cell);
    d.point(unit.cart_grid_offset_goal);
    d.point(unit.velocity);
    d.word(unit.max_speed as u64);
    d.word(unit.accel as u64);
    d.word(unit.health as u64);
    d.word(unit.path_index as u64);
    d.word(unit.path.len() as u64);
    for point in unit.path.iter() {
        d.point(point);
    }
    d.option(
        unit.destination
            .map(|p| (u64::from(p.x as u32) << 32) | u64::from(p.y as u32)),
    );
    d.word(u64::from(unit.selected));
    d.option(unit.command_group.map(u64::from));
    d.option(unit.target.map(|t| u64::from(t.0)));
    d.word(u64::from(unit.stalled_cycles));
    d.point(unit.stall_cell);
    d.0
}

/// XOR-fold of unit digests. Order independent.
pub fn fold<I: IntoIterator<Item = u64>>(digests: I) -> u64 {
    digests.into_iter().fold(0, |acc, d| acc ^ d)
}
