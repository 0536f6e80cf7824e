// Pure coordinate transforms between the sim's spaces.
//
// Spaces, from the screen inward:
// - screen: pixels on the player's display. Depends on the camera (`pan`)
//   and the display `resolution`, both carried in every snapshot.
// - iso:    the isometric projection of the map, independent of the camera.
//           Cart (0, 0) projects to iso (0, 0), the top corner of the map.
// - cart:   the flat tile plane in pixels. A tile is `tile_cart_width` x
//           `tile_cart_height` cart pixels.
// - grid point: cart rescaled so that a cell is `GRID_CELL_SIZE` units on a
//           side. Unit positions and velocities live here.
// - cell:   integer tile coordinate, `0..size` on each axis.
//
// Everything is integer math with floor semantics (`div_euclid`), so points
// off the top/left edge of the map map to negative cells instead of folding
// onto cell 0.

use empires_protocol::Point;

/// Grid points per cell edge.
pub const GRID_CELL_SIZE: i32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
    /// Cells per map edge.
    pub size: i32,
    pub tile_iso_width: i32,
    pub tile_iso_height: i32,
    pub tile_cart_width: i32,
    pub tile_cart_height: i32,
    pub tile_cart_mid: Point,
}

impl Grid {
    /// Build a grid for a `size` x `size` map of iso tiles. The cart tile is
    /// square with an edge equal to the iso tile height, which makes the
    /// projection exact at tile centers.
    pub fn new(size: i32, tile_iso_width: i32, tile_iso_height: i32) -> Self {
        let edge = tile_iso_height;
        Self {
            size,
            tile_iso_width,
            tile_iso_height,
            tile_cart_width: edge,
            tile_cart_height: edge,
            tile_cart_mid: Point::new(edge / 2, edge / 2),
        }
    }

    pub fn contains_cell(&self, cell: Point) -> bool {
        (0..self.size).contains(&cell.x) && (0..self.size).contains(&cell.y)
    }

    /// Clamp a grid point onto the map.
    pub fn clamp_grid_point(&self, point: Point) -> Point {
        let max = self.size * GRID_CELL_SIZE - 1;
        Point::new(point.x.clamp(0, max), point.y.clamp(0, max))
    }

    // -----------------------------------------------------------------------
    // cart <-> iso <-> screen
    // -----------------------------------------------------------------------

    pub fn cart_to_iso(&self, cart: Point) -> Point {
        let (x, y) = (i64::from(cart.x), i64::from(cart.y));
        let w = i64::from(self.tile_iso_width);
        let h = i64::from(self.tile_iso_height);
        let cw = i64::from(self.tile_cart_width);
        let ch = i64::from(self.tile_cart_height);
        Point::new(
            narrow(((x - y) * w).div_euclid(2 * cw)),
            narrow(((x + y) * h).div_euclid(2 * ch)),
        )
    }

    pub fn iso_to_cart(&self, iso: Point) -> Point {
        let (x, y) = (i64::from(iso.x), i64::from(iso.y));
        let w = i64::from(self.tile_iso_width);
        let h = i64::from(self.tile_iso_height);
        let cw = i64::from(self.tile_cart_width);
        let ch = i64::from(self.tile_cart_height);
        Point::new(
            narrow((cw * (x * h + y * w)).div_euclid(w * h)),
            narrow((ch * (y * w - x * h)).div_euclid(w * h)),
        )
    }

    // Pan, resolution and screen points arrive in player snapshots with any
    // i32 value, so these saturate instead of overflowing.

    pub fn screen_to_iso(&self, screen: Point, pan: Point, resolution: Point) -> Point {
        screen
            .saturating_sub(resolution.div_by(2))
            .saturating_add(pan)
    }

    pub fn iso_to_screen(&self, iso: Point, pan: Point, resolution: Point) -> Point {
        iso.saturating_add(resolution.div_by(2))
            .saturating_sub(pan)
    }

    pub fn screen_to_cart(&self, screen: Point, pan: Point, resolution: Point) -> Point {
        self.iso_to_cart(self.screen_to_iso(screen, pan, resolution))
    }

    pub fn cart_to_screen(&self, cart: Point, pan: Point, resolution: Point) -> Point {
        self.iso_to_screen(self.cart_to_iso(cart), pan, resolution)
    }

    /// The cart point under the middle of the screen for camera `pan`.
    pub fn pan_to_cart(&self, pan: Point) -> Point {
        self.iso_to_cart(pan)
    }

    /// The camera pan that centers the screen on `cart`.
    pub fn cart_to_pan(&self, cart: Point) -> Point {
        self.cart_to_iso(cart)
    }

    // -----------------------------------------------------------------------
    // cart <-> cell
    // -----------------------------------------------------------------------

    pub fn cart_to_cell(&self, cart: Point) -> Point {
        Point::new(
            cart.x.div_euclid(self.tile_cart_width),
            cart.y.div_euclid(self.tile_cart_height),
        )
    }

    /// Center of `cell` in cart pixels.
    pub fn cell_to_cart(&self, cell: Point) -> Point {
        Point::new(
            cell.x * self.tile_cart_width,
            cell.y * self.tile_cart_height,
        ) + self.tile_cart_mid
    }

    // -----------------------------------------------------------------------
    // cart <-> grid point <-> cell / offset
    // -----------------------------------------------------------------------

    pub fn cart_to_grid_point(&self, cart: Point) -> Point {
        let cell = i64::from(GRID_CELL_SIZE);
        Point::new(
            narrow((i64::from(cart.x) * cell).div_euclid(i64::from(self.tile_cart_width))),
            narrow((i64::from(cart.y) * cell).div_euclid(i64::from(self.tile_cart_height))),
        )
    }

    pub fn grid_point_to_cart(&self, point: Point) -> Point {
        let cell = i64::from(GRID_CELL_SIZE);
        Point::new(
            narrow((i64::from(point.x) * i64::from(self.tile_cart_width)).div_euclid(cell)),
            narrow((i64::from(point.y) * i64::from(self.tile_cart_height)).div_euclid(cell)),
        )
    }

    pub fn grid_point_with_offset(&self, cart: Point, offset: Point) -> Point {
        self.cart_to_grid_point(cart) + offset
    }

    /// Offset of a grid point from the center of its cell, in
    /// `-GRID_CELL_SIZE / 2 .. GRID_CELL_SIZE / 2`.
    pub fn offset_from_grid_point(&self, point: Point) -> Point {
        let half = GRID_CELL_SIZE / 2;
        Point::new(
            point.x.rem_euclid(GRID_CELL_SIZE) - half,
            point.y.rem_euclid(GRID_CELL_SIZE) - half,
        )
    }

    /// Center of `cell` in grid points.
    pub fn cell_to_grid_point(&self, cell: Point) -> Point {
        let half = GRID_CELL_SIZE / 2;
        Point::new(
            cell.x * GRID_CELL_SIZE + half,
            cell.y * GRID_CELL_SIZE + half,
        )
    }

    pub fn grid_point_to_cell(&self, point: Point) -> Point {
        Point::new(
            point.x.div_euclid(GRID_CELL_SIZE),
            point.y.div_euclid(GRID_CELL_SIZE),
        )
    }

    /// Row-major index of an in-bounds cell.
    pub fn cell_index(&self, cell: Point) -> Option<usize> {
        if self.contains_cell(cell) {
            Some((cell.y * self.size + cell.x) as usize)
        } else {
            None
        }
    }

    pub fn cell_count(&self) -> usize {
        (self.size * self.size) as usize
    }
}

fn narrow(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
