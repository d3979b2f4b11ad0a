use voxcache_core::GridCoord;

/// Voxel stored by the stress runs: a packed material/temperature pair.
pub type BenchVoxel = [u32; 2];

/// One foreground traffic pattern.
#[derive(Debug, Clone)]
pub struct Workload {
    pub name: &'static str,
    /// Percentage of grid rows that receive foreground traffic.
    pub hot_rows_pct: u32,
    /// Percentage of operations that are writes.
    pub write_pct: u32,
    pub ops_per_thread: u64,
}

impl Workload {
    /// Number of rows touched by this workload on a grid of `height` rows.
    pub fn hot_rows(&self, height: u32) -> u32 {
        (height as u64 * self.hot_rows_pct as u64 / 100).clamp(1, height as u64) as u32
    }
}

/// Standard suite, from a tight hot set to traffic across the whole grid.
pub fn standard_workloads(ops_per_thread: u64) -> Vec<Workload> {
    vec![
        Workload {
            name: "hot-5%-read-heavy",
            hot_rows_pct: 5,
            write_pct: 10,
            ops_per_thread,
        },
        Workload {
            name: "hot-5%-write-heavy",
            hot_rows_pct: 5,
            write_pct: 70,
            ops_per_thread,
        },
        Workload {
            name: "hot-25%-mixed",
            hot_rows_pct: 25,
            write_pct: 40,
            ops_per_thread,
        },
        Workload {
            name: "full-grid-mixed",
            hot_rows_pct: 100,
            write_pct: 40,
            ops_per_thread,
        },
    ]
}

/// Deterministic seed content: horizontal strata with sparse noise, so most
/// chunks compress well and some are uniform.
pub fn seed_voxel(coord: GridCoord, height: u32) -> BenchVoxel {
    const AMBIENT: u32 = 20;
    let depth = coord.y * 8 / height.max(1);
    let material = match depth {
        0..=2 => 0, // air
        3 => 3,     // water
        4 | 5 => 2, // sand
        _ => 1,     // stone
    };
    let hash = coord.x.wrapping_mul(31337) ^ coord.y.wrapping_mul(7919);
    if material != 0 && hash % 97 == 0 {
        [8, AMBIENT + 5]
    } else {
        [material, AMBIENT]
    }
}
