use cubett_runtime::{ComputeDevice, CubeCount, CubeDim, LaunchDescriptor, OccupancyRequest};

use crate::cache::{OccupancyCache, OccupancyKey};
use crate::config::{GlobalConfig, PlannerLogLevel};
use crate::{ElemWidth, LaunchPlanError, TensorSplit, TransposeStrategy};

/// Width and height of a tile.
pub const TILE_DIM: u32 = 32;
/// Rows of a tile handled by one unit per pass.
pub const TILE_ROWS: u32 = 8;
/// Highest number of elements a unit of the packed strategies holds in private storage.
pub const MAX_REG_STORAGE: u32 = 8;

/// Padding added to each shared tile row so that transposed reads hit distinct banks.
pub fn tile_padding(elem: ElemWidth) -> usize {
    match elem.size() {
        size if size < 4 => 4 / size,
        _ => 1,
    }
}

/// Bytes of the shared tile of the tiled strategy.
pub fn tile_shared_memory_size(elem: ElemWidth) -> usize {
    let dim = TILE_DIM as usize;
    dim * (dim + tile_padding(elem)) * elem.size()
}

/// Tunable launch parameters.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchConfig {
    /// Units per cube.
    pub cube_dim: CubeDim,
    /// Cubes in the grid.
    pub cube_count: CubeCount,
    /// Dynamic shared memory per cube, in bytes.
    pub shared_memory_size: usize,
    /// Elements each unit holds in private storage, zero when unused.
    pub num_reg_storage: u32,
}

impl LaunchConfig {
    /// A single unit, without shared memory.
    pub fn trivial() -> Self {
        Self::new(CubeDim::new_single(), CubeCount::new_single(), 0, 0)
    }

    /// The launch geometry validated by the queue.
    pub fn descriptor(&self) -> LaunchDescriptor {
        LaunchDescriptor::new(self.cube_dim, self.cube_count, self.shared_memory_size)
    }
}

/// A launch configuration with the number of its cubes resident on one streaming multiprocessor.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchPlan {
    /// The selected configuration.
    pub config: LaunchConfig,
    /// Resident cubes per streaming multiprocessor, at least one.
    pub active_cubes: u32,
}

/// Selects launch configurations maximizing occupancy.
///
/// Occupancy queries of the split strategy go through an [occupancy cache](OccupancyCache) owned
/// by the planner. Concurrent planning calls serialize on the cache lock.
#[derive(Debug)]
pub struct LaunchPlanner {
    cache: spin::Mutex<OccupancyCache>,
    packed_cubes_per_sm: u32,
    tiled_cubes_per_sm: u32,
    logger: PlannerLogLevel,
}

impl Default for LaunchPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchPlanner {
    /// Create a planner configured from the [global configuration](GlobalConfig).
    pub fn new() -> Self {
        Self::from_config(&GlobalConfig::get())
    }

    /// Create a planner with the given configuration.
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            cache: spin::Mutex::new(OccupancyCache::new(config.cache.capacity)),
            packed_cubes_per_sm: config.planner.packed_cubes_per_sm.max(1),
            tiled_cubes_per_sm: config.planner.tiled_cubes_per_sm.max(1),
            logger: config.planner.logger,
        }
    }

    /// Number of cached occupancy queries.
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Cache hits and misses so far.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.lock().stats()
    }

    /// Select the launch configuration of `split` on `device` for elements of width `elem`.
    ///
    /// The returned configuration fits the shared memory, unit and grid limits of the device,
    /// and has at least one resident cube.
    pub fn plan_launch<D: ComputeDevice + ?Sized>(
        &self,
        device: &D,
        elem: ElemWidth,
        split: &TensorSplit,
    ) -> Result<LaunchPlan, LaunchPlanError> {
        let strategy = split.strategy;
        let result = match strategy {
            TransposeStrategy::Trivial => Ok((LaunchConfig::trivial(), 1)),
            TransposeStrategy::Tiled | TransposeStrategy::TiledCopy => {
                Ok(self.plan_tiled(device, elem, split))
            }
            TransposeStrategy::Packed | TransposeStrategy::PackedSplit => {
                self.plan_packed(device, elem, split)
            }
        };

        let result = result.and_then(|(config, active_cubes)| {
            let max = device.properties().max_cube_count;
            if !config.cube_count.fits(&max) {
                return Err(LaunchPlanError::CubeCount {
                    strategy,
                    requested: config.cube_count,
                    max,
                });
            }
            if active_cubes == 0 {
                return Err(LaunchPlanError::NoResidentCube { strategy });
            }

            Ok(LaunchPlan::new(config, active_cubes))
        });

        if self.logger != PlannerLogLevel::Disabled {
            match &result {
                Ok(plan) => log::debug!(
                    "Planned {strategy:?} ({elem:?}) on device {}: {:?}, {} resident cubes",
                    device.id(),
                    plan.config,
                    plan.active_cubes
                ),
                Err(err) => log::debug!("{strategy:?} ({elem:?}) is infeasible: {err}"),
            }
        }

        result
    }

    fn plan_tiled<D: ComputeDevice + ?Sized>(
        &self,
        device: &D,
        elem: ElemWidth,
        split: &TensorSplit,
    ) -> (LaunchConfig, u32) {
        let properties = device.properties();
        let tile = TILE_DIM as usize;

        let vol_y = match split.strategy {
            TransposeStrategy::Tiled => split.vol_mk,
            _ => split.vol_mk_bar,
        };
        let num_tiles = split.vol_mm.div_ceil(tile) * vol_y.div_ceil(tile);
        let num_tiles = to_u32(num_tiles);
        let sm_cubes = properties.num_streaming_multiprocessors * self.tiled_cubes_per_sm;
        let cubes_z = (sm_cubes / num_tiles).min(to_u32(split.vol_mbar)).max(1);

        let cube_dim = CubeDim::new_2d(TILE_DIM, TILE_ROWS);
        let config = LaunchConfig::new(cube_dim, CubeCount::new_3d(num_tiles, 1, cubes_z), 0, 0);

        let static_shared = match split.strategy {
            TransposeStrategy::Tiled => tile_shared_memory_size(elem),
            _ => 0,
        };
        let request = OccupancyRequest::new(
            split.strategy.kernel_name(),
            elem.size(),
            TILE_DIM / TILE_ROWS,
            cube_dim,
            static_shared,
        );

        (config, device.max_active_cubes(&request))
    }

    fn plan_packed<D: ComputeDevice + ?Sized>(
        &self,
        device: &D,
        elem: ElemWidth,
        split: &TensorSplit,
    ) -> Result<(LaunchConfig, u32), LaunchPlanError> {
        let properties = device.properties();
        let strategy = split.strategy;

        let shared_memory_size = split.shared_memory_size(elem);
        if shared_memory_size > properties.max_shared_memory_size {
            return Err(LaunchPlanError::SharedMemory {
                strategy,
                requested: shared_memory_size,
                max: properties.max_shared_memory_size,
            });
        }

        let plane = properties.plane_size as usize;
        let vol = split.vol_mmk_used();
        let threads_for = |num_reg_storage: usize| vol.div_ceil(plane * num_reg_storage) * plane;

        let max_units = properties.max_units_per_cube as usize;
        let min_threads = threads_for(MAX_REG_STORAGE as usize);
        if min_threads > max_units {
            return Err(LaunchPlanError::Units {
                strategy,
                requested: to_u32(min_threads),
                max: properties.max_units_per_cube,
            });
        }
        let max_threads = threads_for(1).min(max_units);

        let min_reg = (vol - 1) / max_threads + 1;
        let max_reg = (vol - 1) / min_threads + 1;

        let sm_cubes = properties.num_streaming_multiprocessors * self.packed_cubes_per_sm;
        let vol_mbar = to_u32(split.vol_mbar);
        let cube_count = match strategy {
            TransposeStrategy::PackedSplit => {
                let num_split = to_u32(split.num_split);
                CubeCount::new_2d(num_split, (sm_cubes / num_split).min(vol_mbar).max(1))
            }
            _ => CubeCount::new_1d(vol_mbar.max(1).min(sm_cubes)),
        };

        // (num_reg_storage, units, active cubes, score)
        let mut best = (0, 0, 0, 0);
        for num_reg_storage in min_reg..=max_reg {
            let units = to_u32(threads_for(num_reg_storage));
            if units > properties.max_units_per_cube {
                continue;
            }
            let num_reg_storage = num_reg_storage as u32;
            let request = OccupancyRequest::new(
                strategy.kernel_name(),
                elem.size(),
                num_reg_storage,
                CubeDim::new_1d(units),
                shared_memory_size,
            );

            let active_cubes = match strategy {
                TransposeStrategy::PackedSplit => {
                    let key = OccupancyKey::new(
                        shared_memory_size / elem.size(),
                        device.id(),
                        elem,
                        num_reg_storage,
                        units / properties.plane_size,
                    );
                    self.cache
                        .lock()
                        .get_or_compute(key, || device.max_active_cubes(&request))
                }
                _ => device.max_active_cubes(&request),
            };

            let score = vol * active_cubes as usize;
            if self.logger == PlannerLogLevel::Full {
                log::trace!(
                    "{strategy:?} candidate: {num_reg_storage} registers, {units} units, \
                     {active_cubes} resident cubes, score {score}"
                );
            }
            if score > best.3 {
                best = (num_reg_storage, units, active_cubes, score);
            }
        }

        let (num_reg_storage, units, active_cubes, _) = best;
        if num_reg_storage == 0 {
            return Err(LaunchPlanError::NoResidentCube { strategy });
        }

        let config = LaunchConfig::new(
            CubeDim::new_1d(units),
            cube_count,
            shared_memory_size,
            num_reg_storage,
        );

        Ok((config, active_cubes))
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
