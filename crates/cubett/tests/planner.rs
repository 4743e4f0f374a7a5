mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use common::{planner, sequence};
use cubett::config::{GlobalConfig, PlannerLogLevel};
use cubett::{
    execute, ElemWidth, LaunchPlanError, LaunchPlanner, PlanBuilder, TransposeError,
    TransposeStrategy, MAX_REG_STORAGE,
};
use cubett_runtime::{
    ComputeDevice, ExecutionQueue, Handle, HardwareProperties, HostDevice, OccupancyRequest,
    ServerError,
};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};

/// Host device counting its occupancy queries.
#[derive(Debug, Default)]
struct CountingDevice {
    inner: HostDevice,
    queries: AtomicU32,
}

impl CountingDevice {
    fn on(inner: HostDevice) -> Self {
        Self {
            inner,
            queries: AtomicU32::new(0),
        }
    }

    fn queries(&self) -> u32 {
        self.queries.load(Ordering::Relaxed)
    }
}

impl ComputeDevice for CountingDevice {
    fn id(&self) -> u32 {
        self.inner.id()
    }

    fn device_count(&self) -> u32 {
        self.inner.device_count()
    }

    fn properties(&self) -> &HardwareProperties {
        self.inner.properties()
    }

    fn max_active_cubes(&self, request: &OccupancyRequest) -> u32 {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.max_active_cubes(request)
    }

    fn queue(&self) -> &ExecutionQueue {
        self.inner.queue()
    }
}

#[test_log::test]
fn split_occupancy_is_queried_once() {
    let device = CountingDevice::default();
    let planner = planner();
    let builder = || {
        PlanBuilder::new(&[16, 3000, 2], &[1, 2, 0])
            .strategy(TransposeStrategy::PackedSplit)
            .num_split(20)
    };

    let first = builder().build(&device, &planner).unwrap();
    let queries = device.queries();
    let entries = planner.cached_entries();
    assert!(queries > 0);
    assert_eq!(entries, queries as usize);

    let second = builder().build(&device, &planner).unwrap();

    assert_eq!(second.launch, first.launch);
    assert_eq!(second.active_cubes, first.active_cubes);
    assert_eq!(device.queries(), queries);
    assert_eq!(planner.cached_entries(), entries);
    assert_eq!(planner.cache_stats(), (queries as u64, queries as u64));
}

#[test_log::test]
fn devices_sharing_a_planner_have_their_own_entries() {
    let first = CountingDevice::default();
    let second = CountingDevice::on(HostDevice::with_ordinal(
        1,
        2,
        HardwareProperties::default(),
    ));
    let planner = planner();
    let builder = || {
        PlanBuilder::new(&[16, 3000, 2], &[1, 2, 0])
            .strategy(TransposeStrategy::PackedSplit)
            .num_split(20)
    };

    builder().build(&first, &planner).unwrap();
    let entries = planner.cached_entries();
    builder().build(&second, &planner).unwrap();

    assert_eq!(second.queries(), first.queries());
    assert_eq!(planner.cached_entries(), 2 * entries);
}

#[test_log::test]
fn packed_occupancy_is_not_cached() {
    let device = CountingDevice::default();
    let planner = planner();
    let builder = || PlanBuilder::new(&[4, 6, 8], &[2, 0, 1]).strategy(TransposeStrategy::Packed);

    builder().build(&device, &planner).unwrap();
    let queries = device.queries();
    builder().build(&device, &planner).unwrap();

    assert_eq!(device.queries(), 2 * queries);
    assert_eq!(planner.cached_entries(), 0);
}

#[test_log::test]
fn cache_capacity_bounds_the_entries() {
    let device = CountingDevice::default();
    let mut config = GlobalConfig::default();
    config.cache.capacity = 2;
    config.planner.logger = PlannerLogLevel::Full;
    let planner = LaunchPlanner::from_config(&config);

    for num_split in [12, 16, 20, 24] {
        PlanBuilder::new(&[16, 3000, 2], &[1, 2, 0])
            .strategy(TransposeStrategy::PackedSplit)
            .num_split(num_split)
            .build(&device, &planner)
            .unwrap();
    }

    assert!(planner.cached_entries() <= 2);
}

#[test_log::test]
fn plans_respect_the_device_limits() {
    let device = HostDevice::default();
    let properties = device.properties().clone();
    let planner = planner();
    let mut rng = StdRng::seed_from_u64(42);

    let mut feasible = 0;

    for _ in 0..200 {
        let rank = rng.random_range(2..=5);
        let shape = (0..rank)
            .map(|_| rng.random_range(1..=24))
            .collect::<Vec<usize>>();
        let mut permutation = (0..rank).collect::<Vec<usize>>();
        permutation.shuffle(&mut rng);
        let elem = *ElemWidth::ALL.choose(&mut rng).unwrap();

        let plan = match PlanBuilder::new(&shape, &permutation)
            .elem(elem)
            .build(&device, &planner)
        {
            Ok(plan) => plan,
            Err(TransposeError::Infeasible(_)) => continue,
            Err(err) => panic!("{shape:?} by {permutation:?}: {err}"),
        };
        feasible += 1;
        let launch = &plan.launch;
        let context = format!("{:?} plan of {shape:?} by {permutation:?}", plan.strategy());

        assert!(plan.active_cubes > 0, "{context}");
        assert!(launch.shared_memory_size <= properties.max_shared_memory_size, "{context}");
        assert!(launch.cube_dim.num_elems() <= properties.max_units_per_cube, "{context}");
        assert!(launch.cube_count.fits(&properties.max_cube_count), "{context}");
        assert_eq!(plan.volume(), shape.iter().product::<usize>(), "{context}");

        if let TransposeStrategy::Packed | TransposeStrategy::PackedSplit = plan.strategy() {
            let capacity = launch.cube_dim.num_elems() as usize * launch.num_reg_storage as usize;
            assert!(launch.num_reg_storage <= MAX_REG_STORAGE, "{context}");
            assert!(plan.split.vol_mmk_used() <= capacity, "{context}");
            assert_eq!(launch.cube_dim.num_elems() % properties.plane_size, 0, "{context}");
        }
    }

    assert!(feasible > 50, "Only {feasible} feasible plans");
}

/// Host device with a cube size limit that isn't a multiple of the plane size, reporting the
/// same occupancy for every configuration.
#[derive(Debug)]
struct UnevenLimitDevice {
    inner: HostDevice,
}

impl UnevenLimitDevice {
    fn new() -> Self {
        let properties = HardwareProperties {
            max_units_per_cube: 1000,
            ..Default::default()
        };

        Self {
            inner: HostDevice::new(properties),
        }
    }
}

impl ComputeDevice for UnevenLimitDevice {
    fn id(&self) -> u32 {
        self.inner.id()
    }

    fn device_count(&self) -> u32 {
        self.inner.device_count()
    }

    fn properties(&self) -> &HardwareProperties {
        self.inner.properties()
    }

    fn max_active_cubes(&self, _request: &OccupancyRequest) -> u32 {
        4
    }

    fn queue(&self) -> &ExecutionQueue {
        self.inner.queue()
    }
}

#[test_log::test]
fn candidates_above_the_cube_size_limit_are_skipped() {
    let device = UnevenLimitDevice::new();
    let shape = [40, 50];
    let permutation = [1, 0];
    let plan = PlanBuilder::new(&shape, &permutation)
        .strategy(TransposeStrategy::Packed)
        .build(&device, &planner())
        .unwrap();

    assert!(plan.launch.cube_dim.num_elems() <= 1000);
    assert_eq!(plan.launch.cube_dim.num_elems(), 672);
    assert_eq!(plan.launch.num_reg_storage, 3);

    let data = sequence::<u32>(2000);
    let input = Handle::from_slice(&data);
    let output = Handle::empty(2000 * 4);
    execute(&plan, &input, &output).unwrap();
    device.queue().sync().unwrap();

    assert_eq!(
        output.to_vec::<u32>(),
        cubett::reference::permute(&data, &shape, &permutation)
    );
}

#[test_log::test]
fn cubes_per_multiprocessor_is_configurable() {
    let device = HostDevice::default();
    let mut config = GlobalConfig::default();
    config.planner.packed_cubes_per_sm = 1;
    let builder = || PlanBuilder::new(&[4, 6, 8, 100], &[2, 0, 1, 3]);

    let default = builder().build(&device, &planner()).unwrap();
    let narrow = builder()
        .build(&device, &LaunchPlanner::from_config(&config))
        .unwrap();

    assert_eq!(default.strategy(), TransposeStrategy::Packed);
    assert_eq!(default.launch.cube_count.x, 100);
    assert_eq!(narrow.launch.cube_count.x, 16);
}

#[test_log::test]
fn minor_group_too_large_for_any_cube() {
    let device = HostDevice::default();

    let err = PlanBuilder::new(&[16, 3000, 2], &[1, 2, 0])
        .strategy(TransposeStrategy::Packed)
        .build(&device, &planner())
        .unwrap_err();

    assert!(matches!(
        err,
        TransposeError::Infeasible(LaunchPlanError::SharedMemory { .. })
    ));
}

fn faulty_plan(device: &HostDevice) -> cubett::Plan {
    let mut plan = PlanBuilder::new(&[4, 6, 8, 3], &[2, 0, 1, 3])
        .strategy(TransposeStrategy::Packed)
        .build(device, &planner())
        .unwrap();
    plan.mbar[0].ct_out = 1 << 20;
    plan
}

#[test_log::test]
fn execution_fault_is_reported_on_sync() {
    let device = HostDevice::default();
    let plan = faulty_plan(&device);
    let input = Handle::from_slice(&sequence::<u32>(576));
    let output = Handle::empty(576 * 4);

    let err = match execute(&plan, &input, &output) {
        Ok(()) => device.queue().sync().unwrap_err(),
        Err(TransposeError::Execution(err)) => err,
        Err(err) => panic!("Unexpected error {err}"),
    };

    assert!(matches!(
        err,
        ServerError::OutOfBounds {
            kernel: "transpose_packed",
            ..
        }
    ));
    assert_eq!(device.queue().sync(), Ok(()));
}

#[test_log::test]
fn execution_fault_is_reported_by_a_later_submission() {
    let device = HostDevice::default();
    let faulty = faulty_plan(&device);
    let healthy = PlanBuilder::new(&[4, 6, 8, 3], &[2, 0, 1, 3])
        .build(&device, &planner())
        .unwrap();
    let input = Handle::from_slice(&sequence::<u32>(576));
    let output = Handle::empty(576 * 4);

    let mut reported = execute(&faulty, &input, &output).err();
    for _ in 0..200 {
        if reported.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
        reported = execute(&healthy, &input, &output).err();
    }

    assert!(matches!(
        reported,
        Some(TransposeError::Execution(ServerError::OutOfBounds { .. }))
    ));
    assert_eq!(device.queue().sync(), Ok(()));
}

#[test_log::test]
fn work_on_distinct_queues_is_independent() {
    let device = HostDevice::default();
    let queue = device.create_queue();
    let faulty = faulty_plan(&device);
    let healthy = PlanBuilder::new(&[4, 6, 8, 3], &[2, 0, 1, 3])
        .queue(queue.clone())
        .build(&device, &planner())
        .unwrap();
    let data = sequence::<u32>(576);
    let input = Handle::from_slice(&data);

    let faulty_result = execute(&faulty, &input, &Handle::empty(576 * 4));
    let output = Handle::empty(576 * 4);
    execute(&healthy, &input, &output).unwrap();

    assert_eq!(queue.sync(), Ok(()));
    assert!(faulty_result.is_err() || device.queue().sync().is_err());
    assert_eq!(
        output.to_vec::<u32>(),
        cubett::reference::permute(&data, &[4, 6, 8, 3], &[2, 0, 1, 3])
    );
}

#[test_log::test]
fn opposite_transpositions_on_two_queues_complete() {
    let device = HostDevice::default();
    let queue = device.create_queue();
    let forward = PlanBuilder::new(&[64, 48], &[1, 0])
        .build(&device, &planner())
        .unwrap();
    let backward = PlanBuilder::new(&[48, 64], &[1, 0])
        .queue(queue.clone())
        .build(&device, &planner())
        .unwrap();
    let x = Handle::from_slice(&sequence::<u32>(3072));
    let y = Handle::empty(3072 * 4);

    for _ in 0..300 {
        execute(&forward, &x, &y).unwrap();
        execute(&backward, &y, &x).unwrap();
    }

    assert_eq!(device.queue().sync(), Ok(()));
    assert_eq!(queue.sync(), Ok(()));
}
