use alloc::boxed::Box;
use core::marker::PhantomData;

use cubett_runtime::cube::{cubes, load, store, units, CubePos};
use cubett_runtime::handle::WORD_SIZE;
use cubett_runtime::{
    lock_pair, CubeCount, CubeDim, CubeTask, ExecutionQueue, Handle, LaunchDescriptor, ServerError,
};

use crate::{Element, TransposeError};

/// Units of a copy cube.
pub const COPY_CUBE_DIM: u32 = 64;
/// Elements staged by each unit of the register blocked copy.
pub const COPY_NUM_ELEM: usize = 4;

/// How a contiguous copy moves its elements. Every strategy gives the same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyStrategy {
    /// One element per unit and iteration.
    Scalar,
    /// 16 bytes words, with a scalar tail for the elements past the last whole word.
    Vectorized,
    /// Each unit stages a fixed number of elements in private storage before writing them back.
    RegisterBlocked,
}

/// What a contiguous copy submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopySummary {
    /// Cubes launched, zero when nothing was submitted.
    pub cubes: u32,
    /// Whole 16 bytes words copied.
    pub vector_groups: usize,
    /// Elements copied one at a time.
    pub tail_elements: usize,
}

/// Copy the first `count` elements of `input` into `output`.
///
/// Submission is asynchronous, like [execute](crate::execute). Nothing is submitted when
/// `count` is zero.
pub fn copy_contiguous<E: Element>(
    count: usize,
    input: &Handle,
    output: &Handle,
    queue: &ExecutionQueue,
    strategy: CopyStrategy,
) -> Result<CopySummary, TransposeError> {
    if input.same_buffer(output) {
        return Err(TransposeError::InPlace);
    }
    let required = count * core::mem::size_of::<E>();
    for handle in [input, output] {
        if handle.size() < required {
            return Err(TransposeError::BufferTooSmall {
                required,
                actual: handle.size(),
            });
        }
    }
    if count == 0 {
        return Ok(CopySummary::default());
    }

    let vector_len = WORD_SIZE / core::mem::size_of::<E>();
    let (work_items, vector_groups, tail_elements) = match strategy {
        CopyStrategy::Scalar => (count, 0, count),
        CopyStrategy::Vectorized => {
            let vectors = count / vector_len;
            let tail = count - vectors * vector_len;
            (vectors.max(tail), vectors, tail)
        }
        CopyStrategy::RegisterBlocked => (count.div_ceil(COPY_NUM_ELEM), 0, count),
    };

    let max_cubes = queue.properties().max_cube_count.x as usize;
    let num_cubes = work_items.div_ceil(COPY_CUBE_DIM as usize).clamp(1, max_cubes) as u32;
    let launch = LaunchDescriptor::new(
        CubeDim::new_1d(COPY_CUBE_DIM),
        CubeCount::new_1d(num_cubes),
        0,
    );

    queue.submit(Box::new(CopyKernel::<E> {
        strategy,
        count,
        launch,
        input: input.clone(),
        output: output.clone(),
        _elem: PhantomData,
    }))?;

    if let Some(err) = queue.take_error() {
        return Err(TransposeError::Execution(err));
    }

    Ok(CopySummary {
        cubes: num_cubes,
        vector_groups,
        tail_elements,
    })
}

#[derive(Debug)]
struct CopyKernel<E: Element> {
    strategy: CopyStrategy,
    count: usize,
    launch: LaunchDescriptor,
    input: Handle,
    output: Handle,
    _elem: PhantomData<E>,
}

impl<E: Element> CopyKernel<E> {
    fn total_units(&self) -> usize {
        self.launch.cube_count.num_cubes() as usize * self.launch.cube_dim.num_elems() as usize
    }

    fn unit_ids(&self, cube: CubePos) -> impl Iterator<Item = usize> {
        let cube_dim = self.launch.cube_dim;
        let first = cube.x as usize * cube_dim.num_elems() as usize;
        units(cube_dim).map(move |unit| first + unit.index as usize)
    }

    fn scalar(&self, input: &[E], output: &mut [E], first: usize) -> Result<(), ServerError> {
        let name = self.name();
        let stride = self.total_units();

        for cube in cubes(self.launch.cube_count) {
            for id in self.unit_ids(cube) {
                let mut i = first + id;
                while i < self.count {
                    store(name, output, i, load(name, input, i)?)?;
                    i += stride;
                }
            }
        }

        Ok(())
    }

    fn vectorized(
        &self,
        input: &[u128],
        output: &mut [u128],
        vectors: usize,
    ) -> Result<(), ServerError> {
        let name = self.name();
        let stride = self.total_units();

        for cube in cubes(self.launch.cube_count) {
            for id in self.unit_ids(cube) {
                let mut i = id;
                while i < vectors {
                    store(name, output, i, load(name, input, i)?)?;
                    i += stride;
                }
            }
        }

        Ok(())
    }

    fn register_blocked(&self, input: &[E], output: &mut [E]) -> Result<(), ServerError> {
        let name = self.name();
        let cube_units = self.launch.cube_dim.num_elems() as usize;
        let stride = self.total_units() * COPY_NUM_ELEM;

        for cube in cubes(self.launch.cube_count) {
            for unit in units(self.launch.cube_dim) {
                let first = cube.x as usize * cube_units * COPY_NUM_ELEM;
                let mut index = first + unit.index as usize;
                let mut values = [E::zeroed(); COPY_NUM_ELEM];

                while index < self.count {
                    for (i, value) in values.iter_mut().enumerate() {
                        let pos = index + i * cube_units;
                        if pos < self.count {
                            *value = load(name, input, pos)?;
                        }
                    }
                    for (i, value) in values.iter().enumerate() {
                        let pos = index + i * cube_units;
                        if pos < self.count {
                            store(name, output, pos, *value)?;
                        }
                    }
                    index += stride;
                }
            }
        }

        Ok(())
    }
}

impl<E: Element> CubeTask for CopyKernel<E> {
    fn name(&self) -> &'static str {
        match self.strategy {
            CopyStrategy::Scalar => "copy_scalar",
            CopyStrategy::Vectorized => "copy_vectorized",
            CopyStrategy::RegisterBlocked => "copy_register_blocked",
        }
    }

    fn launch(&self) -> LaunchDescriptor {
        self.launch
    }

    fn execute(self: Box<Self>) -> Result<(), ServerError> {
        let (input, mut output) = lock_pair(self.name(), &self.input, &self.output)?;

        match self.strategy {
            CopyStrategy::Scalar => {
                self.scalar(input.as_slice::<E>(), output.as_slice_mut::<E>(), 0)
            }
            CopyStrategy::Vectorized => {
                let vector_len = WORD_SIZE / core::mem::size_of::<E>();
                let vectors = self.count / vector_len;

                self.vectorized(
                    input.as_slice::<u128>(),
                    output.as_slice_mut::<u128>(),
                    vectors,
                )?;
                self.scalar(
                    input.as_slice::<E>(),
                    output.as_slice_mut::<E>(),
                    vectors * vector_len,
                )
            }
            CopyStrategy::RegisterBlocked => {
                self.register_blocked(input.as_slice::<E>(), output.as_slice_mut::<E>())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubett_runtime::HardwareProperties;
    use pretty_assertions::assert_eq;

    const STRATEGIES: [CopyStrategy; 3] = [
        CopyStrategy::Scalar,
        CopyStrategy::Vectorized,
        CopyStrategy::RegisterBlocked,
    ];

    #[test_log::test]
    fn every_strategy_copies_the_buffer() {
        let queue = ExecutionQueue::new(HardwareProperties::default());
        let data = (0..1024u32).collect::<Vec<_>>();

        for strategy in STRATEGIES {
            let input = Handle::from_slice(&data);
            let output = Handle::empty(data.len() * 4);

            copy_contiguous::<u32>(1024, &input, &output, &queue, strategy).unwrap();
            queue.sync().unwrap();

            assert_eq!(output.to_vec::<u32>(), data, "{strategy:?}");
        }
    }

    #[test_log::test]
    fn vectorized_copy_has_a_scalar_tail() {
        let queue = ExecutionQueue::new(HardwareProperties::default());
        let data = (0..17i32).collect::<Vec<_>>();
        let input = Handle::from_slice(&data);
        let output = Handle::empty(data.len() * 4);

        let summary =
            copy_contiguous::<i32>(17, &input, &output, &queue, CopyStrategy::Vectorized).unwrap();
        queue.sync().unwrap();

        assert_eq!(summary.vector_groups, 4);
        assert_eq!(summary.tail_elements, 1);
        assert_eq!(output.to_vec::<i32>(), data);
    }

    #[test_log::test]
    fn copy_of_nothing_submits_nothing() {
        let queue = ExecutionQueue::new(HardwareProperties::default());
        let input = Handle::from_slice(&[1u16, 2, 3]);
        let output = Handle::empty(6);

        for strategy in STRATEGIES {
            let summary = copy_contiguous::<u16>(0, &input, &output, &queue, strategy).unwrap();
            assert_eq!(summary, CopySummary::default());
        }
        queue.sync().unwrap();

        assert_eq!(output.to_vec::<u16>(), vec![0, 0, 0]);
    }

    #[test_log::test]
    fn partial_copy_leaves_the_rest_untouched() {
        let queue = ExecutionQueue::new(HardwareProperties::default());
        let input = Handle::from_slice(&(1..=300u64).collect::<Vec<_>>());

        for strategy in STRATEGIES {
            let output = Handle::empty(300 * 8);
            copy_contiguous::<u64>(299, &input, &output, &queue, strategy).unwrap();
            queue.sync().unwrap();

            let copied = output.to_vec::<u64>();
            assert_eq!(copied[..299], (1..300u64).collect::<Vec<_>>()[..], "{strategy:?}");
            assert_eq!(copied[299], 0, "{strategy:?}");
        }
    }

    #[test]
    fn copy_into_itself_is_rejected() {
        let queue = ExecutionQueue::new(HardwareProperties::default());
        let buffer = Handle::empty(64);

        let err = copy_contiguous::<f32>(16, &buffer, &buffer, &queue, CopyStrategy::Scalar);

        assert_eq!(err, Err(TransposeError::InPlace));
    }
}
