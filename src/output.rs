//! Extracted geometry shared with the host.
//!
//! One flat `f32` buffer holds every extracted channel; [`Region`]s locate
//! each channel inside it. The buffer only ever grows, so handing out
//! sub-slices to the solver never reallocates mid-extraction.

use crate::solver::ExtractRequest;

/// A contiguous run of floats inside the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Offset of the first float.
    pub offset: usize,
    /// Number of floats.
    pub len: usize,
}

impl Region {
    /// One past the last float.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// True if the two regions share at least one float.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Which channels are requested from the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtractionSet {
    /// Absolute vertex positions, 3 floats per vertex.
    pub position: bool,
    /// Vertex velocity, 3 floats per vertex.
    pub velocity: bool,
    /// Per-vertex error, 1 float per vertex.
    pub error: bool,
}

impl ExtractionSet {
    /// No channel.
    pub const NONE: Self = Self {
        position: false,
        velocity: false,
        error: false,
    };

    /// Every channel.
    pub const ALL: Self = Self {
        position: true,
        velocity: true,
        error: true,
    };

    /// True if at least one channel is requested.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.position || self.velocity || self.error
    }
}

/// Placement of every requested channel in the output buffer.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionLayout {
    pub positions: Option<Region>,
    pub velocity: Option<Region>,
    pub error: Option<Region>,
    /// Floats needed to hold every region.
    pub total: usize,
}

impl RegionLayout {
    /// Lays out the requested channels back to back, in the order
    /// position, velocity, error.
    #[must_use]
    pub fn compute(set: ExtractionSet, vertex_count: u32) -> Self {
        let vertices = vertex_count as usize;
        let mut cursor = 0;
        let mut place = |wanted: bool, len: usize| {
            wanted.then(|| {
                let region = Region { offset: cursor, len };
                cursor += len;
                region
            })
        };

        let positions = place(set.position, 3 * vertices);
        let velocity = place(set.velocity, 3 * vertices);
        let error = place(set.error, vertices);

        Self {
            positions,
            velocity,
            error,
            total: cursor,
        }
    }

    /// Iterates the placed regions in buffer order.
    pub fn regions(&self) -> impl Iterator<Item = Region> {
        [self.positions, self.velocity, self.error].into_iter().flatten()
    }

    /// True if no two regions overlap and all fit inside `total`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let regions: Vec<Region> = self.regions().collect();
        let fits = regions.iter().all(|r| r.end() <= self.total);
        let disjoint = regions
            .iter()
            .enumerate()
            .all(|(i, a)| regions[i + 1..].iter().all(|b| !a.overlaps(b)));
        fits && disjoint
    }
}

fn carve<'a>(rest: &mut &'a mut [f32], cursor: &mut usize, region: Option<Region>) -> Option<&'a mut [f32]> {
    let region = region?;
    let tail = std::mem::take(rest);
    let (_, tail) = tail.split_at_mut(region.offset - *cursor);
    let (head, tail) = tail.split_at_mut(region.len);
    *rest = tail;
    *cursor = region.end();
    Some(head)
}

/// The most recent extraction, reused across cooks.
#[derive(Debug, Clone, Default)]
pub struct OutputSnapshot {
    buffer: Vec<f32>,
    layout: RegionLayout,
    indices: Vec<u32>,
    vertex_count: u32,
    face_count: u32,
    output_number: u64,
    revision: u64,
    steps_since_last_output: u64,
    max_error: Option<f32>,
    max_velocity: Option<f32>,
    pub(crate) indices_generation: Option<u64>,
}

impl OutputSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The flat backing buffer. May be longer than the current layout needs.
    #[must_use]
    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    /// Current channel placement.
    #[must_use]
    pub const fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    /// Location of the positions inside [`buffer`](Self::buffer).
    #[must_use]
    pub const fn positions_region(&self) -> Option<Region> {
        self.layout.positions
    }

    /// Location of the velocities inside [`buffer`](Self::buffer).
    #[must_use]
    pub const fn velocity_region(&self) -> Option<Region> {
        self.layout.velocity
    }

    /// Location of the errors inside [`buffer`](Self::buffer).
    #[must_use]
    pub const fn error_region(&self) -> Option<Region> {
        self.layout.error
    }

    fn slice(&self, region: Option<Region>) -> Option<&[f32]> {
        region.map(|r| &self.buffer[r.offset..r.end()])
    }

    /// Absolute positions, `x y z` interleaved.
    #[must_use]
    pub fn positions(&self) -> Option<&[f32]> {
        self.slice(self.layout.positions)
    }

    /// Velocities, `x y z` interleaved.
    #[must_use]
    pub fn velocity(&self) -> Option<&[f32]> {
        self.slice(self.layout.velocity)
    }

    /// Per-vertex error.
    #[must_use]
    pub fn error(&self) -> Option<&[f32]> {
        self.slice(self.layout.error)
    }

    /// Triangle vertex indices, 3 per triangle.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Vertex count of the last extraction.
    #[must_use]
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Triangle count behind `indices`.
    #[must_use]
    pub const fn face_count(&self) -> u32 {
        self.face_count
    }

    /// Number of extractions written so far. Zero means no data yet.
    #[must_use]
    pub const fn output_number(&self) -> u64 {
        self.output_number
    }

    /// Input revision the geometry reflects.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Solver steps performed between the previous extraction and this one.
    #[must_use]
    pub const fn steps_since_last_output(&self) -> u64 {
        self.steps_since_last_output
    }

    /// Largest per-vertex error, when errors were extracted.
    #[must_use]
    pub const fn max_error(&self) -> Option<f32> {
        self.max_error
    }

    /// Largest velocity magnitude, when velocities were extracted.
    #[must_use]
    pub const fn max_velocity(&self) -> Option<f32> {
        self.max_velocity
    }

    /// True before the first extraction.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.output_number == 0
    }

    /// Recomputes the layout and grows the buffer to fit it.
    pub(crate) fn prepare(&mut self, set: ExtractionSet, vertex_count: u32) -> RegionLayout {
        let layout = RegionLayout::compute(set, vertex_count);
        if self.buffer.len() < layout.total {
            self.buffer.resize(layout.total, 0.0);
        }
        self.layout = layout;
        self.vertex_count = vertex_count;
        layout
    }

    /// Splits the buffer into one disjoint slice per requested channel.
    pub(crate) fn extract_request(&mut self) -> ExtractRequest<'_> {
        let mut rest: &mut [f32] = &mut self.buffer;
        let mut cursor = 0;
        let position = carve(&mut rest, &mut cursor, self.layout.positions);
        let velocity = carve(&mut rest, &mut cursor, self.layout.velocity);
        let error = carve(&mut rest, &mut cursor, self.layout.error);
        ExtractRequest {
            position,
            velocity,
            error,
        }
    }

    pub(crate) fn positions_mut(&mut self) -> Option<&mut [f32]> {
        let region = self.layout.positions?;
        Some(&mut self.buffer[region.offset..region.end()])
    }

    /// Resizes the index buffer for `face_count` triangles.
    pub(crate) fn indices_mut(&mut self, face_count: u32) -> &mut [u32] {
        let len = 3 * face_count as usize;
        if self.indices.len() != len {
            self.indices.resize(len, 0);
        }
        self.face_count = face_count;
        &mut self.indices
    }

    /// Stamps a completed extraction and refreshes the derived statistics.
    pub(crate) fn finish(&mut self, revision: u64, steps_since_last_output: u64) {
        self.output_number += 1;
        self.revision = revision;
        self.steps_since_last_output = steps_since_last_output;
        self.max_error = self
            .error()
            .map(|errors| errors.iter().copied().fold(0.0f32, f32::max));
        self.max_velocity = self.velocity().map(|velocity| {
            velocity
                .chunks_exact(3)
                .map(|v| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt())
                .fold(0.0f32, f32::max)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_sets() -> Vec<ExtractionSet> {
        let mut sets = Vec::new();
        for bits in 0u8..8 {
            sets.push(ExtractionSet {
                position: bits & 1 != 0,
                velocity: bits & 2 != 0,
                error: bits & 4 != 0,
            });
        }
        sets
    }

    #[test]
    fn regions_are_disjoint_and_in_bounds() {
        for set in all_sets() {
            for vertex_count in [0u32, 1, 1000] {
                let mut output = OutputSnapshot::new();
                let layout = output.prepare(set, vertex_count);
                assert!(layout.is_consistent(), "{set:?} / {vertex_count}");
                for region in layout.regions() {
                    assert!(region.end() <= output.buffer().len());
                }
                for region in [layout.positions, layout.velocity].into_iter().flatten() {
                    assert_eq!(region.len % 3, 0);
                }
            }
        }
    }

    #[test]
    fn layout_follows_fixed_channel_order() {
        let layout = RegionLayout::compute(ExtractionSet::ALL, 4);
        assert_eq!(layout.positions, Some(Region { offset: 0, len: 12 }));
        assert_eq!(layout.velocity, Some(Region { offset: 12, len: 12 }));
        assert_eq!(layout.error, Some(Region { offset: 24, len: 4 }));
        assert_eq!(layout.total, 28);
    }

    #[test]
    fn skipped_channels_leave_no_gap() {
        let layout = RegionLayout::compute(
            ExtractionSet {
                position: false,
                velocity: true,
                error: true,
            },
            2,
        );
        assert_eq!(layout.positions, None);
        assert_eq!(layout.velocity, Some(Region { offset: 0, len: 6 }));
        assert_eq!(layout.error, Some(Region { offset: 6, len: 2 }));
    }

    #[test]
    fn buffer_grows_but_never_shrinks() {
        let mut output = OutputSnapshot::new();
        output.prepare(ExtractionSet::ALL, 10);
        assert_eq!(output.buffer().len(), 70);
        output.prepare(ExtractionSet::ALL, 2);
        assert_eq!(output.buffer().len(), 70);
        assert_eq!(output.layout().total, 14);
        assert_eq!(output.positions().map(<[f32]>::len), Some(6));
    }

    #[test]
    fn extract_request_hands_out_region_sized_slices() {
        let mut output = OutputSnapshot::new();
        output.prepare(ExtractionSet::ALL, 3);
        let request = output.extract_request();
        assert_eq!(request.position.as_ref().map(|s| s.len()), Some(9));
        assert_eq!(request.velocity.as_ref().map(|s| s.len()), Some(9));
        assert_eq!(request.error.as_ref().map(|s| s.len()), Some(3));
    }

    #[test]
    fn extract_request_writes_land_in_their_regions() {
        let mut output = OutputSnapshot::new();
        output.prepare(
            ExtractionSet {
                position: false,
                velocity: true,
                error: true,
            },
            1,
        );
        {
            let request = output.extract_request();
            assert!(request.position.is_none());
            request.velocity.unwrap().copy_from_slice(&[3.0, 0.0, 4.0]);
            request.error.unwrap()[0] = 0.25;
        }
        output.finish(7, 42);
        assert_eq!(output.velocity(), Some(&[3.0, 0.0, 4.0][..]));
        assert_eq!(output.error(), Some(&[0.25][..]));
        assert_eq!(output.max_velocity(), Some(5.0));
        assert_eq!(output.max_error(), Some(0.25));
        assert_eq!(output.revision(), 7);
        assert_eq!(output.steps_since_last_output(), 42);
        assert_eq!(output.output_number(), 1);
    }

    #[test]
    fn zero_length_regions_do_not_overlap() {
        let a = Region { offset: 0, len: 0 };
        let b = Region { offset: 0, len: 3 };
        assert!(!a.overlaps(&b));
        assert!(b.overlaps(&Region { offset: 2, len: 1 }));
    }

    #[test]
    fn indices_resize_to_face_count() {
        let mut output = OutputSnapshot::new();
        assert_eq!(output.indices_mut(2).len(), 6);
        assert_eq!(output.face_count(), 2);
        assert_eq!(output.indices_mut(1).len(), 3);
    }
}
