//! Append-only uniform buffer arena.
//!
//! One GPU buffer backs every per-frame uniform block (camera, lights,
//! entities, materials, pass parameters). Blocks are bump-allocated into a
//! CPU staging region with std140-compatible alignment, uploaded once per
//! frame, and bound with dynamic offsets.

use bytemuck::Pod;
use glam::{Mat4, Vec3, Vec4};

use crate::error::{EngineError, EngineResult};

/// Minimum alignment for vector/matrix pushes, inherited from the std140
/// uniform block ABI. Scalars may pack tighter.
pub const VEC4_ALIGNMENT: u32 = 16;

/// A sub-range of the arena holding one uniform block.
///
/// Ranges are only valid for the frame they were pushed in; `begin_frame`
/// invalidates every previously returned range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRange {
    pub offset: u32,
    pub size: u32,
}

/// CPU side of the arena: staging storage, write cursor and alignment rules.
///
/// Split out from [`UniformArena`] so the allocation logic is usable (and
/// testable) without a GPU device.
#[derive(Debug)]
pub struct ArenaWriter {
    staging: Vec<u8>,
    capacity: u32,
    /// Driver-required alignment for uniform buffer offsets.
    block_alignment: u32,
    cursor: u32,
    mapped: bool,
}

impl ArenaWriter {
    pub fn new(capacity: u32, block_alignment: u32) -> Self {
        debug_assert!(
            block_alignment.is_power_of_two(),
            "uniform offset alignment must be a power of two"
        );
        Self {
            staging: vec![0; capacity as usize],
            capacity,
            block_alignment,
            cursor: 0,
            mapped: false,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn block_alignment(&self) -> u32 {
        self.block_alignment
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Restart the arena for a new frame. Resets the cursor to zero and
    /// opens the staging region for writes.
    ///
    /// Every [`BlockRange`] returned before this call becomes invalid: the
    /// bytes it referred to will be overwritten by this frame's pushes.
    pub fn begin_frame(&mut self) {
        self.cursor = 0;
        self.mapped = true;
    }

    /// Close the staging region. Returns the written prefix for upload.
    pub fn end_frame(&mut self) -> &[u8] {
        self.mapped = false;
        &self.staging[..self.cursor as usize]
    }

    /// Advance the cursor to the next multiple of `alignment`.
    ///
    /// `alignment` must be a power of two; violating this is a programmer
    /// error and trips an assertion in debug builds.
    pub fn align_to(&mut self, alignment: u32) {
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment must be a power of two, got {alignment}"
        );
        self.cursor = align(self.cursor, alignment);
    }

    /// Align, copy `data` into the staging region and advance the cursor.
    ///
    /// Fails loudly with [`EngineError::ArenaOverflow`] when the write would
    /// exceed capacity; the staging region is left untouched in that case.
    pub fn push_bytes(&mut self, data: &[u8], alignment: u32) -> EngineResult<BlockRange> {
        debug_assert!(self.mapped, "the arena must be mapped first (begin_frame)");
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment must be a power of two, got {alignment}"
        );

        let offset = align(self.cursor, alignment);
        let size = data.len() as u32;
        let end = offset as u64 + size as u64;
        if end > self.capacity as u64 {
            return Err(EngineError::ArenaOverflow {
                needed: end,
                capacity: self.capacity as u64,
            });
        }

        self.staging[offset as usize..end as usize].copy_from_slice(data);
        self.cursor = end as u32;
        Ok(BlockRange { offset, size })
    }

    pub fn push_u32(&mut self, value: u32) -> EngineResult<BlockRange> {
        self.push_bytes(&value.to_le_bytes(), 4)
    }

    pub fn push_f32(&mut self, value: f32) -> EngineResult<BlockRange> {
        self.push_bytes(&value.to_le_bytes(), 4)
    }

    /// vec3 occupies 12 bytes but aligns to 16, matching std140.
    pub fn push_vec3(&mut self, value: Vec3) -> EngineResult<BlockRange> {
        self.push_pod(&value.to_array(), VEC4_ALIGNMENT)
    }

    pub fn push_vec4(&mut self, value: Vec4) -> EngineResult<BlockRange> {
        self.push_pod(&value.to_array(), VEC4_ALIGNMENT)
    }

    pub fn push_mat4(&mut self, value: Mat4) -> EngineResult<BlockRange> {
        self.push_pod(&value.to_cols_array(), VEC4_ALIGNMENT)
    }

    fn push_pod<T: Pod>(&mut self, value: &T, alignment: u32) -> EngineResult<BlockRange> {
        self.push_bytes(bytemuck::bytes_of(value), alignment)
    }

    /// Align to the driver's uniform offset alignment and remember the
    /// block start. Pair with [`ArenaWriter::finish_block`].
    pub fn begin_block(&mut self) -> u32 {
        self.align_to(self.block_alignment);
        self.cursor
    }

    /// Close a block opened with [`ArenaWriter::begin_block`], returning the
    /// `(offset, size)` pair render passes bind with a dynamic offset.
    pub fn finish_block(&self, start: u32) -> BlockRange {
        BlockRange {
            offset: start,
            size: self.cursor - start,
        }
    }
}

fn align(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// The GPU-backed arena: an [`ArenaWriter`] plus the uniform buffer it
/// uploads into at the end of every fill.
pub struct UniformArena {
    writer: ArenaWriter,
    buffer: wgpu::Buffer,
}

impl UniformArena {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let block_alignment = device.limits().min_uniform_buffer_offset_alignment;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform arena"),
            size: capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            writer: ArenaWriter::new(capacity, block_alignment),
            buffer,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn writer(&mut self) -> &mut ArenaWriter {
        &mut self.writer
    }

    pub fn block_alignment(&self) -> u32 {
        self.writer.block_alignment()
    }

    /// See [`ArenaWriter::begin_frame`]: all previously returned ranges are
    /// invalid from this point on.
    pub fn begin_frame(&mut self) {
        self.writer.begin_frame();
    }

    /// Upload the written prefix in a single `write_buffer` and unmap.
    pub fn end_frame(&mut self, queue: &wgpu::Queue) {
        let written = self.writer.end_frame();
        if !written.is_empty() {
            queue.write_buffer(&self.buffer, 0, written);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> ArenaWriter {
        let mut w = ArenaWriter::new(4096, 256);
        w.begin_frame();
        w
    }

    #[test]
    fn test_align_is_idempotent() {
        for alignment in [1u32, 2, 4, 8, 16, 32, 64, 128, 256] {
            let mut w = writer();
            w.push_bytes(&[0u8; 5], 1).unwrap();
            w.align_to(alignment);
            let once = w.cursor();
            w.align_to(alignment);
            assert_eq!(once, w.cursor(), "align_to({alignment}) moved twice");
        }
    }

    #[test]
    fn test_pushes_are_increasing_aligned_and_disjoint() {
        let mut w = writer();
        let pushes: &[(usize, u32)] = &[(4, 4), (12, 16), (3, 1), (64, 16), (16, 16), (1, 4)];

        let mut ranges = Vec::new();
        for &(size, alignment) in pushes {
            let data = vec![0xABu8; size];
            let range = w.push_bytes(&data, alignment).unwrap();
            assert_eq!(range.offset % alignment, 0);
            assert_eq!(range.size as usize, size);
            ranges.push(range);
        }

        for pair in ranges.windows(2) {
            assert!(
                pair[0].offset + pair[0].size <= pair[1].offset,
                "ranges overlap or regress: {pair:?}"
            );
        }
    }

    #[test]
    fn test_typed_pushes_use_vec4_alignment() {
        let mut w = writer();
        w.push_u32(7).unwrap();
        let v = w.push_vec3(Vec3::ONE).unwrap();
        assert_eq!(v.offset, 16);
        assert_eq!(v.size, 12);
        let m = w.push_mat4(Mat4::IDENTITY).unwrap();
        assert_eq!(m.offset % 16, 0);
        assert_eq!(m.size, 64);
    }

    #[test]
    fn test_overflow_is_reported_not_corrupted() {
        let mut w = ArenaWriter::new(32, 16);
        w.begin_frame();
        w.push_bytes(&[0u8; 30], 1).unwrap();
        let before = w.cursor();
        let err = w.push_bytes(&[0u8; 8], 1).unwrap_err();
        assert!(matches!(err, EngineError::ArenaOverflow { needed: 38, capacity: 32 }));
        assert_eq!(w.cursor(), before, "failed push must not advance the cursor");
    }

    #[test]
    fn test_begin_frame_restarts_from_zero() {
        let mut w = writer();
        w.push_mat4(Mat4::IDENTITY).unwrap();
        assert_ne!(w.cursor(), 0);
        w.begin_frame();
        assert_eq!(w.cursor(), 0);
        let range = w.push_u32(1).unwrap();
        assert_eq!(range.offset, 0);
    }

    #[test]
    fn test_block_bracketing_respects_driver_alignment() {
        let mut w = writer();
        w.push_u32(1).unwrap();
        let start = w.begin_block();
        assert_eq!(start % 256, 0);
        w.push_mat4(Mat4::IDENTITY).unwrap();
        w.push_vec4(Vec4::ONE).unwrap();
        let block = w.finish_block(start);
        assert_eq!(block.offset, 256);
        assert_eq!(block.size, 80);
    }
}
