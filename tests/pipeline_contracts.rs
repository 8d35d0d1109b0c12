//! Cross-module contracts of the render pipeline, checked without a GPU:
//! framebuffer completeness, bloom mip sizing, uniform arena packing and
//! the cubemap capture geometry.

use approx::assert_relative_eq;
use ember::arena::ArenaWriter;
use ember::environment::{capture_projection, capture_views};
use ember::framebuffer::{mip_extent, AttachmentDesc, Framebuffer};
use ember::passes::bloom::{bloom_level_extent, BLOOM_MIP_LEVELS};
use ember::scene::Entity;
use glam::{Mat4, Vec3, Vec4};

/// Four HDR color attachments plus depth at 800x600 validate as complete,
/// with the depth descriptor never occupying a color slot.
#[test]
fn test_gbuffer_framebuffer_is_complete() {
    let mut framebuffer = Framebuffer::new();
    for label in ["albedo", "normals", "world position"] {
        framebuffer.push_attachment(AttachmentDesc::color(
            label,
            800,
            600,
            wgpu::TextureFormat::Rgba16Float,
        ));
    }
    framebuffer.push_attachment(AttachmentDesc::color(
        "reflectivity",
        800,
        600,
        wgpu::TextureFormat::R16Float,
    ));
    framebuffer.push_attachment(AttachmentDesc::depth("depth", 800, 600));

    assert_eq!(framebuffer.check_status(), Ok(()));
    assert_eq!(framebuffer.color_count(), 4);
    assert!(framebuffer.has_depth());
    assert_eq!(framebuffer.size(), (800, 600));
}

/// The second blur level of a 1920x1080 frame runs at exactly a quarter of
/// the display, and every level matches the texture's declared mip size.
#[test]
fn test_bloom_chain_dimensions_at_full_hd() {
    let display = (1920, 1080);
    assert_eq!(bloom_level_extent(display, 1), (480, 270));

    let base = (display.0 / 2, display.1 / 2);
    for level in 0..BLOOM_MIP_LEVELS {
        let declared = (mip_extent(base.0, level), mip_extent(base.1, level));
        assert_eq!(bloom_level_extent(display, level), declared);
    }
}

/// World transform composition is a pure translation for identity rotation
/// and scale.
#[test]
fn test_world_transform_determinism() {
    let entity = Entity::new("probe", 0).at(Vec3::new(1.0, 2.0, 3.0));
    let expected = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(
        entity.world_transform().to_cols_array(),
        expected.to_cols_array()
    );
}

/// Each of the six capture views maps its nominal world axis in front of
/// the camera (negative Z in view space), in +X,-X,+Y,-Y,+Z,-Z face order.
#[test]
fn test_capture_views_cover_all_faces() {
    let directions = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    for (view, direction) in capture_views().iter().zip(directions) {
        let in_view = view.transform_point3(direction);
        assert!(in_view.z < 0.0, "{direction:?} not in front of its view");
        assert_relative_eq!(in_view.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(in_view.y, 0.0, epsilon = 1e-6);
    }

    // And the shared projection covers the full 90-degree frustum.
    let clip_edge = capture_projection().project_point3(Vec3::new(0.0, 1.0, -1.0));
    assert_relative_eq!(clip_edge.y, 1.0, epsilon = 1e-4);
}

/// A realistic frame fill: global block, a handful of entity and material
/// blocks. Offsets are strictly increasing, aligned and non-overlapping,
/// and restart from zero the next frame.
#[test]
fn test_frame_fill_produces_disjoint_aligned_blocks() {
    let mut writer = ArenaWriter::new(64 * 1024, 256);
    writer.begin_frame();

    let mut blocks = Vec::new();

    // Global: camera matrices, counts, 16 packed light slots.
    let start = writer.begin_block();
    writer.push_mat4(Mat4::IDENTITY).unwrap();
    writer.push_mat4(Mat4::IDENTITY).unwrap();
    writer.push_vec4(Vec4::ONE).unwrap();
    writer.push_vec4(Vec4::ZERO).unwrap();
    for _ in 0..16 {
        for _ in 0..3 {
            writer.push_vec4(Vec4::ZERO).unwrap();
        }
    }
    blocks.push(writer.finish_block(start));
    assert_eq!(blocks[0].size, 928);

    for _ in 0..8 {
        let start = writer.begin_block();
        writer.push_mat4(Mat4::IDENTITY).unwrap();
        writer.push_mat4(Mat4::IDENTITY).unwrap();
        blocks.push(writer.finish_block(start));
    }
    for _ in 0..4 {
        let start = writer.begin_block();
        writer.push_vec4(Vec4::ONE).unwrap();
        writer.push_vec4(Vec4::ZERO).unwrap();
        writer.push_vec4(Vec4::ZERO).unwrap();
        blocks.push(writer.finish_block(start));
    }

    for pair in blocks.windows(2) {
        assert!(pair[0].offset + pair[0].size <= pair[1].offset);
    }
    for block in &blocks {
        assert_eq!(block.offset % 256, 0, "block offset breaks the UBO alignment");
    }

    // Next frame invalidates everything and starts over at zero.
    writer.begin_frame();
    let start = writer.begin_block();
    writer.push_mat4(Mat4::IDENTITY).unwrap();
    assert_eq!(writer.finish_block(start).offset, 0);
}
