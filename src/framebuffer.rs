//! Multi-target framebuffer abstraction.
//!
//! A [`Framebuffer`] owns an ordered list of attachment descriptors and the
//! GPU textures realized from them. Descriptor order determines the color
//! attachment index; the first depth-format descriptor binds to the depth
//! slot instead. Completeness is validated CPU-side and every distinct
//! incompleteness reason surfaces as its own [`FramebufferError`] variant.

use crate::error::FramebufferError;

/// Upper bound on simultaneous color attachments, matching wgpu's limit.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Size of one mip level, shared by attachment allocation and the bloom
/// blur viewports. The two must never disagree.
pub fn mip_extent(base: u32, level: u32) -> u32 {
    (base >> level).max(1)
}

/// Describes one attachment image: resolution, storage format, mip count.
#[derive(Debug, Clone)]
pub struct AttachmentDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub array_layers: u32,
}

impl AttachmentDesc {
    pub fn color(label: &'static str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            width,
            height,
            format,
            mip_level_count: 1,
            sample_count: 1,
            array_layers: 1,
        }
    }

    pub fn depth(label: &'static str, width: u32, height: u32) -> Self {
        Self::color(label, width, height, wgpu::TextureFormat::Depth24Plus)
    }

    pub fn with_mips(mut self, mip_level_count: u32) -> Self {
        self.mip_level_count = mip_level_count;
        self
    }

    pub fn is_depth(&self) -> bool {
        matches!(
            self.format,
            wgpu::TextureFormat::Depth16Unorm
                | wgpu::TextureFormat::Depth24Plus
                | wgpu::TextureFormat::Depth24PlusStencil8
                | wgpu::TextureFormat::Depth32Float
                | wgpu::TextureFormat::Depth32FloatStencil8
        )
    }
}

/// A realized attachment: its descriptor plus the backing texture and views.
pub struct Attachment {
    pub desc: AttachmentDesc,
    pub texture: wgpu::Texture,
    /// View over the whole mip chain, for sampling.
    pub view: wgpu::TextureView,
    /// One single-mip view per level, for rendering into a specific mip.
    pub mip_views: Vec<wgpu::TextureView>,
}

/// Multi-target framebuffer: attachment descriptors plus realized textures.
///
/// Lifecycle: `push_attachment`* -> `attach` -> render -> (`regenerate` on
/// resize, which swaps attachments atomically) -> drop.
#[derive(Default)]
pub struct Framebuffer {
    descs: Vec<AttachmentDesc>,
    attachments: Vec<Attachment>,
    /// Color slots written by draws. `None` means every color attachment.
    draw_buffers: Option<Vec<usize>>,
    read_buffer: Option<usize>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attachment descriptor. Order is meaningful: the n-th
    /// non-depth descriptor becomes color attachment n.
    pub fn push_attachment(&mut self, desc: AttachmentDesc) {
        self.descs.push(desc);
    }

    /// Restrict which color slots draws write to, like an explicit draw
    /// buffer list.
    pub fn set_draw_buffers(&mut self, slots: Vec<usize>) {
        self.draw_buffers = Some(slots);
    }

    pub fn set_read_buffer(&mut self, slot: usize) {
        self.read_buffer = Some(slot);
    }

    pub fn descriptors(&self) -> &[AttachmentDesc] {
        &self.descs
    }

    pub fn is_attached(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Indices into `descs` of the color attachments, in slot order.
    fn color_indices(&self) -> Vec<usize> {
        self.descs
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_depth())
            .map(|(i, _)| i)
            .collect()
    }

    fn depth_index(&self) -> Option<usize> {
        self.descs.iter().position(|d| d.is_depth())
    }

    pub fn color_count(&self) -> usize {
        self.descs.iter().filter(|d| !d.is_depth()).count()
    }

    pub fn has_depth(&self) -> bool {
        self.depth_index().is_some()
    }

    /// Validate completeness of the current descriptor list and draw/read
    /// buffer selection. Reports the first violated rule; never a generic
    /// failure.
    pub fn check_status(&self) -> Result<(), FramebufferError> {
        if self.descs.is_empty() {
            return Err(FramebufferError::MissingAttachment);
        }
        if self.descs.iter().any(|d| d.width == 0 || d.height == 0) {
            return Err(FramebufferError::Undefined);
        }

        let colors = self.color_indices();
        if colors.len() > MAX_COLOR_ATTACHMENTS {
            return Err(FramebufferError::Unsupported(
                "too many color attachments",
            ));
        }
        if self.descs.iter().filter(|d| d.is_depth()).count() > 1 {
            return Err(FramebufferError::Unsupported(
                "more than one depth attachment",
            ));
        }

        // All color attachments share one resolution.
        if let Some((&first, rest)) = colors.split_first() {
            let base = &self.descs[first];
            for &i in rest {
                let d = &self.descs[i];
                if d.width != base.width || d.height != base.height {
                    return Err(FramebufferError::IncompleteAttachment);
                }
            }
        }

        let sample_count = self.descs[0].sample_count;
        if self.descs.iter().any(|d| d.sample_count != sample_count) {
            return Err(FramebufferError::IncompleteMultisample);
        }

        let layered = self.descs[0].array_layers > 1;
        if self.descs.iter().any(|d| (d.array_layers > 1) != layered) {
            return Err(FramebufferError::IncompleteLayerTargets);
        }

        if let Some(slots) = &self.draw_buffers {
            for &slot in slots {
                if slot >= colors.len() {
                    return Err(FramebufferError::IncompleteDrawBuffer {
                        slot,
                        count: colors.len(),
                    });
                }
            }
        }
        if let Some(slot) = self.read_buffer {
            if slot >= colors.len() {
                return Err(FramebufferError::IncompleteReadBuffer {
                    slot,
                    count: colors.len(),
                });
            }
        }

        Ok(())
    }

    /// Realize every descriptor into a texture and swap the attachment set.
    ///
    /// New attachments are fully created before the old set is dropped, so a
    /// failed validation leaves the previous attachments intact.
    pub fn attach(&mut self, device: &wgpu::Device) -> Result<(), FramebufferError> {
        self.check_status()?;

        let fresh: Vec<Attachment> = self.descs.iter().map(|d| realize(device, d)).collect();
        self.attachments = fresh;
        Ok(())
    }

    /// Resize path: every descriptor keeps its format, mip count and order
    /// but takes the new base resolution, then the attachment set is
    /// recreated.
    pub fn regenerate(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> Result<(), FramebufferError> {
        for desc in &mut self.descs {
            desc.width = width;
            desc.height = height;
        }
        self.attach(device)
    }

    /// The attachment bound to color slot `slot`.
    pub fn color_attachment(&self, slot: usize) -> Option<&Attachment> {
        let idx = *self.color_indices().get(slot)?;
        self.attachments.get(idx)
    }

    pub fn color_view(&self, slot: usize) -> Option<&wgpu::TextureView> {
        self.color_attachment(slot).map(|a| &a.view)
    }

    /// Single-mip render view of color slot `slot`.
    pub fn color_mip_view(&self, slot: usize, level: u32) -> Option<&wgpu::TextureView> {
        self.color_attachment(slot)?.mip_views.get(level as usize)
    }

    pub fn depth_attachment(&self) -> Option<&Attachment> {
        let idx = self.depth_index()?;
        self.attachments.get(idx)
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth_attachment().map(|a| &a.view)
    }

    /// Resolution shared by the color attachments.
    pub fn size(&self) -> (u32, u32) {
        self.color_indices()
            .first()
            .map(|&i| (self.descs[i].width, self.descs[i].height))
            .or_else(|| self.descs.first().map(|d| (d.width, d.height)))
            .unwrap_or((0, 0))
    }
}

fn realize(device: &wgpu::Device, desc: &AttachmentDesc) -> Attachment {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(desc.label),
        size: wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: desc.array_layers,
        },
        mip_level_count: desc.mip_level_count,
        sample_count: desc.sample_count,
        dimension: wgpu::TextureDimension::D2,
        format: desc.format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let mip_views = (0..desc.mip_level_count)
        .map(|level| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(desc.label),
                base_mip_level: level,
                mip_level_count: Some(1),
                ..Default::default()
            })
        })
        .collect();

    Attachment {
        desc: desc.clone(),
        texture,
        view,
        mip_views,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    fn gbuffer_layout(width: u32, height: u32) -> Framebuffer {
        let mut fb = Framebuffer::new();
        fb.push_attachment(AttachmentDesc::color("albedo", width, height, TextureFormat::Rgba16Float));
        fb.push_attachment(AttachmentDesc::color("normals", width, height, TextureFormat::Rgba16Float));
        fb.push_attachment(AttachmentDesc::color("world position", width, height, TextureFormat::Rgba16Float));
        fb.push_attachment(AttachmentDesc::color("reflectivity", width, height, TextureFormat::R16Float));
        fb.push_attachment(AttachmentDesc::depth("depth", width, height));
        fb
    }

    #[test]
    fn test_gbuffer_layout_is_complete() {
        let fb = gbuffer_layout(800, 600);
        assert_eq!(fb.check_status(), Ok(()));
        assert_eq!(fb.color_count(), 4);
        assert!(fb.has_depth());
    }

    #[test]
    fn test_empty_framebuffer_is_missing_attachment() {
        let fb = Framebuffer::new();
        assert_eq!(fb.check_status(), Err(FramebufferError::MissingAttachment));
    }

    #[test]
    fn test_zero_sized_attachment_is_undefined() {
        let mut fb = Framebuffer::new();
        fb.push_attachment(AttachmentDesc::color("albedo", 0, 600, TextureFormat::Rgba16Float));
        assert_eq!(fb.check_status(), Err(FramebufferError::Undefined));
    }

    #[test]
    fn test_mismatched_color_resolutions_are_incomplete() {
        let mut fb = Framebuffer::new();
        fb.push_attachment(AttachmentDesc::color("a", 800, 600, TextureFormat::Rgba16Float));
        fb.push_attachment(AttachmentDesc::color("b", 400, 300, TextureFormat::Rgba16Float));
        assert_eq!(
            fb.check_status(),
            Err(FramebufferError::IncompleteAttachment)
        );
    }

    #[test]
    fn test_draw_buffer_out_of_range() {
        let mut fb = gbuffer_layout(800, 600);
        fb.set_draw_buffers(vec![0, 4]);
        assert_eq!(
            fb.check_status(),
            Err(FramebufferError::IncompleteDrawBuffer { slot: 4, count: 4 })
        );
    }

    #[test]
    fn test_read_buffer_out_of_range() {
        let mut fb = gbuffer_layout(800, 600);
        fb.set_read_buffer(7);
        assert_eq!(
            fb.check_status(),
            Err(FramebufferError::IncompleteReadBuffer { slot: 7, count: 4 })
        );
    }

    #[test]
    fn test_two_depth_attachments_are_unsupported() {
        let mut fb = gbuffer_layout(800, 600);
        fb.push_attachment(AttachmentDesc::depth("second depth", 800, 600));
        assert!(matches!(
            fb.check_status(),
            Err(FramebufferError::Unsupported(_))
        ));
    }

    #[test]
    fn test_mixed_sample_counts_are_incomplete_multisample() {
        let mut fb = gbuffer_layout(800, 600);
        let mut msaa = AttachmentDesc::color("msaa", 800, 600, TextureFormat::Rgba16Float);
        msaa.sample_count = 4;
        fb.push_attachment(msaa);
        assert_eq!(
            fb.check_status(),
            Err(FramebufferError::IncompleteMultisample)
        );
    }

    #[test]
    fn test_mixed_layering_is_incomplete_layer_targets() {
        let mut fb = gbuffer_layout(800, 600);
        let mut layered = AttachmentDesc::color("cube", 800, 600, TextureFormat::Rgba16Float);
        layered.array_layers = 6;
        fb.push_attachment(layered);
        assert_eq!(
            fb.check_status(),
            Err(FramebufferError::IncompleteLayerTargets)
        );
    }

    #[test]
    fn test_regenerate_preserves_count_and_order() {
        // Resize only touches resolutions; formats, mip counts and the
        // depth-slot assignment stay fixed. Validated here on the
        // descriptor list, which is what `attach` realizes.
        let mut fb = gbuffer_layout(800, 600);
        let before: Vec<_> = fb
            .descriptors()
            .iter()
            .map(|d| (d.label, d.format, d.is_depth()))
            .collect();

        for desc in &mut fb.descs {
            desc.width = 1920;
            desc.height = 1080;
        }

        let after: Vec<_> = fb
            .descriptors()
            .iter()
            .map(|d| (d.label, d.format, d.is_depth()))
            .collect();
        assert_eq!(before, after);
        assert_eq!(fb.check_status(), Ok(()));
        assert_eq!(fb.size(), (1920, 1080));
        // Depth never occupies a color slot.
        assert_eq!(fb.color_count(), 4);
        assert!(fb.has_depth());
    }

    #[test]
    fn test_mip_extent_halves_down_to_one() {
        assert_eq!(mip_extent(1920, 0), 1920);
        assert_eq!(mip_extent(1920, 1), 960);
        assert_eq!(mip_extent(1920, 5), 60);
        assert_eq!(mip_extent(4, 5), 1);
    }
}
