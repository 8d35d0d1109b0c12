//! Texture loading and GPU texture types.

use std::path::Path;

use image::GenericImageView;

use crate::error::{EngineError, EngineResult};

/// CPU-side image data, ready for upload.
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load an LDR texture from file, converted to RGBA8.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|source| EngineError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
            name,
        })
    }

    /// Load a Radiance HDR equirectangular image as RGBA16F texel data.
    ///
    /// A missing or corrupt file degrades to a 1x1 black texture with an
    /// error log; downstream sampling is wrong but never fatal.
    pub fn hdr_or_black<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match image::open(path) {
            Ok(img) => {
                let (width, height) = img.dimensions();
                let rgb = img.to_rgb32f();
                let mut data = Vec::with_capacity((width * height * 8) as usize);
                for texel in rgb.pixels() {
                    for channel in [texel[0], texel[1], texel[2], 1.0f32] {
                        data.extend_from_slice(&half_bits(channel).to_le_bytes());
                    }
                }
                Self {
                    width,
                    height,
                    format: wgpu::TextureFormat::Rgba16Float,
                    data,
                    name: path.display().to_string(),
                }
            }
            Err(err) => {
                log::error!("could not open HDR image {}: {err}", path.display());
                Self {
                    width: 1,
                    height: 1,
                    format: wgpu::TextureFormat::Rgba16Float,
                    data: vec![0; 8],
                    name: "missing hdr".to_string(),
                }
            }
        }
    }

    /// 1x1 texture of one color.
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    pub fn black() -> Self {
        Self::solid_color([0, 0, 0, 255], "black")
    }

    /// Tangent-space normal pointing straight up.
    pub fn flat_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "flat normal")
    }

    /// Loud placeholder for broken texture references.
    pub fn magenta() -> Self {
        Self::solid_color([255, 0, 255, 255], "magenta")
    }

    fn bytes_per_texel(&self) -> u32 {
        match self.format {
            wgpu::TextureFormat::Rgba16Float => 8,
            _ => 4,
        }
    }
}

/// Convert an f32 to IEEE 754 half-float bits.
fn half_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent >= 0x8f {
        // Overflow (or inf/NaN): clamp to infinity, keep NaN payload bit.
        let nan = if exponent == 0xff && mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    if exponent <= 0x70 {
        // Too small for a normal half: flush to zero (denormals dropped).
        return sign;
    }
    sign | (((exponent - 0x70) as u16) << 10) | ((mantissa >> 13) as u16)
}

/// A 2D texture on the GPU with its default view.
pub struct Texture2D {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub name: String,
}

impl Texture2D {
    pub fn create(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> Self {
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&data.name),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: data.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(data.width * data.bytes_per_texel()),
                rows_per_image: Some(data.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: data.width,
            height: data.height,
            name: data.name.clone(),
        }
    }
}

/// A renderable cubemap: whole-cube sampling view plus one render view per
/// face, in +X, -X, +Y, -Y, +Z, -Z order.
pub struct CubeTexture {
    pub texture: wgpu::Texture,
    pub cube_view: wgpu::TextureView,
    pub face_views: [wgpu::TextureView; 6],
    pub resolution: u32,
}

impl CubeTexture {
    pub fn new(device: &wgpu::Device, resolution: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });

        let face_views = std::array::from_fn(|face| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(label),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: face as u32,
                array_layer_count: Some(1),
                ..Default::default()
            })
        });

        Self {
            texture,
            cube_view,
            face_views,
            resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_bits_round_values() {
        assert_eq!(half_bits(0.0), 0x0000);
        assert_eq!(half_bits(1.0), 0x3c00);
        assert_eq!(half_bits(-2.0), 0xc000);
        assert_eq!(half_bits(0.5), 0x3800);
        // Beyond half range clamps to infinity.
        assert_eq!(half_bits(1.0e6), 0x7c00);
    }

    #[test]
    fn test_default_textures_are_single_texels() {
        for data in [
            TextureData::white(),
            TextureData::black(),
            TextureData::flat_normal(),
            TextureData::magenta(),
        ] {
            assert_eq!((data.width, data.height), (1, 1));
            assert_eq!(data.data.len(), 4);
        }
    }

    #[test]
    fn test_missing_hdr_degrades_to_black_texel() {
        let data = TextureData::hdr_or_black("/definitely/not/a/file.hdr");
        assert_eq!((data.width, data.height), (1, 1));
        assert_eq!(data.format, wgpu::TextureFormat::Rgba16Float);
        assert_eq!(data.data, vec![0u8; 8]);
    }
}
