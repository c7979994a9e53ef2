//! Backing storage for the bindless texture array (§4.2, §7 "texture file
//! missing or malformed -> fall back to the engine's default texture").
//!
//! [`BindlessHeap`](super::BindlessHeap) only hands out slot numbers;
//! [`TextureTable`] is where a slot's actual `wgpu::TextureView` lives. Every
//! unused or not-yet-loaded slot defaults to a 1x1 white texture so the
//! `binding_array` is always fully populated and partially-bound indexing
//! never reads a null view.
use crate::errors::Result;

pub struct TextureTable {
    views: Vec<wgpu::TextureView>,
    default_texture: wgpu::Texture,
    default_view: wgpu::TextureView,
    dirty: bool,
}

impl TextureTable {
    #[must_use]
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, capacity: u32) -> Self {
        let default_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("bindless-default-texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            default_texture.as_image_copy(),
            &[255, 255, 255, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let default_view = default_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            views: vec![default_view.clone(); capacity as usize],
            default_texture,
            default_view,
            dirty: true,
        }
    }

    /// Points bindless slot `slot` at `view`, replacing whatever occupied it
    /// (typically the default texture for a freshly-allocated slot).
    pub fn set(&mut self, slot: u32, view: wgpu::TextureView) -> Result<()> {
        let idx = slot as usize;
        if idx >= self.views.len() {
            return Err(crate::errors::RenderError::DescriptorHeapExhausted { capacity: self.views.len() as u32 });
        }
        self.views[idx] = view;
        self.dirty = true;
        Ok(())
    }

    /// Resets slot `slot` back to the default texture (called from
    /// [`crate::device::disposal::DisposalQueue::flush`]'s release path).
    pub fn clear(&mut self, slot: u32) {
        if let Some(view) = self.views.get_mut(slot as usize) {
            *view = self.default_view.clone();
            self.dirty = true;
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Borrowed-view array suitable for `BindingResource::TextureViewArray`.
    #[must_use]
    pub fn views(&self) -> Vec<&wgpu::TextureView> {
        self.views.iter().collect()
    }

    #[must_use]
    pub fn default_view(&self) -> &wgpu::TextureView {
        &self.default_view
    }
}

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check(_: &TextureTable) {
        assert_send_sync::<wgpu::Texture>();
    }
};
