//! Materials table (§4.7): the GPU-side array of [`MaterialData`] rows
//! indexed by `scattered_material_ids`, bound at the root signature's
//! materials SRV (`b3`). Reuploaded as one contiguous snapshot whenever
//! dirty -- the same bounded, write-mostly policy [`crate::mesh::MeshRegistry`]
//! uses for its own small table, since the number of live materials is a
//! similarly small, bounded count compared to instance or vertex counts.

use super::MaterialData;

/// Stable-index table mapping a `materialId` to its GPU row.
pub struct MaterialTable {
    rows: Vec<MaterialData>,
    buffer: Option<wgpu::Buffer>,
    dirty: bool,
}

impl MaterialTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            buffer: None,
            dirty: true,
        }
    }

    /// Writes `data` at `material_id`, growing the table with default rows
    /// if needed.
    pub fn set(&mut self, material_id: u32, data: MaterialData) {
        let idx = material_id as usize;
        if idx >= self.rows.len() {
            self.rows.resize(idx + 1, MaterialData::default());
        }
        self.rows[idx] = data;
        self.dirty = true;
    }

    #[must_use]
    pub fn get(&self, material_id: u32) -> Option<&MaterialData> {
        self.rows.get(material_id as usize)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Re-sends the entire snapshot when dirty, reallocating the backing
    /// buffer if it has grown past its current size.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> &wgpu::Buffer {
        if self.rows.is_empty() {
            self.rows.push(MaterialData::default());
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.rows);
        let needed_size = bytes.len() as u64;
        let needs_realloc = match &self.buffer {
            Some(b) => b.size() < needed_size,
            None => true,
        };
        if needs_realloc {
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("materials-table"),
                size: needed_size.next_power_of_two(),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.dirty = true;
        }
        if self.dirty {
            if let Some(buffer) = &self.buffer {
                queue.write_buffer(buffer, 0, bytes);
            }
            self.dirty = false;
        }
        self.buffer.as_ref().expect("buffer allocated above")
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_a_sparse_id_backfills_defaults() {
        let mut table = MaterialTable::new();
        table.set(3, MaterialData { albedo: 7, ..MaterialData::default() });
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(0).unwrap().albedo, crate::bindless::NULL_SLOT);
        assert_eq!(table.get(3).unwrap().albedo, 7);
    }
}
