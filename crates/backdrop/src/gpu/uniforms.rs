use crate::registry::UniformLayout;
use crate::types::{SurfaceSize, UniformValue};

/// CPU-side copy of a program's std140 block, uploaded once per draw.
#[derive(Debug, Clone)]
pub(crate) struct UniformBlock {
    bytes: Vec<u8>,
    viewport_offset: usize,
}

impl UniformBlock {
    pub fn new(layout: &UniformLayout) -> Self {
        Self {
            bytes: vec![0; layout.block_size()],
            viewport_offset: layout.viewport_offset(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes `value` at `offset`. `mat2` columns land on 16-byte strides.
    pub fn write(&mut self, offset: usize, value: &UniformValue) {
        match value {
            UniformValue::Mat2(m) => {
                self.put(offset, &m[0..2]);
                self.put(offset + 16, &m[2..4]);
            }
            other => self.put(offset, other.as_slice()),
        }
    }

    pub fn write_field(&mut self, layout: &UniformLayout, name: &str, value: &UniformValue) -> bool {
        match layout.field(name) {
            Some(field) if field.kind == value.kind() => {
                self.write(field.offset, value);
                true
            }
            _ => false,
        }
    }

    pub fn set_viewport(&mut self, size: SurfaceSize) {
        self.put(self.viewport_offset, &size.as_uniform());
    }

    fn put(&mut self, offset: usize, floats: &[f32]) {
        let bytes: &[u8] = bytemuck::cast_slice(floats);
        if let Some(target) = self.bytes.get_mut(offset..offset + bytes.len()) {
            target.copy_from_slice(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{UniformKind, UniformSpec};

    fn read(block: &UniformBlock, offset: usize, count: usize) -> Vec<f32> {
        block.as_bytes()[offset..offset + count * 4]
            .chunks_exact(4)
            .map(|chunk| bytemuck::pod_read_unaligned::<f32>(chunk))
            .collect()
    }

    #[test]
    fn writes_fields_at_std140_offsets() {
        let layout = UniformLayout::new(&[
            UniformSpec::resolution("uResolution"),
            UniformSpec::time("uTime"),
            UniformSpec::color("uColor"),
        ])
        .expect("layout");
        let mut block = UniformBlock::new(&layout);
        assert_eq!(block.as_bytes().len(), layout.block_size());

        assert!(block.write_field(&layout, "uTime", &UniformValue::Scalar(2.5)));
        assert!(block.write_field(&layout, "uColor", &UniformValue::Vec3([0.1, 0.2, 0.3])));
        assert!(!block.write_field(&layout, "uTime", &UniformValue::Vec2([1.0, 1.0])));
        assert!(!block.write_field(&layout, "uMissing", &UniformValue::Scalar(1.0)));
        block.set_viewport(SurfaceSize::new(640, 480));

        assert_eq!(read(&block, 8, 1), vec![2.5]);
        assert_eq!(read(&block, 16, 3), vec![0.1, 0.2, 0.3]);
        assert_eq!(read(&block, layout.viewport_offset(), 2), vec![640.0, 480.0]);
    }

    #[test]
    fn mat2_columns_are_padded() {
        let layout =
            UniformLayout::new(&[UniformSpec::custom("u_rotation", UniformKind::Mat2)]).expect("layout");
        let mut block = UniformBlock::new(&layout);
        block.write(0, &UniformValue::Mat2([1.0, 2.0, 3.0, 4.0]));

        assert_eq!(read(&block, 0, 4), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(read(&block, 16, 2), vec![3.0, 4.0]);
    }
}
