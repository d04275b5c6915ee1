use std::fmt::Debug;

use num_complex::Complex;

use crate::{
    backend::Storage,
    engine::Engine,
    error::{Result, SimError},
};

/// The component layout of every texel in a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// One component per texel; 1.0 for selected basis states, 0.0 otherwise.
    Mask,
    /// Real and imaginary part of an amplitude.
    Vec2,
    /// Polar kets, consistency ratios and density matrices.
    Vec4,
}
impl Format {
    pub const fn components(self) -> usize {
        match self {
            Format::Mask => 1,
            Format::Vec2 => 2,
            Format::Vec4 => 4,
        }
    }
}

/// Size class of a texture: `2^qubits` texels of the given format, laid out on
/// a `width × height` grid with `width = 2^⌈qubits/2⌉` and `height = 2^⌊qubits/2⌋`.
///
/// Basis index `k` lives at `(k % width, k / width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureShape {
    qubits: u32,
    format: Format,
}
impl TextureShape {
    pub const fn new(qubits: u32, format: Format) -> Self {
        TextureShape { qubits, format }
    }

    /// The shape holding exactly `len` texels.
    pub fn for_len(len: usize, format: Format) -> Result<Self> {
        if len == 0 || !len.is_power_of_two() {
            return Err(SimError::InvalidTextureLength { len });
        }
        Ok(TextureShape::new(len.ilog2(), format))
    }

    pub fn qubits(&self) -> u32 {
        self.qubits
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Number of texels.
    pub fn len(&self) -> usize {
        1 << self.qubits
    }

    pub fn width(&self) -> usize {
        1 << self.qubits.div_ceil(2)
    }

    pub fn height(&self) -> usize {
        1 << (self.qubits / 2)
    }

    /// Number of `f32` values backing the texture.
    pub fn float_len(&self) -> usize {
        self.len() * self.format.components()
    }

    /// Bytes backing the texture, saturating at `u64::MAX` for shapes no device can hold.
    pub fn byte_len(&self) -> u64 {
        let texel_bytes = (self.format.components() * size_of::<f32>()) as u64;
        1u64.checked_shl(self.qubits).map_or(u64::MAX, |len| len.saturating_mul(texel_bytes))
    }

    /// Texel coordinate of basis index `k`.
    pub fn coords(&self, k: usize) -> (usize, usize) {
        (k % self.width(), k / self.width())
    }

    /// Basis index of the texel at `(x, y)`.
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width() + x
    }
}

/// A handle to pooled texture storage owned by an [`Engine`].
///
/// Dropping the handle returns the storage to the engine's pool.
pub struct Texture {
    shape: TextureShape,
    storage: Option<Storage>,
    engine: Engine,
}
impl Texture {
    pub(crate) fn new(engine: Engine, shape: TextureShape, storage: Storage) -> Self {
        Texture {
            shape,
            storage: Some(storage),
            engine,
        }
    }

    pub fn shape(&self) -> TextureShape {
        self.shape
    }

    pub fn qubits(&self) -> u32 {
        self.shape.qubits
    }

    pub fn format(&self) -> Format {
        self.shape.format
    }

    pub fn len(&self) -> usize {
        self.shape.len()
    }

    pub fn width(&self) -> usize {
        self.shape.width()
    }

    pub fn height(&self) -> usize {
        self.shape.height()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn storage(&self) -> &Storage {
        match &self.storage {
            Some(storage) => storage,
            None => unreachable!("texture storage is only taken when the texture is dropped"),
        }
    }

    /// Read every component of every texel back to the host, in basis-index order.
    ///
    /// This blocks until all pending kernels writing the texture have finished.
    pub fn read_pixels(&self) -> Result<Vec<f32>> {
        self.engine.read(self)
    }

    /// Read the texture as bytes, mapping `[0, 1]` onto `[0, 255]`.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(self
            .read_pixels()?
            .into_iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect())
    }

    /// Read an amplitude texture as complex numbers.
    pub fn read_complex(&self) -> Result<Vec<Complex<f32>>> {
        self.expect_format(Format::Vec2)?;
        let pixels = self.read_pixels()?;
        Ok(pixels
            .chunks_exact(2)
            .map(|c| Complex::new(c[0], c[1]))
            .collect())
    }

    pub fn read_vec4(&self) -> Result<Vec<[f32; 4]>> {
        self.expect_format(Format::Vec4)?;
        let pixels = self.read_pixels()?;
        Ok(pixels
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect())
    }

    /// Give the storage back to the pool now rather than at the end of scope.
    pub fn release(self) {}

    fn expect_format(&self, expected: Format) -> Result<()> {
        if self.format() != expected {
            return Err(SimError::FormatMismatch {
                kernel: "readback",
                input: 0,
                expected,
                actual: self.format(),
            });
        }
        Ok(())
    }
}
impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.engine.recycle(self.shape, storage);
        }
    }
}
impl Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("qubits", &self.shape.qubits)
            .field("format", &self.shape.format)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_ish_dimensions() {
        let dims: Vec<(usize, usize)> = (0..7)
            .map(|q| {
                let s = TextureShape::new(q, Format::Vec2);
                (s.width(), s.height())
            })
            .collect();
        assert_eq!(
            dims,
            vec![(1, 1), (2, 1), (2, 2), (4, 2), (4, 4), (8, 4), (8, 8)]
        );
    }

    #[test]
    fn coordinates_round_trip() {
        let s = TextureShape::new(5, Format::Vec4);
        assert_eq!(s.coords(0), (0, 0));
        assert_eq!(s.coords(7), (7, 0));
        assert_eq!(s.coords(8), (0, 1));
        assert_eq!(s.coords(29), (5, 3));
        for k in 0..s.len() {
            let (x, y) = s.coords(k);
            assert_eq!(s.index(x, y), k);
        }
    }

    #[test]
    fn byte_len_saturates() {
        assert_eq!(TextureShape::new(3, Format::Vec2).byte_len(), 64);
        assert_eq!(TextureShape::new(0, Format::Mask).byte_len(), 4);
        assert_eq!(TextureShape::new(62, Format::Vec4).byte_len(), u64::MAX);
        assert_eq!(TextureShape::new(64, Format::Mask).byte_len(), u64::MAX);
    }

    #[test]
    fn for_len_rejects_non_powers_of_two() {
        assert_eq!(
            TextureShape::for_len(16, Format::Vec2),
            Ok(TextureShape::new(4, Format::Vec2))
        );
        assert_eq!(
            TextureShape::for_len(1, Format::Mask),
            Ok(TextureShape::new(0, Format::Mask))
        );
        assert_eq!(
            TextureShape::for_len(0, Format::Vec2),
            Err(SimError::InvalidTextureLength { len: 0 })
        );
        assert_eq!(
            TextureShape::for_len(12, Format::Vec2),
            Err(SimError::InvalidTextureLength { len: 12 })
        );
    }

    #[test]
    fn byte_sizes() {
        let s = TextureShape::new(3, Format::Vec4);
        assert_eq!(s.float_len(), 32);
        assert_eq!(s.byte_len(), 128);
    }
}
