//! Pixel-indexed render targets

use crate::error::{Error, Result};
use std::ops::{Index, IndexMut};

/// A 2D buffer with one payload per pixel, stored row-major with `y = 0` at the top
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

/// Per-pixel depth in `[0, 1)`, with `>= 1.0` marking background
pub type DepthBuffer = RenderTarget<f32>;

/// Per-pixel RGBA color, passed through the pipeline untouched
pub type ColorBuffer = RenderTarget<[f32; 4]>;

/// RGBA float image receiving the debug composite
pub type DebugImage = RenderTarget<[f32; 4]>;

impl<T: Copy + Default> RenderTarget<T> {
    /// Create a target filled with the cleared sentinel (`T::default()`)
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, T::default())
    }

    /// Create a target with every pixel set to `value`
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Wrap existing row-major data
    pub fn from_data(width: u32, height: u32, data: Vec<T>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(Error::InvalidData(format!(
                "render target {}x{} needs {} pixels, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Build a target by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    /// Reset every pixel to the cleared sentinel
    pub fn clear(&mut self) {
        self.fill(T::default());
    }

    /// Set every pixel to `value`
    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|pixel| *pixel = value);
    }

    /// Copy `value` into pixel `(x, y)`; out-of-bounds writes are ignored
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        if let Some(pixel) = self.get_mut(x, y) {
            *pixel = value;
        }
    }
}

impl<T> RenderTarget<T> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major index of pixel `(x, y)`
    pub fn index_of(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Pixel coordinates of a row-major index
    pub fn coords_of(&self, index: usize) -> [u32; 2] {
        let width = self.width.max(1) as usize;
        [(index % width) as u32, (index / width) as u32]
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x < self.width && y < self.height {
            self.data.get(self.index_of(x, y))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut T> {
        if x < self.width && y < self.height {
            let index = self.index_of(x, y);
            self.data.get_mut(index)
        } else {
            None
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}

impl<T> Index<usize> for RenderTarget<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for RenderTarget<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl<T> Index<[u32; 2]> for RenderTarget<T> {
    type Output = T;

    fn index(&self, [x, y]: [u32; 2]) -> &Self::Output {
        &self.data[self.index_of(x, y)]
    }
}

impl<T> IndexMut<[u32; 2]> for RenderTarget<T> {
    fn index_mut(&mut self, [x, y]: [u32; 2]) -> &mut Self::Output {
        let index = self.index_of(x, y);
        &mut self.data[index]
    }
}

impl<'a, T> IntoIterator for &'a RenderTarget<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

/// Reject screens with a zero dimension
pub fn check_screen_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidData(format!(
            "screen size must be non-zero, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

/// Background test shared by every realisation of the depth reader
pub fn is_valid_depth(depth: f32) -> bool {
    depth.is_finite() && (0.0..1.0).contains(&depth)
}
