use std::fmt;
use std::ops::{Index, IndexMut};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// One spatial axis of a [`Size3`].
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::X => "width",
            Axis::Y => "height",
            Axis::Z => "depth",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
/// Texel extent of a texture level: width, height and depth.
pub struct Size3 {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Size3 {
    pub const ZERO: Size3 = Size3::new(0, 0, 0);

    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Flat size with a depth of one.
    pub const fn flat(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Extent of mip `level`: every axis halved per level, floored, never below 1.
    pub fn mip(self, level: u32) -> Size3 {
        let shrink = |v: u32| v.checked_shr(level).unwrap_or(0).max(1);
        Size3::new(shrink(self.width), shrink(self.height), shrink(self.depth))
    }

    /// Length of the full mip chain down to 1×1×1.
    pub fn max_mip_levels(self) -> u32 {
        let longest = self.width.max(self.height).max(self.depth).max(1);
        u32::BITS - longest.leading_zeros()
    }

    pub fn product(self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }

    pub fn to_extent(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth,
        }
    }
}

impl Index<Axis> for Size3 {
    type Output = u32;

    fn index(&self, axis: Axis) -> &u32 {
        &self[axis.index()]
    }
}

impl IndexMut<Axis> for Size3 {
    fn index_mut(&mut self, axis: Axis) -> &mut u32 {
        &mut self[axis.index()]
    }
}

impl Index<usize> for Size3 {
    type Output = u32;

    fn index(&self, i: usize) -> &u32 {
        match i {
            0 => &self.width,
            1 => &self.height,
            2 => &self.depth,
            _ => panic!("Size3 index out of range: {i}"),
        }
    }
}

impl IndexMut<usize> for Size3 {
    fn index_mut(&mut self, i: usize) -> &mut u32 {
        match i {
            0 => &mut self.width,
            1 => &mut self.height,
            2 => &mut self.depth,
            _ => panic!("Size3 index out of range: {i}"),
        }
    }
}

impl fmt::Display for Size3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}
