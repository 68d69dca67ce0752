//! Typed 2D image containers.
//!
//! `TypedImage<T>` owns a contiguous row-major buffer of exactly one scalar
//! pixel type together with geometric calibration and an attribute map.
//! `Image` is the closed, type-erased sum over all supported pixel types;
//! [`dispatch`] recovers the concrete type at run time and hands it to a
//! generic visitor.

use crate::util::{VoxRegError, VoxRegResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod attributes;
pub mod dispatch;
#[cfg(feature = "image-io")]
pub mod io;
pub mod pyramid;

pub use attributes::{AttributeMap, AttributeValue};

/// Extent of a 2D grid; both axes are at least one sample wide.
///
/// The only way to obtain a size is [`Size2D::new`] (deserialization goes
/// through it too), so every image and transformation grid is non-empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSize2D")]
pub struct Size2D {
    width: usize,
    height: usize,
}

#[derive(Deserialize)]
struct RawSize2D {
    width: usize,
    height: usize,
}

impl TryFrom<RawSize2D> for Size2D {
    type Error = VoxRegError;

    fn try_from(raw: RawSize2D) -> Result<Self, Self::Error> {
        Size2D::new(raw.width, raw.height)
    }
}

impl Size2D {
    /// Creates a size, rejecting zero extents.
    pub fn new(width: usize, height: usize) -> VoxRegResult<Self> {
        if width == 0 || height == 0 {
            return Err(VoxRegError::InvalidDimensions { width, height });
        }
        width
            .checked_mul(height)
            .ok_or(VoxRegError::InvalidDimensions { width, height })?;
        Ok(Self { width, height })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    /// Always false for a validated size; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Linear row-major index of `(x, y)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width() + x
    }

    /// Returns true if `(x, y)` lies on the grid.
    #[inline]
    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width() && (y as usize) < self.height()
    }

    /// Divides both extents by `factor`, never going below one sample.
    pub fn shrink(&self, factor: usize) -> Size2D {
        let factor = factor.max(1);
        Size2D {
            width: (self.width() / factor).max(1),
            height: (self.height() / factor).max(1),
        }
    }

    /// Per-axis ratio `self / other`.
    pub fn ratio_to(&self, other: Size2D) -> [f64; 2] {
        [
            self.width() as f64 / other.width() as f64,
            self.height() as f64 / other.height() as f64,
        ]
    }
}

impl fmt::Display for Size2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}

/// Tag of the scalar type backing an image buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    Bit,
    SByte,
    UByte,
    SShort,
    UShort,
    SInt,
    UInt,
    SLong,
    ULong,
    Float,
    Double,
}

impl PixelType {
    /// Every supported pixel type, in declaration order.
    pub const ALL: [PixelType; 11] = [
        PixelType::Bit,
        PixelType::SByte,
        PixelType::UByte,
        PixelType::SShort,
        PixelType::UShort,
        PixelType::SInt,
        PixelType::UInt,
        PixelType::SLong,
        PixelType::ULong,
        PixelType::Float,
        PixelType::Double,
    ];

    /// Short name used in descriptors (`convert:repn=ubyte`).
    pub fn name(self) -> &'static str {
        match self {
            PixelType::Bit => "bit",
            PixelType::SByte => "sbyte",
            PixelType::UByte => "ubyte",
            PixelType::SShort => "sshort",
            PixelType::UShort => "ushort",
            PixelType::SInt => "sint",
            PixelType::UInt => "uint",
            PixelType::SLong => "slong",
            PixelType::ULong => "ulong",
            PixelType::Float => "float",
            PixelType::Double => "double",
        }
    }

    /// Returns true for `Float` and `Double`.
    pub fn is_float(self) -> bool {
        matches!(self, PixelType::Float | PixelType::Double)
    }

    /// Representable value range as `(min, max)`.
    pub fn value_range(self) -> (f64, f64) {
        match self {
            PixelType::Bit => (0.0, 1.0),
            PixelType::SByte => (i8::MIN as f64, i8::MAX as f64),
            PixelType::UByte => (0.0, u8::MAX as f64),
            PixelType::SShort => (i16::MIN as f64, i16::MAX as f64),
            PixelType::UShort => (0.0, u16::MAX as f64),
            PixelType::SInt => (i32::MIN as f64, i32::MAX as f64),
            PixelType::UInt => (0.0, u32::MAX as f64),
            PixelType::SLong => (i64::MIN as f64, i64::MAX as f64),
            PixelType::ULong => (0.0, u64::MAX as f64),
            PixelType::Float => (f32::MIN as f64, f32::MAX as f64),
            PixelType::Double => (f64::MIN, f64::MAX),
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelType {
    type Err = VoxRegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| VoxRegError::invalid(format!("unknown pixel type '{s}'")))
    }
}

/// Scalar element type of an image.
///
/// Implemented for exactly the types listed in [`PixelType`]; the wrap and
/// unwrap hooks tie each type to its `Image` variant.
pub trait Pixel: Copy + Default + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// Tag matching this type.
    const PIXEL_TYPE: PixelType;

    /// Widens the value to `f64`.
    fn to_f64(self) -> f64;

    /// Narrows an `f64`: integers round and saturate, bits test `> 0.5`.
    fn from_f64(value: f64) -> Self;

    /// Wraps a typed image into the type-erased enum.
    fn wrap(image: TypedImage<Self>) -> Image;

    /// Borrows the typed image if `image` holds this pixel type.
    fn unwrap_ref(image: &Image) -> Option<&TypedImage<Self>>;
}

macro_rules! impl_pixel {
    ($t:ty, $variant:ident, int) => {
        impl Pixel for $t {
            const PIXEL_TYPE: PixelType = PixelType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                // `as` saturates and maps NaN to zero.
                value.round() as $t
            }

            fn wrap(image: TypedImage<Self>) -> Image {
                Image::$variant(image)
            }

            fn unwrap_ref(image: &Image) -> Option<&TypedImage<Self>> {
                match image {
                    Image::$variant(typed) => Some(typed),
                    _ => None,
                }
            }
        }
    };
    ($t:ty, $variant:ident, float) => {
        impl Pixel for $t {
            const PIXEL_TYPE: PixelType = PixelType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn wrap(image: TypedImage<Self>) -> Image {
                Image::$variant(image)
            }

            fn unwrap_ref(image: &Image) -> Option<&TypedImage<Self>> {
                match image {
                    Image::$variant(typed) => Some(typed),
                    _ => None,
                }
            }
        }
    };
}

impl Pixel for bool {
    const PIXEL_TYPE: PixelType = PixelType::Bit;

    #[inline]
    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value > 0.5
    }

    fn wrap(image: TypedImage<Self>) -> Image {
        Image::Bit(image)
    }

    fn unwrap_ref(image: &Image) -> Option<&TypedImage<Self>> {
        match image {
            Image::Bit(typed) => Some(typed),
            _ => None,
        }
    }
}

impl_pixel!(i8, SByte, int);
impl_pixel!(u8, UByte, int);
impl_pixel!(i16, SShort, int);
impl_pixel!(u16, UShort, int);
impl_pixel!(i32, SInt, int);
impl_pixel!(u32, UInt, int);
impl_pixel!(i64, SLong, int);
impl_pixel!(u64, ULong, int);
impl_pixel!(f32, Float, float);
impl_pixel!(f64, Double, float);

/// Geometric calibration and free-form metadata of an image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageMeta {
    /// Physical extent of one pixel along x and y.
    pub pixel_size: [f64; 2],
    /// Physical coordinate of pixel `(0, 0)`.
    pub origin: [f64; 2],
    /// In-plane rotation of the pixel axes in radians.
    pub rotation: f64,
    /// Free-form attributes.
    pub attributes: AttributeMap,
}

impl Default for ImageMeta {
    fn default() -> Self {
        Self {
            pixel_size: [1.0, 1.0],
            origin: [0.0, 0.0],
            rotation: 0.0,
            attributes: AttributeMap::new(),
        }
    }
}

/// Owned 2D image of one concrete pixel type.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedImage<T> {
    size: Size2D,
    data: Vec<T>,
    meta: ImageMeta,
}

/// Double-precision image used by the registration numerics.
pub type DoubleImage = TypedImage<f64>;

impl<T: Copy> TypedImage<T> {
    /// Creates an image from a row-major buffer of exactly `size.len()` values.
    pub fn new(size: Size2D, data: Vec<T>) -> VoxRegResult<Self> {
        if data.len() != size.len() {
            return Err(VoxRegError::InvalidDimensions {
                width: size.width(),
                height: size.height(),
            });
        }
        Ok(Self {
            size,
            data,
            meta: ImageMeta::default(),
        })
    }

    /// Creates an image with every pixel set to `value`.
    pub fn filled(size: Size2D, value: T) -> Self {
        Self {
            size,
            data: vec![value; size.len()],
            meta: ImageMeta::default(),
        }
    }

    /// Creates an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F: FnMut(usize, usize) -> T>(size: Size2D, mut f: F) -> Self {
        let mut data = Vec::with_capacity(size.len());
        for y in 0..size.height() {
            for x in 0..size.width() {
                data.push(f(x, y));
            }
        }
        Self {
            size,
            data,
            meta: ImageMeta::default(),
        }
    }

    /// Returns the grid size.
    pub fn size(&self) -> Size2D {
        self.size
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.size.width()
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.size.height()
    }

    /// Returns the pixel at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.size.width() || y >= self.size.height() {
            return None;
        }
        Some(self.data[self.size.index(x, y)])
    }

    /// Sets the pixel at `(x, y)`; out-of-bounds writes are rejected.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> VoxRegResult<()> {
        if x >= self.size.width() || y >= self.size.height() {
            return Err(VoxRegError::invalid(format!(
                "pixel ({x}, {y}) outside image of size {}",
                self.size
            )));
        }
        let idx = self.size.index(x, y);
        self.data[idx] = value;
        Ok(())
    }

    /// Returns row `y`.
    pub fn row(&self, y: usize) -> Option<&[T]> {
        if y >= self.size.height() {
            return None;
        }
        let start = y * self.size.width();
        self.data.get(start..start + self.size.width())
    }

    /// Returns the row-major pixel buffer.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the mutable row-major pixel buffer.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the image and returns its buffer.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Returns the calibration and attributes.
    pub fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    /// Returns the mutable calibration and attributes.
    pub fn meta_mut(&mut self) -> &mut ImageMeta {
        &mut self.meta
    }

    /// Replaces the metadata, builder style.
    pub fn with_meta(mut self, meta: ImageMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Maps every pixel to a new type, keeping size and metadata.
    pub fn map<U, F: Fn(T) -> U>(&self, f: F) -> TypedImage<U> {
        TypedImage {
            size: self.size,
            data: self.data.iter().map(|&v| f(v)).collect(),
            meta: self.meta.clone(),
        }
    }

    /// Creates an image of another type with the same size and metadata.
    pub fn with_same_geometry<U>(&self, data: Vec<U>) -> VoxRegResult<TypedImage<U>>
    where
        U: Copy,
    {
        Ok(TypedImage::new(self.size, data)?.with_meta(self.meta.clone()))
    }
}

impl<T: Pixel> TypedImage<T> {
    /// Converts to a double-precision image.
    pub fn to_double(&self) -> DoubleImage {
        self.map(Pixel::to_f64)
    }

    /// Converts from a double-precision image with rounding and saturation.
    pub fn from_double(image: &DoubleImage) -> Self {
        image.map(T::from_f64)
    }
}

/// Type-erased image over the closed pixel-type set.
#[derive(Clone, Debug, PartialEq)]
pub enum Image {
    Bit(TypedImage<bool>),
    SByte(TypedImage<i8>),
    UByte(TypedImage<u8>),
    SShort(TypedImage<i16>),
    UShort(TypedImage<u16>),
    SInt(TypedImage<i32>),
    UInt(TypedImage<u32>),
    SLong(TypedImage<i64>),
    ULong(TypedImage<u64>),
    Float(TypedImage<f32>),
    Double(TypedImage<f64>),
}

/// Shared image handle; the image is released with the last reference.
pub type SharedImage = Arc<Image>;

impl<T: Pixel> From<TypedImage<T>> for Image {
    fn from(image: TypedImage<T>) -> Self {
        T::wrap(image)
    }
}

impl Image {
    /// Returns the tag of the backing pixel type.
    pub fn pixel_type(&self) -> PixelType {
        dispatch::dispatch_image!(self, typed => pixel_type_of(typed))
    }

    /// Returns the grid size.
    pub fn size(&self) -> Size2D {
        dispatch::dispatch_image!(self, typed => typed.size())
    }

    /// Returns the calibration and attributes.
    pub fn meta(&self) -> &ImageMeta {
        dispatch::dispatch_image!(self, typed => typed.meta())
    }

    /// Returns the mutable calibration and attributes.
    pub fn meta_mut(&mut self) -> &mut ImageMeta {
        dispatch::dispatch_image!(self, typed => typed.meta_mut())
    }

    /// Borrows the typed image if the pixel type is `T`.
    pub fn as_typed<T: Pixel>(&self) -> Option<&TypedImage<T>> {
        T::unwrap_ref(self)
    }

    /// Converts to a double-precision image.
    pub fn to_double(&self) -> DoubleImage {
        dispatch::dispatch_image!(self, typed => typed.to_double())
    }

    /// Converts to `target`, rounding and saturating as needed.
    pub fn convert_to(&self, target: PixelType) -> Image {
        self.map_values(target, |v| v)
    }

    /// Converts to `target` after mapping every value through `f`.
    pub fn map_values<F: Fn(f64) -> f64>(&self, target: PixelType, f: F) -> Image {
        let double = self.to_double();
        dispatch::with_pixel_type!(target, T => {
            Image::from(double.map(|v| <T as Pixel>::from_f64(f(v))))
        })
    }

    /// Returns `(min, max)` of the pixel values.
    pub fn value_range(&self) -> (f64, f64) {
        dispatch::dispatch_image!(self, typed => {
            typed.data().iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                let v = v.to_f64();
                (lo.min(v), hi.max(v))
            })
        })
    }
}

fn pixel_type_of<T: Pixel>(_image: &TypedImage<T>) -> PixelType {
    T::PIXEL_TYPE
}
