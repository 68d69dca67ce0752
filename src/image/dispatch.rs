//! Run-time pixel-type dispatch onto generic visitors.
//!
//! A visitor is written once as a generic method over `T: Pixel`; the
//! functions here recover the concrete type of an [`Image`] and call the
//! matching monomorphized instance. A visitor that cannot handle a type
//! returns [`VoxRegError::UnsupportedType`] from its generic body.

use super::{Image, Pixel, PixelType, TypedImage};
use crate::util::{VoxRegError, VoxRegResult};

/// Matches every `Image` variant and binds the typed image to `$typed`.
///
/// Works on `Image`, `&Image` and `&mut Image` through binding modes.
macro_rules! dispatch_image {
    ($image:expr, $typed:ident => $body:expr) => {
        match $image {
            $crate::image::Image::Bit($typed) => $body,
            $crate::image::Image::SByte($typed) => $body,
            $crate::image::Image::UByte($typed) => $body,
            $crate::image::Image::SShort($typed) => $body,
            $crate::image::Image::UShort($typed) => $body,
            $crate::image::Image::SInt($typed) => $body,
            $crate::image::Image::UInt($typed) => $body,
            $crate::image::Image::SLong($typed) => $body,
            $crate::image::Image::ULong($typed) => $body,
            $crate::image::Image::Float($typed) => $body,
            $crate::image::Image::Double($typed) => $body,
        }
    };
}

/// Binds the scalar type named by a [`PixelType`] to the alias `$t`.
macro_rules! with_pixel_type {
    ($pixel_type:expr, $t:ident => $body:expr) => {
        match $pixel_type {
            $crate::image::PixelType::Bit => {
                type $t = bool;
                $body
            }
            $crate::image::PixelType::SByte => {
                type $t = i8;
                $body
            }
            $crate::image::PixelType::UByte => {
                type $t = u8;
                $body
            }
            $crate::image::PixelType::SShort => {
                type $t = i16;
                $body
            }
            $crate::image::PixelType::UShort => {
                type $t = u16;
                $body
            }
            $crate::image::PixelType::SInt => {
                type $t = i32;
                $body
            }
            $crate::image::PixelType::UInt => {
                type $t = u32;
                $body
            }
            $crate::image::PixelType::SLong => {
                type $t = i64;
                $body
            }
            $crate::image::PixelType::ULong => {
                type $t = u64;
                $body
            }
            $crate::image::PixelType::Float => {
                type $t = f32;
                $body
            }
            $crate::image::PixelType::Double => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_image;
pub(crate) use with_pixel_type;

/// Read-only visitor over one image.
pub trait ImageVisitor {
    type Output;

    fn visit<T: Pixel>(&self, image: &TypedImage<T>) -> VoxRegResult<Self::Output>;
}

/// Visitor that modifies one image in place.
pub trait ImageVisitorMut {
    fn visit_mut<T: Pixel>(&self, image: &mut TypedImage<T>) -> VoxRegResult<()>;
}

/// Stateful visitor that folds a sequence of images.
pub trait ImageAccumulator {
    fn accumulate<T: Pixel>(&mut self, image: &TypedImage<T>) -> VoxRegResult<()>;
}

/// Visitor over two images of the same pixel type.
pub trait EqualVisitor {
    type Output;

    fn visit_equal<T: Pixel>(
        &self,
        a: &TypedImage<T>,
        b: &TypedImage<T>,
    ) -> VoxRegResult<Self::Output>;
}

/// Visitor over two images of independent pixel types.
pub trait BinaryVisitor {
    type Output;

    fn visit_pair<A: Pixel, B: Pixel>(
        &self,
        a: &TypedImage<A>,
        b: &TypedImage<B>,
    ) -> VoxRegResult<Self::Output>;
}

/// Runs `visitor` on the concrete image held by `image`.
pub fn filter<V: ImageVisitor>(visitor: &V, image: &Image) -> VoxRegResult<V::Output> {
    dispatch_image!(image, typed => visitor.visit(typed))
}

/// Runs an in-place visitor on `image`.
pub fn filter_inplace<V: ImageVisitorMut>(visitor: &V, image: &mut Image) -> VoxRegResult<()> {
    dispatch_image!(image, typed => visitor.visit_mut(typed))
}

/// Feeds `image` into an accumulating visitor.
pub fn accumulate<V: ImageAccumulator>(visitor: &mut V, image: &Image) -> VoxRegResult<()> {
    dispatch_image!(image, typed => visitor.accumulate(typed))
}

/// Runs `visitor` on two images that must share their pixel type.
pub fn filter_equal<V: EqualVisitor>(visitor: &V, a: &Image, b: &Image) -> VoxRegResult<V::Output> {
    dispatch_image!(a, typed => equal_arm(visitor, typed, b))
}

/// Runs `visitor` on every pixel-type combination of two images.
pub fn filter2<V: BinaryVisitor>(visitor: &V, a: &Image, b: &Image) -> VoxRegResult<V::Output> {
    dispatch_image!(a, typed => pair_arm(visitor, typed, b))
}

fn equal_arm<T: Pixel, V: EqualVisitor>(
    visitor: &V,
    a: &TypedImage<T>,
    b: &Image,
) -> VoxRegResult<V::Output> {
    match T::unwrap_ref(b) {
        Some(other) => visitor.visit_equal(a, other),
        None => Err(VoxRegError::invalid(format!(
            "pixel types differ: {} vs {}",
            T::PIXEL_TYPE,
            b.pixel_type()
        ))),
    }
}

fn pair_arm<A: Pixel, V: BinaryVisitor>(
    visitor: &V,
    a: &TypedImage<A>,
    b: &Image,
) -> VoxRegResult<V::Output> {
    dispatch_image!(b, other => visitor.visit_pair(a, other))
}

/// Error a visitor returns for a pixel type it does not handle.
pub fn unsupported<T: Pixel, O>(operation: &'static str) -> VoxRegResult<O> {
    Err(VoxRegError::UnsupportedType {
        operation,
        pixel_type: T::PIXEL_TYPE,
    })
}

/// Returns true if `pixel_type` is one of `accepted`.
pub fn accepts(pixel_type: PixelType, accepted: &[PixelType]) -> bool {
    accepted.contains(&pixel_type)
}
