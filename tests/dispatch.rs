use voxreg::image::dispatch::{
    accepts, accumulate, filter, filter2, filter_equal, filter_inplace, unsupported,
    BinaryVisitor, EqualVisitor, ImageAccumulator, ImageVisitor, ImageVisitorMut,
};
use voxreg::image::Pixel;
use voxreg::{Image, PixelType, Size2D, TypedImage, VoxRegError, VoxRegResult};

fn image_of(pixel_type: PixelType) -> Image {
    let size = Size2D::new(3, 2).unwrap();
    Image::from(TypedImage::from_fn(size, |x, y| ((x + y) % 2) as u8)).convert_to(pixel_type)
}

struct TypeName;

impl ImageVisitor for TypeName {
    type Output = PixelType;

    fn visit<T: Pixel>(&self, _image: &TypedImage<T>) -> VoxRegResult<PixelType> {
        Ok(T::PIXEL_TYPE)
    }
}

struct PairNames;

impl BinaryVisitor for PairNames {
    type Output = (PixelType, PixelType, f64);

    fn visit_pair<A: Pixel, B: Pixel>(
        &self,
        a: &TypedImage<A>,
        b: &TypedImage<B>,
    ) -> VoxRegResult<Self::Output> {
        let sum: f64 = a
            .data()
            .iter()
            .zip(b.data())
            .map(|(x, y)| x.to_f64() + y.to_f64())
            .sum();
        Ok((A::PIXEL_TYPE, B::PIXEL_TYPE, sum))
    }
}

struct SameSum;

impl EqualVisitor for SameSum {
    type Output = f64;

    fn visit_equal<T: Pixel>(&self, a: &TypedImage<T>, b: &TypedImage<T>) -> VoxRegResult<f64> {
        Ok(a.data().iter().chain(b.data()).map(|v| v.to_f64()).sum())
    }
}

struct Invert;

impl ImageVisitorMut for Invert {
    fn visit_mut<T: Pixel>(&self, image: &mut TypedImage<T>) -> VoxRegResult<()> {
        if !accepts(T::PIXEL_TYPE, &[PixelType::UByte, PixelType::Bit]) {
            return unsupported::<T, ()>("invert");
        }
        for v in image.data_mut() {
            *v = T::from_f64(1.0 - v.to_f64());
        }
        Ok(())
    }
}

#[derive(Default)]
struct CountPixels {
    count: usize,
    types: Vec<PixelType>,
}

impl ImageAccumulator for CountPixels {
    fn accumulate<T: Pixel>(&mut self, image: &TypedImage<T>) -> VoxRegResult<()> {
        self.count += image.data().len();
        self.types.push(T::PIXEL_TYPE);
        Ok(())
    }
}

#[test]
fn single_dispatch_reaches_every_type() {
    for pt in PixelType::ALL {
        assert_eq!(filter(&TypeName, &image_of(pt)).unwrap(), pt);
    }
}

#[test]
fn binary_dispatch_covers_all_121_pairs() {
    let mut seen = 0;
    for a in PixelType::ALL {
        for b in PixelType::ALL {
            let (ta, tb, sum) = filter2(&PairNames, &image_of(a), &image_of(b)).unwrap();
            assert_eq!((ta, tb), (a, b));
            assert_eq!(sum, 6.0);
            seen += 1;
        }
    }
    assert_eq!(seen, 121);
}

#[test]
fn equal_dispatch_rejects_mixed_types() {
    let a = image_of(PixelType::Float);
    assert_eq!(filter_equal(&SameSum, &a, &a).unwrap(), 6.0);
    let err = filter_equal(&SameSum, &a, &image_of(PixelType::SShort)).unwrap_err();
    assert_eq!(err, VoxRegError::invalid("pixel types differ: float vs sshort"));
}

#[test]
fn inplace_visitor_reports_unsupported_types() {
    let mut img = image_of(PixelType::UByte);
    filter_inplace(&Invert, &mut img).unwrap();
    let values = img.to_double();
    assert_eq!(values.data(), &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);

    let mut img = image_of(PixelType::Double);
    let err = filter_inplace(&Invert, &mut img).unwrap_err();
    assert_eq!(
        err,
        VoxRegError::UnsupportedType {
            operation: "invert",
            pixel_type: PixelType::Double,
        }
    );
}

#[test]
fn accumulator_sees_images_in_order() {
    let mut acc = CountPixels::default();
    accumulate(&mut acc, &image_of(PixelType::Bit)).unwrap();
    accumulate(&mut acc, &image_of(PixelType::ULong)).unwrap();
    assert_eq!(acc.count, 12);
    assert_eq!(acc.types, vec![PixelType::Bit, PixelType::ULong]);
}
