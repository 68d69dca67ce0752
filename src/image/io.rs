//! Loading and saving gray images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::{Image, PixelType, Size2D, TypedImage};
use crate::util::fs::{io_error, write_atomic};
use crate::util::VoxRegResult;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use std::path::Path;

/// Creates a `UByte` image from a grayscale image buffer.
pub fn image_from_gray8(img: &image::GrayImage) -> VoxRegResult<Image> {
    let size = Size2D::new(img.width() as usize, img.height() as usize)?;
    Ok(Image::from(TypedImage::new(size, img.as_raw().clone())?))
}

/// Converts a decoded image to gray, keeping 16-bit depth where present.
pub fn image_from_dynamic(img: &DynamicImage) -> VoxRegResult<Image> {
    match img {
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => {
            let gray = img.to_luma16();
            let size = Size2D::new(gray.width() as usize, gray.height() as usize)?;
            Ok(Image::from(TypedImage::new(size, gray.into_raw())?))
        }
        _ => image_from_gray8(&img.to_luma8()),
    }
}

/// Loads an image from disk as `UByte` or `UShort` gray.
pub fn load_image<P: AsRef<Path>>(path: P) -> VoxRegResult<Image> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|err| io_error(path, &err))?;
    image_from_dynamic(&img)
}

/// Saves an image as 8-bit gray, or 16-bit gray for wider integer types.
///
/// Values saturate to the output depth; bit images map to 0/255. The file
/// is written atomically.
pub fn save_image<P: AsRef<Path>>(path: P, image: &Image) -> VoxRegResult<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).map_err(|err| io_error(path, &err))?;
    let size = image.size();
    let (width, height) = (size.width() as u32, size.height() as u32);
    let wide = matches!(
        image.pixel_type(),
        PixelType::SShort
            | PixelType::UShort
            | PixelType::SInt
            | PixelType::UInt
            | PixelType::SLong
            | PixelType::ULong
    );

    write_atomic(path, |tmp| {
        let result = if wide {
            let data = image.to_double().map(|v| v.round().clamp(0.0, 65535.0) as u16);
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(width, height, data.into_data())
                .ok_or_else(|| io_error(tmp, &"buffer does not match image size"))?
                .save_with_format(tmp, format)
        } else {
            let gain = if image.pixel_type() == PixelType::Bit { 255.0 } else { 1.0 };
            let data = image
                .to_double()
                .map(|v| (gain * v).round().clamp(0.0, 255.0) as u8);
            image::GrayImage::from_raw(width, height, data.into_data())
                .ok_or_else(|| io_error(tmp, &"buffer does not match image size"))?
                .save_with_format(tmp, format)
        };
        result.map_err(|err| io_error(tmp, &err))
    })
}

#[cfg(test)]
mod tests {
    use super::{load_image, save_image};
    use crate::image::{Image, PixelType, Size2D, TypedImage};

    #[test]
    fn png_round_trip_keeps_depth() {
        let dir = std::env::temp_dir().join(format!("voxreg-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let size = Size2D::new(3, 2).unwrap();

        let wide = Image::from(TypedImage::new(size, vec![0u16, 1, 500, 65535, 7, 9]).unwrap());
        let path = dir.join("wide.png");
        save_image(&path, &wide).unwrap();
        let back = load_image(&path).unwrap();
        assert_eq!(back.pixel_type(), PixelType::UShort);
        assert_eq!(back, wide);

        let float = Image::from(TypedImage::new(size, vec![-3.0f32, 0.4, 12.6, 300.0, 1.0, 2.0]).unwrap());
        let path = dir.join("narrow.png");
        save_image(&path, &float).unwrap();
        let back = load_image(&path).unwrap();
        assert_eq!(back.as_typed::<u8>().unwrap().data(), &[0, 0, 13, 255, 1, 2]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_extension_is_rejected_without_output() {
        let dir = std::env::temp_dir().join(format!("voxreg-io-ext-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let img = Image::from(TypedImage::filled(Size2D::new(2, 2).unwrap(), 1u8));
        let path = dir.join("out.unknown");
        assert!(save_image(&path, &img).is_err());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
