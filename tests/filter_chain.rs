use voxreg::filter::{BinarizeFilter, CropFilter, MeanFilter, MedianFilter};
use voxreg::{run_chain, Filter, FilterChain, Image, PixelType, Registry, Size2D, TypedImage, VoxRegError};

const FIXTURE: [[u8; 7]; 5] = [
    [0, 10, 20, 30, 40, 50, 60],
    [5, 100, 15, 200, 25, 90, 35],
    [7, 60, 8, 9, 240, 11, 12],
    [80, 1, 2, 3, 4, 5, 6],
    [255, 0, 128, 64, 32, 16, 8],
];

const MEAN_W1: [[u8; 7]; 5] = [
    [29, 25, 63, 55, 73, 50, 59],
    [30, 25, 50, 65, 77, 63, 43],
    [42, 31, 44, 56, 65, 48, 27],
    [67, 60, 31, 54, 43, 37, 10],
    [84, 78, 33, 39, 21, 12, 9],
];

const MEDIAN_W1: [[u8; 7]; 5] = [
    [8, 13, 25, 28, 45, 45, 55],
    [9, 10, 20, 25, 40, 40, 43],
    [34, 8, 9, 9, 11, 12, 12],
    [34, 8, 8, 9, 11, 11, 10],
    [41, 41, 3, 18, 11, 7, 7],
];

fn fixture() -> Image {
    let size = Size2D::new(7, 5).unwrap();
    Image::from(TypedImage::from_fn(size, |x, y| FIXTURE[y][x]))
}

fn rows(image: &Image) -> Vec<Vec<u8>> {
    let typed = image.as_typed::<u8>().unwrap();
    (0..typed.height()).map(|y| typed.row(y).unwrap().to_vec()).collect()
}

fn expected(table: &[[u8; 7]; 5]) -> Vec<Vec<u8>> {
    table.iter().map(|r| r.to_vec()).collect()
}

#[test]
fn mean_fixture_matches_reference() {
    let out = MeanFilter::new(1).filter(&fixture()).unwrap();
    assert_eq!(out.pixel_type(), PixelType::UByte);
    assert_eq!(rows(&out), expected(&MEAN_W1));
}

#[test]
fn median_fixture_matches_reference() {
    let out = MedianFilter::new(1).filter(&fixture()).unwrap();
    assert_eq!(rows(&out), expected(&MEDIAN_W1));
}

#[test]
fn mean_then_binarize_chain() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(7, 5).unwrap();

    let flat = Image::from(TypedImage::filled(size, 5u8));
    let out = run_chain(&registry, "mean:w=1+binarize:min=1", &flat).unwrap();
    let bits = out.as_typed::<bool>().unwrap();
    assert!(bits.data().iter().all(|&b| b));

    let mut spike = TypedImage::filled(size, 0u8);
    spike.set(3, 2, 9).unwrap();
    let out = run_chain(&registry, "mean:w=1+binarize:min=1", &Image::from(spike)).unwrap();
    let bits = out.as_typed::<bool>().unwrap();
    for y in 0..5 {
        for x in 0..7 {
            let inside = (2..=4).contains(&x) && (1..=3).contains(&y);
            assert_eq!(bits.get(x, y).unwrap(), inside, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn chain_keeps_order_and_names() {
    let registry = Registry::with_defaults();
    let chain = FilterChain::parse(&registry, "median:w=2+crop:x=1,y=1,w=4,h=3+convert:repn=float").unwrap();
    assert_eq!(chain.names(), vec!["median", "crop", "convert"]);
    let out = chain.run(&fixture()).unwrap();
    assert_eq!(out.size(), Size2D::new(4, 3).unwrap());
    assert_eq!(out.pixel_type(), PixelType::Float);

    let mut manual = FilterChain::new();
    manual.push_back(Box::new(CropFilter::new(1, 1, Size2D::new(4, 3).unwrap())));
    manual.push_front(Box::new(BinarizeFilter::new(10.0, 100.0).unwrap()));
    assert_eq!(manual.names(), vec!["binarize", "crop"]);
    assert_eq!(manual.run(&fixture()).unwrap().pixel_type(), PixelType::Bit);
}

#[test]
fn chain_errors_surface_before_running() {
    let registry = Registry::with_defaults();
    let err = FilterChain::parse(&registry, "mean:w=1+blur:s=2").err().unwrap();
    assert_eq!(
        err,
        VoxRegError::UnknownPlugin {
            category: "filter",
            name: "blur".to_string(),
        }
    );
    assert!(FilterChain::parse(&registry, "mean:w=-1").err().unwrap().is_invalid_argument());
    assert!(FilterChain::parse(&registry, "binarize:min=5,max=1").err().unwrap().is_invalid_argument());
    let err = run_chain(&registry, "crop:x=5,w=4,h=2", &fixture()).unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn empty_chain_copies_input() {
    let img = fixture();
    assert_eq!(FilterChain::new().run(&img).unwrap(), img);
}
